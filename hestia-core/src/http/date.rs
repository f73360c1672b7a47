//! HTTP-date (RFC 9110 §5.6.7) formatting and parsing

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use super::{HttpError, HttpResult};

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";
const RFC850_DATE: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME_DATE: &str = "%a %b %e %H:%M:%S %Y";

/// Format a timestamp as an IMF-fixdate
pub fn format_http_date(when: DateTime<Utc>) -> String {
    when.format(IMF_FIXDATE).to_string()
}

/// Parse any of the three HTTP-date forms
pub fn parse_http_date(value: &str) -> HttpResult<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in [IMF_FIXDATE, RFC850_DATE, ASCTIME_DATE] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(HttpError::InvalidDate(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_round_trip() {
        let when = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        let text = format_http_date(when);
        assert_eq!(text, "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(parse_http_date(&text).unwrap(), when);
    }

    #[test]
    fn test_obsolete_forms() {
        let when = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT").unwrap(), when);
        assert_eq!(parse_http_date("Sun Nov  6 08:49:37 1994").unwrap(), when);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_http_date("yesterday").is_err());
    }
}
