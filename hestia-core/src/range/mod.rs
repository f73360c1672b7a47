//! Byte-range requests (`Range: bytes=...`)
//!
//! Only the `bytes` unit is understood and only a single range is ever
//! served. A request naming several ranges is answered with 416 rather than
//! `multipart/byteranges`.

pub mod inode;

pub use inode::{Inode, InodeSource};

/// Smallest slice served for one range request
pub const MIN_CHUNK: u64 = 128 * 1024;
/// Largest slice served for one range request
pub const MAX_CHUNK: u64 = 320_000;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("malformed range header")]
    Malformed,
    #[error("range not satisfiable for {size} bytes")]
    Unsatisfiable { size: u64 },
    #[error("{count} ranges requested, only one is supported")]
    MultipleRanges { count: usize, size: u64 },
}

impl RangeError {
    /// Resource size to report in `Content-Range: bytes */size`
    pub fn size(&self) -> Option<u64> {
        match self {
            RangeError::Malformed => None,
            RangeError::Unsatisfiable { size } | RangeError::MultipleRanges { size, .. } => {
                Some(*size)
            }
        }
    }
}

/// One requested range; `end` is inclusive and `None` means "to the end"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn full() -> Self {
        Self { start: 0, end: None }
    }

    pub fn is_full_range(&self) -> bool {
        self.start == 0 && self.end.is_none()
    }

    /// Check against a resource of `size` bytes
    pub fn validate(&self, size: u64) -> Result<(), RangeError> {
        let Some(last) = size.checked_sub(1) else {
            return Err(RangeError::Unsatisfiable { size });
        };
        if self.start > last {
            return Err(RangeError::Unsatisfiable { size });
        }
        if let Some(end) = self.end {
            if end > last || self.start >= end {
                return Err(RangeError::Unsatisfiable { size });
            }
        }
        Ok(())
    }
}

/// Parse a `Range` header value into its ranges, in request order
///
/// An empty start means 0, an empty end means open-ended.
pub fn parse_ranges(value: &str) -> Result<Vec<ByteRange>, RangeError> {
    let spec = value.trim().strip_prefix("bytes=").ok_or(RangeError::Malformed)?;

    let mut ranges = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (start, end) = part.split_once('-').ok_or(RangeError::Malformed)?;
        let start = match start.trim() {
            "" => 0,
            s => s.parse().map_err(|_| RangeError::Malformed)?,
        };
        let end = match end.trim() {
            "" => None,
            e => Some(e.parse().map_err(|_| RangeError::Malformed)?),
        };
        ranges.push(ByteRange { start, end });
    }

    if ranges.is_empty() {
        return Err(RangeError::Malformed);
    }
    Ok(ranges)
}

/// Largest slice served per request for a resource of `size` bytes
pub fn chunk_limit(size: u64, mime: &str) -> u64 {
    let chunk = (size / 32).clamp(MIN_CHUNK, MAX_CHUNK);
    if mime.eq_ignore_ascii_case("audio/mpeg") {
        chunk / 2
    } else {
        chunk
    }
}

/// The slice of a resource actually sent back, inclusive bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServedRange {
    pub start: u64,
    pub end: u64,
    pub size: u64,
}

impl ServedRange {
    pub fn whole(size: u64) -> Self {
        Self { start: 0, end: size.saturating_sub(1), size }
    }

    pub fn len(&self) -> u64 {
        if self.size == 0 {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Content-Range` header value
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.size)
    }
}

/// Validate the requested ranges and clamp the single survivor to the chunk limit
pub fn resolve(ranges: &[ByteRange], size: u64, mime: &str) -> Result<ServedRange, RangeError> {
    let range = match ranges {
        [range] => *range,
        [] => return Err(RangeError::Malformed),
        many => return Err(RangeError::MultipleRanges { count: many.len(), size }),
    };
    range.validate(size)?;

    let last = size - 1;
    let requested_end = range.end.unwrap_or(last);
    let clamped_end = range.start.saturating_add(chunk_limit(size, mime) - 1);
    Ok(ServedRange { start: range.start, end: requested_end.min(clamped_end), size })
}

/// Whether an `If-Range` validator still names the current representation
pub fn if_range_matches(value: &str, etag: Option<&str>, last_modified: Option<&str>) -> bool {
    let value = value.trim();
    if value.starts_with('"') || value.starts_with("W/") {
        etag.is_some_and(|etag| etag == value)
    } else {
        last_modified.is_some_and(|lm| lm == value)
    }
}

/// Header value for a 416 response
pub fn unsatisfied_content_range(size: u64) -> String {
    format!("bytes */{}", size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ranges() {
        assert_eq!(parse_ranges("bytes=0-99").unwrap(), vec![ByteRange { start: 0, end: Some(99) }]);
        assert_eq!(parse_ranges("bytes=500-").unwrap(), vec![ByteRange { start: 500, end: None }]);
        assert_eq!(parse_ranges("bytes=-20").unwrap(), vec![ByteRange { start: 0, end: Some(20) }]);
        assert_eq!(parse_ranges("bytes=0-1, 5-9").unwrap().len(), 2);
        assert!(parse_ranges("bytes=0-").unwrap()[0].is_full_range());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_ranges("items=0-5"), Err(RangeError::Malformed));
        assert_eq!(parse_ranges("bytes="), Err(RangeError::Malformed));
        assert_eq!(parse_ranges("bytes=abc-"), Err(RangeError::Malformed));
        assert_eq!(parse_ranges("bytes=12"), Err(RangeError::Malformed));
    }

    #[test]
    fn test_validity() {
        let inverted = parse_ranges("bytes=20-10").unwrap();
        assert_eq!(resolve(&inverted, 100, "text/plain"), Err(RangeError::Unsatisfiable { size: 100 }));

        let beyond = parse_ranges("bytes=999999999-").unwrap();
        assert_eq!(resolve(&beyond, 100, "text/plain"), Err(RangeError::Unsatisfiable { size: 100 }));

        let past_end = parse_ranges("bytes=10-100").unwrap();
        assert!(resolve(&past_end, 100, "text/plain").is_err());

        let empty = parse_ranges("bytes=0-").unwrap();
        assert!(resolve(&empty, 0, "text/plain").is_err());
    }

    #[test]
    fn test_multiple_ranges_unsatisfiable() {
        let ranges = parse_ranges("bytes=0-10,20-30").unwrap();
        let err = resolve(&ranges, 100, "text/plain").unwrap_err();
        assert_eq!(err, RangeError::MultipleRanges { count: 2, size: 100 });
        assert_eq!(err.size(), Some(100));
    }

    #[test]
    fn test_chunk_limit() {
        assert_eq!(chunk_limit(1000, "text/plain"), MIN_CHUNK);
        assert_eq!(chunk_limit(100 * 1024 * 1024, "video/mp4"), MAX_CHUNK);
        assert_eq!(chunk_limit(8 * 1024 * 1024, "video/mp4"), 262_144);
        assert_eq!(chunk_limit(100 * 1024 * 1024, "audio/mpeg"), MAX_CHUNK / 2);
    }

    #[test]
    fn test_open_range_is_clamped() {
        let size = 10 * 1024 * 1024;
        let served = resolve(&parse_ranges("bytes=0-").unwrap(), size, "video/mp4").unwrap();
        assert_eq!(served.start, 0);
        assert!(served.end < size - 1);
        assert_eq!(served.len(), 320_000);
        assert_eq!(served.content_range(), format!("bytes 0-319999/{}", size));

        let small = resolve(&parse_ranges("bytes=10-19").unwrap(), 100, "text/plain").unwrap();
        assert_eq!((small.start, small.end, small.len()), (10, 19, 10));
    }

    #[test]
    fn test_if_range() {
        assert!(if_range_matches("\"abc\"", Some("\"abc\""), None));
        assert!(!if_range_matches("\"old\"", Some("\"abc\""), None));
        let date = "Wed, 21 Oct 2015 07:28:00 GMT";
        assert!(if_range_matches(date, None, Some(date)));
        assert!(!if_range_matches(date, Some("\"abc\""), Some("Thu, 22 Oct 2015 07:28:00 GMT")));
    }
}
