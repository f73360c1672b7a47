//! Line formats for log output

use crate::logging::destinations::LogEntry;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq)]
pub enum LogFormat {
    /// `{"timestamp":"...","level":"INFO","message":"..."}`
    Json,
    /// `2026-01-15 10:30:00.000 INFO  [hestia_core::engine] message key=value`
    Human,
    /// `timestamp=... level=INFO target=... message="..."`
    Logfmt,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "human" | "text" => Ok(LogFormat::Human),
            "logfmt" => Ok(LogFormat::Logfmt),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

impl LogFormat {
    pub fn format_entry(&self, entry: &LogEntry) -> String {
        match self {
            LogFormat::Json => format_json(entry),
            LogFormat::Human => format_human(entry),
            LogFormat::Logfmt => format_logfmt(entry),
        }
    }
}

fn level_name(entry: &LogEntry) -> String {
    format!("{:?}", entry.level).to_uppercase()
}

fn plain_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_json(entry: &LogEntry) -> String {
    let mut json = serde_json::Map::new();
    json.insert("timestamp".into(), entry.timestamp.to_rfc3339().into());
    json.insert("level".into(), level_name(entry).into());
    json.insert("message".into(), entry.message.clone().into());
    json.insert("target".into(), entry.target.clone().into());

    if let Some(location) = &entry.location {
        json.insert("file".into(), location.file.clone().into());
        json.insert("line".into(), location.line.into());
    }

    for (key, value) in &entry.fields {
        json.insert(key.clone(), value.clone());
    }

    serde_json::to_string(&json).unwrap_or_else(|_| "Failed to serialize log entry".to_string())
}

fn format_human(entry: &LogEntry) -> String {
    let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
    let mut line =
        format!("{} {:5} [{}] {}", timestamp, level_name(entry), entry.target, entry.message);

    for (key, value) in &entry.fields {
        line.push_str(&format!(" {}={}", key, plain_value(value)));
    }

    line
}

fn format_logfmt(entry: &LogEntry) -> String {
    let mut parts = vec![
        format!("timestamp={}", entry.timestamp.to_rfc3339()),
        format!("level={}", level_name(entry)),
        format!("target={}", entry.target),
        format!("message=\"{}\"", entry.message.replace('"', "\\\"")),
    ];

    if let Some(location) = &entry.location {
        parts.push(format!("file=\"{}\"", location.file));
        parts.push(format!("line={}", location.line));
    }

    for (key, value) in &entry.fields {
        let rendered = match value {
            serde_json::Value::Number(_) | serde_json::Value::Bool(_) => value.to_string(),
            other => format!("\"{}\"", plain_value(other).replace('"', "\\\"")),
        };
        parts.push(format!("{}={}", key, rendered));
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;

    #[test]
    fn test_json_format() {
        let entry = LogEntry::new(LogLevel::Info, "served".to_string(), "hestia".to_string());
        let parsed: serde_json::Value =
            serde_json::from_str(&LogFormat::Json.format_entry(&entry)).unwrap();
        assert_eq!(parsed["message"], "served");
        assert_eq!(parsed["level"], "INFO");
    }

    #[test]
    fn test_human_format() {
        let entry = LogEntry::new(LogLevel::Error, "boom".to_string(), "app".to_string())
            .with_field("status", serde_json::json!(500));
        let line = LogFormat::Human.format_entry(&entry);
        assert!(line.contains("ERROR"));
        assert!(line.contains("[app] boom"));
        assert!(line.contains("status=500"));
    }

    #[test]
    fn test_logfmt_quotes_message() {
        let entry = LogEntry::new(LogLevel::Warn, "say \"hi\"".to_string(), "app".to_string());
        let line = LogFormat::Logfmt.format_entry(&entry);
        assert!(line.contains("level=WARN"));
        assert!(line.contains("message=\"say \\\"hi\\\"\""));
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
