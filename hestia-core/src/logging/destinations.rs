//! Log sinks and the entry record handed to formatters

use crate::logging::{LogFormat, LogLevel, LoggingConfig};
use std::collections::HashMap;

/// Where log lines are written
#[derive(Clone, Debug)]
pub enum LogOutput {
    Stdout {
        /// Overrides the config-wide format
        format: Option<LogFormat>,
    },
    Stderr {
        format: Option<LogFormat>,
    },
    /// Append to a file, creating parent directories
    File { path: String },
}

/// A structured log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Usually the module path
    pub target: String,
    pub fields: HashMap<String, serde_json::Value>,
    pub location: Option<LogLocation>,
}

#[derive(Debug, Clone)]
pub struct LogLocation {
    pub file: String,
    pub line: u32,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: String, target: String) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            level,
            message,
            target,
            fields: HashMap::new(),
            location: None,
        }
    }

    pub fn from_log_record(record: &log::Record, config: &LoggingConfig) -> Self {
        let mut entry = Self::new(
            LogLevel::from(record.level()),
            record.args().to_string(),
            record.target().to_string(),
        );

        if let (Some(file), Some(line)) = (record.file(), record.line()) {
            entry.location = Some(LogLocation { file: file.to_string(), line });
        }

        for (key, value) in &config.context_fields {
            entry.fields.insert(key.clone(), serde_json::Value::String(value.clone()));
        }

        entry
    }

    pub fn with_field(mut self, key: &str, value: serde_json::Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_record_carries_context_fields() {
        let config = LoggingConfig::default().with_context_field("service", "hestia");
        let entry = LogEntry::from_log_record(
            &log::Record::builder()
                .args(format_args!("session {} reused", 7))
                .level(log::Level::Debug)
                .target("hestia_core::session")
                .file(Some("store.rs"))
                .line(Some(42))
                .build(),
            &config,
        );

        assert_eq!(entry.level, LogLevel::Debug);
        assert_eq!(entry.message, "session 7 reused");
        assert_eq!(entry.fields.get("service"), Some(&serde_json::json!("hestia")));
        assert_eq!(entry.location.as_ref().map(|l| l.line), Some(42));
    }
}
