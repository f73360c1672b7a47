//! Process-wide logger behind the `log` facade.
//!
//! The engine only ever calls `log::info!` and friends; binaries pick the
//! destination and format once at startup through [`init_logging`].
//!
//! ```rust,no_run
//! use hestia_core::logging::{LoggingConfig, LogFormat, LogLevel};
//!
//! let config = LoggingConfig::default()
//!     .with_level(LogLevel::Debug)
//!     .with_stderr(LogFormat::Logfmt)
//!     .with_context_field("service", "hestia");
//! hestia_core::logging::init_logging(&config).unwrap();
//! log::info!("listening on {}", "127.0.0.1:8080");
//! ```

pub mod config;
pub mod destinations;
pub mod formatter;

pub use config::{LogLevel, LoggingConfig};
pub use destinations::{LogEntry, LogOutput};
pub use formatter::LogFormat;

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, Once};

static INIT: Once = Once::new();

/// Install the global logger. Later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let mut result = Ok(());
    INIT.call_once(|| {
        result = install(config);
    });
    result
}

fn install(config: &LoggingConfig) -> anyhow::Result<()> {
    let logger = HestiaLogger::new(config.clone())?;
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(config.level.to_filter());
    Ok(())
}

struct HestiaLogger {
    config: LoggingConfig,
    writers: Vec<Arc<dyn LogWriter>>,
}

impl HestiaLogger {
    fn new(config: LoggingConfig) -> anyhow::Result<Self> {
        let mut writers: Vec<Arc<dyn LogWriter>> = Vec::new();

        for output in &config.outputs {
            match output {
                LogOutput::Stdout { format } => {
                    let fmt = format.clone().unwrap_or_else(|| config.format.clone());
                    writers.push(Arc::new(StdoutWriter { format: fmt }));
                }
                LogOutput::Stderr { format } => {
                    let fmt = format.clone().unwrap_or_else(|| config.format.clone());
                    writers.push(Arc::new(StderrWriter { format: fmt }));
                }
                LogOutput::File { path } => {
                    writers.push(Arc::new(FileWriter::open(path, config.format.clone())?));
                }
            }
        }

        if writers.is_empty() {
            writers.push(Arc::new(StdoutWriter { format: config.format.clone() }));
        }

        Ok(Self { config, writers })
    }
}

impl log::Log for HestiaLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::from(self.config.level.clone())
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let entry = LogEntry::from_log_record(record, &self.config);
        for writer in &self.writers {
            let _ = writer.write_log(&entry);
        }
    }

    fn flush(&self) {
        for writer in &self.writers {
            let _ = writer.flush();
        }
    }
}

trait LogWriter: Send + Sync {
    fn write_log(&self, entry: &LogEntry) -> io::Result<()>;
    fn flush(&self) -> io::Result<()>;
}

struct StdoutWriter {
    format: LogFormat,
}

impl LogWriter for StdoutWriter {
    fn write_log(&self, entry: &LogEntry) -> io::Result<()> {
        let line = self.format.format_entry(entry);
        writeln!(io::stdout().lock(), "{}", line)
    }

    fn flush(&self) -> io::Result<()> {
        io::stdout().flush()
    }
}

struct StderrWriter {
    format: LogFormat,
}

impl LogWriter for StderrWriter {
    fn write_log(&self, entry: &LogEntry) -> io::Result<()> {
        let line = self.format.format_entry(entry);
        writeln!(io::stderr().lock(), "{}", line)
    }

    fn flush(&self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Append-only file sink
struct FileWriter {
    file: Mutex<File>,
    format: LogFormat,
}

impl FileWriter {
    fn open(path: &str, format: LogFormat) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file), format })
    }
}

impl LogWriter for FileWriter {
    fn write_log(&self, entry: &LogEntry) -> io::Result<()> {
        let line = self.format.format_entry(entry);
        let mut file = self.file.lock().map_err(|_| io::Error::other("log file lock poisoned"))?;
        writeln!(file, "{}", line)
    }

    fn flush(&self) -> io::Result<()> {
        let mut file = self.file.lock().map_err(|_| io::Error::other("log file lock poisoned"))?;
        file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_writer_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("hestia.log");
        let writer = FileWriter::open(path.to_str().unwrap(), LogFormat::Logfmt).unwrap();

        let entry = LogEntry::new(LogLevel::Warn, "disk low".to_string(), "hestia".to_string());
        writer.write_log(&entry).unwrap();
        writer.write_log(&entry).unwrap();
        writer.flush().unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 2);
        assert!(written.contains("level=WARN"));
    }
}
