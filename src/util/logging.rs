use env_logger::Builder;
use log::{Level, LevelFilter};
use std::fmt;
use std::io::Write;

use crate::config::LogLevel;

/// Initialize the logging system
pub fn init(level: &LogLevel) {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level.to_filter())
        .init();
}

impl LogLevel {
    /// The `log` filter matching this level
    pub fn to_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Logger handed to each scaler at construction.
///
/// Records go through the `log` facade under a fixed target, prefixed with
/// the identity of the trigger that produced them.
#[derive(Debug, Clone)]
pub struct ScalerLogger {
    target: String,
    prefix: String,
}

impl ScalerLogger {
    /// Create a logger writing under `target`
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            prefix: String::new(),
        }
    }

    /// Derive a logger that tags every record with the trigger's identity
    pub fn for_trigger(&self, namespace: &str, name: &str, scaler_index: usize) -> Self {
        let prefix = match (namespace.is_empty(), name.is_empty()) {
            (true, true) => format!("[trigger {}] ", scaler_index),
            (true, false) => format!("[{} trigger {}] ", name, scaler_index),
            _ => format!("[{}/{} trigger {}] ", namespace, name, scaler_index),
        };
        Self {
            target: self.target.clone(),
            prefix,
        }
    }

    /// The log target records are written under
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if log::log_enabled!(target: self.target.as_str(), level) {
            log::log!(target: self.target.as_str(), level, "{}{}", self.prefix, args);
        }
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    pub fn trace(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Trace, args);
    }
}

impl Default for ScalerLogger {
    fn default() -> Self {
        Self::new("metric_scaler")
    }
}
