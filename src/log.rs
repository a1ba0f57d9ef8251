//! Logging.
//!
//! The connector never logs through globals: it is handed a [`Logger`] at
//! construction. [`TracingLogger`] forwards to `tracing`, and [`init`]
//! installs a `tracing-subscriber` formatter for applications that do not
//! bring their own.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::error::{SqlDbError, SqlDbResult};

/// Environment variable naming the deployment environment.
pub const ENV_NAME: &str = "APPENV";
pub const DEVELOPMENT_ENV: &str = "development";

/// Sink for the connector's log lines.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }
}

/// Forwards to `tracing` events with target `sqldb`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::TRACE => tracing::trace!(target: "sqldb", "{}", message),
            Level::DEBUG => tracing::debug!(target: "sqldb", "{}", message),
            Level::INFO => tracing::info!(target: "sqldb", "{}", message),
            Level::WARN => tracing::warn!(target: "sqldb", "{}", message),
            _ => tracing::error!(target: "sqldb", "{}", message),
        }
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: Level, _message: &str) {}
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `sqldb=debug,sqlx=warn`.
    /// `RUST_LOG` wins when set.
    pub level: String,
    pub json: bool,
    pub color: bool,
    /// Include file and line of the call site.
    pub caller: bool,
    /// Append to this file instead of stderr. Disables color.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
            color: false,
            caller: true,
            file: None,
        }
    }
}

impl LogConfig {
    /// Defaults for the current `APPENV`: color in development.
    pub fn from_env() -> Self {
        Self {
            color: is_development(),
            ..Self::default()
        }
    }
}

/// True when `APPENV` is unset, empty or `development`.
pub fn is_development() -> bool {
    match std::env::var(ENV_NAME) {
        Ok(env) => env.is_empty() || env == DEVELOPMENT_ENV,
        Err(_) => true,
    }
}

/// Install a global `tracing` subscriber built from `config`.
pub fn init(config: &LogConfig) -> SqlDbResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| SqlDbError::config(format!("invalid log level '{}': {}", config.level, e)))?;

    let (writer, ansi) = match &config.file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), config.color),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_file(config.caller)
        .with_line_number(config.caller);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| SqlDbError::config(format!("failed to install log subscriber: {}", e)))
}
