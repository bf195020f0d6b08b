use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::error::ConsoleError;

pub const LOG_ENV: &str = "TASKVIEW_LOG";
const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    File(PathBuf),
    Stderr,
    /// No subscriber; the full-screen viewer owns the terminal.
    Discard,
}

impl LogTarget {
    pub fn select(log_file: Option<PathBuf>, owns_terminal: bool) -> Self {
        match log_file {
            Some(path) => LogTarget::File(path),
            None if owns_terminal => LogTarget::Discard,
            None => LogTarget::Stderr,
        }
    }
}

fn env_filter() -> EnvFilter {
    let level = std::env::var(LOG_ENV).unwrap_or_else(|_| DEFAULT_LEVEL.to_owned());
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Installs the global subscriber. Returns `false` when one was already set.
pub fn init_logging(target: &LogTarget) -> Result<bool, ConsoleError> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter());
    let installed = match target {
        LogTarget::Discard => return Ok(false),
        LogTarget::Stderr => {
            let subscriber = builder.with_writer(std::io::stderr).finish();
            tracing::subscriber::set_global_default(subscriber).is_ok()
        }
        LogTarget::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let subscriber = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .finish();
            tracing::subscriber::set_global_default(subscriber).is_ok()
        }
    };
    Ok(installed)
}
