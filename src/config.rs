use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::console::config::DEFAULT_MAX_LINES;
use crate::console::StreamOptions;
use crate::transport::http::DEFAULT_REQUEST_TIMEOUT;
use crate::ui::OutputMode;

pub const CONFIG_FILE_NAME: &str = "taskview.toml";
pub const CONFIG_ENV: &str = "TASKVIEW_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid `{key}` in {path}: {reason}")]
    Invalid {
        path: PathBuf,
        key: &'static str,
        reason: String,
    },
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    page_url: Option<String>,
    #[serde(default)]
    greeting: Option<String>,
    #[serde(default)]
    close_notice: Option<String>,
    #[serde(default)]
    max_lines: Option<usize>,
    #[serde(default)]
    session_cookie: Option<String>,
    #[serde(default)]
    request_timeout_secs: Option<u64>,
    #[serde(default)]
    log_file: Option<PathBuf>,
    #[serde(default)]
    color: Option<OutputMode>,
}

/// Effective settings after the config file is applied over defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub source: Option<PathBuf>,
    pub page_url: Option<String>,
    pub stream: StreamOptions,
    pub max_lines: usize,
    pub session_cookie: Option<String>,
    pub request_timeout: Duration,
    pub log_file: Option<PathBuf>,
    pub color: OutputMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source: None,
            page_url: None,
            stream: StreamOptions::default(),
            max_lines: DEFAULT_MAX_LINES,
            session_cookie: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            log_file: None,
            color: OutputMode::Auto,
        }
    }
}

impl Settings {
    /// Loads from `--config`, then `$TASKVIEW_CONFIG`, then `./taskview.toml`
    /// when present. Without any file the defaults apply.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        match config_path(explicit, env_path, &cwd) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let defaults = Self::default();

        let max_lines = file.max_lines.unwrap_or(defaults.max_lines);
        if max_lines == 0 {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                key: "max_lines",
                reason: "must be at least 1".to_owned(),
            });
        }
        let request_timeout = match file.request_timeout_secs {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    path: path.to_path_buf(),
                    key: "request_timeout_secs",
                    reason: "must be at least 1".to_owned(),
                })
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.request_timeout,
        };

        Ok(Self {
            source: Some(path.to_path_buf()),
            page_url: file.page_url,
            stream: StreamOptions {
                greeting: file.greeting.unwrap_or(defaults.stream.greeting),
                close_notice: file.close_notice.unwrap_or(defaults.stream.close_notice),
            },
            max_lines,
            session_cookie: file.session_cookie,
            request_timeout,
            log_file: file.log_file,
            color: file.color.unwrap_or(defaults.color),
        })
    }
}

fn config_path(explicit: Option<&Path>, env_path: Option<PathBuf>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env_path.filter(|path| !path.as_os_str().is_empty()) {
        return Some(path);
    }
    let local = cwd.join(CONFIG_FILE_NAME);
    local.is_file().then_some(local)
}
