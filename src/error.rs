use thiserror::Error;

use crate::config::ConfigError;
use crate::console::{ConnectionState, TaskId};
use crate::ui::UiError;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("You have to query task by id number. (Add URL suffix like '?id=1')")]
    MissingTaskId,

    #[error("no page url given; pass one on the command line or set `page_url` in taskview.toml")]
    MissingPageUrl,

    #[error("invalid page url `{url}`: {reason}")]
    InvalidPageUrl { url: String, reason: String },

    #[error("task stream cannot start while {state}")]
    InvalidState { state: ConnectionState },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("task stream for task {task} ended with an error")]
    StreamFailed { task: TaskId },

    #[error("failed to cancel task {task}: endpoint answered HTTP {status}")]
    CancelRejected { task: TaskId, status: u16 },

    #[error("http request failed: {0}")]
    Http(String),

    #[error("unexpected response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Ui(#[from] UiError),
}

impl ConsoleError {
    /// Errors caused by how the command was invoked rather than by the server.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            ConsoleError::MissingTaskId
                | ConsoleError::MissingPageUrl
                | ConsoleError::InvalidPageUrl { .. }
        )
    }

    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ConsoleError::MissingTaskId => Some("Add URL suffix like '?id=1'"),
            ConsoleError::MissingPageUrl => {
                Some("Run `taskview --help` to see supported command forms")
            }
            ConsoleError::CancelRejected { .. } => {
                Some("The task may have finished already; retry to check")
            }
            ConsoleError::Config(_) => Some("Check taskview.toml or the path given with --config"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("cannot connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("cannot send on task stream: {0}")]
    Send(String),

    #[error("task stream is not connected")]
    NotConnected,
}
