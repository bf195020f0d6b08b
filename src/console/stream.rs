use std::fmt::{Display, Formatter};

use tracing::{debug, info, warn};
use url::Url;

use crate::ansi::StyledFragment;
use crate::error::{ConsoleError, TransportError};

use super::chunk::{ChunkDecoder, Placement};
use super::config::{CLOSE_NOTICE, GREETING, STREAM_ERROR_MESSAGE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Error,
    Closed,
}

impl Display for CloseReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Error => write!(f, "error"),
            CloseReason::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Closed(CloseReason),
}

impl ConnectionState {
    pub fn is_closed(self) -> bool {
        matches!(self, ConnectionState::Closed(_))
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Closed(reason) => write!(f, "closed ({reason})"),
        }
    }
}

/// Something that happened on the transport, delivered in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Error(String),
    Closed,
}

/// Outbound half of a streaming connection. Inbound traffic arrives
/// separately as [`TransportEvent`]s.
pub trait Transport {
    fn open(&mut self, url: &Url) -> Result<(), TransportError>;
    fn send(&mut self, payload: &str) -> Result<(), TransportError>;
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Receiver of decoded output.
pub trait LineSink {
    fn place(&mut self, fragment: StyledFragment, overwrite_active: bool);
    fn close_line(&mut self);
    /// User-visible message outside the output lines.
    fn report(&mut self, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    pub greeting: String,
    pub close_notice: String,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            greeting: GREETING.to_owned(),
            close_notice: CLOSE_NOTICE.to_owned(),
        }
    }
}

pub struct TaskStream<T: Transport> {
    transport: T,
    state: ConnectionState,
    decoder: ChunkDecoder,
    options: StreamOptions,
}

impl<T: Transport> TaskStream<T> {
    pub fn new(transport: T) -> Self {
        Self::with_options(transport, StreamOptions::default())
    }

    pub fn with_options(transport: T, options: StreamOptions) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            decoder: ChunkDecoder::new(),
            options,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Opens the connection. Transport failures close the stream and are
    /// reported through `sink`; only a wrong starting state is an error.
    pub fn start(&mut self, url: &Url, sink: &mut dyn LineSink) -> Result<(), ConsoleError> {
        if self.state != ConnectionState::Disconnected {
            return Err(ConsoleError::InvalidState { state: self.state });
        }
        self.state = ConnectionState::Connecting;
        info!(%url, "connecting to task stream");
        if let Err(err) = self.transport.open(url) {
            self.fail(&err.to_string(), sink);
        }
        Ok(())
    }

    pub fn handle(&mut self, event: TransportEvent, sink: &mut dyn LineSink) {
        match (self.state, event) {
            (ConnectionState::Closed(_), event) => {
                debug!(?event, "ignoring event on closed stream");
            }
            (ConnectionState::Connecting, TransportEvent::Opened) => {
                self.state = ConnectionState::Open;
                info!("task stream connected");
                if let Err(err) = self.transport.send(&self.options.greeting) {
                    warn!("stream_greeting_error: {err}");
                }
            }
            (ConnectionState::Open, TransportEvent::Message(chunk)) => {
                for placement in self.decoder.decode(&chunk) {
                    match placement {
                        Placement::Place {
                            fragment,
                            overwrite_active,
                        } => sink.place(fragment, overwrite_active),
                        Placement::CloseLine => sink.close_line(),
                    }
                }
            }
            (_, TransportEvent::Error(detail)) => self.fail(&detail, sink),
            (_, TransportEvent::Closed) => {
                self.state = ConnectionState::Closed(CloseReason::Closed);
                info!("task stream closed");
            }
            (state, event) => {
                debug!(?event, %state, "dropping event outside the open state");
            }
        }
    }

    /// Requests the transport to close. No message is processed afterwards.
    pub fn stop(&mut self) {
        match self.state {
            ConnectionState::Closing | ConnectionState::Closed(_) => return,
            ConnectionState::Disconnected => {
                self.state = ConnectionState::Closed(CloseReason::Closed);
                return;
            }
            ConnectionState::Open => {
                if let Err(err) = self.transport.send(&self.options.close_notice) {
                    debug!("stream_close_notice_error: {err}");
                }
            }
            ConnectionState::Connecting => {}
        }
        self.state = ConnectionState::Closing;
        if let Err(err) = self.transport.close() {
            debug!("stream_close_error: {err}");
        }
    }

    fn fail(&mut self, detail: &str, sink: &mut dyn LineSink) {
        warn!("stream_error: {detail}");
        self.state = ConnectionState::Closed(CloseReason::Error);
        sink.report(&format!("{STREAM_ERROR_MESSAGE}: {detail}"));
    }
}
