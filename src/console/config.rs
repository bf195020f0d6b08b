use std::time::Duration;

pub const DEFAULT_MAX_LINES: usize = 10_000;
pub const MAX_EVENTS_PER_TICK: usize = 200;

pub const GREETING: &str = "Hi From the Client!";
pub const CLOSE_NOTICE: &str = "Client Closed!";
pub const STREAM_ERROR_MESSAGE: &str = "Cannot connect to websocket";

pub const EVENT_DRAIN_WAIT: Duration = Duration::from_millis(1);
pub const INPUT_POLL_WAIT: Duration = Duration::from_millis(50);
