use std::fmt::{Display, Formatter};

use tracing::{info, warn};
use url::Url;

use crate::error::ConsoleError;

use super::stream::{ConnectionState, LineSink, StreamOptions, TaskStream, Transport, TransportEvent};

const STREAM_PATH: &str = "ws/runsh/";
const CANCEL_PATH: [&str; 3] = ["api", "v1", "cancel"];

/// The page the console was opened from: location, protocol and query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    url: Url,
}

impl PageContext {
    pub fn parse(raw: &str) -> Result<Self, ConsoleError> {
        let url = Url::parse(raw.trim()).map_err(|err| ConsoleError::InvalidPageUrl {
            url: raw.to_owned(),
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConsoleError::InvalidPageUrl {
                url: raw.to_owned(),
                reason: format!("unsupported scheme `{}`", url.scheme()),
            });
        }
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "https"
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Page-relative stream address, `ws` or `wss` to match the page.
    pub fn stream_url(&self, task: &TaskId) -> Result<Url, ConsoleError> {
        let mut url = self.url.join(STREAM_PATH).map_err(|err| self.invalid(err))?;
        let scheme = if self.is_secure() { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| self.invalid(format!("cannot switch to `{scheme}`")))?;
        url.path_segments_mut()
            .map_err(|()| self.invalid("page url cannot carry a path"))?
            .pop_if_empty()
            .push(task.as_str());
        Ok(url)
    }

    pub fn cancel_url(&self, task: &TaskId) -> Result<Url, ConsoleError> {
        let mut segments = CANCEL_PATH.to_vec();
        segments.push(task.as_str());
        self.origin_endpoint(&segments)
    }

    /// Absolute endpoint on the page's origin built from raw path segments.
    pub fn origin_endpoint(&self, segments: &[&str]) -> Result<Url, ConsoleError> {
        let mut url = self.url.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|()| self.invalid("page url cannot carry a path"))?
            .clear()
            .extend(segments);
        Ok(url)
    }

    fn invalid(&self, reason: impl Display) -> ConsoleError {
        ConsoleError::InvalidPageUrl {
            url: self.url.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_owned()))
        }
    }

    pub fn from_page(page: &PageContext) -> Result<Self, ConsoleError> {
        page.query_param("id")
            .as_deref()
            .and_then(Self::new)
            .ok_or(ConsoleError::MissingTaskId)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One-shot request asking the server to drop a task. Returns the HTTP status.
pub trait CancelEndpoint {
    fn request_cancel(&self, url: &Url) -> Result<u16, ConsoleError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Accepted,
    Unconfirmed { status: u16 },
}

pub struct TaskController<T: Transport, C: CancelEndpoint> {
    task: TaskId,
    stream: TaskStream<T>,
    cancel_endpoint: C,
    stream_url: Url,
    cancel_url: Url,
}

impl<T: Transport, C: CancelEndpoint> TaskController<T, C> {
    pub fn new(page: &PageContext, transport: T, cancel_endpoint: C) -> Result<Self, ConsoleError> {
        Self::with_options(page, transport, cancel_endpoint, StreamOptions::default())
    }

    pub fn with_options(
        page: &PageContext,
        transport: T,
        cancel_endpoint: C,
        options: StreamOptions,
    ) -> Result<Self, ConsoleError> {
        let task = TaskId::from_page(page)?;
        let stream_url = page.stream_url(&task)?;
        let cancel_url = page.cancel_url(&task)?;
        Ok(Self {
            task,
            stream: TaskStream::with_options(transport, options),
            cancel_endpoint,
            stream_url,
            cancel_url,
        })
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task
    }

    pub fn stream_url(&self) -> &Url {
        &self.stream_url
    }

    pub fn cancel_url(&self) -> &Url {
        &self.cancel_url
    }

    pub fn cancel_endpoint(&self) -> &C {
        &self.cancel_endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.stream.state()
    }

    pub fn stream(&self) -> &TaskStream<T> {
        &self.stream
    }

    pub fn start(&mut self, sink: &mut dyn LineSink) -> Result<(), ConsoleError> {
        self.stream.start(&self.stream_url, sink)
    }

    pub fn handle(&mut self, event: TransportEvent, sink: &mut dyn LineSink) {
        self.stream.handle(event, sink);
    }

    pub fn stop(&mut self) {
        self.stream.stop();
    }

    /// Asks the server to drop the task. Independent of the stream state.
    pub fn cancel(&self) -> Result<CancelOutcome, ConsoleError> {
        cancel_task(&self.cancel_endpoint, &self.task, &self.cancel_url)
    }
}

/// One cancel request: `202` accepts, any status from `400` up rejects, and
/// anything else is reported as unconfirmed.
pub fn cancel_task<C: CancelEndpoint + ?Sized>(
    endpoint: &C,
    task: &TaskId,
    url: &Url,
) -> Result<CancelOutcome, ConsoleError> {
    info!(%task, %url, "requesting task cancellation");
    match endpoint.request_cancel(url)? {
        202 => {
            info!("Task {task} has been marked for deletion");
            Ok(CancelOutcome::Accepted)
        }
        status if status >= 400 => {
            warn!(status, "Failed to cancel task {task}");
            Err(ConsoleError::CancelRejected {
                task: task.clone(),
                status,
            })
        }
        status => {
            warn!(status, "cancel request for task {task} returned an unexpected status");
            Ok(CancelOutcome::Unconfirmed { status })
        }
    }
}
