use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::ConsoleError;

use super::config::{EVENT_DRAIN_WAIT, MAX_EVENTS_PER_TICK};
use super::controller::{CancelEndpoint, CancelOutcome, TaskController};
use super::stream::{ConnectionState, Transport, TransportEvent};
use super::view::{Console, RenderTarget};

/// One watched task: controller, console and the inbound event queue,
/// driven from a single thread by whichever front-end owns it.
pub struct WatchSession<R: RenderTarget, T: Transport, C: CancelEndpoint> {
    controller: TaskController<T, C>,
    console: Console<R>,
    events: Receiver<TransportEvent>,
    transcript: Option<PathBuf>,
}

impl<R: RenderTarget, T: Transport, C: CancelEndpoint> WatchSession<R, T, C> {
    pub fn new(
        controller: TaskController<T, C>,
        console: Console<R>,
        events: Receiver<TransportEvent>,
    ) -> Self {
        Self {
            controller,
            console,
            events,
            transcript: None,
        }
    }

    pub fn with_transcript(mut self, path: Option<PathBuf>) -> Self {
        self.transcript = path;
        self
    }

    pub fn controller(&self) -> &TaskController<T, C> {
        &self.controller
    }

    pub fn console(&self) -> &Console<R> {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut Console<R> {
        &mut self.console
    }

    pub fn state(&self) -> ConnectionState {
        self.controller.state()
    }

    pub fn transcript_path(&self) -> Option<&Path> {
        self.transcript.as_deref()
    }

    pub fn start(&mut self) -> Result<(), ConsoleError> {
        debug!(
            task = %self.controller.task_id(),
            max_lines = self.console.buffer().max_lines(),
            "starting watch session"
        );
        self.controller.start(&mut self.console)
    }

    /// Waits up to `wait` for the first event, then drains what is already
    /// queued, bounded per call. Returns the number of events handled.
    pub fn pump(&mut self, wait: Duration) -> usize {
        let first = match self.events.recv_timeout(wait) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return 0,
        };
        self.controller.handle(first, &mut self.console);
        let mut handled = 1usize;
        while handled < MAX_EVENTS_PER_TICK {
            match self.events.try_recv() {
                Ok(event) => {
                    self.controller.handle(event, &mut self.console);
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        handled
    }

    pub fn stop(&mut self) {
        self.controller.stop();
    }

    pub fn cancel(&self) -> Result<CancelOutcome, ConsoleError> {
        self.controller.cancel()
    }

    /// Pumps until the stream reports closed or `timeout` elapses.
    pub fn wait_closed(&mut self, timeout: Duration) -> ConnectionState {
        let deadline = Instant::now() + timeout;
        while !self.state().is_closed() {
            let now = Instant::now();
            if now >= deadline {
                debug!(state = %self.state(), "gave up waiting for stream close");
                break;
            }
            self.pump((deadline - now).min(EVENT_DRAIN_WAIT * 50));
        }
        self.state()
    }

    /// Writes the plain-text transcript when a path was configured.
    pub fn save_transcript(&self) -> Result<Option<&Path>, ConsoleError> {
        let Some(path) = self.transcript.as_deref() else {
            return Ok(None);
        };
        std::fs::write(path, self.console.buffer().plain_text())?;
        info!(path = %path.display(), lines = self.console.buffer().len(), "transcript saved");
        Ok(Some(path))
    }

    pub fn into_console(self) -> Console<R> {
        self.console
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use url::Url;

    use super::*;
    use crate::console::controller::PageContext;
    use crate::console::document::MarkupDocument;
    use crate::console::line_buffer::LineBuffer;
    use crate::console::stream::testing::FakeTransport;
    use crate::console::stream::CloseReason;

    struct Accepting;

    impl CancelEndpoint for Accepting {
        fn request_cancel(&self, _url: &Url) -> Result<u16, ConsoleError> {
            Ok(202)
        }
    }

    fn new_session() -> (
        WatchSession<MarkupDocument, FakeTransport, Accepting>,
        mpsc::Sender<TransportEvent>,
    ) {
        let page = PageContext::parse("http://h/?id=1").expect("page");
        let controller =
            TaskController::new(&page, FakeTransport::default(), Accepting).expect("controller");
        let console = Console::new(LineBuffer::new(), MarkupDocument::new("Task 1"));
        let (sender, receiver) = mpsc::channel();
        (WatchSession::new(controller, console, receiver), sender)
    }

    #[test]
    fn pump_applies_queued_events_in_order() {
        let (mut session, sender) = new_session();
        session.start().expect("start");
        sender.send(TransportEvent::Opened).expect("send");
        sender
            .send(TransportEvent::Message("Task (id: 1) Status: running".to_owned()))
            .expect("send");
        sender.send(TransportEvent::Message("10%\r".to_owned())).expect("send");
        sender.send(TransportEvent::Message("\r50%".to_owned())).expect("send");

        assert_eq!(session.pump(Duration::from_millis(10)), 4);
        assert_eq!(
            session.console().buffer().plain_lines(),
            vec!["Task (id: 1) Status: running", "50%"]
        );
        assert_eq!(session.console().target().node_count(), 2);
    }

    #[test]
    fn pump_is_bounded_per_call() {
        let (mut session, sender) = new_session();
        session.start().expect("start");
        sender.send(TransportEvent::Opened).expect("send");
        for index in 0..MAX_EVENTS_PER_TICK + 5 {
            sender
                .send(TransportEvent::Message(format!("line {index}\n")))
                .expect("send");
        }
        assert_eq!(session.pump(Duration::from_millis(10)), MAX_EVENTS_PER_TICK);
        assert_eq!(session.pump(Duration::from_millis(10)), 6);
        assert_eq!(session.pump(Duration::from_millis(1)), 0);
    }

    #[test]
    fn wait_closed_returns_after_remote_close() {
        let (mut session, sender) = new_session();
        session.start().expect("start");
        sender.send(TransportEvent::Opened).expect("send");
        session.stop();
        sender.send(TransportEvent::Closed).expect("send");
        assert_eq!(
            session.wait_closed(Duration::from_secs(1)),
            ConnectionState::Closed(CloseReason::Closed)
        );
    }

    #[test]
    fn transcript_is_written_only_when_configured() {
        let (session, _sender) = new_session();
        assert!(session.save_transcript().expect("no transcript").is_none());

        let path = std::env::temp_dir().join(format!(
            "taskview-transcript-{}.txt",
            std::process::id()
        ));
        let (mut session, sender) = new_session();
        session = session.with_transcript(Some(path.clone()));
        session.start().expect("start");
        sender.send(TransportEvent::Opened).expect("send");
        sender
            .send(TransportEvent::Message("Building...\nDone\r".to_owned()))
            .expect("send");
        sender.send(TransportEvent::Message("Done.\n".to_owned())).expect("send");
        session.pump(Duration::from_millis(10));

        assert_eq!(session.save_transcript().expect("saved"), Some(path.as_path()));
        let written = std::fs::read_to_string(&path).expect("read transcript");
        let _ = std::fs::remove_file(&path);
        assert_eq!(written, "Building...\nDone.\n");
    }
}
