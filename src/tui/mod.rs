use std::io;
use std::sync::mpsc::{self, Receiver, TryRecvError};

use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::runtime::Handle;
use tracing::{info, warn};
use url::Url;

use crate::console::config::{EVENT_DRAIN_WAIT, INPUT_POLL_WAIT};
use crate::console::{
    cancel_task, CancelEndpoint, CancelOutcome, RenderTarget, TaskId, Transport, WatchSession,
};
use crate::error::ConsoleError;
use crate::ui::NoticeLevel;

mod events;
mod render;
mod viewport;

pub use viewport::ViewportTarget;

use events::{key_action, KeyAction};
use render::{output_height, render_ui, ViewModel};

type TuiTerminal = Terminal<CrosstermBackend<io::Stdout>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusLine {
    pub(crate) level: NoticeLevel,
    pub(crate) text: String,
}

impl StatusLine {
    fn new(level: NoticeLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

type CancelResult = Result<CancelOutcome, ConsoleError>;

/// A cancel request running on the runtime's blocking pool so the viewer
/// keeps pumping and drawing while it waits.
struct PendingCancel {
    results: Receiver<CancelResult>,
}

impl PendingCancel {
    fn spawn<C>(runtime: &Handle, endpoint: C, task: TaskId, url: Url) -> Self
    where
        C: CancelEndpoint + Send + 'static,
    {
        let (sender, results) = mpsc::channel();
        runtime.spawn_blocking(move || {
            let _ = sender.send(cancel_task(&endpoint, &task, &url));
        });
        Self { results }
    }

    /// `None` while the request is still in flight.
    fn poll(&self) -> Option<CancelResult> {
        match self.results.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ConsoleError::Http(
                "cancel request ended without a response".to_owned(),
            ))),
        }
    }
}

fn init_terminal() -> Result<TuiTerminal, io::Error> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut TuiTerminal) -> Result<(), io::Error> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()
}

/// Runs the full-screen viewer until the user quits. The stream is stopped
/// on the way out; the caller decides how long to wait for the close.
/// Cancel requests run on `runtime`.
pub fn run_viewport<T, C>(
    session: &mut WatchSession<ViewportTarget, T, C>,
    runtime: &Handle,
) -> Result<(), ConsoleError>
where
    T: Transport,
    C: CancelEndpoint + Clone + Send + 'static,
{
    let mut terminal = init_terminal()?;
    let result = event_loop(&mut terminal, session, runtime);
    session.stop();
    let restored = restore_terminal(&mut terminal);
    result?;
    restored?;
    Ok(())
}

fn event_loop<T, C>(
    terminal: &mut TuiTerminal,
    session: &mut WatchSession<ViewportTarget, T, C>,
    runtime: &Handle,
) -> Result<(), ConsoleError>
where
    T: Transport,
    C: CancelEndpoint + Clone + Send + 'static,
{
    let task = session.controller().task_id().to_string();
    let stream_url = session.controller().stream_url().to_string();
    let can_save = session.transcript_path().is_some();
    let mut status: Option<StatusLine> = None;
    let mut pending_cancel: Option<PendingCancel> = None;

    loop {
        session.pump(EVENT_DRAIN_WAIT);
        if let Some(result) = pending_cancel.as_ref().and_then(PendingCancel::poll) {
            status = Some(cancel_status(result, &task));
            pending_cancel = None;
        }

        let height = output_height(terminal.size()?.height);
        terminal.draw(|frame| {
            let model = ViewModel {
                task: &task,
                stream_url: &stream_url,
                state: session.state(),
                target: session.console().target(),
                status: status.as_ref(),
                can_save,
            };
            render_ui(frame, &model);
        })?;

        if !event::poll(INPUT_POLL_WAIT)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        let Some(action) = key_action(&key) else {
            continue;
        };
        match action {
            KeyAction::Quit => return Ok(()),
            KeyAction::Cancel if pending_cancel.is_some() => {
                info!("cancel already in flight");
            }
            KeyAction::Cancel => {
                let controller = session.controller();
                pending_cancel = Some(PendingCancel::spawn(
                    runtime,
                    controller.cancel_endpoint().clone(),
                    controller.task_id().clone(),
                    controller.cancel_url().clone(),
                ));
                status = Some(StatusLine::new(
                    NoticeLevel::Info,
                    format!("cancelling task {task}..."),
                ));
            }
            KeyAction::Save => status = save_status(session),
            scroll => apply_scroll(session.console_mut().target_mut(), scroll, height),
        }
    }
}

fn apply_scroll(target: &mut ViewportTarget, action: KeyAction, height: usize) {
    let page = height.max(1);
    match action {
        KeyAction::LineUp => target.scroll_up(1, height),
        KeyAction::LineDown => target.scroll_down(1, height),
        KeyAction::PageUp => target.scroll_up(page, height),
        KeyAction::PageDown => target.scroll_down(page, height),
        KeyAction::Top => target.scroll_top(),
        KeyAction::Bottom => target.scroll_to_bottom(),
        KeyAction::Quit | KeyAction::Cancel | KeyAction::Save => {}
    }
}

fn cancel_status(result: Result<CancelOutcome, ConsoleError>, task: &str) -> StatusLine {
    match result {
        Ok(CancelOutcome::Accepted) => StatusLine::new(
            NoticeLevel::Success,
            format!("Task {task} has been marked for deletion"),
        ),
        Ok(CancelOutcome::Unconfirmed { status }) => StatusLine::new(
            NoticeLevel::Warning,
            format!("cancel request returned HTTP {status}"),
        ),
        Err(err) => StatusLine::new(NoticeLevel::Error, err.to_string()),
    }
}

fn save_status<T: Transport, C: CancelEndpoint>(
    session: &WatchSession<ViewportTarget, T, C>,
) -> Option<StatusLine> {
    match session.save_transcript() {
        Ok(Some(path)) => Some(StatusLine::new(
            NoticeLevel::Info,
            format!("transcript saved to {}", path.display()),
        )),
        Ok(None) => None,
        Err(err) => {
            warn!("transcript_save_error: {err}");
            Some(StatusLine::new(NoticeLevel::Error, err.to_string()))
        }
    }
}
