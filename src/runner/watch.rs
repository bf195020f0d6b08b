use std::io::{self, IsTerminal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::console::config::INPUT_POLL_WAIT;
use crate::console::{
    CancelEndpoint, CloseReason, Console, ConnectionState, LineBuffer, MarkupDocument,
    RenderTarget, TaskController, TaskId, TerminalTarget, Transport, WatchSession,
};
use crate::error::ConsoleError;
use crate::transport::{HttpClient, WebSocketTransport};
use crate::tui::{self, ViewportTarget};
use crate::ui::theme::resolve_color_enabled;
use crate::ui::{NoticeLevel, PlainRenderer, Renderer, SpinnerHandle};
use crate::{WatchArgs, WatchMode};

use super::Prepared;

/// How long a stopped stream gets to finish its close handshake.
const CLOSE_WAIT: Duration = Duration::from_secs(2);

type LiveSession<R> = WatchSession<R, WebSocketTransport, HttpClient>;

pub(super) fn run_watch(args: WatchArgs) -> Result<String, ConsoleError> {
    let owns_terminal = args.mode == WatchMode::Viewport;
    let prepared = Prepared::load(&args.target, owns_terminal)?;
    match &args.mode {
        WatchMode::Viewport => watch_viewport(&prepared, &args),
        WatchMode::Plain => watch_plain(&prepared, &args),
        WatchMode::Html(path) => watch_html(&prepared, &args, path),
    }
}

fn open_session<R: RenderTarget>(
    prepared: &Prepared,
    args: &WatchArgs,
    target: R,
) -> Result<LiveSession<R>, ConsoleError> {
    let (transport, events) = WebSocketTransport::new(prepared.runtime.handle().clone());
    let transport = transport.with_cookie(prepared.settings.session_cookie.clone());
    let controller = TaskController::with_options(
        &prepared.page,
        transport,
        prepared.http(),
        prepared.settings.stream.clone(),
    )?;
    let buffer = LineBuffer::with_capacity_limit(prepared.settings.max_lines);
    let mut session = WatchSession::new(controller, Console::new(buffer, target), events)
        .with_transcript(args.save.clone());
    session.start()?;
    Ok(session)
}

fn watch_viewport(prepared: &Prepared, args: &WatchArgs) -> Result<String, ConsoleError> {
    let mut session = open_session(prepared, args, ViewportTarget::new())?;
    tui::run_viewport(&mut session, prepared.runtime.handle())?;
    conclude(prepared, &mut session)?;
    Ok(String::new())
}

fn watch_plain(prepared: &Prepared, args: &WatchArgs) -> Result<String, ConsoleError> {
    let is_tty = io::stdout().is_terminal();
    let target = TerminalTarget::new(
        io::stdout(),
        resolve_color_enabled(prepared.mode, is_tty),
        is_tty,
    );
    let mut session = open_session(prepared, args, target)?;
    follow(prepared, &mut session)?;
    let outcome = conclude(prepared, &mut session);
    session.console_mut().target_mut().finish()?;
    outcome?;
    Ok(String::new())
}

fn watch_html(
    prepared: &Prepared,
    args: &WatchArgs,
    path: &std::path::Path,
) -> Result<String, ConsoleError> {
    let task = TaskId::from_page(&prepared.page)?;
    let mut session = open_session(prepared, args, MarkupDocument::new(format!("Task {task}")))?;
    follow(prepared, &mut session)?;
    let outcome = conclude(prepared, &mut session);

    let (buffer, document) = session.into_console().into_parts();
    std::fs::write(path, document.to_html())?;
    info!(path = %path.display(), lines = buffer.len(), "html document written");
    PlainRenderer::stderr(prepared.mode).notice(
        NoticeLevel::Info,
        &format!("wrote {} lines to {}", buffer.len(), path.display()),
    )?;
    outcome?;
    Ok(String::new())
}

/// Pumps events until the stream closes or the user interrupts with Ctrl+C.
fn follow<R, T, C>(
    prepared: &Prepared,
    session: &mut WatchSession<R, T, C>,
) -> Result<(), ConsoleError>
where
    R: RenderTarget,
    T: Transport,
    C: CancelEndpoint,
{
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    prepared.runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, Ordering::SeqCst);
        }
    });

    let label = format!("connecting to {}", session.controller().stream_url());
    let mut spinner = Some(PlainRenderer::stderr(prepared.mode).spinner(&label)?);
    loop {
        session.pump(INPUT_POLL_WAIT);
        let state = session.state();
        if state != ConnectionState::Connecting {
            if let Some(handle) = spinner.take() {
                settle_spinner(handle.as_ref(), state);
            }
        }
        if state.is_closed() {
            return Ok(());
        }
        if interrupted.load(Ordering::SeqCst) {
            info!("interrupted; closing task stream");
            session.stop();
            return Ok(());
        }
    }
}

fn settle_spinner(spinner: &dyn SpinnerHandle, state: ConnectionState) {
    match state {
        ConnectionState::Closed(CloseReason::Error) => spinner.finish_error("connection failed"),
        _ => spinner.finish_success("connected"),
    }
}

/// Waits for the close, saves the transcript and turns an errored stream
/// into a failure.
fn conclude<R, T, C>(
    prepared: &Prepared,
    session: &mut WatchSession<R, T, C>,
) -> Result<(), ConsoleError>
where
    R: RenderTarget,
    T: Transport,
    C: CancelEndpoint,
{
    let state = session.wait_closed(CLOSE_WAIT);
    let mut notices = PlainRenderer::stderr(prepared.mode);
    match session.save_transcript() {
        Ok(Some(path)) => notices.notice(
            NoticeLevel::Info,
            &format!("transcript saved to {}", path.display()),
        )?,
        Ok(None) => {}
        Err(err) => {
            warn!("transcript_save_error: {err}");
            return Err(err);
        }
    }

    match state {
        ConnectionState::Closed(CloseReason::Error) => Err(ConsoleError::StreamFailed {
            task: session.controller().task_id().clone(),
        }),
        ConnectionState::Closed(CloseReason::Closed) => Ok(()),
        other => {
            warn!(state = %other, "task stream did not close in time");
            Ok(())
        }
    }
}
