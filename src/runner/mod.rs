use std::io::{self, IsTerminal};

use tokio::runtime::Runtime;
use tracing::debug;

use crate::config::Settings;
use crate::console::PageContext;
use crate::error::ConsoleError;
use crate::logging::{init_logging, LogTarget};
use crate::transport::HttpClient;
use crate::ui::theme::resolve_color_enabled;
use crate::ui::{OutputMode, PlainRenderer};
use crate::{Command, TargetArgs};

mod account;
mod watch;

/// Runs one parsed command. The returned text is meant for stdout; progress
/// and summaries go to stderr while the command runs.
pub fn run_command(cmd: Command) -> Result<String, ConsoleError> {
    match cmd {
        Command::Watch(args) => watch::run_watch(args),
        Command::Cancel(target) => account::run_cancel(&target),
        Command::Providers(target) => account::run_providers(&target),
        Command::WhoAmI(target) => account::run_whoami(&target),
        Command::Help => Ok(String::new()),
    }
}

/// Everything a command needs once settings and the page url are resolved.
struct Prepared {
    settings: Settings,
    mode: OutputMode,
    page: PageContext,
    runtime: Runtime,
}

impl Prepared {
    fn load(target: &TargetArgs, owns_terminal: bool) -> Result<Self, ConsoleError> {
        let settings = Settings::load(target.config.as_deref())?;
        let mode = OutputMode::from_env_or(settings.color);
        init_logging(&LogTarget::select(settings.log_file.clone(), owns_terminal))?;

        let raw = target
            .page_url
            .as_deref()
            .or(settings.page_url.as_deref())
            .ok_or(ConsoleError::MissingPageUrl)?;
        let page = PageContext::parse(raw)?;
        debug!(
            page = %page.url(),
            config = ?settings.source,
            "resolved page"
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            settings,
            mode,
            page,
            runtime,
        })
    }

    fn http(&self) -> HttpClient {
        HttpClient::new(
            self.runtime.handle().clone(),
            self.settings.request_timeout,
            self.settings.session_cookie.clone(),
        )
    }

    fn stdout_color(&self) -> bool {
        resolve_color_enabled(self.mode, io::stdout().is_terminal())
    }
}

fn buffered_renderer(color_enabled: bool) -> PlainRenderer<Vec<u8>> {
    PlainRenderer::new(Vec::<u8>::new(), color_enabled)
}

fn rendered_text(renderer: PlainRenderer<Vec<u8>>) -> Result<String, ConsoleError> {
    String::from_utf8(renderer.into_inner()).map_err(|error| {
        ConsoleError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid utf-8 in rendered output: {error}"),
        ))
    })
}
