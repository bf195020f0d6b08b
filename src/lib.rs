pub mod ansi;
pub mod config;
pub mod console;
pub mod error;
pub mod logging;
pub mod runner;
pub mod transport;
pub mod tui;
pub mod ui;

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Watch(WatchArgs),
    Cancel(TargetArgs),
    Providers(TargetArgs),
    WhoAmI(TargetArgs),
    Help,
}

/// Which page to talk to and where settings come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetArgs {
    pub page_url: Option<String>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchMode {
    Viewport,
    Plain,
    Html(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchArgs {
    pub target: TargetArgs,
    pub mode: WatchMode,
    pub save: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliParseError {
    MissingValue(&'static str),
    UnknownArgument(String),
    UnexpectedArgument(String),
    ConflictingModes,
}

impl std::fmt::Display for CliParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliParseError::MissingValue(flag) => write!(f, "{flag} requires a value"),
            CliParseError::UnknownArgument(arg) => write!(f, "unknown argument: {arg}"),
            CliParseError::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: {arg} (page url already given)")
            }
            CliParseError::ConflictingModes => write!(f, "--plain and --html cannot be combined"),
        }
    }
}

impl std::error::Error for CliParseError {}

pub fn parse_command<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(cmd) = args.next() else {
        return Ok(Command::Help);
    };

    match cmd.as_str() {
        "--help" | "-h" | "help" => return Ok(Command::Help),
        "watch" => return parse_watch(args),
        "cancel" => return Ok(parse_target(args)?.map_or(Command::Help, Command::Cancel)),
        "providers" => return Ok(parse_target(args)?.map_or(Command::Help, Command::Providers)),
        "whoami" => return Ok(parse_target(args)?.map_or(Command::Help, Command::WhoAmI)),
        _ => {}
    }
    if cmd.starts_with('-') {
        return Err(CliParseError::UnknownArgument(cmd));
    }
    // A bare page url is shorthand for `watch <url>`.
    parse_watch(std::iter::once(cmd).chain(args))
}

fn take_page_url(target: &mut TargetArgs, arg: String) -> Result<(), CliParseError> {
    if target.page_url.is_some() {
        return Err(CliParseError::UnexpectedArgument(arg));
    }
    target.page_url = Some(arg);
    Ok(())
}

/// `None` when help was requested.
fn parse_target<I>(args: I) -> Result<Option<TargetArgs>, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut target = TargetArgs::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(path) = args.next() else {
                    return Err(CliParseError::MissingValue("--config"));
                };
                target.config = Some(PathBuf::from(path));
            }
            "--help" | "-h" => return Ok(None),
            other if other.starts_with('-') => {
                return Err(CliParseError::UnknownArgument(other.to_owned()))
            }
            _ => take_page_url(&mut target, arg)?,
        }
    }
    Ok(Some(target))
}

fn parse_watch<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut target = TargetArgs::default();
    let mut plain = false;
    let mut html: Option<PathBuf> = None;
    let mut save: Option<PathBuf> = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(path) = args.next() else {
                    return Err(CliParseError::MissingValue("--config"));
                };
                target.config = Some(PathBuf::from(path));
            }
            "--plain" => plain = true,
            "--html" => {
                let Some(path) = args.next() else {
                    return Err(CliParseError::MissingValue("--html"));
                };
                html = Some(PathBuf::from(path));
            }
            "--save" => {
                let Some(path) = args.next() else {
                    return Err(CliParseError::MissingValue("--save"));
                };
                save = Some(PathBuf::from(path));
            }
            "--help" | "-h" => return Ok(Command::Help),
            other if other.starts_with('-') => {
                return Err(CliParseError::UnknownArgument(other.to_owned()))
            }
            _ => take_page_url(&mut target, arg)?,
        }
    }
    let mode = match (plain, html) {
        (true, Some(_)) => return Err(CliParseError::ConflictingModes),
        (true, None) => WatchMode::Plain,
        (false, Some(path)) => WatchMode::Html(path),
        (false, None) => WatchMode::Viewport,
    };
    Ok(Command::Watch(WatchArgs { target, mode, save }))
}

pub fn print_usage() {
    eprintln!(
        "taskview\n\nUSAGE:\n  taskview watch <PAGE_URL> [--plain | --html <PATH>] [--save <PATH>] [--config <PATH>]\n  taskview <PAGE_URL> [watch options]\n  taskview cancel <PAGE_URL> [--config <PATH>]\n  taskview providers <PAGE_URL> [--config <PATH>]\n  taskview whoami <PAGE_URL> [--config <PATH>]\n\nCOMMANDS:\n  watch             Stream a task's live output (full-screen by default)\n  cancel            Ask the server to cancel the task\n  providers         List login providers and their login links\n  whoami            Show the user behind the session cookie\n\nPAGE_URL:\n  The task console page, e.g. https://tasks.example.com/?id=42\n  May be omitted when `page_url` is set in taskview.toml.\n\nOPTIONS (watch):\n  --plain           Stream to stdout instead of the full-screen viewer\n  --html <PATH>     Render into an HTML page written to PATH on exit\n  --save <PATH>     Write a plain-text transcript to PATH (also `s` in the viewer)\n\nGENERAL:\n  --config <PATH>   Read settings from PATH instead of ./taskview.toml\n  -h, --help        Print help\n\nENVIRONMENT:\n  TASKVIEW_CONFIG   Settings file used when --config is absent\n  TASKVIEW_COLOR    auto | always | never\n  TASKVIEW_LOG      Log filter (default: info)\n"
    );
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
