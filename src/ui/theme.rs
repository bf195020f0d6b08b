use anstyle::{AnsiColor, Color, Style};

pub const COLOR_ENV: &str = "TASKVIEW_COLOR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Auto,
    Always,
    Never,
}

impl OutputMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "auto" => Some(OutputMode::Auto),
            "always" => Some(OutputMode::Always),
            "never" => Some(OutputMode::Never),
            _ => None,
        }
    }

    /// `TASKVIEW_COLOR` when set to a known mode, else `fallback`.
    pub fn from_env_or(fallback: OutputMode) -> Self {
        std::env::var(COLOR_ENV)
            .ok()
            .as_deref()
            .and_then(Self::parse)
            .unwrap_or(fallback)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub accent: Style,
    pub muted: Style,
    pub success: Style,
    pub warning: Style,
    pub error: Style,
    pub label: Style,
    pub value: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            accent: Style::new()
                .fg_color(Some(Color::Ansi(AnsiColor::Cyan)))
                .bold(),
            muted: Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))),
            success: Style::new()
                .fg_color(Some(Color::Ansi(AnsiColor::Green)))
                .bold(),
            warning: Style::new()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow)))
                .bold(),
            error: Style::new()
                .fg_color(Some(Color::Ansi(AnsiColor::Red)))
                .bold(),
            label: Style::new()
                .fg_color(Some(Color::Ansi(AnsiColor::Blue)))
                .bold(),
            value: Style::new().fg_color(Some(Color::Ansi(AnsiColor::White))),
        }
    }
}

pub fn resolve_color_enabled(mode: OutputMode, is_tty: bool) -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    match mode {
        OutputMode::Always => true,
        OutputMode::Never => false,
        OutputMode::Auto => is_tty,
    }
}

pub fn is_ci_environment() -> bool {
    std::env::var_os("CI").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_modes_only() {
        assert_eq!(OutputMode::parse("always"), Some(OutputMode::Always));
        assert_eq!(OutputMode::parse("never"), Some(OutputMode::Never));
        assert_eq!(OutputMode::parse("auto"), Some(OutputMode::Auto));
        assert_eq!(OutputMode::parse("sometimes"), None);
    }

    #[test]
    fn explicit_modes_ignore_tty() {
        if std::env::var_os("NO_COLOR").is_some() {
            return;
        }
        assert!(resolve_color_enabled(OutputMode::Always, false));
        assert!(!resolve_color_enabled(OutputMode::Never, true));
        assert!(resolve_color_enabled(OutputMode::Auto, true));
    }
}
