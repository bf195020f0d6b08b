use std::io::{IsTerminal, Write};
use std::time::Duration;

use anstream::{AutoStream, ColorChoice};
use anstyle::Style;
use indicatif::{ProgressBar, ProgressStyle};
use tabled::builder::Builder;
use tabled::settings::{Padding, Style as TableStyle};

use crate::ui::renderer::{Renderer, SpinnerHandle, UiResult};
use crate::ui::theme::{is_ci_environment, resolve_color_enabled, OutputMode, Theme};
use crate::ui::widgets::{KeyValue, MessageBlock, NoticeLevel, TableSpec};

const SPINNER_TICK: Duration = Duration::from_millis(80);

pub struct PlainRenderer<W: Write> {
    writer: W,
    color_enabled: bool,
    progress_enabled: bool,
    theme: Theme,
}

impl<W: Write> PlainRenderer<W> {
    pub fn new(writer: W, color_enabled: bool) -> Self {
        Self {
            writer,
            color_enabled,
            progress_enabled: false,
            theme: Theme::default(),
        }
    }

    pub fn with_progress_enabled(mut self, enabled: bool) -> Self {
        self.progress_enabled = enabled;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn style_text(&self, style: Style, text: &str) -> String {
        if !self.color_enabled {
            return text.to_owned();
        }
        format!("{}{}{}", style.render(), text, style.render_reset())
    }

    fn write_block(&mut self, label: &str, style: Style, block: &MessageBlock) -> UiResult<()> {
        let marker = self.style_text(style, label);
        writeln!(self.writer, "{marker} {}", block.title)?;
        writeln!(self.writer, "  {}", block.body)?;
        if let Some(hint) = &block.hint {
            let hint_label = self.style_text(self.theme.muted, "hint");
            writeln!(self.writer, "  {hint_label}: {hint}")?;
        }
        Ok(())
    }
}

fn color_choice(mode: OutputMode) -> ColorChoice {
    match mode {
        OutputMode::Auto => ColorChoice::Auto,
        OutputMode::Always => ColorChoice::AlwaysAnsi,
        OutputMode::Never => ColorChoice::Never,
    }
}

impl PlainRenderer<AutoStream<std::io::Stdout>> {
    pub fn stdout(mode: OutputMode) -> Self {
        let stream = AutoStream::new(std::io::stdout(), color_choice(mode));
        let is_tty = std::io::stdout().is_terminal();
        Self::new(stream, resolve_color_enabled(mode, is_tty))
            .with_progress_enabled(is_tty && !is_ci_environment())
    }
}

impl PlainRenderer<AutoStream<std::io::Stderr>> {
    pub fn stderr(mode: OutputMode) -> Self {
        let stream = AutoStream::new(std::io::stderr(), color_choice(mode));
        let is_tty = std::io::stderr().is_terminal();
        Self::new(stream, resolve_color_enabled(mode, is_tty))
            .with_progress_enabled(is_tty && !is_ci_environment())
    }
}

impl<W: Write> Renderer for PlainRenderer<W> {
    fn section(&mut self, title: &str) -> UiResult<()> {
        let rendered = self.style_text(self.theme.accent, title);
        let underline = self.style_text(self.theme.muted, &"─".repeat(title.chars().count()));
        writeln!(self.writer, "{rendered}")?;
        writeln!(self.writer, "{underline}")?;
        Ok(())
    }

    fn notice(&mut self, level: NoticeLevel, body: &str) -> UiResult<()> {
        let (label, style) = match level {
            NoticeLevel::Info => ("info", self.theme.accent),
            NoticeLevel::Success => ("ok", self.theme.success),
            NoticeLevel::Warning => ("warn", self.theme.warning),
            NoticeLevel::Error => ("error", self.theme.error),
        };
        let marker = self.style_text(style, "•");
        let label = self.style_text(self.theme.muted, label);
        writeln!(self.writer, "{marker} {label}: {body}")?;
        Ok(())
    }

    fn success_block(&mut self, block: &MessageBlock) -> UiResult<()> {
        self.write_block("[success]", self.theme.success, block)
    }

    fn error_block(&mut self, block: &MessageBlock) -> UiResult<()> {
        self.write_block("[error]", self.theme.error, block)
    }

    fn key_values(&mut self, items: &[KeyValue]) -> UiResult<()> {
        let width = items
            .iter()
            .map(|item| item.key.chars().count())
            .max()
            .unwrap_or(0);
        for item in items {
            let padded = format!("{:<width$}", item.key);
            let key = self.style_text(self.theme.label, &padded);
            let value = self.style_text(self.theme.value, &item.value);
            writeln!(self.writer, "{key}  {value}")?;
        }
        Ok(())
    }

    fn table(&mut self, spec: &TableSpec) -> UiResult<()> {
        if spec.rows.is_empty() {
            writeln!(self.writer, "<none>")?;
            return Ok(());
        }
        let mut builder = Builder::default();
        if !spec.headers.is_empty() {
            builder.push_record(spec.headers.iter().map(String::as_str));
        }
        for row in &spec.rows {
            builder.push_record(row.iter().map(String::as_str));
        }
        let mut table = builder.build();
        table.with(TableStyle::blank());
        table.with(Padding::new(0, 2, 0, 0));
        writeln!(self.writer, "{table}")?;
        Ok(())
    }

    fn spinner(&mut self, label: &str) -> UiResult<Box<dyn SpinnerHandle>> {
        if self.progress_enabled {
            let spinner = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
                spinner.set_style(style);
            }
            spinner.set_message(label.to_owned());
            spinner.enable_steady_tick(SPINNER_TICK);
            return Ok(Box::new(IndicatifSpinner(spinner)));
        }
        let marker = self.style_text(self.theme.accent, "◌");
        writeln!(self.writer, "{marker} {label}")?;
        Ok(Box::new(NoopSpinner))
    }
}

struct NoopSpinner;

impl SpinnerHandle for NoopSpinner {
    fn set_message(&self, _message: &str) {}

    fn finish_success(&self, _message: &str) {}

    fn finish_error(&self, _message: &str) {}
}

struct IndicatifSpinner(ProgressBar);

impl SpinnerHandle for IndicatifSpinner {
    fn set_message(&self, message: &str) {
        self.0.set_message(message.to_owned());
    }

    fn finish_success(&self, message: &str) {
        self.0.finish_with_message(message.to_owned());
    }

    fn finish_error(&self, message: &str) {
        self.0.abandon_with_message(message.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(renderer: PlainRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.into_inner()).expect("utf8")
    }

    #[test]
    fn renders_blocks_without_color_when_disabled() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false);
        renderer
            .error_block(
                &MessageBlock::new("Missing task id", "Page url has no `id` parameter")
                    .with_hint("Add URL suffix like '?id=1'"),
            )
            .expect("render error block");

        assert_eq!(
            rendered(renderer),
            "[error] Missing task id\n  Page url has no `id` parameter\n  hint: Add URL suffix like '?id=1'\n"
        );
    }

    #[test]
    fn key_values_are_aligned() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false);
        renderer
            .key_values(&[KeyValue::new("task", "7"), KeyValue::new("stream", "ws://h/ws/runsh/7")])
            .expect("key values");
        assert_eq!(rendered(renderer), "task    7\nstream  ws://h/ws/runsh/7\n");
    }

    #[test]
    fn spinner_falls_back_to_a_single_line_when_progress_disabled() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false).with_progress_enabled(false);
        let spinner = renderer.spinner("Cancelling task 7").expect("spinner");
        spinner.set_message("still waiting");
        spinner.finish_success("done");
        assert_eq!(rendered(renderer), "◌ Cancelling task 7\n");
    }

    #[test]
    fn table_lists_rows_and_handles_empty() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false);
        renderer
            .table(&TableSpec::new(
                vec!["provider".to_owned(), "login".to_owned()],
                vec![vec!["github".to_owned(), "http://h/auth/github/login".to_owned()]],
            ))
            .expect("table");
        renderer
            .table(&TableSpec::new(vec!["provider".to_owned()], Vec::new()))
            .expect("empty table");

        let output = rendered(renderer);
        assert!(output.contains("provider"));
        assert!(output.contains("github"));
        assert!(output.ends_with("<none>\n"));
    }

    #[test]
    fn notice_marks_level() {
        let mut renderer = PlainRenderer::new(Vec::<u8>::new(), false);
        renderer
            .notice(NoticeLevel::Warning, "cancel returned HTTP 200")
            .expect("notice");
        assert_eq!(rendered(renderer), "• warn: cancel returned HTTP 200\n");
    }
}
