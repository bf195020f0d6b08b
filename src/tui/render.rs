use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols::border;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState};
use ratatui::Frame;

use crate::console::{CloseReason, ConnectionState};
use crate::ui::NoticeLevel;

use super::viewport::{to_style, ViewportTarget};
use super::StatusLine;

const HEADER_HEIGHT: u16 = 3;
const FOOTER_HEIGHT: u16 = 1;

pub(super) struct ViewModel<'a> {
    pub(super) task: &'a str,
    pub(super) stream_url: &'a str,
    pub(super) state: ConnectionState,
    pub(super) target: &'a ViewportTarget,
    pub(super) status: Option<&'a StatusLine>,
    pub(super) can_save: bool,
}

/// Rows available to output lines for a terminal of `height` rows.
pub(super) fn output_height(height: u16) -> usize {
    height.saturating_sub(HEADER_HEIGHT + FOOTER_HEIGHT + 2) as usize
}

pub(super) fn render_ui(frame: &mut Frame<'_>, model: &ViewModel<'_>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(HEADER_HEIGHT),
            Constraint::Min(1),
            Constraint::Length(FOOTER_HEIGHT),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], model);
    render_output(frame, chunks[1], model.target);
    render_footer(frame, chunks[2], model);
}

fn render_header(frame: &mut Frame<'_>, area: Rect, model: &ViewModel<'_>) {
    let muted = Style::default().fg(Color::DarkGray);
    let line = Line::from(vec![
        Span::styled("task ", muted),
        Span::styled(
            model.task.to_owned(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::styled("  |  ", muted),
        Span::styled(model.state.to_string(), state_style(model.state)),
        Span::styled("  |  ", muted),
        Span::styled(model.stream_url.to_owned(), muted),
    ]);
    let header = Paragraph::new(line).block(panel_block(Some(" TASKVIEW "), true, Color::Magenta));
    frame.render_widget(header, area);
}

fn render_output(frame: &mut Frame<'_>, area: Rect, target: &ViewportTarget) {
    let height = area.height.saturating_sub(2) as usize;
    let offset = target.offset(height);
    let lines = if target.is_empty() {
        vec![Line::from(Span::styled(
            "waiting for output...",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        target.lines().cloned().collect::<Vec<_>>()
    };
    let output = Paragraph::new(lines)
        .block(panel_block(None, false, Color::DarkGray))
        .scroll((offset.min(u16::MAX as usize) as u16, 0));
    frame.render_widget(output, area);

    let mut scrollbar_state = ScrollbarState::new(target.max_offset(height).max(1))
        .viewport_content_length(height.max(1))
        .position(offset);
    frame.render_stateful_widget(
        Scrollbar::default().orientation(ScrollbarOrientation::VerticalRight),
        area,
        &mut scrollbar_state,
    );
}

fn render_footer(frame: &mut Frame<'_>, area: Rect, model: &ViewModel<'_>) {
    let muted = Style::default().fg(Color::DarkGray);
    let mut spans = vec![Span::styled("quit (q)", muted)];
    spans.push(Span::styled("  |  ", muted));
    spans.push(Span::styled("cancel task (c)", muted));
    if model.can_save {
        spans.push(Span::styled("  |  ", muted));
        spans.push(Span::styled("save (s)", muted));
    }
    spans.push(Span::styled("  |  ", muted));
    spans.push(Span::styled(
        if model.target.is_following() {
            "follow"
        } else {
            "scrolled (End to follow)"
        },
        if model.target.is_following() {
            muted
        } else {
            Style::default().fg(Color::Yellow)
        },
    ));

    let notice = model
        .status
        .map(|status| (status.level, status.text.as_str()))
        .or_else(|| model.target.message().map(|text| (NoticeLevel::Error, text)));
    if let Some((level, text)) = notice {
        spans.push(Span::styled("  |  ", muted));
        spans.push(Span::styled(text.to_owned(), notice_style(level)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn state_style(state: ConnectionState) -> Style {
    match state {
        ConnectionState::Open => Style::default().fg(Color::Green),
        ConnectionState::Closed(CloseReason::Error) => Style::default().fg(Color::Red),
        ConnectionState::Closed(CloseReason::Closed) => Style::default().fg(Color::Gray),
        _ => Style::default().fg(Color::Yellow),
    }
}

fn notice_style(level: NoticeLevel) -> Style {
    let theme = crate::ui::Theme::default();
    match level {
        NoticeLevel::Info => to_style(theme.accent),
        NoticeLevel::Success => to_style(theme.success),
        NoticeLevel::Warning => to_style(theme.warning),
        NoticeLevel::Error => to_style(theme.error),
    }
}

pub(super) fn panel_block<'a>(
    title: Option<&'a str>,
    show_version: bool,
    border_color: Color,
) -> Block<'a> {
    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_set(border::ROUNDED)
        .border_style(Style::default().fg(border_color));
    if let Some(title) = title {
        block = block.title_top(
            Line::from(Span::styled(
                title.to_owned(),
                Style::default()
                    .fg(Color::Magenta)
                    .add_modifier(Modifier::BOLD),
            ))
            .left_aligned(),
        );
    }
    if show_version {
        block = block.title_bottom(
            Line::from(Span::styled(
                format!(" v{} ", env!("CARGO_PKG_VERSION")),
                Style::default().fg(Color::LightMagenta),
            ))
            .right_aligned(),
        );
    }
    block
}
