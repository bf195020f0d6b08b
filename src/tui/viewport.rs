use anstyle::{AnsiColor, Effects};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

use crate::ansi::StyledFragment;
use crate::console::{NodeId, RenderTarget};

/// Line store behind the full-screen output pane.
///
/// Follows the bottom after every update; manual scrolling detaches it until
/// the next update snaps it back.
#[derive(Debug, Default)]
pub struct ViewportTarget {
    lines: Vec<(NodeId, Line<'static>)>,
    next_id: u64,
    message: Option<String>,
    follow: bool,
    offset: usize,
}

impl ViewportTarget {
    pub fn new() -> Self {
        Self {
            follow: true,
            ..Self::default()
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &Line<'static>> {
        self.lines.iter().map(|(_, line)| line)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_following(&self) -> bool {
        self.follow
    }

    pub fn max_offset(&self, height: usize) -> usize {
        self.lines.len().saturating_sub(height)
    }

    /// First visible line for a pane `height` rows tall.
    pub fn offset(&self, height: usize) -> usize {
        let max = self.max_offset(height);
        if self.follow {
            max
        } else {
            self.offset.min(max)
        }
    }

    pub fn scroll_up(&mut self, rows: usize, height: usize) {
        self.offset = self.offset(height).saturating_sub(rows);
        self.follow = false;
    }

    pub fn scroll_down(&mut self, rows: usize, height: usize) {
        let next = self.offset(height).saturating_add(rows);
        if next >= self.max_offset(height) {
            self.follow = true;
        } else {
            self.offset = next;
        }
    }

    pub fn scroll_top(&mut self) {
        self.offset = 0;
        self.follow = false;
    }
}

impl RenderTarget for ViewportTarget {
    fn insert_line(&mut self, content: &StyledFragment) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.lines.push((id, to_line(content)));
        id
    }

    fn replace_line(&mut self, node: NodeId, content: &StyledFragment) {
        if let Some((_, line)) = self.lines.iter_mut().rev().find(|(id, _)| *id == node) {
            *line = to_line(content);
        }
    }

    fn remove_line(&mut self, node: NodeId) {
        if let Some(index) = self.lines.iter().position(|(id, _)| *id == node) {
            self.lines.remove(index);
            self.offset = self.offset.saturating_sub(1);
        }
    }

    fn scroll_to_bottom(&mut self) {
        self.follow = true;
    }

    fn show_message(&mut self, message: &str) {
        self.message = Some(message.to_owned());
    }

    fn node_count(&self) -> usize {
        self.lines.len()
    }
}

pub(crate) fn to_line(content: &StyledFragment) -> Line<'static> {
    Line::from(
        content
            .spans()
            .iter()
            .map(|span| Span::styled(span.text.clone(), to_style(span.style)))
            .collect::<Vec<_>>(),
    )
}

pub(crate) fn to_style(style: anstyle::Style) -> Style {
    let mut mapped = Style::default();
    if let Some(fg) = style.get_fg_color() {
        mapped = mapped.fg(to_color(fg));
    }
    if let Some(bg) = style.get_bg_color() {
        mapped = mapped.bg(to_color(bg));
    }
    let effects = style.get_effects();
    for (effect, modifier) in [
        (Effects::BOLD, Modifier::BOLD),
        (Effects::DIMMED, Modifier::DIM),
        (Effects::ITALIC, Modifier::ITALIC),
        (Effects::UNDERLINE, Modifier::UNDERLINED),
        (Effects::INVERT, Modifier::REVERSED),
        (Effects::STRIKETHROUGH, Modifier::CROSSED_OUT),
    ] {
        if effects.contains(effect) {
            mapped = mapped.add_modifier(modifier);
        }
    }
    mapped
}

fn to_color(color: anstyle::Color) -> Color {
    match color {
        anstyle::Color::Ansi(ansi) => match ansi {
            AnsiColor::Black => Color::Black,
            AnsiColor::Red => Color::Red,
            AnsiColor::Green => Color::Green,
            AnsiColor::Yellow => Color::Yellow,
            AnsiColor::Blue => Color::Blue,
            AnsiColor::Magenta => Color::Magenta,
            AnsiColor::Cyan => Color::Cyan,
            AnsiColor::White => Color::Gray,
            AnsiColor::BrightBlack => Color::DarkGray,
            AnsiColor::BrightRed => Color::LightRed,
            AnsiColor::BrightGreen => Color::LightGreen,
            AnsiColor::BrightYellow => Color::LightYellow,
            AnsiColor::BrightBlue => Color::LightBlue,
            AnsiColor::BrightMagenta => Color::LightMagenta,
            AnsiColor::BrightCyan => Color::LightCyan,
            AnsiColor::BrightWhite => Color::White,
        },
        anstyle::Color::Ansi256(indexed) => Color::Indexed(indexed.0),
        anstyle::Color::Rgb(rgb) => Color::Rgb(rgb.0, rgb.1, rgb.2),
    }
}
