//! Escape-coded terminal text to styled fragments.
//!
//! Only SGR sequences (`ESC [ … m`) affect the output. Every other escape
//! sequence, and every control byte except tab, is dropped without error so
//! that a noisy stream can never stop rendering.

use std::fmt::Write as _;

use anstyle::{Ansi256Color, AnsiColor, Color, Effects, RgbColor, Style};

const ESC: char = '\u{1b}';
const BEL: char = '\u{7}';

/// Longest escape sequence we are willing to hold back waiting for the next chunk.
pub const MAX_ESCAPE_RESIDUE: usize = 64;

const ANSI_COLORS: [AnsiColor; 8] = [
    AnsiColor::Black,
    AnsiColor::Red,
    AnsiColor::Green,
    AnsiColor::Yellow,
    AnsiColor::Blue,
    AnsiColor::Magenta,
    AnsiColor::Cyan,
    AnsiColor::White,
];

const BRIGHT_COLORS: [AnsiColor; 8] = [
    AnsiColor::BrightBlack,
    AnsiColor::BrightRed,
    AnsiColor::BrightGreen,
    AnsiColor::BrightYellow,
    AnsiColor::BrightBlue,
    AnsiColor::BrightMagenta,
    AnsiColor::BrightCyan,
    AnsiColor::BrightWhite,
];

const PALETTE: [(u8, u8, u8); 16] = [
    (0, 0, 0),
    (187, 0, 0),
    (0, 187, 0),
    (187, 187, 0),
    (0, 0, 187),
    (187, 0, 187),
    (0, 187, 187),
    (255, 255, 255),
    (85, 85, 85),
    (255, 85, 85),
    (0, 255, 0),
    (255, 255, 85),
    (85, 85, 255),
    (255, 85, 255),
    (85, 255, 255),
    (255, 255, 255),
];

const CUBE_LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSpan {
    pub style: Style,
    pub text: String,
}

/// Rendered text with presentational styling attached per span.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyledFragment {
    spans: Vec<StyledSpan>,
}

impl StyledFragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unstyled fragment from text that carries no escape sequences.
    pub fn plain(text: &str) -> Self {
        let mut fragment = Self::new();
        fragment.push(Style::new(), text);
        fragment
    }

    pub fn push(&mut self, style: Style, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(last) = self.spans.last_mut() {
            if last.style == style {
                last.text.push_str(text);
                return;
            }
        }
        self.spans.push(StyledSpan {
            style,
            text: text.to_owned(),
        });
    }

    pub fn spans(&self) -> &[StyledSpan] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn plain_text(&self) -> String {
        self.spans.iter().map(|span| span.text.as_str()).collect()
    }

    /// HTML markup safe to insert into a document: span text is escaped
    /// before any styling markup is wrapped around it.
    pub fn markup(&self) -> String {
        let mut out = String::new();
        for span in &self.spans {
            let escaped = escape_markup(&span.text);
            let css = css_declarations(span.style);
            if css.is_empty() {
                out.push_str(&escaped);
            } else {
                let _ = write!(out, "<span style=\"{css}\">{escaped}</span>");
            }
        }
        out
    }

    /// Re-encodes the fragment with SGR sequences for a colour terminal.
    pub fn ansi(&self) -> String {
        let mut out = String::new();
        for span in &self.spans {
            if span.style == Style::new() {
                out.push_str(&span.text);
            } else {
                let _ = write!(
                    out,
                    "{}{}{}",
                    span.style.render(),
                    span.text,
                    span.style.render_reset()
                );
            }
        }
        out
    }
}

/// Style carried between chunks of one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderState {
    style: Style,
}

impl RenderState {
    pub fn style(&self) -> Style {
        self.style
    }

    pub fn reset(&mut self) {
        self.style = Style::new();
    }
}

pub fn render(text: &str) -> StyledFragment {
    render_with(&mut RenderState::default(), text)
}

pub fn render_with(state: &mut RenderState, text: &str) -> StyledFragment {
    let mut fragment = StyledFragment::new();
    let mut buf = String::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            ESC => {
                fragment.push(state.style, &std::mem::take(&mut buf));
                match chars.next() {
                    Some('[') => {
                        let mut params = String::new();
                        for next in chars.by_ref() {
                            if ('@'..='~').contains(&next) {
                                if next == 'm' {
                                    state.style = apply_sgr(state.style, &params);
                                }
                                break;
                            }
                            params.push(next);
                        }
                    }
                    Some(']') => {
                        while let Some(next) = chars.next() {
                            if next == BEL {
                                break;
                            }
                            if next == ESC {
                                if chars.peek() == Some(&'\\') {
                                    chars.next();
                                }
                                break;
                            }
                        }
                    }
                    _ => {}
                }
            }
            '\t' => buf.push(ch),
            ch if ch.is_control() => {}
            _ => buf.push(ch),
        }
    }
    fragment.push(state.style, &buf);
    fragment
}

/// Byte offset of an escape sequence left unfinished at the end of `text`.
///
/// A sequence that already runs past a newline is never held back, so the
/// lines after it are not lost if the stream ends there.
fn incomplete_escape_start(text: &str) -> Option<usize> {
    let start = text.rfind(ESC)?;
    let tail = &text[start + ESC.len_utf8()..];
    if tail.len() + ESC.len_utf8() > MAX_ESCAPE_RESIDUE || tail.contains('\n') {
        return None;
    }
    let mut chars = tail.chars();
    let complete = match chars.next() {
        None => false,
        Some('[') => chars.any(|ch| ('@'..='~').contains(&ch)),
        Some(']') => chars.any(|ch| ch == BEL),
        Some(_) => true,
    };
    if complete {
        None
    } else {
        Some(start)
    }
}

/// Splits `text` into the renderable prefix and an unfinished escape suffix.
pub fn split_incomplete_escape(text: &str) -> (&str, &str) {
    match incomplete_escape_start(text) {
        Some(start) => text.split_at(start),
        None => (text, ""),
    }
}

pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn apply_sgr(current: Style, params: &str) -> Style {
    let codes = if params.is_empty() {
        vec![Some(0u16)]
    } else {
        params
            .split(';')
            .map(|part| {
                if part.is_empty() {
                    Some(0)
                } else {
                    part.parse::<u16>().ok()
                }
            })
            .collect::<Vec<Option<u16>>>()
    };

    let mut style = current;
    let mut i = 0usize;
    while i < codes.len() {
        let Some(code) = codes[i] else {
            i += 1;
            continue;
        };
        match code {
            0 => style = Style::new(),
            1 => style = with_effect(style, Effects::BOLD),
            2 => style = with_effect(style, Effects::DIMMED),
            3 => style = with_effect(style, Effects::ITALIC),
            4 => style = with_effect(style, Effects::UNDERLINE),
            7 => style = with_effect(style, Effects::INVERT),
            9 => style = with_effect(style, Effects::STRIKETHROUGH),
            21 | 22 => style = without_effect(style, Effects::BOLD | Effects::DIMMED),
            23 => style = without_effect(style, Effects::ITALIC),
            24 => style = without_effect(style, Effects::UNDERLINE),
            27 => style = without_effect(style, Effects::INVERT),
            29 => style = without_effect(style, Effects::STRIKETHROUGH),
            30..=37 => style = style.fg_color(Some(ANSI_COLORS[usize::from(code - 30)].into())),
            39 => style = style.fg_color(None),
            40..=47 => style = style.bg_color(Some(ANSI_COLORS[usize::from(code - 40)].into())),
            49 => style = style.bg_color(None),
            90..=97 => style = style.fg_color(Some(BRIGHT_COLORS[usize::from(code - 90)].into())),
            100..=107 => {
                style = style.bg_color(Some(BRIGHT_COLORS[usize::from(code - 100)].into()))
            }
            38 | 48 => {
                let (color, consumed) = extended_color(&codes[i + 1..]);
                if let Some(color) = color {
                    style = if code == 38 {
                        style.fg_color(Some(color))
                    } else {
                        style.bg_color(Some(color))
                    };
                }
                i += consumed;
            }
            _ => {}
        }
        i += 1;
    }
    style
}

fn extended_color(rest: &[Option<u16>]) -> (Option<Color>, usize) {
    match rest.first().copied().flatten() {
        Some(5) => match rest.get(1).copied().flatten() {
            Some(index) if index <= 255 => (Some(Ansi256Color(index as u8).into()), 2),
            _ => (None, rest.len().min(2)),
        },
        Some(2) => {
            if rest.len() < 4 {
                return (None, rest.len());
            }
            let channels = rest[1..4]
                .iter()
                .map(|value| value.filter(|v| *v <= 255).map(|v| v as u8))
                .collect::<Option<Vec<u8>>>();
            match channels.as_deref() {
                Some([r, g, b]) => (Some(RgbColor(*r, *g, *b).into()), 4),
                _ => (None, 4),
            }
        }
        _ => (None, rest.len().min(1)),
    }
}

fn with_effect(style: Style, effect: Effects) -> Style {
    style.effects(style.get_effects().insert(effect))
}

fn without_effect(style: Style, effect: Effects) -> Style {
    style.effects(style.get_effects().remove(effect))
}

fn css_declarations(style: Style) -> String {
    let effects = style.get_effects();
    let (fg, bg) = if effects.contains(Effects::INVERT) {
        (style.get_bg_color(), style.get_fg_color())
    } else {
        (style.get_fg_color(), style.get_bg_color())
    };

    let mut rules: Vec<String> = Vec::new();
    if let Some(color) = fg {
        rules.push(format!("color:{}", css_color(color)));
    }
    if let Some(color) = bg {
        rules.push(format!("background-color:{}", css_color(color)));
    }
    if effects.contains(Effects::BOLD) {
        rules.push("font-weight:bold".to_owned());
    }
    if effects.contains(Effects::DIMMED) {
        rules.push("opacity:0.7".to_owned());
    }
    if effects.contains(Effects::ITALIC) {
        rules.push("font-style:italic".to_owned());
    }
    let decorations = [
        (Effects::UNDERLINE, "underline"),
        (Effects::STRIKETHROUGH, "line-through"),
    ]
    .iter()
    .filter(|(effect, _)| effects.contains(*effect))
    .map(|(_, name)| *name)
    .collect::<Vec<&str>>();
    if !decorations.is_empty() {
        rules.push(format!("text-decoration:{}", decorations.join(" ")));
    }
    rules.join(";")
}

fn css_color(color: Color) -> String {
    let (r, g, b) = match color {
        Color::Ansi(ansi) => PALETTE[ansi_index(ansi)],
        Color::Ansi256(Ansi256Color(index)) => indexed_rgb(index),
        Color::Rgb(RgbColor(r, g, b)) => (r, g, b),
    };
    format!("rgb({r},{g},{b})")
}

fn ansi_index(color: AnsiColor) -> usize {
    ANSI_COLORS
        .iter()
        .position(|candidate| *candidate == color)
        .or_else(|| {
            BRIGHT_COLORS
                .iter()
                .position(|candidate| *candidate == color)
                .map(|idx| idx + 8)
        })
        .unwrap_or(7)
}

fn indexed_rgb(index: u8) -> (u8, u8, u8) {
    match index {
        0..=15 => PALETTE[usize::from(index)],
        16..=231 => {
            let cube = index - 16;
            (
                CUBE_LEVELS[usize::from(cube / 36)],
                CUBE_LEVELS[usize::from((cube / 6) % 6)],
                CUBE_LEVELS[usize::from(cube % 6)],
            )
        }
        _ => {
            let level = 8 + (index - 232) * 10;
            (level, level, level)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red() -> Style {
        Style::new().fg_color(Some(AnsiColor::Red.into()))
    }

    #[test]
    fn render_splits_spans_on_colour_changes() {
        let fragment = render("\u{1b}[31merror\u{1b}[0m ok");
        assert_eq!(fragment.spans().len(), 2);
        assert_eq!(fragment.spans()[0].text, "error");
        assert_eq!(fragment.spans()[0].style, red());
        assert_eq!(fragment.spans()[1].text, " ok");
        assert_eq!(fragment.spans()[1].style, Style::new());
    }

    #[test]
    fn markup_wraps_styled_text_in_spans() {
        let fragment = render("\u{1b}[1;32mpass\u{1b}[0m");
        assert_eq!(
            fragment.markup(),
            "<span style=\"color:rgb(0,187,0);font-weight:bold\">pass</span>"
        );
    }

    #[test]
    fn markup_escapes_text_before_styling() {
        let fragment = render("\u{1b}[31m<script>alert('x') & \"y\"</script>");
        let markup = fragment.markup();
        assert!(markup.starts_with("<span style=\"color:rgb(187,0,0)\">"));
        assert!(markup.contains(
            "&lt;script&gt;alert(&#39;x&#39;) &amp; &quot;y&quot;&lt;/script&gt;"
        ));
    }

    #[test]
    fn non_sgr_sequences_and_controls_are_dropped() {
        let fragment = render("\u{1b}[2K\u{1b}[1Ahel\u{7}lo\u{1b}]0;title\u{7} wor\u{8}ld\u{7f}");
        assert_eq!(fragment.plain_text(), "hello world");
    }

    #[test]
    fn malformed_parameters_are_ignored() {
        let fragment = render("\u{1b}[3?1mtext\u{1b}[38;5mmore\u{1b}[38;2;1;2mend");
        assert_eq!(fragment.plain_text(), "textmoreend");
        assert!(fragment.spans().iter().all(|span| span.style == Style::new()));
    }

    #[test]
    fn extended_colours_are_resolved() {
        let fragment = render("\u{1b}[38;5;196ma\u{1b}[48;2;1;2;3mb");
        assert_eq!(
            fragment.spans()[0].style.get_fg_color(),
            Some(Ansi256Color(196).into())
        );
        assert_eq!(
            fragment.spans()[1].style.get_bg_color(),
            Some(RgbColor(1, 2, 3).into())
        );
        assert_eq!(
            fragment.markup(),
            "<span style=\"color:rgb(255,0,0)\">a</span><span style=\"color:rgb(255,0,0);background-color:rgb(1,2,3)\">b</span>"
        );
    }

    #[test]
    fn reset_codes_remove_individual_effects() {
        let fragment = render("\u{1b}[1;4mab\u{1b}[22mcd\u{1b}[24mef");
        let spans = fragment.spans();
        assert!(spans[0].style.get_effects().contains(Effects::BOLD));
        assert!(!spans[1].style.get_effects().contains(Effects::BOLD));
        assert!(spans[1].style.get_effects().contains(Effects::UNDERLINE));
        assert_eq!(spans[2].style, Style::new());
    }

    #[test]
    fn render_with_carries_style_across_calls() {
        let mut state = RenderState::default();
        let _ = render_with(&mut state, "\u{1b}[31mfirst");
        let second = render_with(&mut state, "second");
        assert_eq!(second.spans()[0].style, red());
        state.reset();
        assert_eq!(state.style(), Style::new());
    }

    #[test]
    fn plain_text_renders_to_itself() {
        for text in ["Building...", "Done.", "42 tests passed", ""] {
            let fragment = render(text);
            assert_eq!(fragment.markup(), text);
            assert_eq!(render(&fragment.markup()), fragment);
        }
    }

    #[test]
    fn markup_never_leaks_markup_characters() {
        let mut seed = 0x2545_f491_u32;
        let alphabet = [
            '<', '>', '&', '"', '\'', '\u{1b}', '[', 'm', '3', '1', ';', 'a', '\u{0}', '\r',
        ];
        for _ in 0..200 {
            let mut input = String::new();
            for _ in 0..24 {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                input.push(alphabet[(seed as usize) % alphabet.len()]);
            }
            let markup = render(&input).markup();
            let stripped = markup
                .replace("<span style=\"", "")
                .replace("\">", "")
                .replace("</span>", "");
            assert!(!stripped.contains('<'), "{input:?} -> {markup}");
            assert!(!stripped.contains('>'), "{input:?} -> {markup}");
            assert!(!stripped.chars().any(|ch| ch.is_control()), "{input:?}");
            let unescaped = ["&amp;", "&lt;", "&gt;", "&quot;", "&#39;"]
                .iter()
                .fold(stripped.clone(), |acc, entity| acc.replace(entity, ""));
            assert!(!unescaped.contains('&'), "{input:?} -> {markup}");
        }
    }

    #[test]
    fn incomplete_escape_is_split_off() {
        assert_eq!(split_incomplete_escape("abc\u{1b}[3"), ("abc", "\u{1b}[3"));
        assert_eq!(split_incomplete_escape("abc\u{1b}"), ("abc", "\u{1b}"));
        assert_eq!(split_incomplete_escape("abc\u{1b}]0;ti"), ("abc", "\u{1b}]0;ti"));
        assert_eq!(split_incomplete_escape("abc\u{1b}[31m"), ("abc\u{1b}[31m", ""));
        assert_eq!(split_incomplete_escape("plain"), ("plain", ""));
        assert_eq!(
            split_incomplete_escape("\u{1b}]0;title\nls output"),
            ("\u{1b}]0;title\nls output", "")
        );
    }

    #[test]
    fn overlong_escape_residue_is_not_held_back() {
        let text = format!("a\u{1b}[{}", "1;".repeat(40));
        assert_eq!(incomplete_escape_start(&text), None);
    }

    #[test]
    fn ansi_reencoding_keeps_plain_spans_bare() {
        let fragment = render("plain \u{1b}[31mred");
        let encoded = fragment.ansi();
        assert!(encoded.starts_with("plain "));
        assert!(encoded.contains("red"));
        assert!(encoded.contains('\u{1b}'));
        assert_eq!(render(&encoded).plain_text(), "plain red");
    }
}
