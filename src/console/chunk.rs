//! Turns raw transport chunks into line placements.
//!
//! Placement rule:
//! - every `\n` closes the active line;
//! - inside a line, `\r` returns the cursor and the last part with visible
//!   text is what remains on screen;
//! - a part is placed over the active line iff a `\r` came before it, either
//!   inside the same line or at the end of the previous chunk;
//! - anything else starts a new line, since the server frames one line per
//!   message. That holds for parts with no visible text too: an empty or
//!   style-only message is a blank line;
//! - the remainder after a chunk's last `\n` only opens a line when it has
//!   visible text.
//!
//! There is no column tracking: text after `\r` replaces the whole line.

use tracing::trace;

use crate::ansi::{render_with, split_incomplete_escape, RenderState, StyledFragment};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Place {
        fragment: StyledFragment,
        overwrite_active: bool,
    },
    CloseLine,
}

#[derive(Debug, Default)]
pub struct ChunkDecoder {
    render: RenderState,
    residue: String,
    returned: bool,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the last chunk left the cursor at column zero of an open line.
    #[cfg(test)]
    fn cursor_returned(&self) -> bool {
        self.returned
    }

    #[cfg(test)]
    fn pending_escape(&self) -> &str {
        &self.residue
    }

    pub fn decode(&mut self, chunk: &str) -> Vec<Placement> {
        let mut text = std::mem::take(&mut self.residue);
        text.push_str(chunk);
        let (complete, pending) = split_incomplete_escape(&text);
        let holding_escape = !pending.is_empty();
        self.residue = pending.to_owned();

        let mut placements = Vec::new();
        let mut pieces = complete.split('\n').peekable();
        let mut first = true;
        while let Some(piece) = pieces.next() {
            let last = pieces.peek().is_none();
            let opens_line = !last || (first && !holding_escape);
            self.decode_line_piece(piece, opens_line, &mut placements);
            if !last {
                placements.push(Placement::CloseLine);
                self.returned = false;
            }
            first = false;
        }
        placements
    }

    /// `opens_line` marks a piece that is a whole line of its own, so it is
    /// placed even without visible text.
    fn decode_line_piece(&mut self, piece: &str, opens_line: bool, out: &mut Vec<Placement>) {
        let parts = piece.split('\r').collect::<Vec<&str>>();
        let mut visible: Option<(usize, StyledFragment)> = None;
        for (idx, part) in parts.iter().enumerate() {
            let fragment = render_with(&mut self.render, part);
            if !fragment.is_empty() {
                visible = Some((idx, fragment));
            }
        }

        match visible {
            Some((idx, fragment)) => {
                let overwrite_active = idx > 0 || self.returned;
                trace!(overwrite_active, "placing fragment");
                out.push(Placement::Place {
                    fragment,
                    overwrite_active,
                });
                self.returned = idx + 1 < parts.len();
            }
            None if opens_line && parts.len() == 1 && !self.returned => {
                trace!("placing blank line");
                out.push(Placement::Place {
                    fragment: StyledFragment::new(),
                    overwrite_active: false,
                });
            }
            None => {
                self.returned = self.returned || parts.len() > 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ansi::render;

    fn place(text: &str, overwrite_active: bool) -> Placement {
        Placement::Place {
            fragment: render(text),
            overwrite_active,
        }
    }

    #[test]
    fn newline_terminated_chunk_places_and_closes() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(
            decoder.decode("Building...\n"),
            vec![place("Building...", false), Placement::CloseLine]
        );
        assert!(!decoder.cursor_returned());
    }

    #[test]
    fn chunk_without_boundaries_is_a_new_line() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode("one"), vec![place("one", false)]);
        assert_eq!(decoder.decode("two"), vec![place("two", false)]);
    }

    #[test]
    fn carriage_return_inside_chunk_keeps_last_visible_part() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(
            decoder.decode("10%\r20%\r30%"),
            vec![place("30%", true)]
        );
        assert!(!decoder.cursor_returned());
    }

    #[test]
    fn trailing_carriage_return_overwrites_on_next_chunk() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode("Done\r"), vec![place("Done", false)]);
        assert!(decoder.cursor_returned());
        assert_eq!(
            decoder.decode("Done.\n"),
            vec![place("Done.", true), Placement::CloseLine]
        );
        assert!(!decoder.cursor_returned());
    }

    #[test]
    fn crlf_line_endings_do_not_overwrite() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(
            decoder.decode("a\r\nb\r\n"),
            vec![
                place("a", false),
                Placement::CloseLine,
                place("b", false),
                Placement::CloseLine,
            ]
        );
    }

    #[test]
    fn bare_carriage_return_only_marks_cursor() {
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.decode("\r\u{1b}[2K").is_empty());
        assert!(decoder.cursor_returned());
        assert_eq!(decoder.decode("fresh"), vec![place("fresh", true)]);
    }

    #[test]
    fn escape_split_across_chunks_is_carried() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode("ok \u{1b}[3"), vec![place("ok ", false)]);
        assert_eq!(decoder.pending_escape(), "\u{1b}[3");
        let placements = decoder.decode("1mred");
        assert_eq!(placements, vec![place("\u{1b}[31mred", false)]);
        assert_eq!(decoder.pending_escape(), "");
    }

    #[test]
    fn style_persists_into_the_next_chunk() {
        let mut decoder = ChunkDecoder::new();
        let _ = decoder.decode("\u{1b}[32mgreen\n");
        assert_eq!(
            decoder.decode("still green"),
            vec![place("\u{1b}[32mstill green", false)]
        );
    }

    #[test]
    fn empty_message_is_a_blank_line() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode("first"), vec![place("first", false)]);
        assert_eq!(decoder.decode(""), vec![place("", false)]);
        assert_eq!(decoder.decode("   "), vec![place("   ", false)]);
        assert_eq!(decoder.decode("third"), vec![place("third", false)]);
    }

    #[test]
    fn style_only_message_opens_a_line_and_keeps_its_style() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode("\u{1b}[0m"), vec![place("", false)]);
        assert_eq!(
            decoder.decode("\u{1b}[33m"),
            vec![Placement::Place {
                fragment: StyledFragment::new(),
                overwrite_active: false,
            }]
        );
        assert_eq!(
            decoder.decode("warn"),
            vec![place("\u{1b}[33mwarn", false)]
        );
    }

    #[test]
    fn blank_line_inside_a_chunk_is_kept() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(
            decoder.decode("a\n\nb\n"),
            vec![
                place("a", false),
                Placement::CloseLine,
                place("", false),
                Placement::CloseLine,
                place("b", false),
                Placement::CloseLine,
            ]
        );
    }

    #[test]
    fn newline_after_carriage_return_closes_without_blank_line() {
        let mut decoder = ChunkDecoder::new();
        let _ = decoder.decode("Done\r");
        assert_eq!(decoder.decode("\n"), vec![Placement::CloseLine]);
    }

    #[test]
    fn held_escape_alone_places_nothing() {
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.decode("\u{1b}[3").is_empty());
        assert_eq!(decoder.decode("1mred"), vec![place("\u{1b}[31mred", false)]);
    }

    #[test]
    fn output_after_unterminated_osc_is_not_held_back() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(
            decoder.decode("\u{1b}]0;title\nnext"),
            vec![place("", false), Placement::CloseLine, place("next", false)]
        );
        assert_eq!(decoder.pending_escape(), "");
    }
}
