use std::io::{self, Write};

use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use tracing::warn;

use crate::ansi::StyledFragment;
use crate::ui::theme::Theme;

use super::view::{NodeId, RenderTarget};

/// Streams lines to a terminal or pipe.
///
/// Only the last printed line can be rewritten in place; a rewrite of any
/// other node is printed as a fresh line.
pub struct TerminalTarget<W: Write> {
    writer: W,
    color_enabled: bool,
    rewrite_in_place: bool,
    theme: Theme,
    nodes: Vec<NodeId>,
    next_id: u64,
    last_written: Option<NodeId>,
    line_open: bool,
    failed: bool,
}

impl<W: Write> TerminalTarget<W> {
    pub fn new(writer: W, color_enabled: bool, rewrite_in_place: bool) -> Self {
        Self {
            writer,
            color_enabled,
            rewrite_in_place,
            theme: Theme::default(),
            nodes: Vec::new(),
            next_id: 0,
            last_written: None,
            line_open: false,
            failed: false,
        }
    }

    /// Terminates the last line and flushes.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.line_open {
            writeln!(self.writer)?;
            self.line_open = false;
        }
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn encode(&self, content: &StyledFragment) -> String {
        if self.color_enabled {
            content.ansi()
        } else {
            content.plain_text()
        }
    }

    fn write_new_line(&mut self, text: &str) -> io::Result<()> {
        if self.line_open {
            writeln!(self.writer)?;
        }
        write!(self.writer, "{text}")?;
        self.line_open = true;
        Ok(())
    }

    fn rewrite_last(&mut self, text: &str) -> io::Result<()> {
        write!(self.writer, "\r")?;
        queue!(self.writer, Clear(ClearType::CurrentLine))?;
        write!(self.writer, "{text}")?;
        self.line_open = true;
        Ok(())
    }

    fn record(&mut self, result: io::Result<()>) {
        if let Err(err) = result {
            if !self.failed {
                warn!("terminal_write_error: {err}");
            }
            self.failed = true;
        }
    }
}

impl<W: Write> RenderTarget for TerminalTarget<W> {
    fn insert_line(&mut self, content: &StyledFragment) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.push(id);
        let text = self.encode(content);
        let result = self.write_new_line(&text);
        self.record(result);
        self.last_written = Some(id);
        id
    }

    fn replace_line(&mut self, node: NodeId, content: &StyledFragment) {
        let text = self.encode(content);
        let result = if self.rewrite_in_place && self.last_written == Some(node) {
            self.rewrite_last(&text)
        } else {
            self.write_new_line(&text)
        };
        self.record(result);
        self.last_written = Some(node);
    }

    fn remove_line(&mut self, node: NodeId) {
        self.nodes.retain(|candidate| *candidate != node);
    }

    fn scroll_to_bottom(&mut self) {
        let result = self.writer.flush();
        self.record(result);
    }

    fn show_message(&mut self, message: &str) {
        let text = if self.color_enabled {
            format!(
                "{}{}{}",
                self.theme.warning.render(),
                message,
                self.theme.warning.render_reset()
            )
        } else {
            message.to_owned()
        };
        let result = self
            .write_new_line(&text)
            .and_then(|()| writeln!(self.writer))
            .and_then(|()| self.writer.flush());
        self.line_open = false;
        self.last_written = None;
        self.record(result);
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
