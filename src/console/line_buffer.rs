use std::collections::VecDeque;

use crate::ansi::StyledFragment;

use super::config::DEFAULT_MAX_LINES;
use super::view::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    content: StyledFragment,
    node: Option<NodeId>,
    open: bool,
}

impl Line {
    pub fn content(&self) -> &StyledFragment {
        &self.content
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineChange {
    Added { index: usize, evicted: Vec<Line> },
    Replaced { index: usize },
}

/// Ordered output lines. Only the last line can be open, and only an open
/// line is ever rewritten.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    lines: VecDeque<Line>,
    max_lines: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_capacity_limit(DEFAULT_MAX_LINES)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_limit(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines: max_lines.max(1),
        }
    }

    pub fn append(&mut self, fragment: StyledFragment, overwrite_active: bool) -> LineChange {
        if overwrite_active {
            if let Some(active) = self.lines.back_mut().filter(|line| line.open) {
                active.content = fragment;
                return LineChange::Replaced {
                    index: self.lines.len() - 1,
                };
            }
        }

        self.close_active();
        self.lines.push_back(Line {
            content: fragment,
            node: None,
            open: true,
        });
        let mut evicted = Vec::new();
        while self.lines.len() > self.max_lines {
            if let Some(line) = self.lines.pop_front() {
                evicted.push(line);
            }
        }
        LineChange::Added {
            index: self.lines.len() - 1,
            evicted,
        }
    }

    pub fn active_line(&self) -> Option<&Line> {
        self.lines.back().filter(|line| line.open)
    }

    pub fn close_active(&mut self) {
        if let Some(active) = self.lines.back_mut() {
            active.open = false;
        }
    }

    pub fn bind_node(&mut self, index: usize, node: NodeId) {
        if let Some(line) = self.lines.get_mut(index) {
            line.node = Some(node);
        }
    }

    pub fn line(&self, index: usize) -> Option<&Line> {
        self.lines.get(index)
    }

    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    pub fn plain_lines(&self) -> Vec<String> {
        self.lines
            .iter()
            .map(|line| line.content.plain_text())
            .collect()
    }

    /// Transcript of the buffer, one line per entry.
    pub fn plain_text(&self) -> String {
        let mut text = self.plain_lines().join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }
}
