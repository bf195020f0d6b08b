use tracing::debug;

use crate::ansi::StyledFragment;

use super::line_buffer::{Line, LineBuffer, LineChange};
use super::stream::LineSink;

/// Handle of one rendered line inside a [`RenderTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// A scrollable surface holding one node per output line.
///
/// New nodes always go just before the target's anchor, so insertion order is
/// display order.
pub trait RenderTarget {
    fn insert_line(&mut self, content: &StyledFragment) -> NodeId;
    fn replace_line(&mut self, node: NodeId, content: &StyledFragment);
    fn remove_line(&mut self, node: NodeId);
    fn scroll_to_bottom(&mut self);
    /// Writes to the messages area, outside the line nodes.
    fn show_message(&mut self, message: &str);
    fn node_count(&self) -> usize;
}

pub struct OutputView<T: RenderTarget> {
    target: T,
}

impl<T: RenderTarget> OutputView<T> {
    pub fn new(target: T) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn into_target(self) -> T {
        self.target
    }

    pub fn on_line_added(&mut self, line: &Line) -> NodeId {
        let node = self.target.insert_line(line.content());
        self.target.scroll_to_bottom();
        node
    }

    pub fn on_line_replaced(&mut self, line: &Line) {
        let Some(node) = line.node() else {
            debug!("replaced line has no rendered node");
            return;
        };
        self.target.replace_line(node, line.content());
        self.target.scroll_to_bottom();
    }

    pub fn on_line_evicted(&mut self, line: &Line) {
        if let Some(node) = line.node() {
            self.target.remove_line(node);
        }
    }

    pub fn show_message(&mut self, message: &str) {
        self.target.show_message(message);
    }
}

/// Line buffer and view owned together, fed by a task stream.
pub struct Console<T: RenderTarget> {
    buffer: LineBuffer,
    view: OutputView<T>,
}

impl<T: RenderTarget> Console<T> {
    pub fn new(buffer: LineBuffer, target: T) -> Self {
        Self {
            buffer,
            view: OutputView::new(target),
        }
    }

    pub fn buffer(&self) -> &LineBuffer {
        &self.buffer
    }

    pub fn view(&self) -> &OutputView<T> {
        &self.view
    }

    pub fn target(&self) -> &T {
        self.view.target()
    }

    pub fn target_mut(&mut self) -> &mut T {
        self.view.target_mut()
    }

    pub fn into_parts(self) -> (LineBuffer, T) {
        (self.buffer, self.view.into_target())
    }
}

impl<T: RenderTarget> LineSink for Console<T> {
    fn place(&mut self, fragment: StyledFragment, overwrite_active: bool) {
        match self.buffer.append(fragment, overwrite_active) {
            LineChange::Added { index, evicted } => {
                for line in &evicted {
                    self.view.on_line_evicted(line);
                }
                if let Some(line) = self.buffer.line(index) {
                    let node = self.view.on_line_added(line);
                    self.buffer.bind_node(index, node);
                }
            }
            LineChange::Replaced { index } => {
                if let Some(line) = self.buffer.line(index) {
                    self.view.on_line_replaced(line);
                }
            }
        }
    }

    fn close_line(&mut self) {
        self.buffer.close_active();
    }

    fn report(&mut self, message: &str) {
        self.view.show_message(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ansi::render;
    use crate::console::document::MarkupDocument;

    fn console(max_lines: usize) -> Console<MarkupDocument> {
        Console::new(
            LineBuffer::with_capacity_limit(max_lines),
            MarkupDocument::new("test"),
        )
    }

    #[test]
    fn added_lines_get_nodes_in_order() {
        let mut console = console(100);
        console.place(render("one"), false);
        console.place(render("two"), false);

        let nodes = console
            .buffer()
            .lines()
            .map(|line| line.node().expect("node bound"))
            .collect::<Vec<NodeId>>();
        assert_eq!(console.target().node_ids(), nodes);
        assert_eq!(console.target().plain_lines(), vec!["one", "two"]);
        assert!(console.target().is_scrolled_to_bottom());
    }

    #[test]
    fn replaced_line_keeps_its_node() {
        let mut console = console(100);
        console.place(render("10%"), false);
        let before = console.target().node_ids();
        console.place(render("\u{1b}[32m100%"), true);

        assert_eq!(console.target().node_ids(), before);
        assert_eq!(
            console.target().line_markup(),
            vec!["<span style=\"color:rgb(0,187,0)\">100%</span>"]
        );
    }

    #[test]
    fn node_count_tracks_buffer_through_random_operations() {
        let mut console = console(16);
        let mut seed = 0x9e37_79b9_u32;
        for step in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            match seed % 4 {
                0 => console.close_line(),
                1 => console.place(render(&format!("o{step}")), true),
                _ => console.place(render(&format!("n{step}")), false),
            }
            assert_eq!(
                console.target().node_count(),
                console.buffer().len(),
                "step {step}"
            );
            assert_eq!(
                console.target().plain_lines(),
                console.buffer().plain_lines(),
                "step {step}"
            );
        }
    }

    #[test]
    fn report_goes_to_messages_area() {
        let mut console = console(100);
        console.report("Cannot connect to websocket");
        assert_eq!(console.target().message(), Some("Cannot connect to websocket"));
        assert_eq!(console.target().node_count(), 0);
    }
}
