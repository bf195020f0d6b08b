//! In-memory page: an output container of `<pre>` nodes ahead of a fixed
//! anchor, plus a messages area.

use std::fmt::Write as _;

use crate::ansi::{escape_markup, StyledFragment};

use super::view::{NodeId, RenderTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Node {
    id: NodeId,
    markup: String,
    text: String,
}

#[derive(Debug, Clone)]
pub struct MarkupDocument {
    title: String,
    nodes: Vec<Node>,
    next_id: u64,
    message: Option<String>,
    scroll_top: usize,
}

impl MarkupDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            nodes: Vec::new(),
            next_id: 0,
            message: None,
            scroll_top: 0,
        }
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id).collect()
    }

    pub fn line_markup(&self) -> Vec<&str> {
        self.nodes.iter().map(|node| node.markup.as_str()).collect()
    }

    pub fn plain_lines(&self) -> Vec<String> {
        self.nodes.iter().map(|node| node.text.clone()).collect()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Height of the scrollable output, one unit per node.
    pub fn scroll_height(&self) -> usize {
        self.nodes.len()
    }

    pub fn scroll_top(&self) -> usize {
        self.scroll_top
    }

    pub fn is_scrolled_to_bottom(&self) -> bool {
        self.scroll_top == self.scroll_height()
    }

    pub fn to_html(&self) -> String {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
        let _ = writeln!(html, "<title>{}</title>", escape_markup(&self.title));
        html.push_str(
            "<style>body{background:#000;color:#fff;font-family:monospace}pre{margin:0}</style>\n",
        );
        html.push_str("</head>\n<body>\n");
        let _ = writeln!(
            html,
            "<div id=\"messages\">{}</div>",
            escape_markup(self.message.as_deref().unwrap_or_default())
        );
        html.push_str("<div id=\"output\">\n");
        for node in &self.nodes {
            let _ = writeln!(
                html,
                "<pre style=\"word-wrap:break-word\">{}</pre>",
                node.markup
            );
        }
        html.push_str("<div id=\"anchor\"></div>\n</div>\n</body>\n</html>\n");
        html
    }
}

impl RenderTarget for MarkupDocument {
    fn insert_line(&mut self, content: &StyledFragment) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.push(Node {
            id,
            markup: content.markup(),
            text: content.plain_text(),
        });
        id
    }

    fn replace_line(&mut self, node: NodeId, content: &StyledFragment) {
        // Overwrites hit the newest node, so search from the back.
        if let Some(existing) = self
            .nodes
            .iter_mut()
            .rev()
            .find(|candidate| candidate.id == node)
        {
            existing.markup = content.markup();
            existing.text = content.plain_text();
        }
    }

    fn remove_line(&mut self, node: NodeId) {
        self.nodes.retain(|candidate| candidate.id != node);
        self.scroll_top = self.scroll_top.min(self.nodes.len());
    }

    fn scroll_to_bottom(&mut self) {
        self.scroll_top = self.scroll_height();
    }

    fn show_message(&mut self, message: &str) {
        self.message = Some(message.to_owned());
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ansi::render;

    #[test]
    fn replace_updates_only_the_addressed_node() {
        let mut document = MarkupDocument::new("Task 7");
        let first = document.insert_line(&render("head"));
        for index in 0..500 {
            document.insert_line(&render(&format!("line {index}")));
        }
        let last = document.insert_line(&render("10%"));
        document.replace_line(last, &render("100%"));
        document.replace_line(first, &render("HEAD"));

        let lines = document.plain_lines();
        assert_eq!(lines.len(), 502);
        assert_eq!(lines.first().map(String::as_str), Some("HEAD"));
        assert_eq!(lines.last().map(String::as_str), Some("100%"));
        assert_eq!(lines[1], "line 0");
    }

    #[test]
    fn html_places_nodes_before_anchor() {
        let mut document = MarkupDocument::new("Task 7");
        document.insert_line(&render("<b>one</b>"));
        document.insert_line(&render("\u{1b}[31mtwo"));
        document.show_message("done & dusted");

        let html = document.to_html();
        let first = html.find("&lt;b&gt;one&lt;/b&gt;").expect("first line");
        let second = html
            .find("<span style=\"color:rgb(187,0,0)\">two</span>")
            .expect("second line");
        let anchor = html.find("<div id=\"anchor\">").expect("anchor");
        assert!(first < second && second < anchor);
        assert!(html.contains("<div id=\"messages\">done &amp; dusted</div>"));
        assert!(html.contains("<title>Task 7</title>"));
    }

    #[test]
    fn remove_line_keeps_remaining_order() {
        let mut document = MarkupDocument::new("t");
        let a = document.insert_line(&render("a"));
        document.insert_line(&render("b"));
        document.insert_line(&render("c"));
        document.scroll_to_bottom();
        document.remove_line(a);

        assert_eq!(document.plain_lines(), vec!["b", "c"]);
        assert!(document.is_scrolled_to_bottom());
    }
}
