//! Lenient HTML fragment parser and serializer
//!
//! Covers what experiment payloads carry: elements with quoted or bare
//! attributes, void and self-closing tags, raw-text `<script>`/`<style>`
//! bodies, comments and text. Unmatched close tags are ignored and unclosed
//! elements are closed at the end of the fragment.

use crate::document::NodeId;
use crate::error::DomResult;
use crate::tree::{Element, NodeKind, Tree};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Parse `markup` and append the resulting nodes under `parent`
pub(crate) fn parse_into(tree: &mut Tree, parent: NodeId, markup: &str) -> DomResult<()> {
    let mut parser = Parser {
        input: markup,
        pos: 0,
    };
    let mut stack = vec![parent];

    while !parser.at_end() {
        let current = *stack.last().unwrap_or(&parent);
        if parser.starts_with("<!--") {
            let body = parser.take_comment();
            let node = tree.create(NodeKind::Comment(body));
            tree.insert(current, node, None)?;
        } else if parser.starts_with("<!") || parser.starts_with("<?") {
            parser.skip_past('>');
        } else if parser.starts_with("</") {
            let name = parser.take_close_tag();
            if let Some(depth) = stack
                .iter()
                .skip(1)
                .rposition(|id| tree.element(*id).is_ok_and(|e| e.tag == name))
            {
                stack.truncate(depth + 1);
            }
        } else if parser.starts_with("<") && parser.peek_tag_start() {
            let (element, self_closing) = parser.take_open_tag();
            let tag = element.tag.clone();
            let node = tree.create(NodeKind::Element(element));
            tree.insert(current, node, None)?;

            if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
                let body = parser.take_raw_text(&tag);
                if !body.is_empty() {
                    let text = tree.create(NodeKind::Text(body));
                    tree.insert(node, text, None)?;
                }
            } else if !self_closing && !is_void(&tag) {
                stack.push(node);
            }
        } else {
            let text = parser.take_text();
            let node = tree.create(NodeKind::Text(text));
            tree.insert(current, node, None)?;
        }
    }
    Ok(())
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.rest().starts_with(prefix)
    }

    fn peek_tag_start(&self) -> bool {
        self.rest()
            .chars()
            .nth(1)
            .is_some_and(|c| c.is_ascii_alphabetic())
    }

    fn skip_past(&mut self, c: char) {
        match self.rest().find(c) {
            Some(i) => self.pos += i + c.len_utf8(),
            None => self.pos = self.input.len(),
        }
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let end = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    fn take_comment(&mut self) -> String {
        self.pos += "<!--".len();
        let rest = self.rest();
        match rest.find("-->") {
            Some(end) => {
                self.pos += end + "-->".len();
                rest[..end].to_string()
            }
            None => {
                self.pos = self.input.len();
                rest.to_string()
            }
        }
    }

    fn take_close_tag(&mut self) -> String {
        self.pos += "</".len();
        let name = self
            .take_while(|c| !c.is_whitespace() && c != '>')
            .to_ascii_lowercase();
        self.skip_past('>');
        name
    }

    fn take_open_tag(&mut self) -> (Element, bool) {
        self.pos += 1;
        let name = self.take_while(|c| !c.is_whitespace() && c != '>' && c != '/');
        let mut element = Element::new(name);
        let mut self_closing = false;

        loop {
            self.skip_whitespace();
            if self.at_end() {
                break;
            }
            if self.starts_with("/>") {
                self.pos += 2;
                self_closing = true;
                break;
            }
            if self.starts_with(">") {
                self.pos += 1;
                break;
            }
            if self.starts_with("/") {
                self.pos += 1;
                continue;
            }

            let attr = self
                .take_while(|c| !c.is_whitespace() && c != '=' && c != '>' && c != '/')
                .to_ascii_lowercase();
            self.skip_whitespace();
            let value = if self.starts_with("=") {
                self.pos += 1;
                self.skip_whitespace();
                self.take_attr_value()
            } else {
                String::new()
            };
            if !attr.is_empty() && element.attr(&attr).is_none() {
                element.attrs.push((attr, value));
            }
        }
        (element, self_closing)
    }

    fn take_attr_value(&mut self) -> String {
        let quote = self.rest().chars().next();
        match quote {
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                let raw = self.take_while(|c| c != q);
                if !self.at_end() {
                    self.pos += 1;
                }
                decode_attr(raw)
            }
            _ => decode_attr(self.take_while(|c| !c.is_whitespace() && c != '>')),
        }
    }

    fn take_raw_text(&mut self, tag: &str) -> String {
        let rest = self.rest();
        let closing = format!("</{tag}");
        let end = rest
            .to_ascii_lowercase()
            .find(&closing)
            .unwrap_or(rest.len());
        let body = rest[..end].to_string();
        self.pos += end;
        if !self.at_end() {
            self.skip_past('>');
        }
        body
    }

    fn take_text(&mut self) -> String {
        let rest = self.rest();
        // A lone '<' that does not open a tag is text.
        let skip = usize::from(rest.starts_with('<'));
        let end = rest[skip..].find('<').map_or(rest.len(), |i| i + skip);
        self.pos += end;
        rest[..end].to_string()
    }
}

fn decode_attr(raw: &str) -> String {
    raw.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn encode_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

/// Serialize the children of `node`
pub(crate) fn serialize_children(tree: &Tree, node: NodeId) -> String {
    let mut out = String::new();
    for child in tree.children(node) {
        serialize_node(tree, *child, &mut out);
    }
    out
}

/// Serialize `node` including its own tag
pub(crate) fn serialize_node(tree: &Tree, node: NodeId, out: &mut String) {
    let Ok(n) = tree.node(node) else {
        return;
    };
    match &n.kind {
        NodeKind::Document => {
            out.push_str(&serialize_children(tree, node));
        }
        NodeKind::Text(text) => out.push_str(text),
        NodeKind::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeKind::Element(element) => {
            out.push('<');
            out.push_str(&element.tag);
            for (name, value) in &element.attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&encode_attr(value));
                out.push('"');
            }
            out.push('>');
            if is_void(&element.tag) {
                return;
            }
            out.push_str(&serialize_children(tree, node));
            out.push_str("</");
            out.push_str(&element.tag);
            out.push('>');
        }
    }
}
