//! CSS selector subset
//!
//! Supported: type and universal selectors, `#id`, `.class`, attribute
//! conditions (`[a]`, `=`, `^=`, `$=`, `*=`, `~=`), `:first-child`,
//! `:last-child`, `:nth-child(n)`, the four combinators and selector lists.

use crate::document::NodeId;
use crate::error::{DomError, DomResult};
use crate::tree::Tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
    NextSibling,
    SubsequentSibling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Equals,
    Prefix,
    Suffix,
    Contains,
    Word,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrCondition {
    name: String,
    op: Option<(AttrOp, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pseudo {
    FirstChild,
    LastChild,
    NthChild(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
    pseudos: Vec<Pseudo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    compounds: Vec<Compound>,
    /// `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`
    combinators: Vec<Combinator>,
}

/// Parsed, comma-separated selector list
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SelectorList(Vec<Complex>);

impl SelectorList {
    /// Parse selector text
    pub(crate) fn parse(selector: &str) -> DomResult<Self> {
        let trimmed = selector.trim();
        if trimmed.is_empty() {
            return Err(DomError::invalid_selector(selector, "empty selector"));
        }
        let groups = split_top_level(trimmed)
            .into_iter()
            .map(|group| parse_complex(group.trim(), selector))
            .collect::<DomResult<Vec<_>>>()?;
        Ok(Self(groups))
    }

    /// Whether `node` matches any selector in the list
    pub(crate) fn matches(&self, tree: &Tree, node: NodeId) -> bool {
        self.0.iter().any(|complex| {
            let last = complex.compounds.len() - 1;
            matches_at(tree, node, complex, last)
        })
    }

    /// First match in document order
    pub(crate) fn first_match(&self, tree: &Tree) -> Option<NodeId> {
        tree.descendant_elements(tree.root())
            .into_iter()
            .find(|id| self.matches(tree, *id))
    }
}

fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

struct Cursor<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn error(&self, reason: impl Into<String>) -> DomError {
        DomError::invalid_selector(self.source, reason)
    }

    fn ident(&mut self) -> DomResult<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error(format!("expected identifier at offset {start}")));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn expect(&mut self, expected: char) -> DomResult<()> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(format!("expected '{expected}', found '{c}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of input"))),
        }
    }
}

fn parse_complex(group: &str, source: &str) -> DomResult<Complex> {
    let mut cursor = Cursor {
        chars: group.chars().collect(),
        pos: 0,
        source,
    };
    let mut compounds = Vec::new();
    let mut combinators = Vec::new();
    let mut pending: Option<Combinator> = None;

    loop {
        let saw_space = cursor.skip_whitespace();
        let Some(c) = cursor.peek() else {
            break;
        };
        let explicit = match c {
            '>' => Some(Combinator::Child),
            '+' => Some(Combinator::NextSibling),
            '~' => Some(Combinator::SubsequentSibling),
            _ => None,
        };
        if let Some(combinator) = explicit {
            if compounds.is_empty() || pending.is_some() {
                return Err(cursor.error(format!("unexpected combinator '{c}'")));
            }
            pending = Some(combinator);
            cursor.pos += 1;
            continue;
        }

        let compound = parse_compound(&mut cursor)?;
        if !compounds.is_empty() {
            let combinator = match pending.take() {
                Some(explicit) => explicit,
                None if saw_space => Combinator::Descendant,
                None => return Err(cursor.error("missing combinator")),
            };
            combinators.push(combinator);
        }
        compounds.push(compound);
    }

    if pending.is_some() {
        return Err(cursor.error("dangling combinator"));
    }
    if compounds.is_empty() {
        return Err(cursor.error("empty selector"));
    }
    Ok(Complex {
        compounds,
        combinators,
    })
}

fn parse_compound(cursor: &mut Cursor<'_>) -> DomResult<Compound> {
    let mut compound = Compound::default();
    let start = cursor.pos;

    match cursor.peek() {
        Some('*') => {
            cursor.pos += 1;
        }
        Some(c) if c.is_alphabetic() => {
            compound.tag = Some(cursor.ident()?.to_ascii_lowercase());
        }
        _ => {}
    }

    loop {
        match cursor.peek() {
            Some('#') => {
                cursor.pos += 1;
                compound.id = Some(cursor.ident()?);
            }
            Some('.') => {
                cursor.pos += 1;
                compound.classes.push(cursor.ident()?);
            }
            Some('[') => {
                cursor.pos += 1;
                compound.attrs.push(parse_attr(cursor)?);
            }
            Some(':') => {
                cursor.pos += 1;
                compound.pseudos.push(parse_pseudo(cursor)?);
            }
            _ => break,
        }
    }

    if cursor.pos == start {
        let found = cursor.peek().map_or("end of input".to_string(), |c| format!("'{c}'"));
        return Err(cursor.error(format!("unexpected {found}")));
    }
    Ok(compound)
}

fn parse_attr(cursor: &mut Cursor<'_>) -> DomResult<AttrCondition> {
    cursor.skip_whitespace();
    let name = cursor.ident()?.to_ascii_lowercase();
    cursor.skip_whitespace();

    let op = match cursor.peek() {
        Some(']') => None,
        Some('=') => Some(AttrOp::Equals),
        Some(c @ ('^' | '$' | '*' | '~')) => {
            cursor.pos += 1;
            if cursor.peek() != Some('=') {
                return Err(cursor.error(format!("expected '=' after '{c}'")));
            }
            Some(match c {
                '^' => AttrOp::Prefix,
                '$' => AttrOp::Suffix,
                '*' => AttrOp::Contains,
                _ => AttrOp::Word,
            })
        }
        Some(c) => return Err(cursor.error(format!("unexpected '{c}' in attribute selector"))),
        None => return Err(cursor.error("unterminated attribute selector")),
    };

    let op = match op {
        None => None,
        Some(op) => {
            cursor.expect('=')?;
            cursor.skip_whitespace();
            let value = match cursor.peek() {
                Some(q @ ('"' | '\'')) => {
                    cursor.pos += 1;
                    let mut value = String::new();
                    loop {
                        match cursor.bump() {
                            Some(c) if c == q => break,
                            Some(c) => value.push(c),
                            None => return Err(cursor.error("unterminated string")),
                        }
                    }
                    value
                }
                _ => cursor.ident()?,
            };
            cursor.skip_whitespace();
            Some((op, value))
        }
    };

    cursor.expect(']')?;
    Ok(AttrCondition { name, op })
}

fn parse_pseudo(cursor: &mut Cursor<'_>) -> DomResult<Pseudo> {
    let name = cursor.ident()?.to_ascii_lowercase();
    match name.as_str() {
        "first-child" => Ok(Pseudo::FirstChild),
        "last-child" => Ok(Pseudo::LastChild),
        "nth-child" => {
            cursor.expect('(')?;
            cursor.skip_whitespace();
            let digits = cursor.ident()?;
            let n = digits
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| cursor.error(format!("unsupported nth-child argument '{digits}'")))?;
            cursor.skip_whitespace();
            cursor.expect(')')?;
            Ok(Pseudo::NthChild(n))
        }
        other => Err(cursor.error(format!("unsupported pseudo-class ':{other}'"))),
    }
}

fn element_position(tree: &Tree, node: NodeId) -> Option<(usize, usize)> {
    let parent = tree.parent(node)?;
    let siblings: Vec<NodeId> = tree.element_children(parent).collect();
    let index = siblings.iter().position(|s| *s == node)?;
    Some((index + 1, siblings.len()))
}

fn matches_compound(tree: &Tree, node: NodeId, compound: &Compound) -> bool {
    let Ok(element) = tree.element(node) else {
        return false;
    };
    if compound.tag.as_ref().is_some_and(|t| *t != element.tag) {
        return false;
    }
    if compound
        .id
        .as_ref()
        .is_some_and(|id| element.attr("id") != Some(id.as_str()))
    {
        return false;
    }
    if !compound.classes.iter().all(|c| element.has_class(c)) {
        return false;
    }
    let attrs_ok = compound.attrs.iter().all(|cond| {
        let Some(actual) = element.attr(&cond.name) else {
            return false;
        };
        match &cond.op {
            None => true,
            Some((AttrOp::Equals, v)) => actual == v,
            Some((AttrOp::Prefix, v)) => !v.is_empty() && actual.starts_with(v.as_str()),
            Some((AttrOp::Suffix, v)) => !v.is_empty() && actual.ends_with(v.as_str()),
            Some((AttrOp::Contains, v)) => !v.is_empty() && actual.contains(v.as_str()),
            Some((AttrOp::Word, v)) => actual.split_ascii_whitespace().any(|w| w == v),
        }
    });
    if !attrs_ok {
        return false;
    }
    compound.pseudos.iter().all(|pseudo| {
        let Some((position, count)) = element_position(tree, node) else {
            return false;
        };
        match pseudo {
            Pseudo::FirstChild => position == 1,
            Pseudo::LastChild => position == count,
            Pseudo::NthChild(n) => position == *n,
        }
    })
}

fn matches_at(tree: &Tree, node: NodeId, complex: &Complex, index: usize) -> bool {
    if !matches_compound(tree, node, &complex.compounds[index]) {
        return false;
    }
    if index == 0 {
        return true;
    }
    let previous = index - 1;
    match complex.combinators[previous] {
        Combinator::Child => tree
            .parent(node)
            .is_some_and(|p| matches_at(tree, p, complex, previous)),
        Combinator::Descendant => {
            let mut cursor = tree.parent(node);
            while let Some(ancestor) = cursor {
                if matches_at(tree, ancestor, complex, previous) {
                    return true;
                }
                cursor = tree.parent(ancestor);
            }
            false
        }
        Combinator::NextSibling => tree
            .previous_element_sibling(node)
            .is_some_and(|s| matches_at(tree, s, complex, previous)),
        Combinator::SubsequentSibling => {
            let mut cursor = tree.previous_element_sibling(node);
            while let Some(sibling) = cursor {
                if matches_at(tree, sibling, complex, previous) {
                    return true;
                }
                cursor = tree.previous_element_sibling(sibling);
            }
            false
        }
    }
}
