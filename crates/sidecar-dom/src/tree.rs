//! Arena-backed node tree used by the in-memory document

use crate::document::NodeId;
use crate::error::{DomError, DomResult};

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Document,
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) kind: NodeKind,
}

/// Element payload; attributes keep insertion order for stable serialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Element {
    pub(crate) tag: String,
    pub(crate) attrs: Vec<(String, String)>,
}

impl Element {
    pub(crate) fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }

    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` when the stored value changed
    pub(crate) fn set_attr(&mut self, name: &str, value: &str) -> bool {
        if let Some(slot) = self
            .attrs
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            if slot.1 == value {
                return false;
            }
            slot.1 = value.to_string();
        } else {
            self.attrs
                .push((name.to_ascii_lowercase(), value.to_string()));
        }
        true
    }

    pub(crate) fn remove_attr(&mut self, name: &str) -> bool {
        let before = self.attrs.len();
        self.attrs.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.attrs.len() != before
    }

    pub(crate) fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_ascii_whitespace().any(|x| x == class))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
            root: NodeId(0),
        }
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn node(&self, id: NodeId) -> DomResult<&Node> {
        self.nodes.get(id.0).ok_or(DomError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> DomResult<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(DomError::UnknownNode(id))
    }

    pub(crate) fn element(&self, id: NodeId) -> DomResult<&Element> {
        match &self.node(id)?.kind {
            NodeKind::Element(e) => Ok(e),
            _ => Err(DomError::NotAnElement(id)),
        }
    }

    pub(crate) fn element_mut(&mut self, id: NodeId) -> DomResult<&mut Element> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Element(e) => Ok(e),
            _ => Err(DomError::NotAnElement(id)),
        }
    }

    pub(crate) fn is_element(&self, id: NodeId) -> bool {
        matches!(
            self.nodes.get(id.0).map(|n| &n.kind),
            Some(NodeKind::Element(_))
        )
    }

    /// Allocate a detached node
    pub(crate) fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            kind,
        });
        id
    }

    pub(crate) fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub(crate) fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map_or(&[][..], |n| n.children.as_slice())
    }

    /// `true` when `ancestor` is `node` or one of its ancestors
    pub(crate) fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// `true` when `node` is reachable from the document root
    pub(crate) fn is_connected(&self, node: NodeId) -> bool {
        self.is_inclusive_ancestor(self.root, node)
    }

    /// Detach `id` from its parent, returning the former parent
    pub(crate) fn detach(&mut self, id: NodeId) -> DomResult<Option<NodeId>> {
        let parent = self.node(id)?.parent;
        if let Some(p) = parent {
            self.node_mut(p)?.children.retain(|c| *c != id);
            self.node_mut(id)?.parent = None;
        }
        Ok(parent)
    }

    /// Insert `child` under `parent`, returning the parent it was moved from
    pub(crate) fn insert(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<Option<NodeId>> {
        self.node(parent)?;
        self.node(child)?;
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest(format!(
                "cannot insert {child} into its own subtree at {parent}"
            )));
        }
        if matches!(self.node(child)?.kind, NodeKind::Document) {
            return Err(DomError::HierarchyRequest(
                "the document node cannot be inserted".to_string(),
            ));
        }
        // Inserting a node before itself means before its next sibling.
        let reference = match reference {
            Some(r) if r == child => self.next_sibling(child),
            other => other,
        };
        if let Some(r) = reference {
            if self.parent(r) != Some(parent) {
                return Err(DomError::NotAChild {
                    parent,
                    reference: r,
                });
            }
        }

        let old_parent = self.detach(child)?;
        let siblings = &mut self.node_mut(parent)?.children;
        let index = reference
            .and_then(|r| siblings.iter().position(|c| *c == r))
            .unwrap_or(siblings.len());
        siblings.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(old_parent)
    }

    /// Drop all children of `id`, leaving them detached in the arena
    pub(crate) fn clear_children(&mut self, id: NodeId) -> DomResult<()> {
        let children = std::mem::take(&mut self.node_mut(id)?.children);
        for child in children {
            self.node_mut(child)?.parent = None;
        }
        Ok(())
    }

    fn sibling_offset(&self, id: NodeId, offset: isize) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|c| *c == id)?;
        let target = index.checked_add_signed(offset)?;
        siblings.get(target).copied()
    }

    pub(crate) fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub(crate) fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.sibling_offset(id, 1)
    }

    pub(crate) fn previous_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|c| *c == id)?;
        siblings[..index]
            .iter()
            .rev()
            .copied()
            .find(|s| self.is_element(*s))
    }

    pub(crate) fn next_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|c| *c == id)?;
        siblings[index + 1..]
            .iter()
            .copied()
            .find(|s| self.is_element(*s))
    }

    pub(crate) fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.is_element(*c))
    }

    pub(crate) fn first_element_child(&self, id: NodeId) -> Option<NodeId> {
        self.element_children(id).next()
    }

    pub(crate) fn last_element_child(&self, id: NodeId) -> Option<NodeId> {
        self.element_children(id).last()
    }

    /// Elements under `id` in document order, excluding `id`
    pub(crate) fn descendant_elements(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            if self.is_element(current) {
                out.push(current);
            }
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    pub(crate) fn find_tag(&self, tag: &str) -> Option<NodeId> {
        self.descendant_elements(self.root)
            .into_iter()
            .find(|id| self.element(*id).is_ok_and(|e| e.tag == tag))
    }

    pub(crate) fn find_id(&self, value: &str) -> Option<NodeId> {
        self.descendant_elements(self.root)
            .into_iter()
            .find(|id| self.element(*id).is_ok_and(|e| e.attr("id") == Some(value)))
    }
}
