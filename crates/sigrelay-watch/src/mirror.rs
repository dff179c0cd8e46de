//! Host-side mirror of a page's DOM, kept current from CDP `DOM.*` events.
//!
//! Nodes are keyed by their CDP `nodeId`. Ids are only meaningful within one
//! document; the mirror is cleared whenever the document is replaced.

use crate::dom::DomNode;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

pub type NodeId = i64;

const ELEMENT_NODE: u8 = 1;
const TEXT_NODE: u8 = 3;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    node_id: NodeId,
    node_type: u8,
    #[serde(default)]
    node_name: String,
    #[serde(default)]
    local_name: String,
    #[serde(default)]
    node_value: String,
    #[serde(default)]
    attributes: Vec<String>,
    children: Option<Vec<RawNode>>,
    child_node_count: Option<u32>,
}

#[derive(Debug)]
enum NodeData {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
    Other,
}

#[derive(Debug)]
struct MirrorNode {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Children have been delivered (or there are none).
    loaded: bool,
}

#[derive(Debug, Default)]
pub struct DocumentMirror {
    nodes: HashMap<NodeId, MirrorNode>,
    root: Option<NodeId>,
}

impl DocumentMirror {
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Replace everything with the tree from a `DOM.getDocument` reply.
    pub fn reset(&mut self, root: &Value) -> bool {
        self.clear();
        let Ok(raw) = RawNode::deserialize(root) else {
            return false;
        };
        self.root = Some(self.load(raw, None));
        true
    }

    /// Apply `DOM.setChildNodes`. Returns false for an unknown parent.
    pub fn set_children(&mut self, parent: NodeId, nodes: &Value) -> bool {
        if !self.nodes.contains_key(&parent) {
            return false;
        }
        let Ok(raws) = Vec::<RawNode>::deserialize(nodes) else {
            return false;
        };
        let old = self
            .nodes
            .get_mut(&parent)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        for id in old {
            self.remove_subtree(id);
        }
        let ids: Vec<NodeId> = raws.into_iter().map(|r| self.load(r, Some(parent))).collect();
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children = ids;
            node.loaded = true;
        }
        true
    }

    /// Apply `DOM.childNodeInserted`. `previous == 0` inserts first.
    pub fn insert(&mut self, parent: NodeId, previous: NodeId, node: &Value) -> Option<NodeId> {
        if !self.nodes.contains_key(&parent) {
            return None;
        }
        let raw = RawNode::deserialize(node).ok()?;
        if self.nodes.contains_key(&raw.node_id) {
            self.detach(raw.node_id);
        }
        let id = self.load(raw, Some(parent));
        let siblings = &mut self.nodes.get_mut(&parent)?.children;
        let at = if previous == 0 {
            0
        } else {
            siblings
                .iter()
                .position(|s| *s == previous)
                .map_or(siblings.len(), |i| i + 1)
        };
        siblings.insert(at, id);
        Some(id)
    }

    /// Apply `DOM.childNodeRemoved`.
    pub fn remove(&mut self, node: NodeId) {
        self.detach(node);
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(NodeData::Element { attributes, .. }) = self.data_mut(node) {
            match attributes.iter_mut().find(|(k, _)| k == name) {
                Some(slot) => slot.1 = value.to_string(),
                None => attributes.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        if let Some(NodeData::Element { attributes, .. }) = self.data_mut(node) {
            attributes.retain(|(k, _)| k != name);
        }
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        if let Some(NodeData::Text(current)) = self.data_mut(node) {
            *current = text.to_string();
        }
    }

    /// True if `node` is reachable from the document root.
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.root.is_some_and(|root| self.is_within(node, root))
    }

    /// True if `node` is `ancestor` or one of its descendants.
    pub fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    /// True once the whole subtree under `node` has been delivered.
    pub fn subtree_loaded(&self, node: NodeId) -> bool {
        self.nodes
            .get(&node)
            .is_some_and(|n| n.loaded && n.children.iter().all(|c| self.subtree_loaded(*c)))
    }

    /// First element in document order whose tag and attributes satisfy `pred`.
    pub fn find_element(&self, pred: impl Fn(&DomNode) -> bool) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if let Some(shallow) = self.shallow(id) {
                if pred(&shallow) {
                    return Some(id);
                }
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }

    /// Snapshot of an element subtree.
    pub fn snapshot(&self, node: NodeId) -> Option<DomNode> {
        let mut element = self.shallow(node)?;
        for child in &self.nodes.get(&node)?.children {
            match self.nodes.get(child).map(|c| &c.data) {
                Some(NodeData::Element { .. }) => {
                    if let Some(sub) = self.snapshot(*child) {
                        element = element.with_child(sub);
                    }
                }
                Some(NodeData::Text(text)) => element = element.with_text(text),
                _ => {}
            }
        }
        Some(element)
    }

    /// Text of the document's `<title>`.
    pub fn title(&self) -> String {
        self.find_element(|n| n.tag() == "title")
            .and_then(|id| self.snapshot(id))
            .map(|n| n.text_content().trim().to_string())
            .unwrap_or_default()
    }

    /// The page heading: first `h1`, else the first `role="heading"` element.
    pub fn page_heading(&self) -> Option<DomNode> {
        self.find_element(|n| n.tag() == "h1")
            .or_else(|| self.find_element(|n| n.attr("role") == Some("heading")))
            .and_then(|id| self.snapshot(id))
    }

    fn shallow(&self, node: NodeId) -> Option<DomNode> {
        match &self.nodes.get(&node)?.data {
            NodeData::Element { tag, attributes } => Some(
                attributes
                    .iter()
                    .fold(DomNode::new(tag), |n, (k, v)| n.with_attr(k, v)),
            ),
            _ => None,
        }
    }

    fn data_mut(&mut self, node: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(&node).map(|n| &mut n.data)
    }

    fn load(&mut self, raw: RawNode, parent: Option<NodeId>) -> NodeId {
        let id = raw.node_id;
        let loaded = raw.children.is_some() || raw.child_node_count.unwrap_or(0) == 0;
        let data = match raw.node_type {
            ELEMENT_NODE => {
                let tag = if raw.local_name.is_empty() {
                    raw.node_name
                } else {
                    raw.local_name
                };
                NodeData::Element {
                    tag: tag.to_ascii_lowercase(),
                    attributes: raw
                        .attributes
                        .chunks_exact(2)
                        .map(|pair| (pair[0].clone(), pair[1].clone()))
                        .collect(),
                }
            }
            TEXT_NODE => NodeData::Text(raw.node_value),
            _ => NodeData::Other,
        };
        self.nodes.insert(
            id,
            MirrorNode {
                data,
                parent,
                children: Vec::new(),
                loaded,
            },
        );
        let children: Vec<NodeId> = raw
            .children
            .unwrap_or_default()
            .into_iter()
            .map(|c| self.load(c, Some(id)))
            .collect();
        if let Some(node) = self.nodes.get_mut(&id) {
            node.children = children;
        }
        id
    }

    fn detach(&mut self, node: NodeId) {
        let parent = self.nodes.get(&node).and_then(|n| n.parent);
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| *c != node);
        }
        if self.root == Some(node) {
            self.root = None;
        }
        self.remove_subtree(node);
    }

    fn remove_subtree(&mut self, node: NodeId) {
        if let Some(removed) = self.nodes.remove(&node) {
            for child in removed.children {
                self.remove_subtree(child);
            }
        }
    }
}
