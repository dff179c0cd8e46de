//! Owned DOM snapshot.
//!
//! Hosts hand the watcher detached copies of added subtrees, so extraction
//! never touches a live document. Snapshots can be decoded from CDP
//! `DOM.Node` objects or built directly in tests.

use serde::Deserialize;
use serde_json::Value;

/// Child of an element: another element or a text run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomChild {
    Element(DomNode),
    Text(String),
}

/// Element node with its attributes and children in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomNode {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<DomChild>,
}

impl DomNode {
    /// Empty element. The tag is stored lower-case.
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_child(mut self, child: DomNode) -> Self {
        self.children.push(DomChild::Element(child));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(DomChild::Text(text.to_string()));
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// True if attribute `name` is present and contains `needle`.
    pub fn attr_contains(&self, name: &str, needle: &str) -> bool {
        self.attr(name).is_some_and(|v| v.contains(needle))
    }

    pub fn children(&self) -> &[DomChild] {
        &self.children
    }

    /// Strict descendants in pre-order (document order).
    pub fn descendants(&self) -> Descendants<'_> {
        let mut stack: Vec<&DomNode> = self.element_children().collect();
        stack.reverse();
        Descendants { stack }
    }

    pub fn element_children(&self) -> impl DoubleEndedIterator<Item = &DomNode> {
        self.children.iter().filter_map(|c| match c {
            DomChild::Element(e) => Some(e),
            DomChild::Text(_) => None,
        })
    }

    /// First strict descendant matching `pred`, in document order.
    pub fn find(&self, pred: impl Fn(&DomNode) -> bool) -> Option<&DomNode> {
        self.descendants().find(|n| pred(n))
    }

    /// Concatenated text of the subtree.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                DomChild::Text(t) => out.push_str(t),
                DomChild::Element(e) => e.collect_text(out),
            }
        }
    }

    /// Copy of this subtree with every descendant matching `pred` removed
    /// (together with its own subtree).
    pub fn pruned(&self, pred: &impl Fn(&DomNode) -> bool) -> DomNode {
        let children = self
            .children
            .iter()
            .filter_map(|c| match c {
                DomChild::Element(e) if pred(e) => None,
                DomChild::Element(e) => Some(DomChild::Element(e.pruned(pred))),
                DomChild::Text(t) => Some(DomChild::Text(t.clone())),
            })
            .collect();
        DomNode {
            tag: self.tag.clone(),
            attributes: self.attributes.clone(),
            children,
        }
    }

    /// Decode a CDP `DOM.Node`. Returns `None` unless it is an element.
    ///
    /// Text children become text runs; comments and other node kinds are
    /// skipped.
    pub fn from_cdp(value: &Value) -> Option<DomNode> {
        let raw = CdpNode::deserialize(value).ok()?;
        raw.into_element()
    }
}

/// Pre-order iterator over strict descendants.
pub struct Descendants<'a> {
    stack: Vec<&'a DomNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a DomNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.element_children().rev());
        Some(node)
    }
}

const ELEMENT_NODE: u8 = 1;
const TEXT_NODE: u8 = 3;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CdpNode {
    node_type: u8,
    #[serde(default)]
    node_name: String,
    #[serde(default)]
    local_name: String,
    #[serde(default)]
    node_value: String,
    /// Flat `[name, value, name, value, ...]`.
    #[serde(default)]
    attributes: Vec<String>,
    #[serde(default)]
    children: Vec<CdpNode>,
}

impl CdpNode {
    fn into_element(self) -> Option<DomNode> {
        if self.node_type != ELEMENT_NODE {
            return None;
        }
        let tag = if self.local_name.is_empty() {
            self.node_name
        } else {
            self.local_name
        };
        let attributes = self
            .attributes
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect();
        let children = self
            .children
            .into_iter()
            .filter_map(|c| match c.node_type {
                ELEMENT_NODE => c.into_element().map(DomChild::Element),
                TEXT_NODE => Some(DomChild::Text(c.node_value)),
                _ => None,
            })
            .collect();

        let mut node = DomNode::new(&tag);
        node.attributes = attributes;
        node.children = children;
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> DomNode {
        DomNode::new("LI")
            .with_attr("id", "chat-1")
            .with_child(
                DomNode::new("div")
                    .with_child(DomNode::new("span").with_text("a"))
                    .with_text("b"),
            )
            .with_child(DomNode::new("p").with_text("c"))
    }

    #[test]
    fn test_tag_is_lowercased() {
        assert_eq!(sample().tag(), "li");
    }

    #[test]
    fn test_descendants_in_document_order() {
        let node = sample();
        let tags: Vec<_> = node.descendants().map(|n| n.tag()).collect();
        assert_eq!(tags, vec!["div", "span", "p"]);
    }

    #[test]
    fn test_text_content_and_pruning() {
        let node = sample();
        assert_eq!(node.text_content(), "abc");
        let pruned = node.pruned(&|n: &DomNode| n.tag() == "span");
        assert_eq!(pruned.text_content(), "bc");
        // Original untouched.
        assert_eq!(node.text_content(), "abc");
    }

    #[test]
    fn test_from_cdp() {
        let raw = json!({
            "nodeId": 7,
            "nodeType": 1,
            "nodeName": "LI",
            "localName": "li",
            "attributes": ["role", "article", "aria-label", "Bob said hi"],
            "children": [
                {"nodeId": 8, "nodeType": 3, "nodeName": "#text", "nodeValue": "hello "},
                {"nodeId": 9, "nodeType": 8, "nodeName": "#comment", "nodeValue": "x"},
                {"nodeId": 10, "nodeType": 1, "nodeName": "SPAN", "localName": "span",
                 "attributes": [], "children": [
                    {"nodeId": 11, "nodeType": 3, "nodeName": "#text", "nodeValue": "world"}
                 ]}
            ]
        });
        let node = DomNode::from_cdp(&raw).unwrap();
        assert_eq!(node.tag(), "li");
        assert_eq!(node.attr("role"), Some("article"));
        assert!(node.attr_contains("aria-label", "said"));
        assert_eq!(node.children().len(), 2);
        assert_eq!(node.text_content(), "hello world");
    }

    #[test]
    fn test_from_cdp_rejects_non_elements() {
        assert!(DomNode::from_cdp(&json!({"nodeType": 3, "nodeValue": "x"})).is_none());
        assert!(DomNode::from_cdp(&json!({"foo": 1})).is_none());
        assert!(DomNode::from_cdp(&json!("text")).is_none());
    }
}
