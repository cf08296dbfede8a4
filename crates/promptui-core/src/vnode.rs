// ABOUTME: The renderer's output tree: text leaves and element nodes with props and children.
// ABOUTME: Emitters and the tool extractor consume this tree; nothing here knows about components.

use serde::Serialize;

use crate::props::Props;

/// Tag used for anonymous groups produced from sequences.
pub const FRAGMENT: &str = "fragment";

/// A rendered node.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VNode {
    Text(TextNode),
    Element(ElementNode),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextNode {
    pub content: String,
}

/// An element. `props` never contains a `children` key; children live in
/// `children` and are never absent entries.
#[derive(Debug, Clone, Serialize)]
pub struct ElementNode {
    #[serde(rename = "type")]
    pub tag: String,
    pub props: Props,
    pub children: Vec<VNode>,
}

impl VNode {
    pub fn text(content: impl Into<String>) -> Self {
        VNode::Text(TextNode {
            content: content.into(),
        })
    }

    pub fn element(tag: impl Into<String>, props: Props, children: Vec<VNode>) -> Self {
        let mut props = props;
        props.remove("children");
        VNode::Element(ElementNode {
            tag: tag.into(),
            props,
            children,
        })
    }

    pub fn fragment(children: Vec<VNode>) -> Self {
        VNode::element(FRAGMENT, Props::new(), children)
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            VNode::Element(el) => Some(el),
            VNode::Text(_) => None,
        }
    }

    /// Tag name for elements, `None` for text.
    pub fn tag(&self) -> Option<&str> {
        self.as_element().map(|el| el.tag.as_str())
    }

    /// Concatenated raw text of this node and all descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            VNode::Text(t) => out.push_str(&t.content),
            VNode::Element(el) => {
                for child in &el.children {
                    child.collect_text(out);
                }
            }
        }
    }
}

impl ElementNode {
    /// Concatenated raw text of all children.
    pub fn text_content(&self) -> String {
        self.children.iter().map(VNode::text_content).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_constructor_strips_children_prop() {
        let props = Props::new().with("children", "oops").with("id", "x");
        let node = VNode::element("div", props, vec![]);
        let el = node.as_element().unwrap();
        assert!(!el.props.contains_key("children"));
        assert_eq!(el.props.str("id"), Some("x"));
    }

    #[test]
    fn text_content_flattens_in_document_order() {
        let tree = VNode::element(
            "div",
            Props::new(),
            vec![
                VNode::text("a"),
                VNode::element("span", Props::new(), vec![VNode::text("b"), VNode::text("c")]),
                VNode::text("d"),
            ],
        );
        assert_eq!(tree.text_content(), "abcd");
    }

    #[test]
    fn serializes_with_type_field() {
        let node = VNode::element("p", Props::new(), vec![VNode::text("hi")]);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["kind"], "element");
        assert_eq!(json["type"], "p");
        assert_eq!(json["children"][0]["content"], "hi");
    }
}
