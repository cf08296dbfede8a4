// ABOUTME: Renderer input: a closed union of everything a component may return, plus components.
// ABOUTME: Components are sync (with hooks) or async (deferred result); elements are native descriptors.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::env::RenderEnv;
use crate::hooks::Hooks;
use crate::props::{PropValue, Props};
use crate::render::RenderError;

/// What a component produces.
#[derive(Debug, Clone, Default)]
pub enum Node {
    /// Renders to nothing (null, undefined, booleans).
    #[default]
    Empty,
    /// Renders to a text leaf.
    Text(String),
    /// Renders to an anonymous fragment element.
    List(Vec<Node>),
    /// A component invocation.
    Component(ComponentNode),
    /// A native element descriptor.
    Element(ElementDesc),
}

impl Node {
    /// Convert loosely-typed JSON into a node: strings and numbers become
    /// text, arrays become lists, everything else renders to nothing.
    pub fn from_json(value: &Value) -> Node {
        match value {
            Value::String(s) => Node::Text(s.clone()),
            Value::Number(n) => Node::Text(n.to_string()),
            Value::Array(items) => Node::List(items.iter().map(Node::from_json).collect()),
            Value::Null | Value::Bool(_) | Value::Object(_) => Node::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Text(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::Text(s)
    }
}

impl From<&String> for Node {
    fn from(s: &String) -> Self {
        Node::Text(s.clone())
    }
}

impl From<bool> for Node {
    fn from(_: bool) -> Self {
        Node::Empty
    }
}

macro_rules! impl_numeric_node {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Node {
                fn from(n: $t) -> Self {
                    Node::Text(n.to_string())
                }
            }
        )*
    };
}

impl_numeric_node!(i32, i64, u32, u64, usize, f64);

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Node::Empty, Into::into)
    }
}

impl<T: Into<Node>> From<Vec<T>> for Node {
    fn from(items: Vec<T>) -> Self {
        Node::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<ElementDesc> for Node {
    fn from(el: ElementDesc) -> Self {
        Node::Element(el)
    }
}

impl From<ComponentNode> for Node {
    fn from(c: ComponentNode) -> Self {
        Node::Component(c)
    }
}

/// A native element before rendering.
#[derive(Debug, Clone)]
pub struct ElementDesc {
    pub tag: String,
    pub props: Props,
    pub children: Vec<Node>,
}

/// Start building a native element.
pub fn el(tag: impl Into<String>) -> ElementDesc {
    ElementDesc {
        tag: tag.into(),
        props: Props::new(),
        children: Vec::new(),
    }
}

impl ElementDesc {
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(key, value);
        self
    }

    pub fn props(mut self, props: Props) -> Self {
        self.props.merge(props);
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I, N>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Set the occurrence key used to keep hook state stable across reorders.
    pub fn key(self, key: impl Into<String>) -> Self {
        self.prop("key", key.into())
    }
}

/// Signature of a synchronous component body.
pub type SyncComponentFn = dyn Fn(&mut Hooks<'_>, &Props) -> Result<Node, RenderError> + Send + Sync;

/// Signature of an asynchronous component body.
pub type AsyncComponentFn =
    dyn Fn(RenderEnv, Props) -> BoxFuture<'static, Result<Node, RenderError>> + Send + Sync;

#[derive(Clone)]
pub(crate) enum ComponentBody {
    Sync(Arc<SyncComponentFn>),
    Async(Arc<AsyncComponentFn>),
}

/// A named component function.
#[derive(Clone)]
pub struct Component {
    name: Arc<str>,
    pub(crate) body: ComponentBody,
}

impl Component {
    /// A synchronous component. Hooks are available through the first argument.
    pub fn new<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(&mut Hooks<'_>, &Props) -> Result<Node, RenderError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: ComponentBody::Sync(Arc::new(f)),
        }
    }

    /// An asynchronous component whose result is deferred. Only the async
    /// renderer can evaluate it.
    pub fn new_async<F, Fut>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(RenderEnv, Props) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Node, RenderError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: ComponentBody::Async(Arc::new(move |env, props| Box::pin(f(env, props)))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_async(&self) -> bool {
        matches!(self.body, ComponentBody::Async(_))
    }

    /// An invocation of this component with the given props.
    pub fn with_props(&self, props: Props) -> Node {
        Node::Component(ComponentNode {
            component: self.clone(),
            props,
        })
    }

    /// An invocation of this component with no props.
    pub fn node(&self) -> Node {
        self.with_props(Props::new())
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("async", &self.is_async())
            .finish()
    }
}

/// A component together with the props it is invoked with.
#[derive(Debug, Clone)]
pub struct ComponentNode {
    pub component: Component,
    pub props: Props,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitive_conversions_follow_render_rules() {
        assert!(matches!(Node::from(true), Node::Empty));
        assert!(matches!(Node::from(false), Node::Empty));
        assert!(matches!(Node::from(None::<&str>), Node::Empty));
        assert!(matches!(Node::from(42), Node::Text(ref s) if s == "42"));
        assert!(matches!(Node::from(1.5), Node::Text(ref s) if s == "1.5"));
        assert!(matches!(Node::from(vec!["a", "b"]), Node::List(ref v) if v.len() == 2));
    }

    #[test]
    fn json_children_convert_to_nodes() {
        let node = Node::from_json(&json!(["x", 3, null, true, { "a": 1 }]));
        match node {
            Node::List(items) => {
                assert!(matches!(&items[0], Node::Text(s) if s == "x"));
                assert!(matches!(&items[1], Node::Text(s) if s == "3"));
                assert!(items[2].is_empty());
                assert!(items[3].is_empty());
                assert!(items[4].is_empty());
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn builder_collects_props_and_children() {
        let desc = el("button")
            .prop("data-action", "save")
            .key("k1")
            .child("Save")
            .children(vec!["!", "?"]);
        assert_eq!(desc.props.str("data-action"), Some("save"));
        assert_eq!(desc.props.str("key"), Some("k1"));
        assert_eq!(desc.children.len(), 3);
    }

    #[test]
    fn component_reports_kind() {
        let sync = Component::new("Sync", |_, _| Ok(Node::Empty));
        let deferred = Component::new_async("Deferred", |_, _| async { Ok(Node::Empty) });
        assert!(!sync.is_async());
        assert!(deferred.is_async());
        assert_eq!(deferred.name(), "Deferred");
    }
}
