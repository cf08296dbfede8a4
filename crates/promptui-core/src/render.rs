// ABOUTME: Tree renderer: evaluates a Node (components included) into a VNode tree.
// ABOUTME: The async variant evaluates siblings concurrently and reassembles them in input order.

use std::collections::HashSet;

use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use serde_json::Value;
use thiserror::Error;

use crate::env::RenderEnv;
use crate::hooks::{HookError, HookRuntime, Hooks};
use crate::node::{ComponentBody, ComponentNode, ElementDesc, Node};
use crate::props::PropValue;
use crate::vnode::VNode;

/// Path of the root occurrence; every occurrence path starts with it.
pub const ROOT_PATH: &str = "root";

/// Errors produced while evaluating a tree. Component failures pass through
/// unchanged; no partial tree is returned.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("component {0} returned a deferred result; it can only be rendered asynchronously")]
    AsyncComponent(String),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Component(#[from] anyhow::Error),
}

impl RenderError {
    /// Wrap any error raised inside a component body.
    pub fn component(err: impl Into<anyhow::Error>) -> Self {
        RenderError::Component(err.into())
    }
}

/// Evaluates nodes against a hook runtime and render environment. Each
/// top-level call is one render pass: occurrences it does not reach are
/// unmounted when it completes successfully.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    runtime: HookRuntime,
    env: RenderEnv,
}

impl Renderer {
    pub fn new(runtime: HookRuntime, env: RenderEnv) -> Self {
        Self { runtime, env }
    }

    pub fn runtime(&self) -> &HookRuntime {
        &self.runtime
    }

    pub fn env(&self) -> &RenderEnv {
        &self.env
    }

    /// Synchronous evaluation. Async components are rejected with
    /// [`RenderError::AsyncComponent`].
    pub fn render(&self, node: Node) -> Result<Option<VNode>, RenderError> {
        self.runtime.begin_pass();
        let out = self.render_at(node, ROOT_PATH)?;
        self.runtime.end_pass();
        Ok(out)
    }

    /// Asynchronous evaluation supporting deferred component results.
    pub async fn render_async(&self, node: Node) -> Result<Option<VNode>, RenderError> {
        self.runtime.begin_pass();
        let out = self.render_at_async(node, ROOT_PATH.to_string()).await?;
        self.runtime.end_pass();
        Ok(out)
    }

    fn render_at(&self, node: Node, path: &str) -> Result<Option<VNode>, RenderError> {
        match node {
            Node::Empty => Ok(None),
            Node::Text(text) => Ok(Some(VNode::text(text))),
            Node::List(items) => {
                let children = self.render_children(items, path)?;
                Ok(Some(VNode::fragment(children)))
            }
            Node::Component(invocation) => {
                let occurrence = occurrence_path(path, invocation.component.name());
                let output = match &invocation.component.body {
                    ComponentBody::Sync(_) => self.invoke_sync(&invocation, &occurrence)?,
                    ComponentBody::Async(_) => {
                        return Err(RenderError::AsyncComponent(
                            invocation.component.name().to_string(),
                        ));
                    }
                };
                self.render_at(output, &occurrence)
            }
            Node::Element(desc) => {
                let (tag, props, children) = split_children(desc);
                let children = self.render_children(children, path)?;
                Ok(Some(VNode::element(tag, props, children)))
            }
        }
    }

    fn render_children(&self, items: Vec<Node>, path: &str) -> Result<Vec<VNode>, RenderError> {
        let paths = child_paths(path, &items);
        let mut out = Vec::with_capacity(items.len());
        for (item, child_path) in items.into_iter().zip(paths) {
            if let Some(vnode) = self.render_at(item, &child_path)? {
                out.push(vnode);
            }
        }
        Ok(out)
    }

    fn invoke_sync(&self, invocation: &ComponentNode, occurrence: &str) -> Result<Node, RenderError> {
        let ComponentBody::Sync(body) = &invocation.component.body else {
            return Err(RenderError::AsyncComponent(
                invocation.component.name().to_string(),
            ));
        };
        let id = self.runtime.mount(occurrence, invocation.component.name());
        let mut hooks = Hooks::new(&self.runtime, &self.env, id);
        body(&mut hooks, &invocation.props)
    }

    fn render_at_async(&self, node: Node, path: String) -> BoxFuture<'_, Result<Option<VNode>, RenderError>> {
        async move {
            match node {
                Node::Empty => Ok(None),
                Node::Text(text) => Ok(Some(VNode::text(text))),
                Node::List(items) => {
                    let children = self.render_children_async(items, &path).await?;
                    Ok(Some(VNode::fragment(children)))
                }
                Node::Component(invocation) => {
                    let occurrence = occurrence_path(&path, invocation.component.name());
                    let output = match &invocation.component.body {
                        ComponentBody::Sync(_) => self.invoke_sync(&invocation, &occurrence)?,
                        ComponentBody::Async(body) => {
                            body(self.env.clone(), invocation.props.clone()).await?
                        }
                    };
                    self.render_at_async(output, occurrence).await
                }
                Node::Element(desc) => {
                    let (tag, props, children) = split_children(desc);
                    let children = self.render_children_async(children, &path).await?;
                    Ok(Some(VNode::element(tag, props, children)))
                }
            }
        }
        .boxed()
    }

    async fn render_children_async(&self, items: Vec<Node>, path: &str) -> Result<Vec<VNode>, RenderError> {
        let paths = child_paths(path, &items);
        let pending = items
            .into_iter()
            .zip(paths)
            .map(|(item, child_path)| self.render_at_async(item, child_path));
        let rendered = try_join_all(pending).await?;
        Ok(rendered.into_iter().flatten().collect())
    }
}

/// Render with a throwaway runtime and an empty environment.
pub fn render(node: Node) -> Result<Option<VNode>, RenderError> {
    Renderer::default().render(node)
}

/// Async counterpart of [`render`].
pub async fn render_async(node: Node) -> Result<Option<VNode>, RenderError> {
    Renderer::default().render_async(node).await
}

/// Pull a `children` prop (JSON) out of the props and put it ahead of any
/// builder children; drop the `key` prop, which only names occurrences.
fn split_children(desc: ElementDesc) -> (String, crate::props::Props, Vec<Node>) {
    let ElementDesc {
        tag,
        mut props,
        children,
    } = desc;
    props.remove("key");
    let mut all = Vec::with_capacity(children.len() + 1);
    match props.remove("children") {
        Some(PropValue::Json(Value::Array(items))) => {
            all.extend(items.iter().map(Node::from_json));
        }
        Some(PropValue::Json(value)) => all.push(Node::from_json(&value)),
        Some(PropValue::Handler(_)) | None => {}
    }
    all.extend(children);
    (tag, props, all)
}

fn node_key(node: &Node) -> Option<String> {
    let props = match node {
        Node::Element(desc) => &desc.props,
        Node::Component(invocation) => &invocation.props,
        Node::Empty | Node::Text(_) | Node::List(_) => return None,
    };
    match props.json("key")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Occurrence paths of sibling nodes. A repeated key falls back to the
/// sibling's index so two occurrences never share hook state.
fn child_paths(parent: &str, items: &[Node]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .enumerate()
        .map(|(index, node)| match node_key(node) {
            Some(key) if seen.insert(key.clone()) => format!("{}/k:{}", parent, key),
            Some(key) => {
                tracing::warn!("duplicate key {} under {}; using position {}", key, parent, index);
                format!("{}/{}", parent, index)
            }
            None => format!("{}/{}", parent, index),
        })
        .collect()
}

fn occurrence_path(path: &str, component: &str) -> String {
    format!("{}#{}", path, component)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Cleanup;
    use crate::node::{Component, el};
    use crate::props::Props;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn shape(node: &Option<VNode>) -> serde_json::Value {
        serde_json::to_value(node).unwrap()
    }

    #[test]
    fn primitives_render_per_kind() {
        assert!(render(Node::Empty).unwrap().is_none());
        assert!(render(true.into()).unwrap().is_none());

        let text = render(42.into()).unwrap().unwrap();
        assert_eq!(text.text_content(), "42");

        let list = render(vec![Node::from("a"), Node::Empty, Node::from("b")].into())
            .unwrap()
            .unwrap();
        let el = list.as_element().unwrap();
        assert_eq!(el.tag, "fragment");
        assert_eq!(el.children.len(), 2, "empty entries are dropped");
    }

    #[test]
    fn element_children_prop_is_extracted() {
        let node = el("p")
            .prop("children", serde_json::json!(["x", 1]))
            .prop("key", "k")
            .prop("class", "c")
            .child("y");
        let out = render(node.into()).unwrap().unwrap();
        let p = out.as_element().unwrap();
        assert!(!p.props.contains_key("children"));
        assert!(!p.props.contains_key("key"));
        assert_eq!(p.props.str("class"), Some("c"));
        assert_eq!(out.text_content(), "x1y");
    }

    #[test]
    fn component_receives_props_and_nests() {
        let inner = Component::new("Inner", |_, props| {
            Ok(el("span").child(props.str("label").unwrap_or_default().to_string()).into())
        });
        let outer = {
            let inner = inner.clone();
            Component::new("Outer", move |_, _| {
                Ok(el("div")
                    .child(inner.with_props(Props::new().with("label", "hi")))
                    .into())
            })
        };

        let out = render(outer.node()).unwrap().unwrap();
        assert_eq!(out.tag(), Some("div"));
        assert_eq!(out.text_content(), "hi");
    }

    #[test]
    fn component_errors_propagate_unchanged() {
        let failing = Component::new("Failing", |_, _| {
            Err(RenderError::component(anyhow::anyhow!("boom")))
        });
        let tree = el("div").child(el("p").child(failing.node()));
        let err = render(tree.into()).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn sync_render_rejects_async_component() {
        let deferred = Component::new_async("Deferred", |_, _| async { Ok(Node::from("x")) });
        let err = render(deferred.node()).unwrap_err();
        assert!(matches!(err, RenderError::AsyncComponent(ref name) if name == "Deferred"));
    }

    #[test]
    fn state_survives_across_passes() {
        let renderer = Renderer::default();
        let setter = Arc::new(std::sync::Mutex::new(None));
        let s = Arc::clone(&setter);
        let counter = Component::new("Counter", move |hooks, _| {
            let (count, set_count) = hooks.use_state(0)?;
            *s.lock().unwrap() = Some(set_count);
            Ok(format!("Count: {}", count).into())
        });

        let first = renderer.render(counter.node()).unwrap().unwrap();
        assert_eq!(first.text_content(), "Count: 0");

        setter.lock().unwrap().as_ref().unwrap().set(3);
        let second = renderer.render(counter.node()).unwrap().unwrap();
        assert_eq!(second.text_content(), "Count: 3");
    }

    #[test]
    fn keyed_children_keep_state_when_reordered() {
        let renderer = Renderer::default();
        let item = Component::new("Item", |hooks, props| {
            let initial = props.str("label").unwrap_or_default().to_string();
            let (label, _) = hooks.use_state(initial)?;
            Ok(label.into())
        });

        let list = |labels: &[&str], keys: &[&str]| -> Node {
            el("ul")
                .children(labels.iter().zip(keys).map(|(label, key)| {
                    item.with_props(Props::new().with("label", *label).with("key", *key))
                }))
                .into()
        };

        renderer.render(list(&["a", "b"], &["1", "2"])).unwrap();
        // Same keys, swapped positions, new labels: state follows the key.
        let out = renderer
            .render(list(&["x", "y"], &["2", "1"]))
            .unwrap()
            .unwrap();
        assert_eq!(out.text_content(), "ba");
    }

    #[test]
    fn repeated_keys_do_not_share_state() {
        let renderer = Renderer::default();
        let item = Component::new("Item", |hooks, props| {
            let initial = props.str("label").unwrap_or_default().to_string();
            let (label, _) = hooks.use_state(initial)?;
            Ok(label.into())
        });
        let tree: Node = el("ul")
            .child(item.with_props(Props::new().with("label", "a").with("key", "same")))
            .child(item.with_props(Props::new().with("label", "b").with("key", "same")))
            .into();

        let out = renderer.render(tree).unwrap().unwrap();
        assert_eq!(out.text_content(), "ab");
    }

    #[test]
    fn removed_occurrences_run_cleanup() {
        let renderer = Renderer::default();
        let cleanups = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&cleanups);
        let child = Component::new("Child", move |hooks, _| {
            let c = Arc::clone(&c);
            hooks.use_effect_with((), move || {
                Some(Cleanup::new(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                }))
            })?;
            Ok("child".into())
        });

        renderer.render(el("div").child(child.node()).into()).unwrap();
        assert_eq!(cleanups.load(Ordering::SeqCst), 0);

        renderer.render(el("div").into()).unwrap();
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert!(renderer.runtime().is_empty());
    }

    fn delayed(name: &'static str, ms: u64, inner: Node) -> Component {
        Component::new_async(name, move |_, _| {
            let inner = inner.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(el("section").prop("name", name).child(inner).into())
            }
        })
    }

    #[tokio::test]
    async fn nested_deferred_components_match_sync_shape() {
        let leaf = delayed("Leaf", 1, Node::from("leaf"));
        let slow = delayed("Slow", 20, leaf.node());
        let fast = delayed("Fast", 1, Node::from("fast"));
        let tree: Node = el("main").child(slow.node()).child(fast.node()).into();

        let async_out = render_async(tree).await.unwrap();

        let expected: Node = el("main")
            .child(
                el("section")
                    .prop("name", "Slow")
                    .child(el("section").prop("name", "Leaf").child("leaf")),
            )
            .child(el("section").prop("name", "Fast").child("fast"))
            .into();
        let sync_out = render(expected).unwrap();

        assert_eq!(shape(&async_out), shape(&sync_out));
    }

    #[tokio::test]
    async fn async_siblings_keep_input_order() {
        let items: Vec<Node> = [30u64, 1, 15]
            .into_iter()
            .enumerate()
            .map(|(i, ms)| {
                Component::new_async(format!("Item{}", i), move |_, _| async move {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(Node::from(i))
                })
                .node()
            })
            .collect();

        let out = render_async(Node::List(items)).await.unwrap().unwrap();
        assert_eq!(out.text_content(), "012");
    }

    #[tokio::test]
    async fn async_rejection_propagates() {
        let ok = delayed("Ok", 5, Node::from("fine"));
        let bad = Component::new_async("Bad", |_, _| async {
            Err(RenderError::component(anyhow::anyhow!("deferred failure")))
        });
        let err = render_async(vec![ok.node(), bad.node()].into()).await.unwrap_err();
        assert_eq!(err.to_string(), "deferred failure");
    }

    #[tokio::test]
    async fn async_render_runs_sync_components_with_hooks() {
        let renderer = Renderer::default();
        let counter = Component::new("Counter", |hooks, _| {
            let (count, _) = hooks.use_state(7)?;
            Ok(count.into())
        });
        let wrapper = {
            let counter = counter.clone();
            Component::new_async("Wrapper", move |_, _| {
                let counter = counter.clone();
                async move { Ok(el("div").child(counter.node()).into()) }
            })
        };
        let out = renderer.render_async(wrapper.node()).await.unwrap().unwrap();
        assert_eq!(out.text_content(), "7");
        assert_eq!(renderer.runtime().len(), 1);
    }
}
