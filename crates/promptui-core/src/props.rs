// ABOUTME: Element and component properties: JSON data values plus executable handlers.
// ABOUTME: Handlers are the callables that become tool executors once a tree is rendered.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use serde_json::Value;

/// Future returned by a [`Handler`] invocation.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Value>>;

type HandlerFn = dyn Fn(Value) -> HandlerFuture + Send + Sync;

/// A callable attached to an element (`onClick`, `onChange`, `execute`).
///
/// Handlers take a single JSON argument (the tool-call arguments, `Value::Null`
/// when the agent supplied none) and resolve to a JSON result.
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    /// Wrap an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self(Arc::new(move |args| Box::pin(f(args))))
    }

    /// Wrap a synchronous closure; the result is delivered as an already
    /// completed future.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::new(move |args| std::future::ready(f(args)))
    }

    /// A handler that does nothing and returns `null`.
    pub fn noop() -> Self {
        Self::from_fn(|_| Ok(Value::Null))
    }

    /// Invoke the handler.
    pub fn call(&self, args: Value) -> HandlerFuture {
        (self.0)(args)
    }

    /// True when both handles point at the same closure.
    pub fn ptr_eq(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

/// A single property value.
#[derive(Debug, Clone)]
pub enum PropValue {
    Json(Value),
    Handler(Handler),
}

impl PropValue {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            PropValue::Json(v) => Some(v),
            PropValue::Handler(_) => None,
        }
    }

    pub fn as_handler(&self) -> Option<&Handler> {
        match self {
            PropValue::Handler(h) => Some(h),
            PropValue::Json(_) => None,
        }
    }
}

impl From<Value> for PropValue {
    fn from(v: Value) -> Self {
        PropValue::Json(v)
    }
}

impl From<Handler> for PropValue {
    fn from(h: Handler) -> Self {
        PropValue::Handler(h)
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::Json(Value::String(s.to_string()))
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::Json(Value::String(s))
    }
}

impl From<&String> for PropValue {
    fn from(s: &String) -> Self {
        PropValue::Json(Value::String(s.clone()))
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Json(Value::Bool(b))
    }
}

macro_rules! impl_numeric_prop {
    ($($t:ty),*) => {
        $(
            impl From<$t> for PropValue {
                fn from(n: $t) -> Self {
                    PropValue::Json(Value::from(n))
                }
            }
        )*
    };
}

impl_numeric_prop!(i32, i64, u32, u64, usize, f64);

/// Property bag for elements and components. Keys are kept sorted so that
/// emitted attributes are deterministic.
#[derive(Debug, Clone, Default)]
pub struct Props {
    entries: BTreeMap<String, PropValue>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<PropValue> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// The JSON value stored under `key`, if it is a data prop.
    pub fn json(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).and_then(PropValue::as_json)
    }

    /// The string stored under `key`. Non-string values yield `None`.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.json(key).and_then(Value::as_str)
    }

    /// The string stored under `key` when it is present and non-empty.
    pub fn non_empty_str(&self, key: &str) -> Option<&str> {
        self.str(key).filter(|s| !s.is_empty())
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.json(key).and_then(Value::as_bool)
    }

    pub fn handler(&self, key: &str) -> Option<&Handler> {
        self.entries.get(key).and_then(PropValue::as_handler)
    }

    /// Copy every entry of `other` into `self`, overwriting existing keys.
    pub fn merge(&mut self, other: Props) {
        self.entries.extend(other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Handlers are not data; they are omitted from serialized props.
impl Serialize for Props {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let data: Vec<(&String, &Value)> = self
            .entries
            .iter()
            .filter_map(|(k, v)| v.as_json().map(|v| (k, v)))
            .collect();
        let mut map = serializer.serialize_map(Some(data.len()))?;
        for (k, v) in data {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_accessors_reject_wrong_types() {
        let props = Props::new()
            .with("data-action", "save")
            .with("id", 42)
            .with("empty", "")
            .with("disabled", true);

        assert_eq!(props.str("data-action"), Some("save"));
        assert_eq!(props.str("id"), None);
        assert_eq!(props.non_empty_str("empty"), None);
        assert_eq!(props.bool("disabled"), Some(true));
        assert!(props.handler("data-action").is_none());
    }

    #[test]
    fn serialization_skips_handlers() {
        let props = Props::new()
            .with("label", "Go")
            .with("onClick", Handler::noop());

        let json = serde_json::to_value(&props).unwrap();
        assert_eq!(json, json!({ "label": "Go" }));
    }

    #[tokio::test]
    async fn handler_from_fn_resolves_immediately() {
        let handler = Handler::from_fn(|args| Ok(json!({ "echo": args })));
        let out = handler.call(json!(7)).await.unwrap();
        assert_eq!(out, json!({ "echo": 7 }));
    }

    #[test]
    fn cloned_handlers_share_identity() {
        let a = Handler::noop();
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&Handler::noop()));
    }
}
