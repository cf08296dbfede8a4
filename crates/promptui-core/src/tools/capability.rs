// ABOUTME: Explicit registry of capabilities that `tool use=<id>` elements resolve against.
// ABOUTME: A capability names its parameters and invokes a method on an instance fetched from the injector.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::injector::{Injector, Service};
use crate::props::{Handler, HandlerFuture};

/// JSON type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
            ParamKind::Object => "object",
            ParamKind::Array => "array",
        }
    }
}

/// One declared argument of a capability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub optional: bool,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            optional: false,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    fn schema(&self) -> Value {
        let mut schema = json!({ "type": self.kind.as_str() });
        if let (Some(description), Some(obj)) = (&self.description, schema.as_object_mut()) {
            obj.insert("description".to_string(), Value::String(description.clone()));
        }
        schema
    }
}

type InvokeFn = dyn Fn(Service, Value) -> HandlerFuture + Send + Sync;

/// A named operation on a service instance.
#[derive(Clone)]
pub struct Capability {
    id: String,
    name: String,
    description: String,
    params: Vec<ParamSpec>,
    instance_token: String,
    invoke: Arc<InvokeFn>,
}

impl Capability {
    /// A capability invoking `f` on the `T` registered in the injector under
    /// the capability id (override with [`Capability::instance`]).
    pub fn new<T, F, Fut>(id: impl Into<String>, name: impl Into<String>, f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Arc<T>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let id = id.into();
        let invoke_id = id.clone();
        let invoke = move |service: Service, args: Value| -> HandlerFuture {
            match service.downcast::<T>() {
                Ok(instance) => Box::pin(f(instance, args)),
                Err(_) => {
                    let id = invoke_id.clone();
                    Box::pin(async move {
                        Err(anyhow::anyhow!("instance for capability {} has an unexpected type", id))
                    })
                }
            }
        };
        Self {
            instance_token: id.clone(),
            id,
            name: name.into(),
            description: String::new(),
            params: Vec::new(),
            invoke: Arc::new(invoke),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Injector token the instance is looked up under.
    pub fn instance(mut self, token: impl Into<String>) -> Self {
        self.instance_token = token.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// JSON schema properties and required names derived from the declared
    /// parameters.
    pub fn schema(&self) -> (Map<String, Value>, Vec<String>) {
        let properties = self
            .params
            .iter()
            .map(|p| (p.name.clone(), p.schema()))
            .collect();
        let required = self
            .params
            .iter()
            .filter(|p| !p.optional)
            .map(|p| p.name.clone())
            .collect();
        (properties, required)
    }

    /// A handler that resolves the live instance through `injector` at call
    /// time and invokes the capability with `bound` merged under the call's
    /// arguments.
    pub fn executor(&self, injector: Arc<dyn Injector>, bound: Map<String, Value>) -> Handler {
        let capability = self.clone();
        Handler::new(move |args: Value| {
            let capability = capability.clone();
            let instance = injector.get(&capability.instance_token);
            let args = merge_args(&bound, args);
            async move {
                let instance = instance.ok_or_else(|| {
                    anyhow::anyhow!(
                        "no instance registered under {} for capability {}",
                        capability.instance_token,
                        capability.id
                    )
                })?;
                (capability.invoke)(instance, args).await
            }
        })
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("instance_token", &self.instance_token)
            .finish_non_exhaustive()
    }
}

/// Overlay call arguments on pre-bound ones. Non-object arguments are
/// ignored when anything is bound.
pub(crate) fn merge_args(bound: &Map<String, Value>, args: Value) -> Value {
    if bound.is_empty() {
        return args;
    }
    let mut merged = bound.clone();
    if let Value::Object(extra) = args {
        merged.extend(extra);
    }
    Value::Object(merged)
}

/// Capabilities by id.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    entries: HashMap<String, Arc<Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability, returning the one it replaced.
    pub fn register(&mut self, capability: Capability) -> Option<Arc<Capability>> {
        tracing::debug!("registering capability {}", capability.id);
        self.entries
            .insert(capability.id.clone(), Arc::new(capability))
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.register(capability);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<Capability>> {
        self.entries.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injector::{EmptyInjector, Provider, ProviderInjector};
    use std::sync::Mutex;

    struct Cart {
        items: Mutex<Vec<String>>,
    }

    fn add_item() -> Capability {
        Capability::new("cart.add", "add_to_cart", |cart: Arc<Cart>, args: Value| async move {
            let sku = args
                .get("sku")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("sku is required"))?
                .to_string();
            cart.items.lock().unwrap().push(sku.clone());
            Ok(json!({ "added": sku, "qty": args.get("qty").cloned().unwrap_or(Value::Null) }))
        })
        .describe("Add an item to the cart")
        .param(ParamSpec::new("sku", ParamKind::String).describe("Item SKU"))
        .param(ParamSpec::new("qty", ParamKind::Integer).optional())
        .instance("cart")
    }

    #[test]
    fn schema_marks_non_optional_params_required() {
        let (properties, required) = add_item().schema();
        assert_eq!(
            properties.get("sku"),
            Some(&json!({ "type": "string", "description": "Item SKU" }))
        );
        assert_eq!(properties.get("qty"), Some(&json!({ "type": "integer" })));
        assert_eq!(required, vec!["sku".to_string()]);
    }

    #[tokio::test]
    async fn executor_resolves_instance_and_merges_bound_args() {
        let cart = Arc::new(Cart {
            items: Mutex::new(Vec::new()),
        });
        let injector: Arc<dyn Injector> = Arc::new(ProviderInjector::new([Provider::shared(
            "cart",
            cart.clone() as Service,
        )]));
        let bound = json!({ "sku": "A-1" }).as_object().cloned().unwrap();
        let handler = add_item().executor(injector, bound);

        let out = handler.call(json!({ "qty": 2 })).await.unwrap();
        assert_eq!(out, json!({ "added": "A-1", "qty": 2 }));
        assert_eq!(*cart.items.lock().unwrap(), vec!["A-1".to_string()]);
    }

    #[tokio::test]
    async fn executor_fails_without_instance() {
        let handler = add_item().executor(Arc::new(EmptyInjector), Map::new());
        let err = handler.call(json!({ "sku": "x" })).await.unwrap_err();
        assert!(err.to_string().contains("no instance registered under cart"));
    }

    #[tokio::test]
    async fn executor_rejects_wrong_instance_type() {
        let injector: Arc<dyn Injector> =
            Arc::new(ProviderInjector::new([Provider::value("cart", 5u32)]));
        let handler = add_item().executor(injector, Map::new());
        assert!(handler.call(json!({ "sku": "x" })).await.is_err());
    }

    #[test]
    fn registry_replaces_by_id() {
        let mut registry = CapabilityRegistry::new();
        assert!(registry.register(add_item()).is_none());
        assert!(registry.register(add_item()).is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("cart.add").unwrap().name(), "add_to_cart");
    }

    #[test]
    fn bound_args_sit_under_call_args() {
        let bound = json!({ "a": 1, "b": 2 }).as_object().cloned().unwrap();
        assert_eq!(merge_args(&bound, json!({ "b": 3 })), json!({ "a": 1, "b": 3 }));
        assert_eq!(merge_args(&Map::new(), json!(7)), json!(7));
        assert_eq!(merge_args(&bound, Value::Null), json!({ "a": 1, "b": 2 }));
    }
}
