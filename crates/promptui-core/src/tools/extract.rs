// ABOUTME: Walks a rendered VNode tree in document order and collects agent-callable tools.
// ABOUTME: Buttons, named inputs, links and tool elements become tools; their callbacks become executors.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::injector::{EmptyInjector, Injector};
use crate::props::{Handler, Props};
use crate::router::{NavigationHistory, build_url, parse_prompt_url};
use crate::tools::capability::{CapabilityRegistry, merge_args};
use crate::tools::{ExecutorTable, Tool, ToolKind, ToolParams};
use crate::vnode::{ElementNode, VNode};

/// Tools found in one tree plus the executors for those that have one.
#[derive(Debug, Clone, Default)]
pub struct ExtractResult {
    pub tools: Vec<Tool>,
    pub executors: ExecutorTable,
}

/// Extractor bound to a capability registry and the injector that supplies
/// capability instances.
#[derive(Clone)]
pub struct ToolExtractor {
    registry: Arc<CapabilityRegistry>,
    injector: Arc<dyn Injector>,
    history: Option<NavigationHistory>,
}

impl Default for ToolExtractor {
    fn default() -> Self {
        Self::new(Arc::new(CapabilityRegistry::new()), Arc::new(EmptyInjector))
    }
}

impl ToolExtractor {
    pub fn new(registry: Arc<CapabilityRegistry>, injector: Arc<dyn Injector>) -> Self {
        Self {
            registry,
            injector,
            history: None,
        }
    }

    /// Link tools without their own `onClick` push their target onto
    /// `history`.
    pub fn with_history(mut self, history: NavigationHistory) -> Self {
        self.history = Some(history);
        self
    }

    /// Collect tools in pre-order. A later tool reusing an earlier name is
    /// dropped.
    pub fn extract(&self, node: &VNode) -> ExtractResult {
        let mut pass = Pass {
            extractor: self,
            seen: HashSet::new(),
            result: ExtractResult::default(),
        };
        pass.visit(node);
        pass.result
    }
}

/// Extract with no capabilities registered.
pub fn extract(node: &VNode) -> ExtractResult {
    ToolExtractor::default().extract(node)
}

struct Found {
    tool: Tool,
    executor: Option<Handler>,
}

struct Pass<'a> {
    extractor: &'a ToolExtractor,
    seen: HashSet<String>,
    result: ExtractResult,
}

impl Pass<'_> {
    fn visit(&mut self, node: &VNode) {
        let VNode::Element(el) = node else {
            return;
        };

        let found = match el.tag.as_str() {
            "button" => button_tool(el),
            "input" => input_tool(el),
            "tool" => self.tool_element(el),
            "a" | "Link" => self.link_tool(el),
            _ => None,
        };
        if let Some(found) = found {
            self.record(found);
        }

        for child in &el.children {
            self.visit(child);
        }
    }

    fn record(&mut self, found: Found) {
        let name = found.tool.name.clone();
        if !self.seen.insert(name.clone()) {
            tracing::warn!("duplicate tool name {}; keeping the first occurrence", name);
            return;
        }
        if let Some(executor) = found.executor {
            self.result.executors.insert(name, executor);
        }
        self.result.tools.push(found.tool);
    }

    fn link_tool(&self, el: &ElementNode) -> Option<Found> {
        let href = el
            .props
            .non_empty_str("href")
            .or_else(|| el.props.non_empty_str("to"));
        let on_click = el.props.handler("onClick").cloned();
        if href.is_none() && on_click.is_none() {
            return None;
        }

        let label = el.text_content();
        let executor = match (on_click, href) {
            (Some(handler), _) => handler,
            (None, Some(href)) => navigate_handler(href, self.extractor.history.clone()),
            (None, None) => Handler::noop(),
        };

        Some(Found {
            tool: Tool {
                name: format!("navigate_{}", href.unwrap_or("custom")),
                kind: ToolKind::Button,
                description: Some(format!("Navigate to {}", label)),
                label,
                params: Some(ToolParams::default()),
                input_type: None,
                placeholder: None,
            },
            executor: Some(executor),
        })
    }

    fn tool_element(&self, el: &ElementNode) -> Option<Found> {
        match el.props.get("use") {
            Some(_) => self.capability_tool(el),
            None => manual_tool(el),
        }
    }

    fn capability_tool(&self, el: &ElementNode) -> Option<Found> {
        let id = el.props.non_empty_str("use")?;
        let Some(capability) = self.extractor.registry.get(id) else {
            tracing::debug!("skipping tool element: capability {} is not registered", id);
            return None;
        };

        let bound = object_prop(&el.props, "bind");
        let (properties, required) = capability.schema();
        let executor = capability.executor(Arc::clone(&self.extractor.injector), bound.clone());
        let description = Some(capability.description().to_string()).filter(|d| !d.is_empty());

        Some(Found {
            tool: Tool {
                name: capability.name().to_string(),
                kind: ToolKind::Button,
                label: el.text_content(),
                description,
                params: Some(ToolParams {
                    properties,
                    required,
                    bound,
                }),
                input_type: None,
                placeholder: None,
            },
            executor: Some(executor),
        })
    }
}

fn object_prop(props: &Props, key: &str) -> Map<String, Value> {
    props
        .json(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Infer a schema entry for a pre-bound value.
fn schema_for(value: &Value) -> Value {
    let json_type = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    json!({ "type": json_type, "default": value })
}

/// `data-params` is either a schema (`{properties, required}`) the agent
/// fills in, or a plain object of values bound by the page.
fn button_params(props: &Props) -> Option<ToolParams> {
    let value = props.json("data-params")?;
    let obj = value.as_object()?;
    if obj.get("properties").is_some_and(Value::is_object) {
        return ToolParams::from_schema(value);
    }
    Some(ToolParams {
        properties: obj.iter().map(|(k, v)| (k.clone(), schema_for(v))).collect(),
        required: Vec::new(),
        bound: obj.clone(),
    })
}

fn button_tool(el: &ElementNode) -> Option<Found> {
    let name = el
        .props
        .non_empty_str("data-action")
        .or_else(|| el.props.non_empty_str("id"))?;
    let params = button_params(&el.props);
    let bound = params.as_ref().map(|p| p.bound.clone()).unwrap_or_default();
    let executor = el
        .props
        .handler("onClick")
        .map(|handler| with_bound_args(handler.clone(), bound));

    Some(Found {
        tool: Tool {
            name: name.to_string(),
            kind: ToolKind::Button,
            label: el.text_content(),
            description: el.props.non_empty_str("title").map(str::to_string),
            params,
            input_type: None,
            placeholder: None,
        },
        executor,
    })
}

fn input_tool(el: &ElementNode) -> Option<Found> {
    let name = el.props.non_empty_str("name")?;
    let placeholder = el.props.non_empty_str("placeholder").map(str::to_string);
    let input_type = el.props.non_empty_str("type").unwrap_or("text").to_string();
    let label = placeholder.clone().unwrap_or_else(|| name.to_string());

    Some(Found {
        tool: Tool {
            name: name.to_string(),
            kind: ToolKind::Input,
            label,
            description: None,
            params: None,
            input_type: Some(input_type),
            placeholder,
        },
        executor: el.props.handler("onChange").cloned(),
    })
}

fn manual_tool(el: &ElementNode) -> Option<Found> {
    let name = el.props.non_empty_str("name")?;
    let params = el.props.json("params").and_then(ToolParams::from_schema);
    let executor = el.props.handler("execute").cloned().unwrap_or_else(Handler::noop);

    Some(Found {
        tool: Tool {
            name: name.to_string(),
            kind: ToolKind::Button,
            label: el.text_content(),
            description: el.props.non_empty_str("description").map(str::to_string),
            params,
            input_type: None,
            placeholder: None,
        },
        executor: Some(executor),
    })
}

/// Follow `href` through `history`. Without a history the target is only
/// reported back.
fn navigate_handler(href: &str, history: Option<NavigationHistory>) -> Handler {
    let href = href.to_string();
    Handler::from_fn(move |_| {
        let Some(history) = &history else {
            tracing::debug!("no history to follow link {}", href);
            return Ok(json!({ "href": href }));
        };
        let url = parse_prompt_url(&href)?;
        history.push(&build_url(url.pathname(), url.query(), url.hash()))?;
        Ok(json!({ "href": href }))
    })
}

fn with_bound_args(handler: Handler, bound: Map<String, Value>) -> Handler {
    if bound.is_empty() {
        return handler;
    }
    Handler::new(move |args| handler.call(merge_args(&bound, args)))
}
