// ABOUTME: Tool catalogue types: extracted tools, their normalized LLM definitions, and executors.
// ABOUTME: Definitions follow the function-calling shape {name, description, parameters{type, properties, required}}.

pub mod capability;
pub mod extract;

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::props::Handler;

pub use capability::{Capability, CapabilityRegistry, ParamKind, ParamSpec};
pub use extract::{ExtractResult, ToolExtractor, extract};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("tool {name} failed: {source}")]
    Execution {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Button,
    Input,
}

/// Parameters a tool declares. `bound` values are supplied by the page
/// itself and are not asked of the agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolParams {
    pub properties: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub bound: Map<String, Value>,
}

impl ToolParams {
    /// Read a JSON-schema-like object: `{properties?, required?}`.
    pub fn from_schema(schema: &Value) -> Option<Self> {
        let obj = schema.as_object()?;
        let properties = obj
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let required = obj
            .get("required")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            properties,
            required,
            bound: Map::new(),
        })
    }
}

/// A tool found in a rendered tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ToolKind,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<ToolParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl Tool {
    pub fn button(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ToolKind::Button,
            label: label.into(),
            description: None,
            params: None,
            input_type: None,
            placeholder: None,
        }
    }

    /// The uniform definition handed to the agent.
    pub fn definition(&self) -> ToolDefinition {
        let description = self
            .description
            .clone()
            .filter(|d| !d.is_empty())
            .or_else(|| Some(self.label.clone()).filter(|l| !l.is_empty()))
            .unwrap_or_else(|| self.name.clone());

        let mut properties = Map::new();
        let mut required = Vec::new();
        if let Some(params) = &self.params {
            for (key, schema) in &params.properties {
                if !params.bound.contains_key(key) {
                    properties.insert(key.clone(), schema.clone());
                }
            }
            required.extend(
                params
                    .required
                    .iter()
                    .filter(|r| !params.bound.contains_key(*r))
                    .cloned(),
            );
        }

        if self.kind == ToolKind::Input {
            properties.insert("value".to_string(), self.value_schema());
            if !required.iter().any(|r| r == "value") {
                required.push("value".to_string());
            }
        }

        ToolDefinition {
            name: self.name.clone(),
            description,
            parameters: ParameterSchema {
                schema_type: "object".to_string(),
                properties,
                required: (!required.is_empty()).then_some(required),
            },
        }
    }

    fn value_schema(&self) -> Value {
        let json_type = match self.input_type.as_deref() {
            Some("number") | Some("range") => "number",
            Some("checkbox") => "boolean",
            _ => "string",
        };
        let description = self
            .placeholder
            .clone()
            .unwrap_or_else(|| format!("Value for {}", self.name));
        json!({ "type": json_type, "description": description })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

/// A tool as presented to the agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

/// Normalize extracted tools into agent-facing definitions, preserving order.
pub fn normalize_tools(tools: &[Tool]) -> Vec<ToolDefinition> {
    tools.iter().map(Tool::definition).collect()
}

/// Executable handlers keyed by tool name.
#[derive(Debug, Clone, Default)]
pub struct ExecutorTable {
    handlers: BTreeMap<String, Handler>,
}

impl ExecutorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name` unless the name is taken. Returns
    /// false when an earlier registration kept the name.
    pub fn insert(&mut self, name: impl Into<String>, handler: Handler) -> bool {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return false;
        }
        self.handlers.insert(name, handler);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invoke the handler registered for `name`.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let handler = self
            .handlers
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tracing::info!("executing tool {}", name);
        handler.call(args).await.map_err(|source| ToolError::Execution {
            name: name.to_string(),
            source,
        })
    }
}
