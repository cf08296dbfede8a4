// ABOUTME: Browser: the route table and shared host services that open prompt URLs as Pages.
// ABOUTME: Routes are ranked by specificity; the first matching pattern binds the page's params.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use promptui_core::router::{compare_specificity, match_route, parse_prompt_url};
use promptui_core::{
    CapabilityRegistry, Component, EmptyInjector, Handler, Injector, OutputFormat, Provider,
    RenderError, ToolError, UrlError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::page::{Page, PageInit};

/// Injector token under which pages expose the current [`BrowserContext`].
pub const BROWSER_CONTEXT: &str = "promptui.browser_context";

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("invalid URL format: {0}")]
    InvalidUrl(#[from] UrlError),

    #[error("route not found: {0}")]
    RouteNotFound(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("page not initialized; call render first")]
    NotRendered,

    #[error("cannot go back: already at the first page")]
    CannotGoBack,

    #[error("cannot go forward: already at the latest page")]
    CannotGoForward,
}

/// Cookie and local-storage state visible to every page a browser opens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserContext {
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    #[serde(default)]
    pub local_storage: BTreeMap<String, String>,
}

impl BrowserContext {
    /// Overlay `other` on this context, key by key.
    pub fn merge(&mut self, other: BrowserContext) {
        self.cookies.extend(other.cookies);
        self.local_storage.extend(other.local_storage);
    }
}

/// A tool a route offers regardless of what its component renders.
#[derive(Clone)]
pub struct RouteTool {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Option<Value>,
    pub handler: Handler,
}

impl RouteTool {
    pub fn new(name: impl Into<String>, handler: Handler) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: None,
            handler,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// JSON-schema-like `{properties, required}` object for the arguments.
    pub fn parameters(mut self, schema: Value) -> Self {
        self.parameters = Some(schema);
        self
    }
}

impl fmt::Debug for RouteTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A path pattern bound to the component that renders it.
#[derive(Debug, Clone)]
pub struct Route {
    pub path: String,
    pub component: Component,
    pub tools: Vec<RouteTool>,
}

impl Route {
    pub fn new(path: impl Into<String>, component: Component) -> Self {
        Self {
            path: path.into(),
            component,
            tools: Vec::new(),
        }
    }

    pub fn tool(mut self, tool: RouteTool) -> Self {
        self.tools.push(tool);
        self
    }
}

/// Opens prompt URLs against a route table.
pub struct Browser {
    routes: Vec<Route>,
    injector: Arc<dyn Injector>,
    registry: Arc<CapabilityRegistry>,
    context: BrowserContext,
    format: OutputFormat,
}

impl Browser {
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Self {
        let mut routes: Vec<Route> = routes.into_iter().collect();
        routes.sort_by(|a, b| compare_specificity(&a.path, &b.path));
        Self {
            routes,
            injector: Arc::new(EmptyInjector),
            registry: Arc::new(CapabilityRegistry::new()),
            context: BrowserContext::default(),
            format: OutputFormat::default(),
        }
    }

    /// Host services every page resolves tokens against.
    pub fn with_injector(mut self, injector: Arc<dyn Injector>) -> Self {
        self.injector = injector;
        self
    }

    /// Capabilities `tool use=<id>` elements resolve against.
    pub fn with_registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_context(mut self, context: BrowserContext) -> Self {
        self.context = context;
        self
    }

    /// Merge `context` into the context handed to pages opened from now on.
    pub fn set_context(&mut self, context: BrowserContext) {
        self.context.merge(context);
    }

    pub fn context(&self) -> &BrowserContext {
        &self.context
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Route patterns in match order.
    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|r| r.path.as_str())
    }

    /// Parse `url`, pick the most specific matching route and return a page
    /// bound to it. `providers` are layered over the browser's injector for
    /// every render of the page.
    pub fn open(&self, url: &str, providers: Vec<Provider>) -> Result<Page, BrowserError> {
        let parsed = parse_prompt_url(url)?;
        let (route, matched) = self
            .routes
            .iter()
            .find_map(|route| match_route(&route.path, parsed.pathname()).map(|m| (route, m)))
            .ok_or_else(|| BrowserError::RouteNotFound(parsed.pathname().to_string()))?;

        tracing::info!("opened {} on route {}", url, route.path);

        Ok(Page::new(PageInit {
            route: route.clone(),
            params: matched.params,
            url: parsed,
            injector: Arc::clone(&self.injector),
            providers,
            registry: Arc::clone(&self.registry),
            context: self.context.clone(),
            format: self.format,
        }))
    }
}

impl fmt::Debug for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Browser")
            .field("routes", &self.routes.iter().map(|r| &r.path).collect::<Vec<_>>())
            .field("context", &self.context)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}
