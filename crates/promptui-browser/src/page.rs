// ABOUTME: Page: one opened URL bound to its matched route, hook state, and current tool executors.
// ABOUTME: Renders to {prompt, tools}, executes tools by name, and tracks URL changes for subscribers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use promptui_core::injector::resolve;
use promptui_core::router::{Location, SCHEME, build_url, parse_prompt_url};
use promptui_core::tools::ToolParams;
use promptui_core::{
    CapabilityRegistry, ExecutorTable, HookRuntime, Injector, NavigationHistory, OutputFormat,
    PromptUrl, Props, Provider, ProviderInjector, RenderEnv, Renderer, RouterContext, Subscription,
    Tool, ToolDefinition, ToolError, ToolExtractor, emit, normalize_tools,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::browser::{BROWSER_CONTEXT, BrowserContext, BrowserError, Route, RouteTool};

/// Output of one page render.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderResult {
    pub prompt: String,
    /// Agent-facing definitions, in catalogue order.
    pub tools: Vec<ToolDefinition>,
    /// The catalogue as extracted, before normalization.
    pub extracted: Vec<Tool>,
}

/// One entry of a batched [`Page::executes`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub params: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// The browser context a page exposes to its components.
pub fn browser_context(env: &RenderEnv) -> Option<Arc<BrowserContext>> {
    resolve::<BrowserContext>(env.injector().as_ref(), BROWSER_CONTEXT)
}

type UrlSubscriber = Arc<dyn Fn(&PromptUrl) -> anyhow::Result<()> + Send + Sync>;

pub(crate) struct PageInit {
    pub route: Route,
    pub params: BTreeMap<String, String>,
    pub url: PromptUrl,
    pub injector: Arc<dyn Injector>,
    pub providers: Vec<Provider>,
    pub registry: Arc<CapabilityRegistry>,
    pub context: BrowserContext,
    pub format: OutputFormat,
}

struct PageState {
    url: PromptUrl,
    context: BrowserContext,
    executors: ExecutorTable,
    subscribers: Vec<(u64, UrlSubscriber)>,
    next_subscriber: u64,
}

struct PageInner {
    route: Route,
    params: BTreeMap<String, String>,
    injector: Arc<dyn Injector>,
    providers: Vec<Provider>,
    registry: Arc<CapabilityRegistry>,
    format: OutputFormat,
    runtime: HookRuntime,
    history: NavigationHistory,
    state: Mutex<PageState>,
    history_listener: Mutex<Option<Subscription>>,
}

/// Handle to an opened page. Clones share the same page.
#[derive(Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

/// Non-owning handle for callbacks the page itself stores.
#[derive(Clone)]
pub struct WeakPage {
    inner: Weak<PageInner>,
}

impl WeakPage {
    pub fn upgrade(&self) -> Option<Page> {
        self.inner.upgrade().map(|inner| Page { inner })
    }
}

impl Page {
    pub(crate) fn new(init: PageInit) -> Self {
        let history = NavigationHistory::new();
        let start = build_url(init.url.pathname(), init.url.query(), init.url.hash());
        if let Err(err) = history.push(&start) {
            tracing::warn!("could not seed history with {}: {}", start, err);
        }

        let page = Page {
            inner: Arc::new(PageInner {
                route: init.route,
                params: init.params,
                injector: init.injector,
                providers: init.providers,
                registry: init.registry,
                format: init.format,
                runtime: HookRuntime::new(),
                history,
                state: Mutex::new(PageState {
                    url: init.url,
                    context: init.context,
                    executors: ExecutorTable::new(),
                    subscribers: Vec::new(),
                    next_subscriber: 0,
                }),
                history_listener: Mutex::new(None),
            }),
        };

        let weak = page.downgrade();
        let listener = page.inner.history.listen(move |update| {
            if let Some(page) = weak.upgrade() {
                page.location_changed(&update.location);
            }
        });
        *page.lock_listener() = Some(listener);
        page
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listener(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.inner
            .history_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn downgrade(&self) -> WeakPage {
        WeakPage {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same page.
    pub fn ptr_eq(&self, other: &Page) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Pattern of the route this page was opened on.
    pub fn route(&self) -> &str {
        &self.inner.route.path
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.inner.params
    }

    /// A copy of the current URL.
    pub fn url(&self) -> PromptUrl {
        self.state().url.clone()
    }

    pub fn context(&self) -> BrowserContext {
        self.state().context.clone()
    }

    pub fn format(&self) -> OutputFormat {
        self.inner.format
    }

    /// The history components navigate through.
    pub fn history(&self) -> &NavigationHistory {
        &self.inner.history
    }

    pub fn runtime(&self) -> &HookRuntime {
        &self.inner.runtime
    }

    /// Merge `context` into the context exposed to the next render.
    pub fn set_context(&self, context: BrowserContext) {
        self.state().context.merge(context);
    }

    /// Evaluate the route component, emit the prompt and rebuild the tool
    /// catalogue and executor table. `providers` shadow the page's own for
    /// this render only.
    pub async fn render(&self, providers: Vec<Provider>) -> Result<RenderResult, BrowserError> {
        let (url, context) = {
            let state = self.state();
            (state.url.clone(), state.context.clone())
        };

        let mut layered = self.inner.providers.clone();
        layered.extend(providers);
        layered.push(Provider::value(BROWSER_CONTEXT, context));
        let injector: Arc<dyn Injector> = Arc::new(ProviderInjector::with_parent(
            layered,
            Arc::clone(&self.inner.injector),
        ));

        let env = RenderEnv::new(Arc::clone(&injector)).with_router(RouterContext {
            history: self.inner.history.clone(),
            params: self.inner.params.clone(),
        });
        let props = Props::new()
            .with("params", json!(self.inner.params))
            .with("searchParams", serde_json::to_value(url.query()).unwrap_or(Value::Null));

        let renderer = Renderer::new(self.inner.runtime.clone(), env);
        let tree = renderer
            .render_async(self.inner.route.component.with_props(props))
            .await?;

        let (prompt, mut extracted) = match &tree {
            Some(tree) => {
                let prompt = emit(tree, self.inner.format);
                let found = ToolExtractor::new(Arc::clone(&self.inner.registry), injector)
                    .with_history(self.inner.history.clone())
                    .extract(tree);
                (prompt, found)
            }
            None => (String::new(), Default::default()),
        };

        for route_tool in &self.inner.route.tools {
            if extracted.tools.iter().any(|t| t.name == route_tool.name) {
                tracing::warn!(
                    "route tool {} shadowed by a rendered tool of the same name",
                    route_tool.name
                );
                continue;
            }
            extracted.executors.insert(&route_tool.name, route_tool.handler.clone());
            extracted.tools.push(route_tool_entry(route_tool));
        }

        let result = RenderResult {
            prompt,
            tools: normalize_tools(&extracted.tools),
            extracted: extracted.tools,
        };
        self.state().executors = extracted.executors;

        tracing::info!("rendered {} with {} tools", url.href(), result.tools.len());
        Ok(result)
    }

    /// Invoke a tool from the most recent render.
    pub async fn execute(&self, name: &str, params: Value) -> Result<Value, ToolError> {
        let executors = self.state().executors.clone();
        executors.execute(name, params).await
    }

    /// Run `calls` in order, stopping at the first failure.
    pub async fn executes(&self, calls: &[ToolCall]) -> Result<Vec<Value>, ToolError> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(&call.name, call.params.clone()).await?);
        }
        Ok(results)
    }

    /// Register a URL-change callback. Failing callbacks are logged and do
    /// not stop the others.
    pub fn subscribe(
        &self,
        callback: impl Fn(&PromptUrl) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Subscription {
        let id = {
            let mut state = self.state();
            let id = state.next_subscriber;
            state.next_subscriber += 1;
            state.subscribers.push((id, Arc::new(callback)));
            id
        };
        let weak = self.downgrade();
        Subscription::new(move || {
            if let Some(page) = weak.upgrade() {
                page.state().subscribers.retain(|(sid, _)| *sid != id);
            }
        })
    }

    /// Move to `url` within this page. Subscribers are notified; nothing is
    /// re-rendered. The route and its params stay bound.
    pub fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let parsed = parse_prompt_url(url)?;
        tracing::info!("navigating {} to {}", self.inner.route.path, url);
        self.inner
            .history
            .push(&build_url(parsed.pathname(), parsed.query(), parsed.hash()))?;
        Ok(())
    }

    fn location_changed(&self, location: &Location) {
        let url = match parse_prompt_url(&format!("{}{}", SCHEME, location.href())) {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!("ignoring unparseable location {}: {}", location.href(), err);
                return;
            }
        };
        let subscribers: Vec<UrlSubscriber> = {
            let mut state = self.state();
            state.url = url.clone();
            state.subscribers.iter().map(|(_, s)| Arc::clone(s)).collect()
        };
        for subscriber in subscribers {
            if let Err(err) = subscriber(&url) {
                tracing::warn!("URL subscriber failed for {}: {}", url.href(), err);
            }
        }
    }

    /// Unmount every component occurrence and stop following the history.
    pub fn dispose(&self) {
        if let Some(listener) = self.lock_listener().take() {
            listener.unsubscribe();
        }
        self.inner.runtime.dispose();
        let mut state = self.state();
        state.executors = ExecutorTable::new();
        state.subscribers.clear();
    }
}

fn route_tool_entry(route_tool: &RouteTool) -> Tool {
    let mut tool = Tool::button(&route_tool.name, &route_tool.name);
    tool.description = route_tool.description.clone();
    tool.params = route_tool.parameters.as_ref().and_then(ToolParams::from_schema);
    tool
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("route", &self.inner.route.path)
            .field("url", &self.url().href())
            .field("format", &self.inner.format)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{Browser, Route};
    use promptui_core::{Component, Handler, Node, RenderError, el};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dashboard(saves: Arc<AtomicUsize>) -> Component {
        Component::new("Dashboard", move |_, _| {
            let saves = Arc::clone(&saves);
            Ok(el("div")
                .child(el("h1").child("Dashboard"))
                .child(
                    el("button")
                        .prop("data-action", "save")
                        .prop(
                            "onClick",
                            Handler::from_fn(move |_| {
                                saves.fetch_add(1, Ordering::SeqCst);
                                Ok(json!({ "saved": true }))
                            }),
                        )
                        .child("Save"),
                )
                .into())
        })
    }

    #[tokio::test]
    async fn render_emits_prompt_and_tools() {
        let saves = Arc::new(AtomicUsize::new(0));
        let browser = Browser::new([Route::new("/dashboard", dashboard(Arc::clone(&saves)))]);
        let page = browser.open("prompt:///dashboard", vec![]).unwrap();

        let result = page.render(vec![]).await.unwrap();
        assert!(result.prompt.contains("[Save]"), "prompt was {:?}", result.prompt);
        assert_eq!(
            serde_json::to_value(&result.extracted[0]).unwrap(),
            json!({ "name": "save", "type": "button", "label": "Save" })
        );
        assert_eq!(result.tools[0].name, "save");

        let out = page.execute("save", Value::Null).await.unwrap();
        assert_eq!(out, json!({ "saved": true }));
        assert_eq!(saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn execute_unknown_tool_is_not_found() {
        let browser = Browser::new([Route::new("/", dashboard(Arc::new(AtomicUsize::new(0))))]);
        let page = browser.open("/", vec![]).unwrap();
        page.render(vec![]).await.unwrap();

        let err = page.execute("launch", Value::Null).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(ref n) if n == "launch"));
    }

    #[tokio::test]
    async fn executes_stops_at_first_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (ok_calls, later_calls) = (Arc::clone(&calls), Arc::clone(&calls));
        let route = Route::new("/", Component::new("Empty", |_, _| Ok(Node::Empty)))
            .tool(RouteTool::new(
                "ok",
                Handler::from_fn(move |args| {
                    ok_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(args)
                }),
            ))
            .tool(RouteTool::new(
                "boom",
                Handler::from_fn(|_| Err(anyhow::anyhow!("exploded"))),
            ))
            .tool(RouteTool::new(
                "later",
                Handler::from_fn(move |_| {
                    later_calls.fetch_add(100, Ordering::SeqCst);
                    Ok(Value::Null)
                }),
            ));
        let page = Browser::new([route]).open("/", vec![]).unwrap();
        page.render(vec![]).await.unwrap();

        let results = page
            .executes(&[ToolCall::new("ok", json!(1)), ToolCall::new("ok", json!(2))])
            .await
            .unwrap();
        assert_eq!(results, vec![json!(1), json!(2)]);

        let err = page
            .executes(&[
                ToolCall::new("ok", json!(3)),
                ToolCall::new("boom", Value::Null),
                ToolCall::new("later", Value::Null),
            ])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exploded"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn route_tools_follow_rendered_tools() {
        let route = Route::new("/", dashboard(Arc::new(AtomicUsize::new(0))))
            .tool(
                RouteTool::new("refresh", Handler::noop())
                    .describe("Reload the dashboard")
                    .parameters(json!({
                        "properties": { "force": { "type": "boolean" } }
                    })),
            )
            .tool(RouteTool::new("save", Handler::noop()));
        let page = Browser::new([route]).open("/", vec![]).unwrap();
        let result = page.render(vec![]).await.unwrap();

        let names: Vec<&str> = result.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["save", "refresh"]);
        assert_eq!(result.tools[1].description, "Reload the dashboard");
        assert!(result.tools[1].parameters.properties.contains_key("force"));
    }

    #[tokio::test]
    async fn root_props_carry_params_and_query() {
        let product = Component::new("Product", |_, props| {
            let id = props
                .json("params")
                .and_then(|p| p.get("id"))
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_string();
            let tab = props
                .json("searchParams")
                .and_then(|q| q.get("tab"))
                .and_then(Value::as_str)
                .unwrap_or("none")
                .to_string();
            Ok(el("p").child(format!("product {} tab {}", id, tab)).into())
        });
        let page = Browser::new([Route::new("/products/:id", product)])
            .open("prompt:///products/42?tab=specs", vec![])
            .unwrap();
        let result = page.render(vec![]).await.unwrap();
        assert_eq!(result.prompt, "product 42 tab specs\n");
    }

    #[tokio::test]
    async fn components_see_context_and_providers() {
        let greeter = Component::new_async("Greeter", |env: RenderEnv, _props| async move {
            let user = browser_context(&env)
                .and_then(|ctx| ctx.cookies.get("user").cloned())
                .unwrap_or_default();
            let greeting = env
                .get("greeting")
                .and_then(|svc| svc.downcast::<String>().ok())
                .ok_or_else(|| RenderError::component(anyhow::anyhow!("no greeting")))?;
            Ok::<Node, RenderError>(el("p").child(format!("{} {}", greeting, user)).into())
        });
        let page = Browser::new([Route::new("/", greeter)]).open("/", vec![]).unwrap();
        page.set_context(BrowserContext {
            cookies: BTreeMap::from([("user".to_string(), "ada".to_string())]),
            local_storage: BTreeMap::new(),
        });

        let result = page
            .render(vec![Provider::value("greeting", "hello".to_string())])
            .await
            .unwrap();
        assert_eq!(result.prompt, "hello ada\n");

        let err = page.render(vec![]).await.unwrap_err();
        assert!(matches!(err, BrowserError::Render(_)));
    }

    #[tokio::test]
    async fn navigate_notifies_subscribers_and_swallows_failures() {
        let page = Browser::new([Route::new("/", Component::new("Home", |_, _| Ok(Node::Empty)))])
            .open("prompt:///", vec![])
            .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let failing = page.subscribe(|_| Err(anyhow::anyhow!("listener broke")));
        let recording = page.subscribe(move |url| {
            sink.lock().unwrap().push(url.pathname().to_string());
            Ok(())
        });

        page.navigate("prompt:///orders?page=2").unwrap();
        assert_eq!(page.url().pathname(), "/orders");
        assert_eq!(page.url().query().get_str("page"), Some("2"));
        assert_eq!(*seen.lock().unwrap(), vec!["/orders".to_string()]);

        recording.unsubscribe();
        failing.unsubscribe();
        page.navigate("/settings").unwrap();
        assert_eq!(page.url().pathname(), "/settings");
        assert_eq!(seen.lock().unwrap().len(), 1);

        assert!(matches!(
            page.navigate("ftp://nope").unwrap_err(),
            BrowserError::InvalidUrl(_)
        ));
    }

    #[tokio::test]
    async fn link_tools_move_the_page_url() {
        let menu = Component::new("Menu", |_, _| {
            Ok(el("div")
                .child(el("Link").prop("to", "/orders?page=2").child("Orders"))
                .into())
        });
        let page = Browser::new([Route::new("/", menu)]).open("/", vec![]).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _subscription = page.subscribe(move |url| {
            sink.lock().unwrap().push(url.pathname().to_string());
            Ok(())
        });

        let result = page.render(vec![]).await.unwrap();
        assert_eq!(result.tools[0].name, "navigate_/orders?page=2");
        assert_eq!(result.tools[0].description, "Navigate to Orders");

        page.execute("navigate_/orders?page=2", Value::Null).await.unwrap();
        assert_eq!(page.url().pathname(), "/orders");
        assert_eq!(page.url().query().get_str("page"), Some("2"));
        assert_eq!(*seen.lock().unwrap(), vec!["/orders".to_string()]);
    }

    #[tokio::test]
    async fn url_returns_independent_copies() {
        let page = Browser::new([Route::new("/*", Component::new("Any", |_, _| Ok(Node::Empty)))])
            .open("/a?x=1", vec![])
            .unwrap();
        let before = page.url();
        page.navigate("/b").unwrap();
        assert_eq!(before.pathname(), "/a");
        assert_eq!(page.url().pathname(), "/b");
    }

    #[tokio::test]
    async fn empty_render_has_no_prompt_or_tools() {
        let page = Browser::new([Route::new("/", Component::new("Nothing", |_, _| Ok(Node::Empty)))])
            .open("/", vec![])
            .unwrap();
        assert_eq!(page.render(vec![]).await.unwrap(), RenderResult::default());
    }
}
