// ABOUTME: Built-in demo apps for the CLI: a home page, a hook-driven counter, and a todo list.
// ABOUTME: The todo list exercises injected services, a registered capability, params and async components.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use promptui_browser::{Browser, Route, RouteTool};
use promptui_core::injector::resolve;
use promptui_core::{
    Capability, CapabilityRegistry, Component, Handler, Node, OutputFormat, ParamKind, ParamSpec,
    Provider, ProviderInjector, RenderEnv, RenderError, el,
};
use serde::Serialize;
use serde_json::{Value, json};

/// Injector token of the shared [`TodoStore`].
pub const TODOS: &str = "demo.todos";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Todo {
    pub id: u64,
    pub title: String,
    pub done: bool,
}

/// In-memory todo list shared by every page of the demo.
#[derive(Debug, Default)]
pub struct TodoStore {
    items: Mutex<Vec<Todo>>,
}

impl TodoStore {
    pub fn with_items(titles: &[&str]) -> Self {
        let store = Self::default();
        for title in titles {
            store.add(title);
        }
        store
    }

    pub fn add(&self, title: &str) -> Todo {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let todo = Todo {
            id: items.iter().map(|t| t.id).max().unwrap_or(0) + 1,
            title: title.to_string(),
            done: false,
        };
        items.push(todo.clone());
        todo
    }

    /// Flip the done flag, returning the updated item.
    pub fn toggle(&self, id: u64) -> Option<Todo> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let todo = items.iter_mut().find(|t| t.id == id)?;
        todo.done = !todo.done;
        Some(todo.clone())
    }

    pub fn get(&self, id: u64) -> Option<Todo> {
        self.list().into_iter().find(|t| t.id == id)
    }

    pub fn list(&self) -> Vec<Todo> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn home() -> Component {
    Component::new("Home", |_, _| {
        Ok(el("div")
            .child(el("h1").child("promptui demo"))
            .child(el("p").child("Pick a page to open."))
            .child(
                el("ul").children([
                    el("li").child(el("Link").prop("to", "/counter").child("Counter")),
                    el("li").child(el("Link").prop("to", "/todos").child("Todo list")),
                ]),
            )
            .into())
    })
}

fn counter() -> Component {
    Component::new("Counter", |hooks, _| {
        let (count, set_count) = hooks.use_state(0i64)?;

        let inc = set_count.clone();
        let dec = set_count.clone();
        let set = set_count;
        Ok(el("div")
            .child(el("h1").child("Counter"))
            .child(el("p").child(format!("Count: {}", count)))
            .child(
                el("button")
                    .prop("data-action", "increment")
                    .prop("title", "Add one to the count")
                    .prop(
                        "onClick",
                        Handler::from_fn(move |_| {
                            inc.update(|c| c + 1);
                            Ok(json!({ "count": count + 1 }))
                        }),
                    )
                    .child("Increment"),
            )
            .child(
                el("button")
                    .prop("data-action", "decrement")
                    .prop(
                        "onClick",
                        Handler::from_fn(move |_| {
                            dec.update(|c| c - 1);
                            Ok(json!({ "count": count - 1 }))
                        }),
                    )
                    .child("Decrement"),
            )
            .child(
                el("input")
                    .prop("name", "set_count")
                    .prop("type", "number")
                    .prop("placeholder", "New count")
                    .prop(
                        "onChange",
                        Handler::from_fn(move |args| {
                            let value = args
                                .get("value")
                                .and_then(Value::as_i64)
                                .context("value must be an integer")?;
                            set.set(value);
                            Ok(json!({ "count": value }))
                        }),
                    ),
            )
            .into())
    })
}

fn todo_list() -> Component {
    Component::new("TodoList", |hooks, _| {
        let store = resolve::<TodoStore>(hooks.env().injector().as_ref(), TODOS)
            .ok_or_else(|| RenderError::component(anyhow::anyhow!("todo store is not provided")))?;
        let todos = store.list();

        let items: Vec<Node> = todos
            .iter()
            .map(|todo| {
                let store = Arc::clone(&store);
                let id = todo.id;
                let mark = if todo.done { "x" } else { " " };
                el("li")
                    .key(todo.id.to_string())
                    .child(format!("[{}] {} ", mark, todo.title))
                    .child(
                        el("button")
                            .prop("data-action", format!("toggle_{}", id))
                            .prop("title", format!("Toggle \"{}\"", todo.title))
                            .prop(
                                "onClick",
                                Handler::from_fn(move |_| {
                                    let todo = store
                                        .toggle(id)
                                        .with_context(|| format!("no todo with id {}", id))?;
                                    Ok(serde_json::to_value(todo)?)
                                }),
                            )
                            .child("Toggle"),
                    )
                    .into()
            })
            .collect();

        let body: Node = if items.is_empty() {
            el("p").child("Nothing to do.").into()
        } else {
            el("ul").children(items).into()
        };

        Ok(el("div")
            .child(el("h1").child(format!("Todos ({})", todos.len())))
            .child(body)
            .child(el("tool").prop("use", "todos.add").child("Add todo"))
            .into())
    })
}

fn todo_detail() -> Component {
    Component::new_async("TodoDetail", |env: RenderEnv, props| async move {
        let id = props
            .json("params")
            .and_then(|p| p.get("id"))
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<u64>().ok());
        let store = resolve::<TodoStore>(env.injector().as_ref(), TODOS);
        let todo = id.zip(store).and_then(|(id, store)| store.get(id));

        let node: Node = match todo {
            Some(todo) => el("div")
                .child(el("h2").child(todo.title.clone()))
                .child(el("p").child(if todo.done { "Done." } else { "Still open." }))
                .into(),
            None => el("p").child("No such todo.").into(),
        };
        Ok::<Node, RenderError>(node)
    })
}

fn add_todo() -> Capability {
    Capability::new("todos.add", "add_todo", |store: Arc<TodoStore>, args: Value| async move {
        let title = args
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .context("title is required")?;
        Ok::<Value, anyhow::Error>(serde_json::to_value(store.add(title))?)
    })
    .describe("Add an item to the todo list")
    .param(ParamSpec::new("title", ParamKind::String).describe("What needs doing"))
    .instance(TODOS)
}

/// The demo route table with a seeded todo store.
pub fn browser(format: OutputFormat) -> Browser {
    let store = TodoStore::with_items(&["Write the release notes", "Review open pull requests"]);
    let injector = ProviderInjector::new([Provider::value(TODOS, store)]);

    Browser::new([
        Route::new("/", home()),
        Route::new("/counter", counter()),
        Route::new("/todos", todo_list()).tool(
            RouteTool::new("todo_count", Handler::noop())
                .describe("Report how many todos exist; the page shows the count"),
        ),
        Route::new("/todos/:id", todo_detail()),
    ])
    .with_injector(Arc::new(injector))
    .with_registry(CapabilityRegistry::new().with(add_todo()))
    .with_format(format)
}
