// ABOUTME: Core of promptui: renders component trees to VNodes, then to prompt text and a tool catalogue.
// ABOUTME: Also hosts the hooks runtime, update scheduler, and router used by pages.

pub mod emit;
pub mod env;
pub mod hooks;
pub mod injector;
pub mod node;
pub mod props;
pub mod render;
pub mod router;
pub mod subscription;
pub mod tools;
pub mod vnode;

pub use emit::{OutputFormat, emit, render_to_html, render_to_markdown};
pub use env::{RenderEnv, RouterContext};
pub use hooks::{Cleanup, ContextId, HookError, HookRuntime, Hooks, Scheduler};
pub use injector::{EmptyInjector, Injector, Provider, ProviderInjector, Service};
pub use node::{Component, ComponentNode, ElementDesc, Node, el};
pub use props::{Handler, PropValue, Props};
pub use render::{RenderError, Renderer, render, render_async};
pub use router::{NavigationHistory, PromptUrl, SearchParams, UrlError};
pub use subscription::Subscription;
pub use tools::{
    Capability, CapabilityRegistry, ExecutorTable, ExtractResult, ParamKind, ParamSpec, Tool,
    ToolDefinition, ToolError, ToolExtractor, ToolKind, normalize_tools,
};
pub use vnode::VNode;
