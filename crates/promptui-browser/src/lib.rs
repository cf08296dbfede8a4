// ABOUTME: Page orchestration for promptui: route tables, opened pages, reactive pages, sessions.
// ABOUTME: Turns prompt:// URLs into rendered prompts plus executable tool catalogues.

pub mod browser;
pub mod config;
pub mod page;
pub mod reactive;
pub mod session;

pub use browser::{BROWSER_CONTEXT, Browser, BrowserContext, BrowserError, Route, RouteTool};
pub use config::{ConfigError, PromptuiConfig};
pub use page::{Page, RenderResult, ToolCall, WeakPage, browser_context};
pub use reactive::ReactivePage;
pub use session::{START_URL, Session, SnapshotSink, normalize_url};
