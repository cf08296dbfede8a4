// ABOUTME: Session: a bounded back/forward history of page URLs driving a Browser.
// ABOUTME: Each successful render with a non-empty prompt is handed to an optional snapshot sink.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use promptui_core::router::SCHEME;
use promptui_core::Provider;
use serde_json::Value;

use crate::browser::{Browser, BrowserError};
use crate::config::{DEFAULT_HISTORY_LIMIT, PromptuiConfig};
use crate::page::{Page, RenderResult};

/// The address a fresh session starts on.
pub const START_URL: &str = "prompt:///";

/// Receives every rendered prompt worth archiving.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn save_snapshot(&self, url: &str, prompt: &str) -> anyhow::Result<()>;
}

/// Prefix root-relative addresses with the prompt scheme.
pub fn normalize_url(url: &str) -> String {
    if url.starts_with('/') && !url.starts_with(SCHEME) {
        format!("{}{}", SCHEME, url)
    } else {
        url.to_string()
    }
}

/// Navigation state of one agent conversation.
pub struct Session {
    browser: Arc<Browser>,
    sink: Option<Arc<dyn SnapshotSink>>,
    history: Vec<String>,
    index: usize,
    limit: usize,
    providers: Vec<Provider>,
    page: Option<Page>,
    result: Option<RenderResult>,
}

impl Session {
    pub fn new(browser: Arc<Browser>) -> Self {
        Self {
            browser,
            sink: None,
            history: vec![START_URL.to_string()],
            index: 0,
            limit: DEFAULT_HISTORY_LIMIT,
            providers: Vec::new(),
            page: None,
            result: None,
        }
    }

    /// A session sized by `config`.
    pub fn with_config(browser: Arc<Browser>, config: &PromptuiConfig) -> Self {
        Self::new(browser).with_history_limit(config.history_limit)
    }

    pub fn with_sink(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Keep at most `limit` entries, dropping the oldest. At least one entry
    /// is always kept.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self.trim_history();
        self
    }

    pub fn current_url(&self) -> &str {
        &self.history[self.index]
    }

    pub fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    pub fn result(&self) -> Option<&RenderResult> {
        self.result.as_ref()
    }

    pub fn can_go_back(&self) -> bool {
        self.index > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.index + 1 < self.history.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Open `url`, record it as the newest history entry and render it.
    /// Entries ahead of the cursor are discarded. A URL that fails to open
    /// leaves the history untouched.
    pub async fn navigate(
        &mut self,
        url: &str,
        providers: Vec<Provider>,
    ) -> Result<RenderResult, BrowserError> {
        let url = normalize_url(url);
        tracing::info!("navigate: from {} to {}", self.current_url(), url);
        let page = self.browser.open(&url, providers.clone())?;

        self.history.truncate(self.index + 1);
        self.history.push(url);
        self.index = self.history.len() - 1;
        self.trim_history();

        self.show(page, providers).await
    }

    /// Render the current page again with the providers it was opened with.
    pub async fn refresh(&mut self) -> Result<RenderResult, BrowserError> {
        let page = match &self.page {
            Some(page) => page.clone(),
            None => self.browser.open(&self.history[self.index], self.providers.clone())?,
        };
        let providers = self.providers.clone();
        self.show(page, providers).await
    }

    pub async fn go_back(&mut self, providers: Vec<Provider>) -> Result<RenderResult, BrowserError> {
        if !self.can_go_back() {
            return Err(BrowserError::CannotGoBack);
        }
        self.move_to(self.index - 1, providers).await
    }

    pub async fn go_forward(
        &mut self,
        providers: Vec<Provider>,
    ) -> Result<RenderResult, BrowserError> {
        if !self.can_go_forward() {
            return Err(BrowserError::CannotGoForward);
        }
        self.move_to(self.index + 1, providers).await
    }

    /// Execute a tool of the current page.
    pub async fn execute(&self, name: &str, params: Value) -> Result<Value, BrowserError> {
        let page = self.page.as_ref().ok_or(BrowserError::NotRendered)?;
        Ok(page.execute(name, params).await?)
    }

    async fn move_to(
        &mut self,
        index: usize,
        providers: Vec<Provider>,
    ) -> Result<RenderResult, BrowserError> {
        let url = self.history[index].clone();
        tracing::info!("moving from {} to {}", self.current_url(), url);
        let page = self.browser.open(&url, providers.clone())?;
        self.index = index;
        self.show(page, providers).await
    }

    async fn show(
        &mut self,
        page: Page,
        providers: Vec<Provider>,
    ) -> Result<RenderResult, BrowserError> {
        if let Some(previous) = self.page.take() {
            if !previous.ptr_eq(&page) {
                previous.dispose();
            }
        }
        self.providers = providers;
        self.page = Some(page.clone());
        let result = page.render(Vec::new()).await?;
        self.result = Some(result.clone());
        self.save_snapshot(&result).await;
        Ok(result)
    }

    async fn save_snapshot(&self, result: &RenderResult) {
        let Some(sink) = &self.sink else {
            return;
        };
        if result.prompt.is_empty() {
            return;
        }
        let url = self.current_url();
        if let Err(err) = sink.save_snapshot(url, &result.prompt).await {
            tracing::warn!("failed to save snapshot for {}: {}", url, err);
        }
    }

    fn trim_history(&mut self) {
        if self.history.len() > self.limit {
            let excess = self.history.len() - self.limit;
            self.history.drain(..excess);
            self.index = self.index.saturating_sub(excess);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("history", &self.history)
            .field("index", &self.index)
            .field("limit", &self.limit)
            .field("snapshots", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}
