// ABOUTME: ReactivePage: a Page that re-renders itself whenever hook state changes.
// ABOUTME: Observes the page's scheduler, refreshes once per flushed batch, and fans results out to listeners.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use promptui_core::{Provider, Subscription, ToolDefinition};
use tokio::task::JoinHandle;

use crate::browser::BrowserError;
use crate::page::{Page, RenderResult};

type RenderListener = Arc<dyn Fn(&RenderResult) + Send + Sync>;

#[derive(Default)]
struct ReactiveState {
    /// Providers of the last explicit render; `None` until the first one.
    providers: Option<Vec<Provider>>,
    current: Option<RenderResult>,
    listeners: Vec<(u64, RenderListener)>,
    next_listener: u64,
    observer: Option<Subscription>,
    driver: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct ReactiveShared {
    state: Mutex<ReactiveState>,
    refreshing: tokio::sync::Mutex<()>,
}

impl Drop for ReactiveShared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(driver) = state.driver.take() {
            driver.abort();
        }
    }
}

/// A page bound to its scheduler. Clones share listeners and the last result.
#[derive(Clone)]
pub struct ReactivePage {
    page: Page,
    shared: Arc<ReactiveShared>,
}

impl ReactivePage {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            shared: Arc::new(ReactiveShared::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ReactiveState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Render with `providers` and keep re-rendering with them on every
    /// scheduler flush until disposed.
    pub async fn render(&self, providers: Vec<Provider>) -> Result<RenderResult, BrowserError> {
        {
            let mut state = self.state();
            state.providers = Some(providers);
            if state.observer.is_none() {
                state.observer = Some(self.observe_scheduler());
            }
            if state.driver.is_none() {
                state.driver = Some(self.page.runtime().scheduler().spawn_driver());
            }
        }
        self.refresh().await
    }

    fn observe_scheduler(&self) -> Subscription {
        let page = self.page.downgrade();
        let shared = Arc::downgrade(&self.shared);
        self.page.runtime().scheduler().observe(move |batch| {
            let (Some(page), Some(shared)) = (page.upgrade(), shared.upgrade()) else {
                return;
            };
            tracing::debug!("{} occurrences changed on {}; refreshing", batch.len(), page.route());
            let reactive = ReactivePage { page, shared };
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(err) = reactive.refresh().await {
                            tracing::warn!("refresh of {} failed: {}", reactive.page.route(), err);
                        }
                    });
                }
                Err(_) => tracing::warn!("no async runtime available to refresh {}", reactive.page.route()),
            }
        })
    }

    /// Re-render with the providers of the last [`ReactivePage::render`] and
    /// notify render listeners.
    pub async fn refresh(&self) -> Result<RenderResult, BrowserError> {
        let _serialized = self.shared.refreshing.lock().await;
        let providers = self.state().providers.clone().ok_or(BrowserError::NotRendered)?;
        let result = self.page.render(providers).await?;

        let listeners: Vec<RenderListener> = {
            let mut state = self.state();
            state.current = Some(result.clone());
            state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in listeners {
            listener(&result);
        }
        Ok(result)
    }

    /// Call `listener` after every completed render.
    pub fn on_render(&self, listener: impl Fn(&RenderResult) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut state = self.state();
            let id = state.next_listener;
            state.next_listener += 1;
            state.listeners.push((id, Arc::new(listener)));
            id
        };
        let shared = Arc::downgrade(&self.shared);
        Subscription::new(move || {
            if let Some(shared) = shared.upgrade() {
                let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
                state.listeners.retain(|(lid, _)| *lid != id);
            }
        })
    }

    pub fn current(&self) -> Option<RenderResult> {
        self.state().current.clone()
    }

    /// Prompt of the last render, empty before the first.
    pub fn current_prompt(&self) -> String {
        self.state()
            .current
            .as_ref()
            .map(|r| r.prompt.clone())
            .unwrap_or_default()
    }

    /// Tools of the last render, empty before the first.
    pub fn current_tools(&self) -> Vec<ToolDefinition> {
        self.state()
            .current
            .as_ref()
            .map(|r| r.tools.clone())
            .unwrap_or_default()
    }

    /// Stop reacting to state changes and unmount the page.
    pub fn dispose(&self) {
        let (observer, driver) = {
            let mut state = self.state();
            state.listeners.clear();
            state.current = None;
            state.providers = None;
            (state.observer.take(), state.driver.take())
        };
        if let Some(observer) = observer {
            observer.unsubscribe();
        }
        if let Some(driver) = driver {
            driver.abort();
        }
        self.page.dispose();
        tracing::debug!("disposed reactive page {}", self.page.route());
    }
}

impl fmt::Debug for ReactivePage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactivePage")
            .field("page", &self.page)
            .finish_non_exhaustive()
    }
}
