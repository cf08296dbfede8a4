// ABOUTME: Per-render environment handed to components: the host injector and router context.
// ABOUTME: Sync components reach it through Hooks; async components receive it by value.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::injector::{EmptyInjector, Injector, Service};
use crate::router::NavigationHistory;

/// Routing state visible to components of a page.
#[derive(Debug, Clone)]
pub struct RouterContext {
    pub history: NavigationHistory,
    pub params: BTreeMap<String, String>,
}

/// Everything a component may consult besides its props.
#[derive(Clone)]
pub struct RenderEnv {
    injector: Arc<dyn Injector>,
    router: Option<RouterContext>,
}

impl RenderEnv {
    pub fn new(injector: Arc<dyn Injector>) -> Self {
        Self {
            injector,
            router: None,
        }
    }

    pub fn with_router(mut self, router: RouterContext) -> Self {
        self.router = Some(router);
        self
    }

    pub fn injector(&self) -> &Arc<dyn Injector> {
        &self.injector
    }

    /// Shorthand for `injector().get(token)`.
    pub fn get(&self, token: &str) -> Option<Service> {
        self.injector.get(token)
    }

    pub fn router(&self) -> Option<&RouterContext> {
        self.router.as_ref()
    }
}

impl Default for RenderEnv {
    fn default() -> Self {
        Self::new(Arc::new(EmptyInjector))
    }
}

impl fmt::Debug for RenderEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderEnv")
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}
