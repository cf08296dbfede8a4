// ABOUTME: The injector capability: an opaque token-to-service lookup supplied by the host.
// ABOUTME: Includes a provider-list implementation with parent chaining for per-render overrides.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A service value stored in an injector.
pub type Service = Arc<dyn Any + Send + Sync>;

/// Resolves services by token. The core never constructs services itself.
pub trait Injector: Send + Sync {
    fn get(&self, token: &str) -> Option<Service>;
}

/// Resolve a token and downcast the service to `T`.
pub fn resolve<T: Any + Send + Sync>(injector: &dyn Injector, token: &str) -> Option<Arc<T>> {
    injector.get(token).and_then(|svc| svc.downcast::<T>().ok())
}

/// An injector with nothing in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyInjector;

impl Injector for EmptyInjector {
    fn get(&self, _token: &str) -> Option<Service> {
        None
    }
}

/// A token bound to a service value.
#[derive(Clone)]
pub struct Provider {
    pub token: String,
    pub value: Service,
}

impl Provider {
    pub fn value<T: Any + Send + Sync>(token: impl Into<String>, value: T) -> Self {
        Self {
            token: token.into(),
            value: Arc::new(value),
        }
    }

    pub fn shared(token: impl Into<String>, value: Service) -> Self {
        Self {
            token: token.into(),
            value,
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider").field("token", &self.token).finish()
    }
}

/// Injector built from a provider list. Lookups fall through to the parent
/// when the token is not provided locally; later providers shadow earlier ones.
#[derive(Clone, Default)]
pub struct ProviderInjector {
    services: HashMap<String, Service>,
    parent: Option<Arc<dyn Injector>>,
}

impl ProviderInjector {
    pub fn new(providers: impl IntoIterator<Item = Provider>) -> Self {
        let services = providers.into_iter().map(|p| (p.token, p.value)).collect();
        Self {
            services,
            parent: None,
        }
    }

    pub fn with_parent(providers: impl IntoIterator<Item = Provider>, parent: Arc<dyn Injector>) -> Self {
        let mut injector = Self::new(providers);
        injector.parent = Some(parent);
        injector
    }

    pub fn provide(&mut self, provider: Provider) {
        self.services.insert(provider.token, provider.value);
    }
}

impl Injector for ProviderInjector {
    fn get(&self, token: &str) -> Option<Service> {
        self.services
            .get(token)
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|p| p.get(token)))
    }
}

impl fmt::Debug for ProviderInjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens: Vec<&String> = self.services.keys().collect();
        tokens.sort();
        f.debug_struct("ProviderInjector")
            .field("tokens", &tokens)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
