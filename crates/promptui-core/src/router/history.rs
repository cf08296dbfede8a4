// ABOUTME: In-memory navigation history: an entry stack with a cursor and change listeners.
// ABOUTME: push truncates forward entries, replace overwrites in place, back/forward/go clamp.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::router::url::{PromptUrl, SearchParams, UrlError, build_url, parse_url};
use crate::subscription::Subscription;

/// One history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub pathname: String,
    pub query: SearchParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Location {
    /// The location reported by an empty history.
    pub fn root() -> Self {
        Self {
            pathname: "/".to_string(),
            query: SearchParams::new(),
            hash: None,
        }
    }

    /// Root-relative address of this location.
    pub fn href(&self) -> String {
        build_url(&self.pathname, &self.query, self.hash.as_deref())
    }
}

impl From<&PromptUrl> for Location {
    fn from(url: &PromptUrl) -> Self {
        Self {
            pathname: url.pathname().to_string(),
            query: url.query().clone(),
            hash: url.hash().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NavigationAction {
    Push,
    Replace,
    Pop,
}

/// Delivered to history listeners after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationUpdate {
    pub action: NavigationAction,
    pub location: Location,
}

type HistoryListener = Arc<dyn Fn(&NavigationUpdate) + Send + Sync>;

#[derive(Default)]
struct HistoryState {
    entries: Vec<Location>,
    index: Option<usize>,
    listeners: Vec<(u64, HistoryListener)>,
    next_listener_id: u64,
}

/// Shared handle to one history stack. Clones observe the same stack;
/// equality is identity.
#[derive(Clone, Default)]
pub struct NavigationHistory {
    state: Arc<Mutex<HistoryState>>,
}

impl NavigationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HistoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, action: NavigationAction, location: Location) {
        let listeners: Vec<HistoryListener> = self
            .state()
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        let update = NavigationUpdate { action, location };
        for listener in listeners {
            listener(&update);
        }
    }

    /// Current entry, or `/` when the history is empty.
    pub fn location(&self) -> Location {
        let state = self.state();
        state
            .index
            .and_then(|i| state.entries.get(i).cloned())
            .unwrap_or_else(Location::root)
    }

    pub fn index(&self) -> Option<usize> {
        self.state().index
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries after the cursor, append, and move the cursor to it.
    pub fn push(&self, url: &str) -> Result<(), UrlError> {
        let location = Location::from(&parse_url(url)?);
        {
            let mut state = self.state();
            let keep = state.index.map_or(0, |i| i + 1);
            state.entries.truncate(keep);
            state.entries.push(location.clone());
            state.index = Some(state.entries.len() - 1);
        }
        tracing::debug!("history push {}", location.href());
        self.notify(NavigationAction::Push, location);
        Ok(())
    }

    /// Overwrite the current entry; an empty history gets its first entry.
    pub fn replace(&self, url: &str) -> Result<(), UrlError> {
        let location = Location::from(&parse_url(url)?);
        {
            let mut state = self.state();
            match state.index {
                Some(i) => state.entries[i] = location.clone(),
                None => {
                    state.entries.push(location.clone());
                    state.index = Some(0);
                }
            }
        }
        tracing::debug!("history replace {}", location.href());
        self.notify(NavigationAction::Replace, location);
        Ok(())
    }

    pub fn back(&self) {
        self.go(-1);
    }

    pub fn forward(&self) {
        self.go(1);
    }

    /// Move the cursor by `delta`, clamped to the stack. No notification when
    /// the cursor does not move.
    pub fn go(&self, delta: isize) {
        let moved = {
            let mut state = self.state();
            let Some(current) = state.index else {
                return;
            };
            let last = state.entries.len() - 1;
            let target = current.saturating_add_signed(delta).min(last);
            if target == current {
                None
            } else {
                state.index = Some(target);
                Some(state.entries[target].clone())
            }
        };
        if let Some(location) = moved {
            self.notify(NavigationAction::Pop, location);
        }
    }

    pub fn can_go_back(&self) -> bool {
        self.state().index.is_some_and(|i| i > 0)
    }

    pub fn can_go_forward(&self) -> bool {
        let state = self.state();
        state.index.is_some_and(|i| i + 1 < state.entries.len())
    }

    /// Register a listener; listeners fire in registration order.
    pub fn listen(&self, listener: impl Fn(&NavigationUpdate) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut state = self.state();
            let id = state.next_listener_id;
            state.next_listener_id += 1;
            state.listeners.push((id, Arc::new(listener)));
            id
        };
        let weak = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = weak.upgrade() {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                state.listeners.retain(|(lid, _)| *lid != id);
            }
        })
    }

    pub fn ptr_eq(&self, other: &NavigationHistory) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl PartialEq for NavigationHistory {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for NavigationHistory {}

impl fmt::Debug for NavigationHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("NavigationHistory")
            .field("index", &state.index)
            .field("len", &state.entries.len())
            .finish()
    }
}
