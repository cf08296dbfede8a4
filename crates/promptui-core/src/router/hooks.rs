// ABOUTME: Router hooks for components rendered by a page: params, location, navigation, query.
// ABOUTME: Location-reading hooks subscribe the occurrence to history changes so it re-renders.

use std::collections::BTreeMap;

use crate::env::RouterContext;
use crate::hooks::{Cleanup, HookError, Hooks};
use crate::router::history::{Location, NavigationHistory};
use crate::router::url::{SearchParams, UrlError, build_url};

impl Hooks<'_> {
    fn router_context(&self, hook: &'static str) -> Result<RouterContext, HookError> {
        self.env()
            .router()
            .cloned()
            .ok_or(HookError::MissingRouter { hook })
    }

    /// Re-render this occurrence whenever the history changes.
    fn follow_history(&mut self, history: &NavigationHistory) -> Result<(), HookError> {
        let updater = self.updater();
        let history = history.clone();
        self.use_effect_with(history.clone(), move || {
            let subscription = history.listen(move |_| {
                updater.request();
            });
            Some(Cleanup::new(move || subscription.unsubscribe()))
        })
    }

    /// Params bound by the matched route pattern.
    pub fn use_params(&mut self) -> Result<BTreeMap<String, String>, HookError> {
        Ok(self.router_context("use_params")?.params)
    }

    /// The current history location.
    pub fn use_location(&mut self) -> Result<Location, HookError> {
        let router = self.router_context("use_location")?;
        self.follow_history(&router.history)?;
        Ok(router.history.location())
    }

    /// A navigator bound to this page's history.
    pub fn use_navigate(&mut self) -> Result<Navigator, HookError> {
        let router = self.router_context("use_navigate")?;
        Ok(Navigator {
            history: router.history,
        })
    }

    /// Current query parameters plus a setter that merges into them.
    pub fn use_search_params(&mut self) -> Result<(SearchParams, SearchParamsSetter), HookError> {
        let router = self.router_context("use_search_params")?;
        self.follow_history(&router.history)?;
        let query = router.history.location().query;
        Ok((
            query,
            SearchParamsSetter {
                history: router.history,
            },
        ))
    }
}

/// Pushes or replaces history entries.
#[derive(Debug, Clone)]
pub struct Navigator {
    history: NavigationHistory,
}

impl Navigator {
    pub fn new(history: NavigationHistory) -> Self {
        Self { history }
    }

    /// Push `to`; `../` prefixes resolve against the current pathname.
    pub fn navigate(&self, to: &str) -> Result<(), UrlError> {
        self.navigate_with(to, false)
    }

    pub fn navigate_with(&self, to: &str, replace: bool) -> Result<(), UrlError> {
        let target = resolve_relative(&self.history.location().pathname, to);
        tracing::info!("navigating to {}", target);
        if replace {
            self.history.replace(&target)
        } else {
            self.history.push(&target)
        }
    }

    pub fn back(&self) {
        self.history.back();
    }

    pub fn forward(&self) {
        self.history.forward();
    }
}

/// Resolve a `../`-relative target against `current`. Other targets are
/// returned unchanged.
pub fn resolve_relative(current: &str, to: &str) -> String {
    if !to.starts_with("../") {
        return to.to_string();
    }
    let mut segments: Vec<&str> = current.split('/').filter(|s| !s.is_empty()).collect();
    let parts: Vec<&str> = to.split('/').collect();
    let up = parts.iter().filter(|s| **s == "..").count();
    segments.truncate(segments.len().saturating_sub(up));
    segments.extend(parts.iter().filter(|s| **s != ".." && !s.is_empty()));
    format!("/{}", segments.join("/"))
}

/// Setter returned by [`Hooks::use_search_params`].
#[derive(Debug, Clone)]
pub struct SearchParamsSetter {
    history: NavigationHistory,
}

impl SearchParamsSetter {
    /// Merge `params` over the current query and replace the current entry.
    pub fn set(&self, params: &SearchParams) -> Result<(), UrlError> {
        let location = self.history.location();
        let merged = location.query.merged(params);
        let url = build_url(&location.pathname, &merged, location.hash.as_deref());
        self.history.replace(&url)
    }
}
