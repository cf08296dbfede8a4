// ABOUTME: Router: URL parsing/building, route matching and ranking, navigation history, router hooks.
// ABOUTME: Pages bind a history and matched params into the render environment for the hooks.

pub mod history;
pub mod hooks;
pub mod matcher;
pub mod url;

pub use history::{Location, NavigationAction, NavigationHistory, NavigationUpdate};
pub use hooks::{Navigator, SearchParamsSetter, resolve_relative};
pub use matcher::{PathMatch, compare_specificity, match_route, rank_routes};
pub use url::{
    PromptUrl, QueryValue, SCHEME, SearchParams, UrlError, build_url, parse_prompt_url, parse_url,
};
