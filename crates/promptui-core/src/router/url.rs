// ABOUTME: Parses and builds page addresses: pathname, ordered query parameters, optional hash.
// ABOUTME: Accepts bare "/path" strings and "prompt://" URLs; repeated query keys collect into lists.

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use thiserror::Error;

/// Scheme prefix of fully qualified page URLs.
pub const SCHEME: &str = "prompt://";

/// Characters escaped when a pathname is written back into a URL. `/` is kept.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("invalid URL: empty string")]
    Empty,

    #[error("invalid URL format: must start with /: {0}")]
    MissingRoot(String),

    #[error("invalid URL format: expected prompt:// or /: {0}")]
    InvalidScheme(String),

    #[error("invalid URL encoding in {0}")]
    InvalidEncoding(String),
}

/// One query parameter's value: scalar when the key appeared once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    Single(String),
    Multi(Vec<String>),
}

impl QueryValue {
    /// The first value.
    pub fn first(&self) -> Option<&str> {
        match self {
            QueryValue::Single(v) => Some(v),
            QueryValue::Multi(vs) => vs.first().map(String::as_str),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            QueryValue::Single(v) => vec![v.as_str()],
            QueryValue::Multi(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            QueryValue::Single(existing) => {
                let first = std::mem::take(existing);
                *self = QueryValue::Multi(vec![first, value]);
            }
            QueryValue::Multi(vs) => vs.push(value),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(v: &str) -> Self {
        QueryValue::Single(v.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(v: String) -> Self {
        QueryValue::Single(v)
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(vs: Vec<String>) -> Self {
        QueryValue::Multi(vs)
    }
}

/// Query parameters in first-seen key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    entries: Vec<(String, QueryValue)>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`SearchParams::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// First value for `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(QueryValue::first)
    }

    /// Set `key`, replacing any existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Add a value for `key`; a second value turns the entry into a list.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => existing.push(value),
            None => self.entries.push((key, QueryValue::Single(value))),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<QueryValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Overlay `other` onto a copy of `self`: keys in both take `other`'s
    /// value at their existing position, new keys are appended.
    pub fn merged(&self, other: &SearchParams) -> SearchParams {
        let mut out = self.clone();
        for (key, value) in &other.entries {
            out.insert(key.clone(), value.clone());
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a `k=v&k=w` string (no leading `?`).
    pub fn parse(query: &str) -> Self {
        let mut params = SearchParams::new();
        for (key, value) in ::url::form_urlencoded::parse(query.as_bytes()) {
            params.append(key.into_owned(), value.into_owned());
        }
        params
    }

    /// Form-encode as `k=v&k=w`, with spaces as `%20`.
    pub fn to_query_string(&self) -> String {
        let mut serializer = ::url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.entries {
            for v in value.values() {
                serializer.append_pair(key, v);
            }
        }
        serializer.finish().replace('+', "%20")
    }
}

impl Serialize for SearchParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<QueryValue>> FromIterator<(K, V)> for SearchParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = SearchParams::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// A parsed page address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptUrl {
    href: String,
    pathname: String,
    query: SearchParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
}

impl PromptUrl {
    /// The string this URL was parsed from.
    pub fn href(&self) -> &str {
        &self.href
    }

    /// Decoded pathname, always starting with `/`.
    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    pub fn query(&self) -> &SearchParams {
        &self.query
    }

    /// Hash suffix including the leading `#`.
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// The `prompt://` form of this address.
    pub fn to_prompt_url(&self) -> String {
        format!(
            "{}{}",
            SCHEME,
            build_url(&self.pathname, &self.query, self.hash.as_deref())
        )
    }
}

/// Parse a root-relative address such as `/products/42?tab=specs#top`.
pub fn parse_url(raw: &str) -> Result<PromptUrl, UrlError> {
    if raw.trim().is_empty() {
        return Err(UrlError::Empty);
    }
    if !raw.starts_with('/') {
        return Err(UrlError::MissingRoot(raw.to_string()));
    }

    let (rest, hash) = match raw.find('#') {
        Some(i) => (&raw[..i], Some(raw[i..].to_string())),
        None => (raw, None),
    };
    let (path, query) = match rest.find('?') {
        Some(i) => (&rest[..i], SearchParams::parse(&rest[i + 1..])),
        None => (rest, SearchParams::new()),
    };

    let pathname = percent_decode_str(path)
        .decode_utf8()
        .map_err(|_| UrlError::InvalidEncoding(raw.to_string()))?
        .into_owned();

    Ok(PromptUrl {
        href: raw.to_string(),
        pathname,
        query,
        hash,
    })
}

/// Parse either a `prompt://` URL or a bare root-relative address. The part
/// after the scheme is the pathname; a missing leading `/` is supplied.
pub fn parse_prompt_url(raw: &str) -> Result<PromptUrl, UrlError> {
    if raw.trim().is_empty() {
        return Err(UrlError::Empty);
    }
    if let Some(rest) = raw.strip_prefix(SCHEME) {
        let rooted = if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{}", rest)
        };
        let mut url = parse_url(&rooted)?;
        url.href = raw.to_string();
        return Ok(url);
    }
    if raw.starts_with('/') {
        return parse_url(raw);
    }
    Err(UrlError::InvalidScheme(raw.to_string()))
}

/// Inverse of [`parse_url`]. `hash` may be given with or without its `#`.
pub fn build_url(pathname: &str, query: &SearchParams, hash: Option<&str>) -> String {
    let mut url = utf8_percent_encode(pathname, PATH).to_string();
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query.to_query_string());
    }
    if let Some(hash) = hash.filter(|h| !h.is_empty()) {
        if !hash.starts_with('#') {
            url.push('#');
        }
        url.push_str(hash);
    }
    url
}
