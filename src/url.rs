//! Composition of service URLs from a base address, a path and a query string.

use serde::Serialize;

use crate::error::{Error, Result};

/// A pre-encoded query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryString(String);

impl QueryString {
    /// Uses `query` verbatim.
    pub fn raw(query: impl Into<String>) -> Self {
        QueryString(query.into())
    }

    /// URL-encodes key/value pairs, keeping the order in which they are serialized.
    ///
    /// Accepts structs, ordered maps and sequences of pairs. Anything else (numbers, bare
    /// strings, nested sequences) fails with [`Error::MalformedQuery`].
    pub fn encode<T: Serialize + ?Sized>(pairs: &T) -> Result<Self> {
        serde_urlencoded::to_string(pairs)
            .map(QueryString)
            .map_err(Error::MalformedQuery)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for QueryString {
    fn from(query: &str) -> Self {
        QueryString::raw(query)
    }
}

impl From<String> for QueryString {
    fn from(query: String) -> Self {
        QueryString(query)
    }
}

/// Strips trailing slashes from the path component of `address`.
///
/// Query and fragment are left untouched. The result is stable under repeated application.
pub fn normalize_base(address: &str) -> String {
    let (head, tail) = match address.find(&['?', '#'][..]) {
        Some(idx) => address.split_at(idx),
        None => (address, ""),
    };

    let path_start = match head.find("://") {
        Some(idx) => head[idx + 3..].find('/').map(|pos| idx + 3 + pos),
        None => Some(0),
    };

    match path_start {
        Some(start) if head.ends_with('/') => {
            let path = head[start..].trim_end_matches('/');
            format!("{}{path}{tail}", &head[..start])
        }
        _ => address.to_owned(),
    }
}

/// Returns true if `path` is already an absolute `http` or `https` URL.
pub fn has_scheme(path: &str) -> bool {
    let starts_with = |prefix: &str| {
        path.get(..prefix.len())
            .is_some_and(|start| start.eq_ignore_ascii_case(prefix))
    };

    starts_with("http://") || starts_with("https://")
}

/// Joins `base` and `path` and appends `query`.
///
/// - An empty path or `/` resolves to the normalized base.
/// - An absolute `http(s)://` path replaces the base entirely.
/// - Otherwise one leading slash is dropped from `path` and the two are joined with `/`.
pub fn compose_url(base: &str, path: &str, query: Option<&QueryString>) -> String {
    let mut url = if has_scheme(path) {
        path.to_owned()
    } else if path.is_empty() || path == "/" {
        normalize_base(base)
    } else {
        let path = path.strip_prefix('/').unwrap_or(path);
        format!("{}/{path}", normalize_base(base))
    };

    if let Some(query) = query.filter(|query| !query.is_empty()) {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(query.as_str());
    }

    url
}
