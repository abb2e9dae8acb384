//! Per-route URL splitting, specialized once at registration time.

use crate::context::Params;

/// Splits a request target into its path and query parameters.
///
/// Routes that never read query parameters get [`PathParser::PathOnly`], which only
/// cuts the URL at `?` and does no further work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathParser {
    PathOnly,
    WithQuery,
}

impl PathParser {
    pub fn compile(has_query_params: bool) -> Self {
        if has_query_params {
            Self::WithQuery
        } else {
            Self::PathOnly
        }
    }

    /// Returns the path (everything before the first `?`) and the parsed query map.
    ///
    /// ```rust
    /// use muzu::router::PathParser;
    ///
    /// let (path, query) = PathParser::WithQuery.parse("/search?q=rust%20lang&page=2");
    /// assert_eq!(path, "/search");
    /// assert_eq!(query.get("q"), Some("rust lang"));
    ///
    /// let (path, query) = PathParser::PathOnly.parse("/search?q=rust");
    /// assert_eq!(path, "/search");
    /// assert!(query.is_empty());
    /// ```
    pub fn parse<'u>(&self, url: &'u str) -> (&'u str, Params) {
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (url, None),
        };
        match (self, query) {
            (Self::WithQuery, Some(query)) => (path, parse_query(query)),
            _ => (path, Params::new()),
        }
    }
}

/// Parses `a=1&b&c=` pairs. Keys are taken verbatim; values are percent-decoded, falling
/// back to the raw text when decoding fails. Later duplicates overwrite earlier ones.
fn parse_query(query: &str) -> Params {
    let mut params = Params::new();
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key.is_empty() {
            continue;
        }
        let value = if value.is_empty() {
            String::new()
        } else {
            urlencoding::decode(value)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| value.to_owned())
        };
        params.insert(key, value);
    }
    params
}
