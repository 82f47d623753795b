//! Per-request context handed to middleware and extractors.

use http::{HeaderMap, Method, Uri, Version};
use plover_http::protocol::{ConnectInfo, ParseError, RequestHead};

use crate::router::PathInfo;
use crate::state::StateMap;

/// Everything known about one request besides its body: the parsed head,
/// the transport endpoints, the route match and the merged route state.
///
/// The context is owned per request; middleware may mutate the headers
/// (e.g. to strip `Content-Encoding` after decompression).
#[derive(Debug)]
pub struct RequestContext {
    head: RequestHead,
    connect_info: ConnectInfo,
    path_info: PathInfo,
    query: QueryMap,
    state: StateMap,
}

impl RequestContext {
    pub(crate) fn new(
        head: RequestHead,
        connect_info: ConnectInfo,
        path_info: PathInfo,
        query: QueryMap,
        state: StateMap,
    ) -> Self {
        Self { head, connect_info, path_info, query, state }
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn method(&self) -> &Method {
        self.head.method()
    }

    pub fn uri(&self) -> &Uri {
        self.head.uri()
    }

    pub fn version(&self) -> Version {
        self.head.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.head.headers_mut()
    }

    pub fn connect_info(&self) -> &ConnectInfo {
        &self.connect_info
    }

    /// The route match: pattern, concrete path and captured parameters.
    pub fn path_info(&self) -> &PathInfo {
        &self.path_info
    }

    pub fn query(&self) -> &QueryMap {
        &self.query
    }

    /// State values merged from the matched route and its scopes.
    pub fn state(&self) -> &StateMap {
        &self.state
    }
}

/// The parsed query string: decoded key/value pairs in order of
/// appearance, plus the raw text for typed deserialization.
#[derive(Debug, Clone, Default)]
pub struct QueryMap {
    raw: String,
    pairs: Vec<(String, String)>,
}

impl QueryMap {
    /// Parses a raw query string (without the leading `?`).
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        if raw.is_empty() {
            return Ok(Self::default());
        }
        let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(raw)
            .map_err(|e| ParseError::invalid_head(format!("invalid query string: {e}")))?;
        Ok(Self { raw: raw.to_owned(), pairs })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// First value recorded for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_in_order() {
        let query = QueryMap::parse("a=1&b=2&a=3").unwrap();
        assert_eq!(query.len(), 3);
        assert_eq!(query.get("a"), Some("1"));
        assert_eq!(query.get("b"), Some("2"));

        let pairs: Vec<_> = query.iter().collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "2"), ("a", "3")]);
    }

    #[test]
    fn decodes_percent_escapes() {
        let query = QueryMap::parse("name=hello%20world&sym=%26").unwrap();
        assert_eq!(query.get("name"), Some("hello world"));
        assert_eq!(query.get("sym"), Some("&"));
    }

    #[test]
    fn empty_query_is_empty() {
        let query = QueryMap::parse("").unwrap();
        assert!(query.is_empty());
        assert_eq!(query.raw(), "");
    }
}
