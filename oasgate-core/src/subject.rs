//! Check subject: the immutable per-check view of an HTTP request.
//!
//! The edge proxy hands us an opaque bag of request attributes. Before the
//! validation engine can look at it, the attributes are copied into a
//! [`CheckSubject`] that owns its data outright. The original attributes are
//! never mutated, forwarded, or drained.
//!
//! # Header Semantics
//!
//! Header names are case-insensitive. They are stored lower-cased in an
//! ordered map, and a later value for the same name replaces an earlier one.
//! Since proxy header maps carry no ordering, incoming pairs are sorted by
//! their original name first so that "later" is deterministic.

use bytes::Bytes;
use std::collections::BTreeMap;

/// Attributes of one HTTP request as delivered by the edge proxy.
///
/// This is the transport seam of the pipeline. The proxy crate implements it
/// for Envoy's `AttributeContext.HttpRequest`; tests implement it for plain
/// structs.
pub trait HttpAttributes {
    /// Request method, as sent (e.g. `GET`).
    fn method(&self) -> &str;

    /// Request path, including any query string.
    fn path(&self) -> &str;

    /// Request host / authority.
    fn host(&self) -> &str;

    /// Every header pair supplied by the proxy.
    fn header_pairs(&self) -> Vec<(String, String)>;

    /// Raw request body. Empty when the proxy did not forward one.
    fn body(&self) -> &[u8];
}

/// Case-insensitive, single-value header map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: BTreeMap<String, String>,
}

impl HeaderMap {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, replacing any previous value for the same name.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.entries.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Looks up a header by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        if name.bytes().any(|b| b.is_ascii_uppercase()) {
            self.entries
                .get(&name.to_ascii_lowercase())
                .map(String::as_str)
        } else {
            self.entries.get(name).map(String::as_str)
        }
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no headers are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates headers in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (k, v) in iter {
            map.insert(k.as_ref(), v);
        }
        map
    }
}

/// The validation subject built for one check.
///
/// Owned by a single decision, immutable after construction, dropped once the
/// verdict has been produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSubject {
    method: String,
    path: String,
    host: String,
    headers: HeaderMap,
    body: Bytes,
}

impl CheckSubject {
    /// Creates a subject from already-normalized parts.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        host: impl Into<String>,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            host: host.into(),
            headers,
            body: body.into(),
        }
    }

    /// Adapts proxy attributes into a subject.
    ///
    /// Returns `None` when the check carries no HTTP attributes at all; the
    /// pipeline treats that as "nothing to validate".
    pub fn adapt<A: HttpAttributes + ?Sized>(attributes: Option<&A>) -> Option<Self> {
        let attrs = attributes?;

        let mut pairs = attrs.header_pairs();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        let headers: HeaderMap = pairs.into_iter().collect();

        Some(Self {
            method: attrs.method().to_string(),
            path: attrs.path().to_string(),
            host: attrs.host().to_string(),
            headers,
            body: Bytes::copy_from_slice(attrs.body()),
        })
    }

    /// Request method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request path, query string included.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path with the query string removed.
    pub fn path_without_query(&self) -> &str {
        match self.path.split_once('?') {
            Some((path, _)) => path,
            None => &self.path,
        }
    }

    /// Raw query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.path.split_once('?').map(|(_, q)| q)
    }

    /// Request host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Media type from `content-type`, lower-cased, parameters stripped.
    pub fn content_type(&self) -> Option<String> {
        let raw = self.headers.get("content-type")?;
        let media = raw.split(';').next().unwrap_or_default().trim();
        if media.is_empty() {
            None
        } else {
            Some(media.to_ascii_lowercase())
        }
    }
}
