//! Ordered, case-insensitive response header set.
//!
//! # Responsibilities
//! - Keep headers in insertion order, including repeated names
//! - Compare names case-insensitively (names are normalized by `HeaderName`)
//! - Mutation helpers used by filters and the orchestrator
//! - Conversion to and from `http::HeaderMap` at the transport edge
//!
//! # Design Decisions
//! - A flat `Vec` keeps the order `HeaderMap` does not guarantee after removals
//! - `insert` replaces in place so a rewritten header keeps its position
//! - Header sets are small; linear scans are fine

use std::fmt;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

/// Response headers as an ordered list of name/value entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderSet {
    /// Create an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First value of `name`, if any.
    pub fn get(&self, name: impl AsRef<str>) -> Option<&HeaderValue> {
        let name = name.as_ref();
        self.entries
            .iter()
            .find(|(k, _)| k.as_str().eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// First value of `name` as a string, skipping non-visible-ASCII values.
    pub fn get_str(&self, name: impl AsRef<str>) -> Option<&str> {
        self.get(name).and_then(|v| v.to_str().ok())
    }

    /// All values of `name` in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a HeaderValue> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.as_str().eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: impl AsRef<str>) -> bool {
        self.get(name).is_some()
    }

    /// Add a value after any existing ones.
    pub fn append(&mut self, name: HeaderName, value: HeaderValue) {
        self.entries.push((name, value));
    }

    /// Replace every value of `name` with `value`.
    ///
    /// The new value takes the position of the first existing entry, or goes
    /// to the end when the header was absent.
    pub fn insert(&mut self, name: HeaderName, value: HeaderValue) {
        match self.entries.iter().position(|(k, _)| *k == name) {
            Some(first) => {
                self.entries[first].1 = value;
                let mut idx = 0;
                self.entries.retain(|(k, _)| {
                    let keep = idx <= first || *k != name;
                    idx += 1;
                    keep
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Remove every value of `name`, returning how many were dropped.
    pub fn remove(&mut self, name: impl AsRef<str>) -> usize {
        let name = name.as_ref();
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.as_str().eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Parsed `Content-Length`, if present and well formed.
    pub fn content_length(&self) -> Option<u64> {
        self.get_str(header::CONTENT_LENGTH.as_str())
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn set_content_length(&mut self, len: u64) {
        self.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    /// Media type of `Content-Type`, lowercased and without parameters.
    pub fn content_type(&self) -> Option<String> {
        self.get_str(header::CONTENT_TYPE.as_str()).map(|v| {
            v.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    /// True when the body is already content-encoded (gzip, br, ...).
    pub fn is_encoded(&self) -> bool {
        self.get_str(header::CONTENT_ENCODING.as_str())
            .map(|v| !v.trim().eq_ignore_ascii_case("identity"))
            .unwrap_or(false)
    }

    /// Build a header set from a `HeaderMap`, keeping its iteration order.
    pub fn from_header_map(map: &HeaderMap) -> Self {
        let entries = map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self { entries }
    }

    /// Convert into a `HeaderMap` for the transport, preserving value order per name.
    pub fn into_header_map(self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (k, v) in self.entries {
            map.append(k, v);
        }
        map
    }
}

impl fmt::Display for HeaderSet {
    /// Wire form: one `name: value` line per entry, CRLF terminated.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in &self.entries {
            write!(f, "{}: {}\r\n", k, String::from_utf8_lossy(v.as_bytes()))?;
        }
        Ok(())
    }
}

impl FromIterator<(HeaderName, HeaderValue)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (HeaderName, HeaderValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<(HeaderName, HeaderValue)> for HeaderSet {
    fn extend<I: IntoIterator<Item = (HeaderName, HeaderValue)>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}
