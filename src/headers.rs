//! An ordered, duplicate-preserving header list and Cache-Control directive
//! parsing.
//!
//! `http::HeaderMap` preserves insertion order for a single name but not the
//! mixed order across names that §3 requires ("ordered list of name/value
//! pairs, duplicates preserved, order within a name preserved"), so the
//! entry's own header storage is a flat `Vec`, with `http::HeaderMap`
//! reserved for the edges that talk to `OriginExecutor`.

use std::collections::HashMap;
use std::fmt;

/// One header field as stored on a [`crate::entry::CacheEntry`] or carried on
/// a request/response value passed across this crate's interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// The header field name, as received (not normalized to lowercase).
    pub name: String,
    /// The header field value.
    pub value: String,
}

impl Header {
    /// Builds a header from a name/value pair.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

/// An ordered, duplicate-preserving list of headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList(pub Vec<Header>);

impl HeaderList {
    /// An empty header list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a header, preserving any existing header of the same name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(Header::new(name, value));
    }

    /// The first value for `name` (case-insensitive), if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// All values for `name` (case-insensitive), in stored order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.0.iter().filter(move |h| h.name.eq_ignore_ascii_case(name)).map(|h| h.value.as_str())
    }

    /// The number of headers named `name` (case-insensitive).
    pub fn count(&self, name: &str) -> usize {
        self.get_all(name).count()
    }

    /// Whether any header named `name` (case-insensitive) is present.
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|h| h.name.eq_ignore_ascii_case(name))
    }

    /// Removes every header named `name` (case-insensitive).
    pub fn remove(&mut self, name: &str) {
        self.0.retain(|h| !h.name.eq_ignore_ascii_case(name));
    }

    /// Replaces every header named `name` with `value`, appending at the
    /// position of the first existing occurrence (or the end if absent).
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.remove(name);
        self.push(name.to_string(), value);
    }

    /// Replaces all headers named `name` with `values`, keeping the
    /// insertion order of `values` and the relative position of other
    /// headers intact (used by the Entry Updater's per-name replace rule).
    pub fn replace_all(&mut self, name: &str, values: impl IntoIterator<Item = String>) {
        let position = self.0.iter().position(|h| h.name.eq_ignore_ascii_case(name));
        self.remove(name);
        let insert_at = position.unwrap_or(self.0.len());
        let new_headers: Vec<Header> =
            values.into_iter().map(|v| Header::new(name.to_string(), v)).collect();
        for (offset, header) in new_headers.into_iter().enumerate() {
            self.0.insert((insert_at + offset).min(self.0.len()), header);
        }
    }

    /// Iterates headers in stored order.
    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    /// Whether the list holds no headers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of headers in the list.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Builds a [`HeaderList`] from an `http::HeaderMap`, the edge type used
    /// at the [`crate::origin::OriginExecutor`] boundary. `HeaderMap`
    /// preserves insertion order for repeated names, so iterating it in
    /// order is enough to recover the ordered, duplicate-preserving shape
    /// §3 requires.
    pub fn from_header_map(map: &http::HeaderMap) -> Self {
        let mut list = Self::new();
        for (name, value) in map.iter() {
            if let Ok(value) = value.to_str() {
                list.push(name.as_str(), value);
            }
        }
        list
    }

    /// Converts back into an `http::HeaderMap` for handing to an
    /// [`crate::origin::OriginExecutor`] or an outbound `http::Response`.
    pub fn to_header_map(&self) -> crate::error::Result<http::HeaderMap> {
        let mut map = http::HeaderMap::with_capacity(self.0.len());
        for h in &self.0 {
            let name = http::header::HeaderName::from_bytes(h.name.as_bytes())?;
            let value = http::header::HeaderValue::from_str(&h.value)?;
            map.append(name, value);
        }
        Ok(map)
    }
}

impl fmt::Display for HeaderList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for h in &self.0 {
            writeln!(f, "{}: {}", h.name, h.value)?;
        }
        Ok(())
    }
}

impl FromIterator<Header> for HeaderList {
    fn from_iter<T: IntoIterator<Item = Header>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A parsed `Cache-Control` header: directive name lowercased, optional
/// value verbatim (quotes stripped).
#[derive(Debug, Clone, Default)]
pub struct CacheControl {
    directives: HashMap<String, Option<String>>,
}

impl CacheControl {
    /// Parses and merges every `Cache-Control` header present in `headers`.
    /// Malformed tokens (stray commas, empty segments) are skipped rather
    /// than causing a parse failure, matching how suitability and
    /// cacheability treat malformed directives as individually absent.
    pub fn parse(headers: &HeaderList) -> Self {
        let mut directives = HashMap::new();
        for raw in headers.get_all("cache-control") {
            for part in split_directives(raw) {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                match part.split_once('=') {
                    Some((name, value)) => {
                        let value = value.trim().trim_matches('"').to_string();
                        directives.insert(name.trim().to_ascii_lowercase(), Some(value));
                    }
                    None => {
                        directives.insert(part.to_ascii_lowercase(), None);
                    }
                }
            }
        }
        Self { directives }
    }

    /// Whether `directive` is present, with or without a value.
    pub fn has(&self, directive: &str) -> bool {
        self.directives.contains_key(directive)
    }

    /// The raw value string for `directive`, if it carries one.
    pub fn value(&self, directive: &str) -> Option<&str> {
        self.directives.get(directive).and_then(|v| v.as_deref())
    }

    /// Parses `directive`'s value as a non-negative integer number of
    /// seconds. A present-but-unparseable value returns `Some(None)` so
    /// callers can distinguish "absent" from "present but malformed" per
    /// the suitability checker's "malformed -> reject conservatively" rule.
    pub fn seconds(&self, directive: &str) -> Option<Option<u64>> {
        self.directives.get(directive).map(|v| match v {
            None => None,
            Some(s) => s.parse::<u64>().ok(),
        })
    }
}

/// Splits a Cache-Control value on top-level commas, respecting quoted
/// strings (a quoted value may itself contain commas, e.g. `no-cache="x,y"`).
fn split_directives(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_order_and_duplicates_across_names() {
        let mut h = HeaderList::new();
        h.push("Set-Cookie", "a=1");
        h.push("Content-Type", "text/plain");
        h.push("Set-Cookie", "b=2");
        assert_eq!(h.get_all("set-cookie").collect::<Vec<_>>(), vec!["a=1", "b=2"]);
        assert_eq!(h.0[1].name, "Content-Type");
    }

    #[test]
    fn cache_control_parses_flags_and_values() {
        let mut h = HeaderList::new();
        h.push("Cache-Control", "max-age=60, no-transform, private");
        let cc = CacheControl::parse(&h);
        assert_eq!(cc.seconds("max-age"), Some(Some(60)));
        assert!(cc.has("no-transform"));
        assert!(cc.has("private"));
        assert!(!cc.has("no-store"));
    }

    #[test]
    fn cache_control_malformed_value_is_present_but_unparseable() {
        let mut h = HeaderList::new();
        h.push("Cache-Control", "max-age=notanumber");
        let cc = CacheControl::parse(&h);
        assert_eq!(cc.seconds("max-age"), Some(None));
    }

    #[test]
    fn cache_control_quoted_value_with_comma() {
        let mut h = HeaderList::new();
        h.push("Cache-Control", r#"no-cache="x,y""#);
        let cc = CacheControl::parse(&h);
        assert_eq!(cc.value("no-cache"), Some("x,y"));
    }

    #[test]
    fn replace_all_keeps_position() {
        let mut h = HeaderList::new();
        h.push("A", "1");
        h.push("B", "old");
        h.push("C", "3");
        h.replace_all("B", vec!["new1".to_string(), "new2".to_string()]);
        let names: Vec<_> = h.iter().map(|x| x.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "B", "C"]);
    }
}
