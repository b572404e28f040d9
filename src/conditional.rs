//! Conditional Request Builder (§4.5).

use http::{Method, Uri};

use crate::entry::{CacheEntry, Variant};
use crate::headers::{CacheControl, HeaderList};

/// A conditional (or unconditional-retry) request the orchestrator sends to
/// the origin during revalidation. Method and URI are preserved from the
/// original request; headers are the original request's headers plus the
/// additions below.
#[derive(Debug)]
pub struct ConditionalRequest {
    /// The request method to send.
    pub method: Method,
    /// The request URI to send.
    pub uri: Uri,
    /// The headers to send, including any added conditional validators.
    pub headers: HeaderList,
}

/// Builds a conditional request validating a single entry.
pub fn build_conditional_request(
    method: &Method,
    uri: &Uri,
    original_request_headers: &HeaderList,
    entry: &CacheEntry,
) -> ConditionalRequest {
    let mut headers = original_request_headers.clone();
    if let Some(etag) = entry.headers.get("etag") {
        headers.set("If-None-Match", etag.to_string());
    }
    if let Some(last_modified) = entry.headers.get("last-modified") {
        headers.set("If-Modified-Since", last_modified.to_string());
    }
    let entry_cc = CacheControl::parse(&entry.headers);
    if entry_cc.has("must-revalidate") || entry_cc.has("proxy-revalidate") {
        headers.set("Cache-Control", "max-age=0");
    }
    ConditionalRequest { method: method.clone(), uri: uri.clone(), headers }
}

/// Builds one conditional request validating every stored variant at once,
/// with a comma-joined `If-None-Match` carrying each variant's ETag.
pub fn build_variants_conditional_request(
    method: &Method,
    uri: &Uri,
    original_request_headers: &HeaderList,
    variants: &[Variant],
) -> ConditionalRequest {
    let mut headers = original_request_headers.clone();
    let etags: Vec<&str> = variants.iter().filter_map(|v| v.entry.headers.get("etag")).collect();
    if !etags.is_empty() {
        headers.set("If-None-Match", etags.join(", "));
    }
    ConditionalRequest { method: method.clone(), uri: uri.clone(), headers }
}

/// Builds an unconditional retry, stripping every conditional header and
/// forcing the origin to bypass its own cache. Used when the conditional
/// revalidation response's `Date` precedes the entry's (§4.12).
pub fn build_unconditional_retry(
    method: &Method,
    uri: &Uri,
    original_request_headers: &HeaderList,
) -> ConditionalRequest {
    let mut headers = original_request_headers.clone();
    for name in ["if-range", "if-match", "if-none-match", "if-unmodified-since", "if-modified-since"] {
        headers.remove(name);
    }
    headers.set("Cache-Control", "no-cache");
    headers.set("Pragma", "no-cache");
    ConditionalRequest { method: method.clone(), uri: uri.clone(), headers }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::HttpVersion;
    use std::time::SystemTime;

    fn entry(etag: &str, last_modified: Option<&str>) -> CacheEntry {
        let mut headers = HeaderList::new();
        headers.push("ETag", etag);
        if let Some(lm) = last_modified {
            headers.push("Last-Modified", lm);
        }
        CacheEntry {
            request_date: SystemTime::UNIX_EPOCH,
            response_date: SystemTime::UNIX_EPOCH,
            status: http::StatusCode::OK,
            reason: None,
            version: HttpVersion::Http11,
            headers,
            body_ref: None,
            request_method: Method::GET,
            variant_map: Default::default(),
        }
    }

    #[test]
    fn builds_if_none_match_and_if_modified_since() {
        let e = entry("\"v1\"", Some("Wed, 21 Oct 2026 07:28:00 GMT"));
        let req_headers = HeaderList::new();
        let uri: Uri = "http://example.com/a".parse().unwrap();
        let cond = build_conditional_request(&Method::GET, &uri, &req_headers, &e);
        assert_eq!(cond.headers.get("if-none-match"), Some("\"v1\""));
        assert_eq!(cond.headers.get("if-modified-since"), Some("Wed, 21 Oct 2026 07:28:00 GMT"));
    }

    #[test]
    fn variants_request_comma_joins_etags() {
        let v1 = Variant {
            variant_key: "a".into(),
            variant_cache_key: "ka".into(),
            entry: entry("\"v1\"", None),
        };
        let v2 = Variant {
            variant_key: "b".into(),
            variant_cache_key: "kb".into(),
            entry: entry("\"v2\"", None),
        };
        let req_headers = HeaderList::new();
        let uri: Uri = "http://example.com/a".parse().unwrap();
        let cond = build_variants_conditional_request(&Method::GET, &uri, &req_headers, &[v1, v2]);
        assert_eq!(cond.headers.get("if-none-match"), Some("\"v1\", \"v2\""));
    }

    #[test]
    fn unconditional_retry_strips_conditionals() {
        let mut req_headers = HeaderList::new();
        req_headers.push("If-None-Match", "\"v1\"");
        let uri: Uri = "http://example.com/a".parse().unwrap();
        let cond = build_unconditional_retry(&Method::GET, &uri, &req_headers);
        assert!(!cond.headers.contains("if-none-match"));
        assert_eq!(cond.headers.get("cache-control"), Some("no-cache"));
        assert_eq!(cond.headers.get("pragma"), Some("no-cache"));
    }
}
