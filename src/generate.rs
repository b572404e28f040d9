//! Response Generator (§4.11): builds the outbound response for a cache hit,
//! either a full 200-style serve or a synthesized 304.

use std::time::SystemTime;

use http::StatusCode;

use crate::age;
use crate::entry::CacheEntry;
use crate::headers::HeaderList;

/// Why a stale entry is being served without successful revalidation, if at
/// all -- controls which `Warning` the generator appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleServeReason {
    /// The entry is simply stale and being served (e.g. during
    /// stale-while-revalidate) with no failed revalidation attempt yet.
    Stale,
    /// A revalidation attempt was made and failed (origin IO error or a
    /// stale-if-error-eligible 5xx).
    RevalidationFailed,
}

/// A status and header set ready to be built into an outbound response.
#[derive(Debug)]
pub struct GeneratedResponse {
    /// The response status.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderList,
}

/// Builds a full 200-style serve from a cache entry: entry headers plus
/// `Content-Length` (if no `Transfer-Encoding`), `Age`, and -- if the entry
/// is stale -- the appropriate `Warning`.
pub fn generate_full_response(
    entry: &CacheEntry,
    now: SystemTime,
    shared_cache: bool,
    body_len: u64,
    stale_serve_reason: Option<StaleServeReason>,
) -> GeneratedResponse {
    let mut headers = entry.headers.clone();

    if !headers.contains("transfer-encoding") {
        headers.set("content-length", body_len.to_string());
    }

    let current_age = age::current_age_s(&entry.headers, entry.request_date, entry.response_date, now);
    headers.set("Age", age::capped_age_header_value(current_age).to_string());

    let freshness_lifetime = age::freshness_lifetime_s(&entry.headers, shared_cache);
    let is_stale = age::staleness_s(current_age, freshness_lifetime) > 0;

    match stale_serve_reason {
        Some(StaleServeReason::RevalidationFailed) => {
            headers.push("Warning", "111 localhost \"Revalidation failed\"");
        }
        Some(StaleServeReason::Stale) if is_stale => {
            headers.push("Warning", "110 localhost \"Response is stale\"");
        }
        _ => {}
    }

    GeneratedResponse { status: entry.status, headers }
}

/// Synthesizes a 304 response carrying only the handful of headers §4.11
/// names, from the entry.
pub fn generate_304_response(entry: &CacheEntry) -> GeneratedResponse {
    let mut headers = HeaderList::new();
    let date = entry
        .headers
        .get("date")
        .map(str::to_string)
        .unwrap_or_else(|| crate::dates::format_http_date(SystemTime::now()));
    headers.push("Date", date);
    for name in ["etag", "content-location", "expires", "cache-control", "vary"] {
        if let Some(v) = entry.headers.get(name) {
            headers.push(capitalize_header_name(name), v.to_string());
        }
    }
    GeneratedResponse { status: StatusCode::NOT_MODIFIED, headers }
}

fn capitalize_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::HttpVersion;
    use http::Method;
    use std::time::Duration;

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn entry() -> CacheEntry {
        let mut headers = HeaderList::new();
        headers.push("Date", crate::dates::format_http_date(t(1000)));
        headers.push("Cache-Control", "max-age=60");
        headers.push("ETag", "\"v1\"");
        CacheEntry {
            request_date: t(1000),
            response_date: t(1000),
            status: StatusCode::OK,
            reason: None,
            version: HttpVersion::Http11,
            headers,
            body_ref: None,
            request_method: Method::GET,
            variant_map: Default::default(),
        }
    }

    #[test]
    fn fresh_serve_has_age_and_no_warning() {
        let e = entry();
        let resp = generate_full_response(&e, t(1030), true, 4, None);
        assert_eq!(resp.headers.get("age"), Some("30"));
        assert!(!resp.headers.contains("warning"));
    }

    #[test]
    fn stale_serve_adds_110_warning() {
        let e = entry();
        let resp =
            generate_full_response(&e, t(1100), true, 4, Some(StaleServeReason::Stale));
        assert!(resp.headers.get("warning").unwrap().contains("110"));
    }

    #[test]
    fn revalidation_failed_adds_111_warning() {
        let e = entry();
        let resp = generate_full_response(
            &e,
            t(1030),
            true,
            4,
            Some(StaleServeReason::RevalidationFailed),
        );
        assert!(resp.headers.get("warning").unwrap().contains("111"));
    }

    #[test]
    fn synthesized_304_carries_only_allowed_headers() {
        let e = entry();
        let resp = generate_304_response(&e);
        assert_eq!(resp.status, StatusCode::NOT_MODIFIED);
        assert!(resp.headers.contains("etag"));
        assert!(!resp.headers.contains("content-length"));
    }
}
