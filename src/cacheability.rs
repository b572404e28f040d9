//! Response Cacheability Policy (§4.2).

use http::{Method, StatusCode, Version};

use crate::config::CacheConfig;
use crate::dates::parse_http_date;
use crate::headers::{CacheControl, HeaderList};

/// The input the cacheability policy decides over. Kept as a small value
/// type (per §9's "replace deep inheritance with getters") rather than
/// borrowing `http::Request`/`Response` directly, so callers can assemble it
/// from whatever request/response representation they have.
#[derive(Debug)]
pub struct CacheabilityInput<'a> {
    /// The method the request was actually sent to the origin with.
    pub origin_method: &'a Method,
    /// The origin's response status.
    pub response_status: StatusCode,
    /// The origin's response headers.
    pub response_headers: &'a HeaderList,
    /// The origin's response HTTP version.
    pub response_version: Version,
    /// Whether the request URI carried a query component.
    pub request_uri_has_query: bool,
    /// The request headers as sent to the origin.
    pub request_headers: &'a HeaderList,
}

const KNOWN_STATUS_RANGES: [(u16, u16); 5] = [(100, 101), (200, 206), (300, 307), (400, 417), (500, 505)];

fn is_known_status(code: u16) -> bool {
    KNOWN_STATUS_RANGES.iter().any(|&(lo, hi)| code >= lo && code <= hi)
}

const DEFAULT_CACHEABLE: [u16; 5] = [200, 203, 300, 301, 410];

/// Returns whether a response may be cached at all, per the rule table in
/// §4.2. Any single "no" short-circuits the rest.
pub fn is_cacheable(input: &CacheabilityInput<'_>, config: &CacheConfig) -> bool {
    let method_ok = *input.origin_method == Method::GET
        || (config.cache_head_responses && *input.origin_method == Method::HEAD);
    if !method_ok {
        return false;
    }

    let code = input.response_status.as_u16();
    if !is_known_status(code) {
        return false;
    }
    if code == 206 {
        return false;
    }
    if code == 303 && !config.allow_303_caching {
        return false;
    }

    if let Some(len) = input.response_headers.get("content-length").and_then(|v| v.parse::<u64>().ok())
    {
        if len > config.max_object_size_bytes {
            return false;
        }
    }

    if input.response_headers.count("age") > 1 || input.response_headers.count("expires") > 1 {
        return false;
    }

    let date_values: Vec<&str> = input.response_headers.get_all("date").collect();
    match date_values.len() {
        0 => return false,
        1 if parse_http_date(date_values[0]).is_none() => return false,
        _ => {}
    }

    if input
        .response_headers
        .get_all("vary")
        .flat_map(|v| v.split(','))
        .any(|v| v.trim() == "*")
    {
        return false;
    }

    let cc = CacheControl::parse(input.response_headers);
    if cc.has("no-store") || cc.has("no-cache") {
        return false;
    }
    if config.shared_cache && cc.has("private") {
        return false;
    }

    if config.shared_cache && input.request_headers.contains("authorization") {
        let authorized_despite_auth = cc.has("s-maxage") || cc.has("must-revalidate") || cc.has("public");
        if !authorized_despite_auth {
            return false;
        }
    }

    let explicitly_cacheable = input.response_headers.contains("expires")
        || cc.has("max-age")
        || cc.has("s-maxage")
        || cc.has("must-revalidate")
        || cc.has("proxy-revalidate")
        || cc.has("public");

    if input.request_uri_has_query {
        let is_http10_origin = input.response_version == Version::HTTP_10;
        if !explicitly_cacheable || (config.never_cache_http10_with_query && is_http10_origin) {
            return false;
        }
    }

    if let (Some(expires), Some(date)) = (
        input.response_headers.get("expires").and_then(parse_http_date),
        input.response_headers.get("date").and_then(parse_http_date),
    ) {
        if expires <= date && !input.response_headers.contains("cache-control") {
            return false;
        }
    }

    DEFAULT_CACHEABLE.contains(&code) || explicitly_cacheable
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_headers() -> HeaderList {
        let mut h = HeaderList::new();
        h.push("Date", "Wed, 21 Oct 2026 07:28:00 GMT");
        h
    }

    fn input<'a>(
        method: &'a Method,
        status: StatusCode,
        headers: &'a HeaderList,
        request_headers: &'a HeaderList,
    ) -> CacheabilityInput<'a> {
        CacheabilityInput {
            origin_method: method,
            response_status: status,
            response_headers: headers,
            response_version: Version::HTTP_11,
            request_uri_has_query: false,
            request_headers,
        }
    }

    #[test]
    fn plain_200_with_max_age_is_cacheable() {
        let mut h = base_headers();
        h.push("Cache-Control", "max-age=60");
        let req = HeaderList::new();
        let config = CacheConfig::default();
        assert!(is_cacheable(&input(&Method::GET, StatusCode::OK, &h, &req), &config));
    }

    #[test]
    fn post_is_never_cacheable() {
        let h = base_headers();
        let req = HeaderList::new();
        let config = CacheConfig::default();
        assert!(!is_cacheable(&input(&Method::POST, StatusCode::OK, &h, &req), &config));
    }

    #[test]
    fn no_store_short_circuits() {
        let mut h = base_headers();
        h.push("Cache-Control", "no-store, max-age=60");
        let req = HeaderList::new();
        let config = CacheConfig::default();
        assert!(!is_cacheable(&input(&Method::GET, StatusCode::OK, &h, &req), &config));
    }

    #[test]
    fn multiple_age_headers_not_cacheable() {
        let mut h = base_headers();
        h.push("Age", "1");
        h.push("Age", "2");
        h.push("Cache-Control", "max-age=60");
        let req = HeaderList::new();
        let config = CacheConfig::default();
        assert!(!is_cacheable(&input(&Method::GET, StatusCode::OK, &h, &req), &config));
    }

    #[test]
    fn vary_star_not_cacheable() {
        let mut h = base_headers();
        h.push("Vary", "*");
        h.push("Cache-Control", "max-age=60");
        let req = HeaderList::new();
        let config = CacheConfig::default();
        assert!(!is_cacheable(&input(&Method::GET, StatusCode::OK, &h, &req), &config));
    }

    #[test]
    fn content_length_over_cap_not_cacheable() {
        let mut h = base_headers();
        h.push("Cache-Control", "max-age=60");
        h.push("Content-Length", "999999999");
        let req = HeaderList::new();
        let mut config = CacheConfig::default();
        config.max_object_size_bytes = 10;
        assert!(!is_cacheable(&input(&Method::GET, StatusCode::OK, &h, &req), &config));
    }

    #[test]
    fn query_uri_requires_explicit_cacheability() {
        let h = base_headers();
        let req = HeaderList::new();
        let config = CacheConfig::default();
        let mut i = input(&Method::GET, StatusCode::OK, &h, &req);
        i.request_uri_has_query = true;
        assert!(!is_cacheable(&i, &config));
    }
}
