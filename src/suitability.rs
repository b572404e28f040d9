//! Cached-Response Suitability Checker (§4.4): for a specific entry and
//! request, decide whether the entry can serve without contacting the
//! origin, needs revalidation first, or cannot serve this request at all.

use std::time::SystemTime;

use http::Method;

use crate::age;
use crate::dates::parse_http_date;
use crate::entry::CacheEntry;
use crate::headers::{CacheControl, HeaderList};

/// The outcome of the suitability check for a stored entry against a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suitability {
    /// The entry can be served as-is, with no origin contact.
    UseCached,
    /// The entry is present but stale or otherwise requires revalidation.
    NeedsRevalidation,
    /// The entry cannot serve this request at all (e.g. method mismatch).
    NotSuitable,
}

/// Everything [`check_suitability`] needs about the candidate entry and the
/// incoming request.
#[derive(Debug)]
pub struct SuitabilityInput<'a> {
    /// The stored entry being evaluated.
    pub entry: &'a CacheEntry,
    /// The incoming request's method.
    pub request_method: &'a Method,
    /// The incoming request's headers.
    pub request_headers: &'a HeaderList,
    /// The instant to evaluate freshness against.
    pub now: SystemTime,
    /// Whether this cache behaves as a shared cache.
    pub shared_cache: bool,
    /// Whether heuristic freshness applies when no explicit freshness
    /// information is present.
    pub heuristic_caching_enabled: bool,
    /// The heuristic freshness coefficient.
    pub heuristic_coefficient: f64,
    /// The heuristic freshness lifetime used when `Last-Modified` is absent.
    pub heuristic_default_lifetime_s: i64,
    /// The actual length of the entry's stored body, if known, used for the
    /// Content-Length-mismatch check in step 2.
    pub actual_body_len: Option<u64>,
}

/// Decides whether `input.entry` can serve `input` without contacting the
/// origin.
pub fn check_suitability(input: &SuitabilityInput<'_>) -> Suitability {
    let entry = input.entry;
    let entry_headers = &entry.headers;

    let current_age =
        age::current_age_s(entry_headers, entry.request_date, entry.response_date, input.now);
    let freshness_lifetime = age::freshness_lifetime_s(entry_headers, input.shared_cache);
    let is_fresh = age::is_fresh(current_age, freshness_lifetime);
    let staleness = age::staleness_s(current_age, freshness_lifetime);

    let heuristically_fresh = input.heuristic_caching_enabled && {
        let heuristic_lifetime = age::heuristic_lifetime_s(
            entry_headers,
            input.heuristic_coefficient,
            input.heuristic_default_lifetime_s,
        );
        current_age < heuristic_lifetime
    };

    let entry_cc = CacheControl::parse(entry_headers);
    let origin_insists_on_freshness = entry_cc.has("must-revalidate")
        || (input.shared_cache && (entry_cc.has("proxy-revalidate") || entry_cc.has("s-maxage")));

    let request_cc = CacheControl::parse(input.request_headers);
    let max_stale_covers_staleness = match request_cc.seconds("max-stale") {
        None => false,
        Some(None) => true, // bare `max-stale` -> unbounded, per the Open Question resolution
        Some(Some(n)) => staleness <= n as i64,
    } && !origin_insists_on_freshness;

    let fresh_enough = is_fresh || heuristically_fresh || max_stale_covers_staleness;

    let has_validator = entry_headers.contains("etag") || entry_headers.contains("last-modified");

    // Step 1's tentative verdict, subject to override by steps 2-5 below.
    let tentative = if fresh_enough {
        Suitability::UseCached
    } else if has_validator {
        Suitability::NeedsRevalidation
    } else {
        return Suitability::NotSuitable;
    };

    // Step 2: Content-Length vs actual body length.
    if let (Some(declared), Some(actual)) = (
        entry_headers.get("content-length").and_then(|v| v.parse::<u64>().ok()),
        input.actual_body_len,
    ) {
        if declared != actual {
            return Suitability::NotSuitable;
        }
    }

    // Step 3: unsupported conditionals.
    if input.request_headers.contains("if-range") || input.request_headers.contains("if-match") {
        return Suitability::NotSuitable;
    }
    if input.request_headers.get("if-unmodified-since").and_then(parse_http_date).is_some() {
        return Suitability::NotSuitable;
    }

    // Step 4: supported conditionals must all match the entry.
    if let Some(inm) = input.request_headers.get("if-none-match") {
        if !if_none_match_matches(inm, entry_headers.get("etag")) {
            return Suitability::NotSuitable;
        }
    }
    if let Some(ims) = input.request_headers.get("if-modified-since").and_then(parse_http_date) {
        if ims > input.now {
            return Suitability::NotSuitable;
        }
        match entry_headers.get("last-modified").and_then(parse_http_date) {
            Some(lm) if lm <= ims => {}
            _ => return Suitability::NotSuitable,
        }
    }

    // Step 5: request Cache-Control directives.
    if request_cc.has("no-cache") || request_cc.has("no-store") {
        return Suitability::NotSuitable;
    }
    match request_cc.seconds("max-age") {
        Some(Some(n)) if current_age > n as i64 => return Suitability::NotSuitable,
        Some(None) => return Suitability::NotSuitable, // malformed -> reject conservatively
        _ => {}
    }
    if let Some(Some(n)) = request_cc.seconds("max-stale") {
        if freshness_lifetime > n as i64 {
            return Suitability::NotSuitable;
        }
    }
    match request_cc.seconds("min-fresh") {
        Some(Some(n)) if freshness_lifetime - current_age < n as i64 => return Suitability::NotSuitable,
        Some(None) => return Suitability::NotSuitable,
        _ => {}
    }

    tentative
}

fn if_none_match_matches(request_value: &str, entry_etag: Option<&str>) -> bool {
    let Some(entry_etag) = entry_etag else { return false };
    request_value.split(',').map(str::trim).any(|candidate| candidate == "*" || candidate == entry_etag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::HttpVersion;
    use std::time::Duration;

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn entry_with(headers: HeaderList, request_date: SystemTime, response_date: SystemTime) -> CacheEntry {
        CacheEntry {
            request_date,
            response_date,
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
    fn fresh_entry_uses_cached() {
        let mut h = HeaderList::new();
        h.push("Date", crate::dates::format_http_date(t(1000)));
        h.push("Cache-Control", "max-age=60");
        let entry = entry_with(h, t(1000), t(1000));
        let req_headers = HeaderList::new();
        let input = SuitabilityInput {
            entry: &entry,
            request_method: &Method::GET,
            request_headers: &req_headers,
            now: t(1010),
            shared_cache: true,
            heuristic_caching_enabled: false,
            heuristic_coefficient: 0.1,
            heuristic_default_lifetime_s: 0,
            actual_body_len: None,
        };
        assert_eq!(check_suitability(&input), Suitability::UseCached);
    }

    #[test]
    fn stale_entry_with_etag_needs_revalidation() {
        let mut h = HeaderList::new();
        h.push("Date", crate::dates::format_http_date(t(1000)));
        h.push("Cache-Control", "max-age=10");
        h.push("ETag", "\"v1\"");
        let entry = entry_with(h, t(1000), t(1000));
        let req_headers = HeaderList::new();
        let input = SuitabilityInput {
            entry: &entry,
            request_method: &Method::GET,
            request_headers: &req_headers,
            now: t(1100),
            shared_cache: true,
            heuristic_caching_enabled: false,
            heuristic_coefficient: 0.1,
            heuristic_default_lifetime_s: 0,
            actual_body_len: None,
        };
        assert_eq!(check_suitability(&input), Suitability::NeedsRevalidation);
    }

    #[test]
    fn stale_entry_without_validator_not_suitable() {
        let mut h = HeaderList::new();
        h.push("Date", crate::dates::format_http_date(t(1000)));
        h.push("Cache-Control", "max-age=10");
        let entry = entry_with(h, t(1000), t(1000));
        let req_headers = HeaderList::new();
        let input = SuitabilityInput {
            entry: &entry,
            request_method: &Method::GET,
            request_headers: &req_headers,
            now: t(1100),
            shared_cache: true,
            heuristic_caching_enabled: false,
            heuristic_coefficient: 0.1,
            heuristic_default_lifetime_s: 0,
            actual_body_len: None,
        };
        assert_eq!(check_suitability(&input), Suitability::NotSuitable);
    }

    #[test]
    fn request_no_cache_forces_not_suitable() {
        let mut h = HeaderList::new();
        h.push("Date", crate::dates::format_http_date(t(1000)));
        h.push("Cache-Control", "max-age=60");
        let entry = entry_with(h, t(1000), t(1000));
        let mut req_headers = HeaderList::new();
        req_headers.push("Cache-Control", "no-cache");
        let input = SuitabilityInput {
            entry: &entry,
            request_method: &Method::GET,
            request_headers: &req_headers,
            now: t(1010),
            shared_cache: true,
            heuristic_caching_enabled: false,
            heuristic_coefficient: 0.1,
            heuristic_default_lifetime_s: 0,
            actual_body_len: None,
        };
        assert_eq!(check_suitability(&input), Suitability::NotSuitable);
    }

    #[test]
    fn max_stale_permits_stale_serve() {
        let mut h = HeaderList::new();
        h.push("Date", crate::dates::format_http_date(t(1000)));
        h.push("Cache-Control", "max-age=10");
        h.push("ETag", "\"v1\"");
        let entry = entry_with(h, t(1000), t(1000));
        let mut req_headers = HeaderList::new();
        req_headers.push("Cache-Control", "max-stale=100");
        let input = SuitabilityInput {
            entry: &entry,
            request_method: &Method::GET,
            request_headers: &req_headers,
            now: t(1050),
            shared_cache: true,
            heuristic_caching_enabled: false,
            heuristic_coefficient: 0.1,
            heuristic_default_lifetime_s: 0,
            actual_body_len: None,
        };
        // staleness = 40, within max-stale=100, freshness_lifetime(10) <= 100
        assert_eq!(check_suitability(&input), Suitability::UseCached);
    }
}
