//! Request Compliance (§4.7): fatal-error detection and in-place repairs
//! applied to an inbound request before it is used to build a cache key or
//! forwarded to the origin.

use http::{Method, Version};

use crate::error::{CacheCoreError, RequestNonComplianceReason, Result};
use crate::headers::{CacheControl, HeaderList};

/// Inputs the request compliance checks and repairs need beyond the headers.
#[derive(Debug)]
pub struct RequestFixInput<'a> {
    /// The request method.
    pub method: &'a Method,
    /// The request's HTTP version.
    pub version: Version,
    /// Whether the request carries an entity body.
    pub has_body: bool,
    /// Whether the caller wants `Expect: 100-continue` present.
    pub expect_continue: bool,
    /// When set, a weak `If-Match`/`If-None-Match` on `PUT`/`DELETE` is
    /// tolerated instead of rejected as fatally non-compliant (§4.7/§6).
    pub weak_etag_on_put_delete_allowed: bool,
}

/// The repaired request produced by [`fix_request`].
#[derive(Debug)]
pub struct RequestFix {
    /// The repaired header set.
    pub headers: HeaderList,
    /// The version to forward the request with.
    pub version: Version,
    /// Whether the caller must drop the request body before forwarding.
    pub drop_entity: bool,
}

/// Runs the fatal-error checks first (returning an error the orchestrator
/// converts into a synthetic response instead of forwarding), then applies
/// every repair.
pub fn fix_request(input: &RequestFixInput<'_>, headers: &HeaderList) -> Result<RequestFix> {
    check_fatal(input, headers)?;

    let mut headers = headers.clone();
    let mut drop_entity = false;

    if *input.method == Method::TRACE {
        drop_entity = true;
    }

    let has_expect_continue = headers
        .get("expect")
        .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"));
    match (input.expect_continue, has_expect_continue) {
        (true, false) => headers.set("Expect", "100-continue"),
        (false, true) => headers.remove("expect"),
        _ => {}
    }

    if *input.method == Method::OPTIONS {
        if input.has_body && !headers.contains("content-type") {
            headers.set("Content-Type", "application/octet-stream");
        }
        if let Some(forwards) = headers.get("max-forwards").and_then(|v| v.trim().parse::<i64>().ok()) {
            if forwards > 0 {
                headers.set("Max-Forwards", (forwards - 1).to_string());
            }
        }
    }

    let cc = CacheControl::parse(&headers);
    if cc.has("no-cache") {
        let had_freshness_directive =
            cc.has("min-fresh") || cc.has("max-stale") || cc.has("max-age");
        if had_freshness_directive {
            if let Some(raw) = headers.get("cache-control").map(str::to_string) {
                let kept: Vec<&str> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|d| {
                        let name = d.split('=').next().unwrap_or("").trim().to_ascii_lowercase();
                        !matches!(name.as_str(), "min-fresh" | "max-stale" | "max-age")
                    })
                    .collect();
                headers.set("Cache-Control", kept.join(", "));
            }
        }
    }

    let version = if input.version == Version::HTTP_10 || version_minor_over_one(input.version) {
        Version::HTTP_11
    } else {
        input.version
    };

    Ok(RequestFix { headers, version, drop_entity })
}

fn version_minor_over_one(v: Version) -> bool {
    matches!(v, Version::HTTP_2 | Version::HTTP_3)
}

fn check_fatal(input: &RequestFixInput<'_>, headers: &HeaderList) -> Result<()> {
    if let Some(if_range) = headers.get("if-range") {
        if is_weak_etag(if_range) {
            return Err(CacheCoreError::RequestFatallyNonCompliant(
                RequestNonComplianceReason::WeakEtagWithRange,
            ));
        }
    }

    if !input.weak_etag_on_put_delete_allowed && matches!(*input.method, Method::PUT | Method::DELETE) {
        for name in ["if-match", "if-none-match"] {
            if let Some(value) = headers.get(name) {
                if value.split(',').map(str::trim).any(is_weak_etag) {
                    return Err(CacheCoreError::RequestFatallyNonCompliant(
                        RequestNonComplianceReason::WeakEtagOnPutDelete,
                    ));
                }
            }
        }
    }

    let cc = CacheControl::parse(headers);
    if let Some(value) = cc.value("no-cache") {
        if !value.is_empty() {
            return Err(CacheCoreError::RequestFatallyNonCompliant(
                RequestNonComplianceReason::NoCacheWithFieldName,
            ));
        }
    }

    Ok(())
}

fn is_weak_etag(value: &str) -> bool {
    value.trim_start().starts_with("W/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(method: Method) -> RequestFixInput<'static> {
        RequestFixInput {
            method: Box::leak(Box::new(method)),
            version: Version::HTTP_11,
            has_body: false,
            expect_continue: false,
            weak_etag_on_put_delete_allowed: false,
        }
    }

    #[test]
    fn weak_etag_with_if_range_is_fatal() {
        let mut h = HeaderList::new();
        h.push("If-Range", "W/\"v1\"");
        let result = fix_request(&input(Method::GET), &h);
        assert!(matches!(
            result,
            Err(CacheCoreError::RequestFatallyNonCompliant(
                RequestNonComplianceReason::WeakEtagWithRange
            ))
        ));
    }

    #[test]
    fn weak_etag_on_put_if_match_is_fatal() {
        let mut h = HeaderList::new();
        h.push("If-Match", "W/\"v1\"");
        let result = fix_request(&input(Method::PUT), &h);
        assert!(matches!(
            result,
            Err(CacheCoreError::RequestFatallyNonCompliant(
                RequestNonComplianceReason::WeakEtagOnPutDelete
            ))
        ));
    }

    #[test]
    fn weak_etag_on_put_delete_allowed_flag_permits_it() {
        let mut h = HeaderList::new();
        h.push("If-Match", "W/\"v1\"");
        let mut i = input(Method::PUT);
        i.weak_etag_on_put_delete_allowed = true;
        assert!(fix_request(&i, &h).is_ok());
    }

    #[test]
    fn no_cache_field_name_form_is_fatal() {
        let mut h = HeaderList::new();
        h.push("Cache-Control", "no-cache=\"x-custom\"");
        let result = fix_request(&input(Method::GET), &h);
        assert!(matches!(
            result,
            Err(CacheCoreError::RequestFatallyNonCompliant(
                RequestNonComplianceReason::NoCacheWithFieldName
            ))
        ));
    }

    #[test]
    fn http10_upgraded_to_http11() {
        let h = HeaderList::new();
        let mut i = input(Method::GET);
        i.version = Version::HTTP_10;
        let fix = fix_request(&i, &h).unwrap();
        assert_eq!(fix.version, Version::HTTP_11);
    }

    #[test]
    fn trace_drops_entity() {
        let h = HeaderList::new();
        let fix = fix_request(&input(Method::TRACE), &h).unwrap();
        assert!(fix.drop_entity);
    }

    #[test]
    fn no_cache_strips_freshness_directives() {
        let mut h = HeaderList::new();
        h.push("Cache-Control", "no-cache, max-age=10, min-fresh=5");
        let fix = fix_request(&input(Method::GET), &h).unwrap();
        let cc = fix.headers.get("cache-control").unwrap();
        assert!(cc.contains("no-cache"));
        assert!(!cc.contains("max-age"));
        assert!(!cc.contains("min-fresh"));
    }
}
