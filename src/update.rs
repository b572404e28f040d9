//! Entry Updater (§4.10): merges a 304 revalidation response into the stale
//! entry that produced the conditional request.

use std::time::SystemTime;

use crate::entry::CacheEntry;
use crate::headers::HeaderList;

/// Headers a 304 is never allowed to update on the stored entry.
const EXCLUDED_FROM_UPDATE: [&str; 1] = ["content-length"];

/// Produces the entry to store after a 304: the stale entry's body
/// reference and metadata, with every header name present on the 304
/// (other than the excluded set) replacing all headers of that name, and
/// timestamps updated to the validating round-trip's.
pub fn merge_304(
    stale_entry: &CacheEntry,
    response_304_headers: &HeaderList,
    new_request_date: SystemTime,
    new_response_date: SystemTime,
) -> CacheEntry {
    let mut merged_headers = stale_entry.headers.clone();

    let mut by_name: Vec<String> = Vec::new();
    for h in response_304_headers.iter() {
        let lower = h.name.to_ascii_lowercase();
        if !by_name.contains(&lower) {
            by_name.push(lower);
        }
    }

    for name in by_name {
        if EXCLUDED_FROM_UPDATE.contains(&name.as_str()) {
            continue;
        }
        if name == "warning" {
            let values: Vec<String> = response_304_headers
                .get_all("warning")
                .filter(|w| !is_1xx_warning(w))
                .map(str::to_string)
                .collect();
            let kept_existing: Vec<String> =
                merged_headers.get_all("warning").map(str::to_string).collect();
            merged_headers.remove("warning");
            for v in kept_existing.into_iter().filter(|w| !is_1xx_warning(w)) {
                merged_headers.push("Warning", v);
            }
            for v in values {
                merged_headers.push("Warning", v);
            }
            continue;
        }
        let values: Vec<String> = response_304_headers.get_all(&name).map(str::to_string).collect();
        merged_headers.replace_all(&name, values);
    }

    CacheEntry {
        request_date: new_request_date,
        response_date: new_response_date,
        status: stale_entry.status,
        reason: stale_entry.reason.clone(),
        version: stale_entry.version,
        headers: merged_headers,
        body_ref: stale_entry.body_ref.clone(),
        request_method: stale_entry.request_method.clone(),
        variant_map: stale_entry.variant_map.clone(),
    }
}

fn is_1xx_warning(value: &str) -> bool {
    value
        .split_whitespace()
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .is_some_and(|code| (100..200).contains(&code))
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

    fn stale_entry() -> CacheEntry {
        let mut headers = HeaderList::new();
        headers.push("ETag", "\"v1\"");
        headers.push("Content-Length", "100");
        headers.push("Cache-Control", "max-age=60");
        CacheEntry {
            request_date: t(0),
            response_date: t(0),
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
    fn merges_headers_from_304_keeps_content_length() {
        let stale = stale_entry();
        let mut resp_304 = HeaderList::new();
        resp_304.push("ETag", "\"v1\"");
        resp_304.push("Cache-Control", "max-age=120");
        resp_304.push("Content-Length", "9999"); // must be ignored
        let merged = merge_304(&stale, &resp_304, t(100), t(101));
        assert_eq!(merged.headers.get("content-length"), Some("100"));
        assert_eq!(merged.headers.get("cache-control"), Some("max-age=120"));
        assert_eq!(merged.request_date, t(100));
        assert_eq!(merged.response_date, t(101));
    }

    #[test]
    fn drops_1xx_warning_but_keeps_others() {
        let mut stale = stale_entry();
        stale.headers.push("Warning", "299 agent \"persistent\"");
        let mut resp_304 = HeaderList::new();
        resp_304.push("Warning", "112 agent \"disconnected\"");
        let merged = merge_304(&stale, &resp_304, t(100), t(101));
        let warnings: Vec<_> = merged.headers.get_all("warning").collect();
        assert!(warnings.iter().any(|w| w.contains("299")));
        assert!(!warnings.iter().any(|w| w.contains("112")));
    }
}
