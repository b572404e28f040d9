//! Cache Invalidator (§4.9): pre-request (unsafe-method) invalidation and
//! post-response (`Content-Location`) invalidation.

use http::{Method, Uri};

use crate::entry::CacheEntry;
use crate::error::Result;
use crate::headers::{CacheControl, HeaderList};
use crate::key::canonicalize_uri;
use crate::store::{degrade_storage_error, EntryStore, UpdateAction};

fn authority_of(uri: &str) -> Option<String> {
    uri.parse::<Uri>().ok()?.authority().map(|a| a.as_str().to_ascii_lowercase())
}

/// Resolves a (possibly relative) `Location`/`Content-Location` value
/// against the request URI, per §4.9's "support both absolute and relative
/// URIs, the latter resolved against the request URI".
fn resolve_against(base: &Uri, candidate: &str) -> Option<Uri> {
    if let Ok(absolute) = candidate.parse::<Uri>() {
        if absolute.authority().is_some() {
            return Some(absolute);
        }
    }
    let scheme = base.scheme_str().unwrap_or("http");
    let authority = base.authority()?.as_str();
    let path = if candidate.starts_with('/') {
        candidate.to_string()
    } else {
        format!("/{candidate}")
    };
    format!("{scheme}://{authority}{path}").parse().ok()
}

/// Removes the base entry for `target_key` and every entry its `variant_map`
/// references.
async fn remove_entry_and_variants<S: EntryStore>(store: &S, key: &str) {
    let entry = match store.get(key).await {
        Ok(Some(e)) => e,
        _ => return,
    };
    for variant_key in entry.variant_map.values() {
        if let Err(e) = store.remove(variant_key).await {
            log::warn!("failed to remove variant entry {variant_key}: {e}");
        }
    }
    if let Err(e) = store.remove(key).await {
        log::warn!("failed to remove entry {key}: {e}");
    }
}

/// Pre-request invalidation: unsafe methods (and, optionally, `no-cache`
/// GET/HEAD requests) invalidate the entry at this key plus any
/// `Content-Location`/`Location` target sharing authority with the request.
pub async fn invalidate_pre_request<S: EntryStore>(
    store: &S,
    method: &Method,
    uri: &Uri,
    request_headers: &HeaderList,
    invalidate_on_no_cache: bool,
) {
    let cc = CacheControl::parse(request_headers);
    let is_unsafe = !matches!(*method, Method::GET | Method::HEAD);
    let no_cache_requested = invalidate_on_no_cache
        && (cc.has("no-cache") || request_headers.contains("pragma"));

    if !is_unsafe && !no_cache_requested {
        return;
    }

    let request_authority = authority_of(&canonicalize_uri(&uri.to_string()));
    let base_key = canonicalize_uri(&uri.to_string());
    remove_entry_and_variants(store, &base_key).await;

    for header_name in ["content-location", "location"] {
        let Some(value) = request_headers.get(header_name) else { continue };
        let Some(resolved) = resolve_against(uri, value) else { continue };
        if authority_of(&resolved.to_string()) != request_authority {
            continue;
        }
        let target_key = canonicalize_uri(&resolved.to_string());
        remove_entry_and_variants(store, &target_key).await;
    }
}

/// Post-response invalidation: only for 2xx responses carrying a
/// `Content-Location` pointing into the same authority. Removes the target
/// entry if it exists, its ETag differs from the response's, and (the
/// preferred reading per the Design Notes' Open Question) the response's
/// `Date` is not strictly older than the entry's `Date`.
pub async fn invalidate_post_response<S: EntryStore>(
    store: &S,
    request_uri: &Uri,
    response_status: http::StatusCode,
    response_headers: &HeaderList,
) -> Result<()> {
    if !response_status.is_success() {
        return Ok(());
    }
    let Some(content_location) = response_headers.get("content-location") else { return Ok(()) };
    let Some(resolved) = resolve_against(request_uri, content_location) else { return Ok(()) };
    if authority_of(&resolved.to_string()) != authority_of(&request_uri.to_string()) {
        return Ok(());
    }

    let target_key = canonicalize_uri(&resolved.to_string());
    let existing = match degrade_storage_error(store.get(&target_key).await, "post-response lookup") {
        Some(Some(e)) => e,
        _ => return Ok(()),
    };

    let etag_differs = match (response_headers.get("etag"), existing.headers.get("etag")) {
        (Some(new), Some(old)) => new != old,
        _ => false,
    };
    if !etag_differs {
        return Ok(());
    }

    let response_date = response_headers.get("date").and_then(crate::dates::parse_http_date);
    let entry_date = existing.headers.get("date").and_then(crate::dates::parse_http_date);
    let not_strictly_older = match (response_date, entry_date) {
        (Some(r), Some(e)) => r >= e,
        _ => true,
    };
    if !not_strictly_older {
        return Ok(());
    }

    if let Err(e) = store.remove(&target_key).await {
        log::warn!("failed to invalidate {target_key} after Content-Location update: {e}");
    }
    Ok(())
}

/// Helper retained for callers that already hold an entry and want a single
/// CAS removal rather than a plain `remove`, matching the CAS-everywhere
/// pattern used elsewhere in the orchestrator.
pub async fn remove_via_update<S: EntryStore>(store: &S, key: &str, max_retries: usize) {
    let _ = store
        .update(key, max_retries, Box::new(|_current: Option<&CacheEntry>| UpdateAction::Remove))
        .await;
}
