//! Crate-wide cacheability and policy configuration (§6), mirroring the
//! teacher's split between a cache-wide options struct and the per-request
//! overrides layered on top of it by the orchestrator's caller.

/// The full set of cacheability and policy flags, with every default value
/// named in §6.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Responses larger than this are passed through uncached (§4.14).
    pub max_object_size_bytes: u64,
    /// The store's LRU capacity in number of entries.
    pub max_cache_entries: usize,
    /// Retry budget for an [`crate::store::EntryStore::update`] CAS loop.
    pub max_update_retries: usize,
    /// Whether this cache behaves as a shared cache (affects `private`,
    /// `s-maxage`, and `proxy-revalidate` handling).
    pub shared_cache: bool,
    /// Whether heuristic freshness (§4.3's `Last-Modified`-based estimate)
    /// is applied when no explicit freshness information is present.
    pub heuristic_caching_enabled: bool,
    /// The coefficient applied to `Date - Last-Modified` when computing a
    /// heuristic freshness lifetime.
    pub heuristic_coefficient: f64,
    /// The heuristic freshness lifetime used when `Last-Modified` is absent.
    pub heuristic_default_lifetime_s: i64,
    /// The maximum number of async revalidation workers. Zero disables
    /// asynchronous (stale-while-revalidate) revalidation entirely.
    pub async_workers_max: usize,
    /// The number of async revalidation workers kept alive permanently.
    pub async_workers_core: usize,
    /// How long a transient (above-core) async worker idles before exiting.
    pub async_worker_idle_lifetime_s: u64,
    /// The bound on the async revalidator's pending job queue.
    pub revalidation_queue_size: usize,
    /// Whether an HTTP/1.0 response to a request with a query component is
    /// never cacheable, regardless of explicit freshness information.
    pub never_cache_http10_with_query: bool,
    /// Whether a 303 See Other response may be cached.
    pub allow_303_caching: bool,
    /// Whether a weak validator is permitted on a PUT/DELETE conditional
    /// request instead of being treated as fatally non-compliant.
    pub weak_etag_on_put_delete_allowed: bool,
    /// Whether HEAD responses participate in cacheability at all (§4.2's
    /// "optionally HEAD per config").
    pub cache_head_responses: bool,
    /// Whether `Cache-Control: no-cache`/`Pragma: no-cache` on a GET/HEAD
    /// request also triggers pre-request invalidation (§4.9 names this as
    /// an "(optionally)" extension of the unsafe-method rule).
    pub invalidate_on_request_no_cache: bool,
    /// The pseudonym this cache identifies itself as in the `Via` header it
    /// adds to every forwarded request (§4.12).
    pub via_pseudonym: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_object_size_bytes: 8192,
            max_cache_entries: 1000,
            max_update_retries: 1,
            shared_cache: true,
            heuristic_caching_enabled: false,
            heuristic_coefficient: 0.10,
            heuristic_default_lifetime_s: 0,
            async_workers_max: 1,
            async_workers_core: 1,
            async_worker_idle_lifetime_s: 60,
            revalidation_queue_size: 100,
            never_cache_http10_with_query: true,
            allow_303_caching: false,
            weak_etag_on_put_delete_allowed: false,
            cache_head_responses: false,
            invalidate_on_request_no_cache: false,
            via_pseudonym: "http-cache-core".to_string(),
        }
    }
}

impl CacheConfig {
    /// Async revalidation is disabled when `async_workers_max == 0`,
    /// per §6.
    pub fn async_revalidation_enabled(&self) -> bool {
        self.async_workers_max > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = CacheConfig::default();
        assert_eq!(c.max_object_size_bytes, 8192);
        assert_eq!(c.max_cache_entries, 1000);
        assert_eq!(c.max_update_retries, 1);
        assert!(c.shared_cache);
        assert!(!c.heuristic_caching_enabled);
        assert_eq!(c.heuristic_coefficient, 0.10);
        assert_eq!(c.heuristic_default_lifetime_s, 0);
        assert_eq!(c.async_workers_max, 1);
        assert_eq!(c.async_workers_core, 1);
        assert_eq!(c.async_worker_idle_lifetime_s, 60);
        assert_eq!(c.revalidation_queue_size, 100);
        assert!(c.never_cache_http10_with_query);
        assert!(!c.allow_303_caching);
        assert!(!c.weak_etag_on_put_delete_allowed);
    }

    #[test]
    fn zero_async_workers_disables_revalidation() {
        let mut c = CacheConfig::default();
        c.async_workers_max = 0;
        assert!(!c.async_revalidation_enabled());
    }
}
