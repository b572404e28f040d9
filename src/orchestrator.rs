//! Cache Orchestrator (§4.12): the top-level state machine that composes
//! every other component on each request.
//!
//! `execute` walks COMPLIANCE -> PRE_INVALIDATE -> LOOKUP -> one of
//! {HIT_SUITABLE, HIT_REVALIDATE, HIT_STALE_ASYNC, MISS_WITH_VARIANTS,
//! MISS} -> (ORIGIN) -> POST_HANDLE -> STORE_OR_FLUSH, exactly as laid out
//! in §4.12. It is generic over the three collaborator traits so callers
//! plug in their own store, origin executor, and resource factory; the
//! reference `MemoryEntryStore`/`MemoryResourceFactory` exist only to drive
//! this crate's own tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use http::{Method, StatusCode, Uri, Version};
use http_body::Body as _;
use http_body_util::BodyExt;

use crate::age;
use crate::body::{read_with_limit, ReadOutcome};
use crate::cacheability::{is_cacheable, CacheabilityInput};
use crate::compliance::request::RequestFixInput;
use crate::compliance::response::ResponseFixInput;
use crate::compliance::{fix_request, fix_response};
use crate::conditional::{build_conditional_request, build_unconditional_retry, build_variants_conditional_request};
use crate::config::CacheConfig;
use crate::dates::parse_http_date;
use crate::entry::{CacheEntry, HttpVersion, Variant};
use crate::error::{CacheCoreError, RequestNonComplianceReason, Result};
use crate::failure_cache::FailureCache;
use crate::generate::{generate_304_response, generate_full_response, StaleServeReason};
use crate::headers::{CacheControl, HeaderList};
use crate::invalidate::{invalidate_post_response, invalidate_pre_request};
use crate::key::{canonicalize_uri, full_variant_cache_key, variant_key, vary_names};
use crate::origin::{empty_body, full_body, CoreBody, OriginExecutor};
use crate::resource::ResourceFactory;
use crate::revalidate::{AsyncRevalidator, JobResult, RevalidationJob};
use crate::servability::is_servable;
use crate::store::{degrade_storage_error, EntryStore, UpdateAction};
use crate::suitability::{check_suitability, Suitability, SuitabilityInput};
use crate::update::merge_304;

/// Per-call knobs the orchestrator cannot infer from the request alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// Whether the caller wants `Expect: 100-continue` present on the
    /// forwarded request (§4.7).
    pub expect_continue: bool,
}

struct Inner<S, O, R> {
    store: S,
    origin: O,
    resources: R,
    config: CacheConfig,
    failure_cache: Arc<dyn FailureCache>,
    revalidator: Option<AsyncRevalidator>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_updates: AtomicU64,
}

/// The cache decision engine. Cheap to clone: internally an `Arc` over the
/// collaborators and bookkeeping counters (§5's "counters are atomic
/// integers").
pub struct CacheOrchestrator<S, O, R> {
    inner: Arc<Inner<S, O, R>>,
}

impl<S, O, R> Clone for CacheOrchestrator<S, O, R> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<S, O, R> std::fmt::Debug for CacheOrchestrator<S, O, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheOrchestrator").finish_non_exhaustive()
    }
}

enum VariantResolution {
    /// The entry at the base key does not vary.
    Direct(CacheEntry),
    /// The request's variant-key resolved to a stored variant.
    Matched { cache_key: String, entry: CacheEntry },
    /// The entry varies but no stored variant matches this request; all
    /// known variants are returned for 304 negotiation.
    NoMatch(Vec<Variant>),
}

impl<S, O, R> CacheOrchestrator<S, O, R>
where
    S: EntryStore,
    O: OriginExecutor,
    R: ResourceFactory,
{
    /// Builds an orchestrator, starting the async revalidator's core
    /// workers immediately if `config.async_revalidation_enabled()`.
    pub fn new(store: S, origin: O, resources: R, config: CacheConfig, failure_cache: Arc<dyn FailureCache>) -> Self {
        let revalidator = config.async_revalidation_enabled().then(|| {
            AsyncRevalidator::start(
                config.async_workers_core,
                config.async_workers_max,
                config.async_worker_idle_lifetime_s,
                config.revalidation_queue_size,
                failure_cache.clone(),
            )
        });
        Self {
            inner: Arc::new(Inner {
                store,
                origin,
                resources,
                config,
                failure_cache,
                revalidator,
                cache_hits: AtomicU64::new(0),
                cache_misses: AtomicU64::new(0),
                cache_updates: AtomicU64::new(0),
            }),
        }
    }

    /// The number of requests served directly from a suitable cache entry.
    pub fn cache_hits(&self) -> u64 {
        self.inner.cache_hits.load(Ordering::Relaxed)
    }

    /// The number of requests that required an origin call (miss,
    /// revalidation, or non-suitable entry).
    pub fn cache_misses(&self) -> u64 {
        self.inner.cache_misses.load(Ordering::Relaxed)
    }

    /// The number of entries written to the store, including variant and
    /// 304-merge writes.
    pub fn cache_updates(&self) -> u64 {
        self.inner.cache_updates.load(Ordering::Relaxed)
    }

    /// Stops the async revalidator from accepting new work. In-flight jobs
    /// run to completion.
    pub fn shutdown(&self) {
        if let Some(revalidator) = &self.inner.revalidator {
            revalidator.shutdown();
        }
    }

    /// Runs one request through the whole state machine described in §4.12.
    pub async fn execute(
        &self,
        request: http::Request<CoreBody>,
        options: ExecuteOptions,
    ) -> Result<http::Response<CoreBody>> {
        let (parts, body) = request.into_parts();
        let method = parts.method;
        let uri = parts.uri;
        let incoming_headers = HeaderList::from_header_map(&parts.headers);

        // COMPLIANCE
        let has_body = !matches!(body.size_hint().exact(), Some(0));
        let fix_input = RequestFixInput {
            method: &method,
            version: parts.version,
            has_body,
            expect_continue: options.expect_continue,
            weak_etag_on_put_delete_allowed: self.inner.config.weak_etag_on_put_delete_allowed,
        };
        let fixed = match fix_request(&fix_input, &incoming_headers) {
            Ok(f) => f,
            Err(CacheCoreError::RequestFatallyNonCompliant(reason)) => {
                return self.synthesize_request_error(reason);
            }
            Err(e) => return Err(e),
        };
        let mut request_headers = fixed.headers;
        let request_version = fixed.version;
        request_headers.push("Via", via_value(request_version, &self.inner.config.via_pseudonym));
        let body = if fixed.drop_entity {
            drop(body);
            empty_body()
        } else {
            body
        };

        let base_key = canonicalize_uri(&uri.to_string());

        // PRE_INVALIDATE
        invalidate_pre_request(
            &self.inner.store,
            &method,
            &uri,
            &request_headers,
            self.inner.config.invalidate_on_request_no_cache,
        )
        .await;

        let only_if_cached = CacheControl::parse(&request_headers).has("only-if-cached");

        if !is_servable(&method, &request_headers) {
            if only_if_cached {
                return self.gateway_timeout();
            }
            return self.fetch_and_post_handle(method, uri, request_version, request_headers, body).await;
        }

        // LOOKUP
        let root = degrade_storage_error(self.inner.store.get(&base_key).await, "lookup").flatten();
        let Some(root) = root else {
            if only_if_cached {
                return self.gateway_timeout();
            }
            return self.fetch_and_post_handle(method, uri, request_version, request_headers, body).await;
        };

        match self.resolve_variant(&root, &request_headers).await {
            VariantResolution::NoMatch(variants) => {
                if only_if_cached {
                    return self.gateway_timeout();
                }
                drop(body);
                self.negotiate_variants(method, uri, request_version, request_headers, base_key, root, variants)
                    .await
            }
            VariantResolution::Direct(entry) => {
                drop(body);
                self.handle_hit(method, uri, request_version, request_headers, base_key, entry, only_if_cached)
                    .await
            }
            VariantResolution::Matched { cache_key, entry } => {
                drop(body);
                self.handle_hit(method, uri, request_version, request_headers, cache_key, entry, only_if_cached)
                    .await
            }
        }
    }

    async fn resolve_variant(&self, root: &CacheEntry, request_headers: &HeaderList) -> VariantResolution {
        if root.variant_map.is_empty() {
            return VariantResolution::Direct(root.clone());
        }
        let vary = vary_names(&root.headers);
        if let Some(requested) = variant_key(request_headers, &vary) {
            if let Some(cache_key) = root.variant_map.get(&requested) {
                if let Some(entry) =
                    degrade_storage_error(self.inner.store.get(cache_key).await, "variant lookup").flatten()
                {
                    return VariantResolution::Matched { cache_key: cache_key.clone(), entry };
                }
            }
        }
        let mut variants = Vec::with_capacity(root.variant_map.len());
        for (variant_key, cache_key) in &root.variant_map {
            if let Some(entry) =
                degrade_storage_error(self.inner.store.get(cache_key).await, "variant gather").flatten()
            {
                variants.push(Variant {
                    variant_key: variant_key.clone(),
                    variant_cache_key: cache_key.clone(),
                    entry,
                });
            }
        }
        VariantResolution::NoMatch(variants)
    }

    async fn handle_hit(
        &self,
        method: Method,
        uri: Uri,
        version: Version,
        request_headers: HeaderList,
        cache_key: String,
        entry: CacheEntry,
        only_if_cached: bool,
    ) -> Result<http::Response<CoreBody>> {
        let now = SystemTime::now();
        let suitability_input = SuitabilityInput {
            entry: &entry,
            request_method: &method,
            request_headers: &request_headers,
            now,
            shared_cache: self.inner.config.shared_cache,
            heuristic_caching_enabled: self.inner.config.heuristic_caching_enabled,
            heuristic_coefficient: self.inner.config.heuristic_coefficient,
            heuristic_default_lifetime_s: self.inner.config.heuristic_default_lifetime_s,
            actual_body_len: entry.body_ref.as_ref().map(|r| r.length()),
        };
        match check_suitability(&suitability_input) {
            Suitability::UseCached => self.serve_cached(&entry, &method, &request_headers).await,
            Suitability::NeedsRevalidation => {
                if only_if_cached {
                    return self.gateway_timeout();
                }
                let entry_cc = CacheControl::parse(&entry.headers);
                let current_age = age::current_age_s(&entry.headers, entry.request_date, entry.response_date, now);
                let freshness = age::freshness_lifetime_s(&entry.headers, self.inner.config.shared_cache);
                let staleness = age::staleness_s(current_age, freshness);
                let async_ok = self.inner.config.async_revalidation_enabled()
                    && matches!(entry_cc.seconds("stale-while-revalidate"), Some(Some(n)) if staleness <= n as i64);
                if async_ok {
                    self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
                    self.schedule_revalidation(cache_key, entry.clone(), method.clone(), uri, version, request_headers.clone())
                        .await;
                    self.serve_full(&entry, &method, Some(StaleServeReason::Stale)).await
                } else {
                    self.synchronous_revalidate(entry, cache_key, method, uri, version, request_headers).await
                }
            }
            Suitability::NotSuitable => {
                if only_if_cached {
                    return self.gateway_timeout();
                }
                self.fetch_and_post_handle(method, uri, version, request_headers, empty_body()).await
            }
        }
    }

    async fn synchronous_revalidate(
        &self,
        entry: CacheEntry,
        cache_key: String,
        method: Method,
        uri: Uri,
        version: Version,
        request_headers: HeaderList,
    ) -> Result<http::Response<CoreBody>> {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
        let cond = build_conditional_request(&method, &uri, &request_headers, &entry);
        let request_date = SystemTime::now();
        let outbound = self.build_outbound_request(&cond.method, &cond.uri, version, &cond.headers, empty_body())?;
        match self.inner.origin.execute(outbound).await {
            Ok(response) => {
                let response_date = SystemTime::now();
                let (parts, resp_body) = response.into_parts();
                let resp_headers = HeaderList::from_header_map(&parts.headers);

                let skewed = match (resp_headers.get("date").and_then(parse_http_date), entry.headers.get("date").and_then(parse_http_date))
                {
                    (Some(response_date_hdr), Some(entry_date_hdr)) => response_date_hdr < entry_date_hdr,
                    _ => false,
                };
                if skewed {
                    drop(resp_body);
                    let retry = build_unconditional_retry(&method, &uri, &request_headers);
                    let retry_request_date = SystemTime::now();
                    let retry_outbound =
                        self.build_outbound_request(&retry.method, &retry.uri, version, &retry.headers, empty_body())?;
                    return match self.inner.origin.execute(retry_outbound).await {
                        Ok(retry_response) => {
                            let retry_response_date = SystemTime::now();
                            self.post_handle(
                                retry_response,
                                method,
                                uri,
                                version,
                                request_headers,
                                retry_request_date,
                                retry_response_date,
                            )
                            .await
                        }
                        Err(e) => self.handle_revalidation_failure(e, &entry, &method, &request_headers).await,
                    };
                }

                if parts.status == StatusCode::NOT_MODIFIED {
                    let merged = merge_304(&entry, &resp_headers, request_date, response_date);
                    if degrade_storage_error(self.inner.store.put(&cache_key, merged.clone()).await, "store 304 merge")
                        .is_some()
                    {
                        self.inner.cache_updates.fetch_add(1, Ordering::Relaxed);
                    }
                    return self.serve_cached(&merged, &method, &request_headers).await;
                }

                if matches!(parts.status.as_u16(), 500 | 502 | 503 | 504) {
                    let entry_cc = CacheControl::parse(&entry.headers);
                    let request_cc = CacheControl::parse(&request_headers);
                    let current_age =
                        age::current_age_s(&entry.headers, entry.request_date, entry.response_date, SystemTime::now());
                    let freshness = age::freshness_lifetime_s(&entry.headers, self.inner.config.shared_cache);
                    let staleness = age::staleness_s(current_age, freshness);
                    let covers = |directive: &CacheControl| {
                        matches!(directive.seconds("stale-if-error"), Some(Some(n)) if staleness <= n as i64)
                    };
                    if covers(&entry_cc) || covers(&request_cc) {
                        drop(resp_body);
                        return self.serve_full(&entry, &method, Some(StaleServeReason::RevalidationFailed)).await;
                    }
                }

                let rebuilt = http::Response::from_parts(parts, resp_body);
                self.post_handle(rebuilt, method, uri, version, request_headers, request_date, response_date).await
            }
            Err(e) => self.handle_revalidation_failure(e, &entry, &method, &request_headers).await,
        }
    }

    async fn handle_revalidation_failure(
        &self,
        err: CacheCoreError,
        entry: &CacheEntry,
        method: &Method,
        request_headers: &HeaderList,
    ) -> Result<http::Response<CoreBody>> {
        if !matches!(err, CacheCoreError::OriginIoError(_)) {
            return Err(err);
        }
        let entry_cc = CacheControl::parse(&entry.headers);
        let request_cc = CacheControl::parse(request_headers);
        let insists_on_freshness = entry_cc.has("must-revalidate")
            || (self.inner.config.shared_cache && entry_cc.has("proxy-revalidate"))
            || request_cc.has("no-cache")
            || request_cc.has("max-age")
            || request_cc.has("min-fresh");
        if insists_on_freshness {
            log::warn!("origin unreachable during revalidation: {err}");
            return self.synthesize(
                StatusCode::GATEWAY_TIMEOUT,
                "gateway timeout: origin unreachable during revalidation",
            );
        }
        log::warn!("revalidation failed, serving stale: {err}");
        self.serve_full(entry, method, Some(StaleServeReason::RevalidationFailed)).await
    }

    async fn negotiate_variants(
        &self,
        method: Method,
        uri: Uri,
        version: Version,
        request_headers: HeaderList,
        base_key: String,
        root: CacheEntry,
        variants: Vec<Variant>,
    ) -> Result<http::Response<CoreBody>> {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
        let cond = build_variants_conditional_request(&method, &uri, &request_headers, &variants);
        let request_date = SystemTime::now();
        let outbound = self.build_outbound_request(&cond.method, &cond.uri, version, &cond.headers, empty_body())?;
        let response = self.inner.origin.execute(outbound).await?;
        let response_date = SystemTime::now();
        let (parts, body) = response.into_parts();

        if parts.status == StatusCode::NOT_MODIFIED {
            let resp_headers = HeaderList::from_header_map(&parts.headers);
            if let Some(etag) = resp_headers.get("etag") {
                if let Some(matched) = variants.iter().find(|v| v.entry.headers.get("etag") == Some(etag)) {
                    let merged = merge_304(&matched.entry, &resp_headers, request_date, response_date);
                    degrade_storage_error(
                        self.inner.store.put(&matched.variant_cache_key, merged.clone()).await,
                        "store variant merge",
                    );

                    let vary = vary_names(&root.headers);
                    if let Some(request_vkey) = variant_key(&request_headers, &vary) {
                        let mapping_value = matched.variant_cache_key.clone();
                        let root_fallback = merged.clone();
                        let result = self
                            .inner
                            .store
                            .update(
                                &base_key,
                                self.inner.config.max_update_retries,
                                Box::new(move |current: Option<&CacheEntry>| {
                                    let mut next = current.cloned().unwrap_or_else(|| root_fallback.clone());
                                    next.variant_map.insert(request_vkey.clone(), mapping_value.clone());
                                    UpdateAction::Replace(Box::new(next))
                                }),
                            )
                            .await;
                        degrade_storage_error(result, "register variant mapping");
                    }
                    return self.serve_cached(&merged, &method, &request_headers).await;
                }
            }
        }

        let rebuilt = http::Response::from_parts(parts, body);
        self.post_handle(rebuilt, method, uri, version, request_headers, request_date, response_date).await
    }

    async fn fetch_and_post_handle(
        &self,
        method: Method,
        uri: Uri,
        version: Version,
        request_headers: HeaderList,
        body: CoreBody,
    ) -> Result<http::Response<CoreBody>> {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
        let request_date = SystemTime::now();
        let outbound = self.build_outbound_request(&method, &uri, version, &request_headers, body)?;
        let response = self.inner.origin.execute(outbound).await?;
        let response_date = SystemTime::now();
        self.post_handle(response, method, uri, version, request_headers, request_date, response_date).await
    }

    async fn post_handle(
        &self,
        response: http::Response<CoreBody>,
        method: Method,
        uri: Uri,
        request_version: Version,
        request_headers: HeaderList,
        request_date: SystemTime,
        response_date: SystemTime,
    ) -> Result<http::Response<CoreBody>> {
        let (parts, body) = response.into_parts();
        let response_headers_in = HeaderList::from_header_map(&parts.headers);

        let fix_input = ResponseFixInput {
            request_method: &method,
            request_headers: &request_headers,
            request_version: HttpVersion::from(request_version),
        };
        let fixed = fix_response(&fix_input, parts.status, &response_headers_in)?;
        let mut response_headers = fixed.headers;

        if let Err(e) = invalidate_post_response(&self.inner.store, &uri, parts.status, &response_headers).await {
            log::warn!("post-response invalidation degraded: {e}");
        }

        let base_key = canonicalize_uri(&uri.to_string());
        let cacheable = is_cacheable(
            &CacheabilityInput {
                origin_method: &method,
                response_status: parts.status,
                response_headers: &response_headers,
                response_version: parts.version,
                request_uri_has_query: uri.query().is_some(),
                request_headers: &request_headers,
            },
            &self.inner.config,
        );

        if parts.status == StatusCode::NOT_MODIFIED
            && !response_headers.contains("last-modified")
            && request_headers.contains("if-modified-since")
        {
            if let Some(ims) = request_headers.get("if-modified-since") {
                response_headers.set("Last-Modified", ims.to_string());
            }
        }

        if fixed.drop_entity {
            let _ = body.collect().await;
            if cacheable {
                let entry = CacheEntry {
                    request_date,
                    response_date,
                    status: parts.status,
                    reason: parts.status.canonical_reason().map(str::to_string),
                    version: HttpVersion::from(parts.version),
                    headers: response_headers.clone(),
                    body_ref: None,
                    request_method: method.clone(),
                    variant_map: Default::default(),
                };
                self.store_entry(&base_key, entry, &request_headers).await;
            }
            return self.build_response(parts.status, &response_headers, empty_body());
        }

        let declared_len = response_headers.get("content-length").and_then(|v| v.parse::<u64>().ok());
        match read_with_limit(body, self.inner.config.max_object_size_bytes, declared_len).await {
            Ok(ReadOutcome::WithinLimit { bytes }) => {
                if cacheable {
                    let resource = self.inner.resources.generate(&base_key, bytes.clone()).await?;
                    let entry = CacheEntry {
                        request_date,
                        response_date,
                        status: parts.status,
                        reason: parts.status.canonical_reason().map(str::to_string),
                        version: HttpVersion::from(parts.version),
                        headers: response_headers.clone(),
                        body_ref: Some(resource),
                        request_method: method.clone(),
                        variant_map: Default::default(),
                    };
                    self.store_entry(&base_key, entry, &request_headers).await;
                }
                self.build_response(parts.status, &response_headers, full_body(bytes))
            }
            Ok(ReadOutcome::LimitExceeded { reconstructed }) => {
                self.build_response(parts.status, &response_headers, reconstructed)
            }
            Err(CacheCoreError::TruncatedBody { declared, actual }) => self.synthesize(
                StatusCode::BAD_GATEWAY,
                &format!("origin declared Content-Length {declared} but body ended after {actual} bytes"),
            ),
            Err(e) => Err(e),
        }
    }

    /// Stores `entry` under `base_key`, splitting into root + variant
    /// storage when the response carries `Vary` (§4.8, §4.12's
    /// STORE_OR_FLUSH). The root's `variant_map` is merged via CAS so
    /// concurrent writers never drop each other's mappings (§5).
    async fn store_entry(&self, base_key: &str, entry: CacheEntry, request_headers: &HeaderList) {
        let vary = vary_names(&entry.headers);
        if vary.is_empty() {
            if degrade_storage_error(self.inner.store.put(base_key, entry).await, "store").is_some() {
                self.inner.cache_updates.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }
        let Some(request_vkey) = variant_key(request_headers, &vary) else { return };
        let variant_cache_key = full_variant_cache_key(&request_vkey, base_key);

        degrade_storage_error(self.inner.store.put(&variant_cache_key, entry.clone()).await, "store variant");

        let root_fallback = entry.clone();
        let mapping_value = variant_cache_key.clone();
        let result = self
            .inner
            .store
            .update(
                base_key,
                self.inner.config.max_update_retries,
                Box::new(move |current: Option<&CacheEntry>| {
                    let mut next = current.cloned().unwrap_or_else(|| root_fallback.clone());
                    next.variant_map.insert(request_vkey.clone(), mapping_value.clone());
                    UpdateAction::Replace(Box::new(next))
                }),
            )
            .await;
        if degrade_storage_error(result, "store root variant map").is_some() {
            self.inner.cache_updates.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn schedule_revalidation(
        &self,
        cache_key: String,
        entry: CacheEntry,
        method: Method,
        uri: Uri,
        version: Version,
        request_headers: HeaderList,
    ) {
        let Some(revalidator) = self.inner.revalidator.clone() else { return };
        let attempt = self.inner.failure_cache.get_error_count(&cache_key).await;
        let inner = self.inner.clone();
        let key_for_job = cache_key.clone();
        let log_key = key_for_job.clone();
        let task: Pin<Box<dyn Future<Output = JobResult> + Send>> = Box::pin(async move {
            match Self::background_revalidate(inner, cache_key, entry, method, uri, version, request_headers).await {
                Ok(()) => JobResult::Success,
                Err(e) => {
                    log::debug!("background revalidation for {log_key} failed: {e}");
                    JobResult::Failure
                }
            }
        });
        revalidator.schedule(RevalidationJob { key: key_for_job, attempt, task });
    }

    /// The stale-while-revalidate background job body (§4.13): one
    /// conditional request, then a 304 merge or a fresh store, mirroring
    /// the relevant half of [`Self::synchronous_revalidate`] without the
    /// clock-skew retry (a background refresh can simply try again next
    /// time the entry goes stale).
    async fn background_revalidate(
        inner: Arc<Inner<S, O, R>>,
        cache_key: String,
        entry: CacheEntry,
        method: Method,
        uri: Uri,
        version: Version,
        request_headers: HeaderList,
    ) -> Result<()> {
        let cond = build_conditional_request(&method, &uri, &request_headers, &entry);
        let request_date = SystemTime::now();
        let mut builder = http::Request::builder().method(cond.method.clone()).uri(cond.uri.clone()).version(version);
        for h in cond.headers.iter() {
            builder = builder.header(h.name.as_str(), h.value.as_str());
        }
        let outbound = builder.body(empty_body()).map_err(CacheCoreError::Http)?;
        let response = inner.origin.execute(outbound).await?;
        let response_date = SystemTime::now();
        let (parts, body) = response.into_parts();
        let response_headers = HeaderList::from_header_map(&parts.headers);

        if parts.status == StatusCode::NOT_MODIFIED {
            let merged = merge_304(&entry, &response_headers, request_date, response_date);
            inner.store.put(&cache_key, merged).await?;
            return Ok(());
        }

        let cacheable = is_cacheable(
            &CacheabilityInput {
                origin_method: &method,
                response_status: parts.status,
                response_headers: &response_headers,
                response_version: parts.version,
                request_uri_has_query: uri.query().is_some(),
                request_headers: &request_headers,
            },
            &inner.config,
        );
        if !cacheable {
            return Ok(());
        }
        let declared_len = response_headers.get("content-length").and_then(|v| v.parse::<u64>().ok());
        if let ReadOutcome::WithinLimit { bytes } =
            read_with_limit(body, inner.config.max_object_size_bytes, declared_len).await?
        {
            let resource = inner.resources.generate(&cache_key, bytes).await?;
            let new_entry = CacheEntry {
                request_date,
                response_date,
                status: parts.status,
                reason: parts.status.canonical_reason().map(str::to_string),
                version: HttpVersion::from(parts.version),
                headers: response_headers,
                body_ref: Some(resource),
                request_method: method,
                variant_map: Default::default(),
            };
            inner.store.put(&cache_key, new_entry).await?;
        }
        Ok(())
    }

    async fn serve_cached(
        &self,
        entry: &CacheEntry,
        method: &Method,
        request_headers: &HeaderList,
    ) -> Result<http::Response<CoreBody>> {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
        if request_headers.contains("if-none-match") || request_headers.contains("if-modified-since") {
            let generated = generate_304_response(entry);
            return self.build_response(generated.status, &generated.headers, empty_body());
        }
        self.serve_full(entry, method, None).await
    }

    async fn serve_full(
        &self,
        entry: &CacheEntry,
        method: &Method,
        reason: Option<StaleServeReason>,
    ) -> Result<http::Response<CoreBody>> {
        let now = SystemTime::now();
        let (body, body_len) = if *method == Method::HEAD {
            (empty_body(), entry.body_ref.as_ref().map(|r| r.length()).unwrap_or(0))
        } else if let Some(resource) = &entry.body_ref {
            let bytes = resource.bytes().await?;
            let len = bytes.len() as u64;
            (full_body(bytes), len)
        } else {
            (empty_body(), 0)
        };
        let generated = generate_full_response(entry, now, self.inner.config.shared_cache, body_len, reason);
        self.build_response(generated.status, &generated.headers, body)
    }

    fn build_outbound_request(
        &self,
        method: &Method,
        uri: &Uri,
        version: Version,
        headers: &HeaderList,
        body: CoreBody,
    ) -> Result<http::Request<CoreBody>> {
        let mut builder = http::Request::builder().method(method.clone()).uri(uri.clone()).version(version);
        for h in headers.iter() {
            builder = builder.header(h.name.as_str(), h.value.as_str());
        }
        builder.body(body).map_err(CacheCoreError::Http)
    }

    fn build_response(
        &self,
        status: StatusCode,
        headers: &HeaderList,
        body: CoreBody,
    ) -> Result<http::Response<CoreBody>> {
        let mut builder = http::Response::builder().status(status);
        for h in headers.iter() {
            builder = builder.header(h.name.as_str(), h.value.as_str());
        }
        builder.body(body).map_err(CacheCoreError::Http)
    }

    fn synthesize(&self, status: StatusCode, message: &str) -> Result<http::Response<CoreBody>> {
        http::Response::builder()
            .status(status)
            .header("content-type", "text/plain; charset=utf-8")
            .header("content-length", message.len().to_string())
            .body(full_body(Bytes::copy_from_slice(message.as_bytes())))
            .map_err(CacheCoreError::Http)
    }

    fn synthesize_request_error(&self, reason: RequestNonComplianceReason) -> Result<http::Response<CoreBody>> {
        let status = match reason {
            RequestNonComplianceReason::BodyWithoutLength => StatusCode::LENGTH_REQUIRED,
            _ => StatusCode::BAD_REQUEST,
        };
        self.synthesize(status, &reason.to_string())
    }

    fn gateway_timeout(&self) -> Result<http::Response<CoreBody>> {
        self.synthesize(StatusCode::GATEWAY_TIMEOUT, "only-if-cached: no suitable cache entry")
    }
}

fn via_value(version: Version, pseudonym: &str) -> String {
    let proto = if version == Version::HTTP_10 { "1.0" } else { "1.1" };
    format!("{proto} {pseudonym} (cache)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure_cache::MemoryFailureCache;
    use crate::resource::MemoryResourceFactory;
    use crate::store::MemoryEntryStore;
    use crate::test_support::{ScriptedOrigin, ScriptedOutcome};

    fn orchestrator(
        outcomes: Vec<ScriptedOutcome>,
        config: CacheConfig,
    ) -> (CacheOrchestrator<MemoryEntryStore, ArcOrigin, MemoryResourceFactory>, Arc<ScriptedOrigin>) {
        let origin = Arc::new(ScriptedOrigin::new(outcomes));
        let orchestrator = CacheOrchestrator::new(
            MemoryEntryStore::new(),
            ArcOrigin(origin.clone()),
            MemoryResourceFactory,
            config,
            Arc::new(MemoryFailureCache::new()),
        );
        (orchestrator, origin)
    }

    /// `OriginExecutor` is implemented for owned types; this thin wrapper
    /// lets the test suite keep an `Arc<ScriptedOrigin>` around to assert
    /// on `requests_seen()` after handing a clone into the orchestrator.
    struct ArcOrigin(Arc<ScriptedOrigin>);

    #[async_trait::async_trait]
    impl OriginExecutor for ArcOrigin {
        async fn execute(&self, request: http::Request<CoreBody>) -> Result<http::Response<CoreBody>> {
            self.0.execute(request).await
        }
    }

    fn get_request(uri: &str) -> http::Request<CoreBody> {
        http::Request::builder().method(Method::GET).uri(uri).body(empty_body()).unwrap()
    }

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderList {
        let mut h = HeaderList::new();
        for (name, value) in pairs {
            h.push(*name, *value);
        }
        h
    }

    fn fresh_response(extra_max_age: u64) -> ScriptedOutcome {
        ScriptedOutcome::Response {
            status: StatusCode::OK,
            headers: headers_with(&[
                ("Date", "Wed, 21 Oct 2026 07:28:00 GMT"),
                ("Cache-Control", &format!("max-age={extra_max_age}")),
                ("ETag", "\"v1\""),
            ]),
            body: b"hello".to_vec(),
        }
    }

    #[tokio::test]
    async fn fresh_get_is_served_from_cache_on_second_request() {
        let (orchestrator, origin) = orchestrator(vec![fresh_response(60)], CacheConfig::default());

        let first = orchestrator.execute(get_request("http://example.com/a"), ExecuteOptions::default()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = orchestrator.execute(get_request("http://example.com/a"), ExecuteOptions::default()).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert!(second.headers().contains_key("age"));

        assert_eq!(origin.requests_seen(), 1);
        assert_eq!(orchestrator.cache_hits(), 1);
        assert_eq!(orchestrator.cache_misses(), 1);
    }

    #[tokio::test]
    async fn unconditional_put_invalidates_prior_entry() {
        let (orchestrator, origin) = orchestrator(
            vec![
                fresh_response(60),
                ScriptedOutcome::Response { status: StatusCode::OK, headers: HeaderList::new(), body: vec![] },
                fresh_response(60),
            ],
            CacheConfig::default(),
        );

        orchestrator.execute(get_request("http://example.com/a"), ExecuteOptions::default()).await.unwrap();

        let put = http::Request::builder()
            .method(Method::PUT)
            .uri("http://example.com/a")
            .body(empty_body())
            .unwrap();
        orchestrator.execute(put, ExecuteOptions::default()).await.unwrap();

        orchestrator.execute(get_request("http://example.com/a"), ExecuteOptions::default()).await.unwrap();
        // PUT is not servable from cache and the prior GET entry was flushed,
        // so all three requests reach the origin.
        assert_eq!(origin.requests_seen(), 3);
        assert_eq!(orchestrator.cache_hits(), 0);
    }

    #[tokio::test]
    async fn synchronous_revalidation_returns_304_served_as_200() {
        let (orchestrator, origin) = orchestrator(
            vec![
                fresh_response(0),
                ScriptedOutcome::Response {
                    status: StatusCode::NOT_MODIFIED,
                    headers: headers_with(&[
                        ("Date", "Wed, 21 Oct 2026 08:28:00 GMT"),
                        ("Cache-Control", "max-age=60"),
                        ("ETag", "\"v1\""),
                    ]),
                    body: vec![],
                },
            ],
            CacheConfig::default(),
        );

        let first = orchestrator.execute(get_request("http://example.com/a"), ExecuteOptions::default()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = orchestrator.execute(get_request("http://example.com/a"), ExecuteOptions::default()).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(origin.requests_seen(), 2);
    }

    #[tokio::test]
    async fn only_if_cached_without_entry_returns_504() {
        let (orchestrator, origin) = orchestrator(vec![], CacheConfig::default());
        let mut request = get_request("http://example.com/a");
        request.headers_mut().insert("cache-control", "only-if-cached".parse().unwrap());
        let response = orchestrator.execute(request, ExecuteOptions::default()).await.unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(origin.requests_seen(), 0);
    }

    #[tokio::test]
    async fn variant_negotiation_stores_both_variants() {
        let mut config = CacheConfig::default();
        config.shared_cache = true;
        let (orchestrator, origin) = orchestrator(
            vec![
                ScriptedOutcome::Response {
                    status: StatusCode::OK,
                    headers: headers_with(&[
                        ("Date", "Wed, 21 Oct 2026 07:28:00 GMT"),
                        ("Cache-Control", "max-age=60"),
                        ("ETag", "\"etag-v1\""),
                        ("Vary", "Accept-Encoding"),
                    ]),
                    body: b"gzip-body".to_vec(),
                },
                ScriptedOutcome::Response {
                    status: StatusCode::OK,
                    headers: headers_with(&[
                        ("Date", "Wed, 21 Oct 2026 07:29:00 GMT"),
                        ("Cache-Control", "max-age=60"),
                        ("ETag", "\"etag-v2\""),
                        ("Vary", "Accept-Encoding"),
                    ]),
                    body: b"identity-body".to_vec(),
                },
            ],
            config,
        );

        let mut gzip_request = get_request("http://example.com/a");
        gzip_request.headers_mut().insert("accept-encoding", "gzip".parse().unwrap());
        let gzip_response = orchestrator.execute(gzip_request, ExecuteOptions::default()).await.unwrap();
        assert_eq!(gzip_response.status(), StatusCode::OK);

        let mut identity_request = get_request("http://example.com/a");
        identity_request.headers_mut().insert("accept-encoding", "identity".parse().unwrap());
        let identity_response = orchestrator.execute(identity_request, ExecuteOptions::default()).await.unwrap();
        assert_eq!(identity_response.status(), StatusCode::OK);

        assert_eq!(origin.requests_seen(), 2);
    }

    #[tokio::test]
    async fn truncated_body_yields_502_and_stores_nothing() {
        let (orchestrator, _origin) = orchestrator(
            vec![ScriptedOutcome::Response {
                status: StatusCode::OK,
                headers: headers_with(&[
                    ("Date", "Wed, 21 Oct 2026 07:28:00 GMT"),
                    ("Cache-Control", "max-age=60"),
                    ("Content-Length", "1000"),
                ]),
                body: b"short body".to_vec(),
            }],
            CacheConfig::default(),
        );
        let response = orchestrator.execute(get_request("http://example.com/a"), ExecuteOptions::default()).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(orchestrator.cache_updates(), 0);
    }
}
