//! Error types for the cache decision engine.
//!
//! Storage and origin errors never escape the orchestrator as a `Result::Err`
//! on the request path (the cache degrades to best-effort); compliance and
//! protocol errors are surfaced because they change what gets sent back to
//! the caller. See [`CacheCoreError`] for the full kind list.

use miette::Diagnostic;
use thiserror::Error;

/// A `Result` typedef to use with [`CacheCoreError`].
pub type Result<T> = std::result::Result<T, CacheCoreError>;

/// Why a request was judged fatally non-compliant and converted into a
/// synthetic error response instead of being forwarded to the origin.
#[derive(Error, Diagnostic, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestNonComplianceReason {
    /// A weak ETag was used in an `If-Range` conditional.
    #[error("weak ETag used in If-Range")]
    WeakEtagWithRange,
    /// A weak ETag was used in an `If-Match`/`If-None-Match` on PUT/DELETE.
    #[error("weak ETag used in If-Match/If-None-Match on PUT or DELETE")]
    WeakEtagOnPutDelete,
    /// `Cache-Control: no-cache` carried a field-name form (`no-cache="x"`).
    #[error("no-cache directive carried a field-name form")]
    NoCacheWithFieldName,
    /// A request body was present with no determinable length.
    #[error("request body present without a determinable length")]
    BodyWithoutLength,
}

/// Why an origin response was judged non-compliant with HTTP/1.1.
#[derive(Error, Diagnostic, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolNonComplianceReason {
    /// 401 without `WWW-Authenticate`.
    #[error("401 response missing WWW-Authenticate")]
    MissingWwwAuthenticate,
    /// 405 without `Allow`.
    #[error("405 response missing Allow")]
    MissingAllow,
    /// 407 without `Proxy-Authenticate`.
    #[error("407 response missing Proxy-Authenticate")]
    MissingProxyAuthenticate,
    /// 206 without a `Content-Range` request header.
    #[error("206 response to a request without Content-Range")]
    PartialContentWithoutRange,
    /// 100 Continue sent to a request that did not send `Expect: 100-continue`.
    #[error("100 Continue sent to a non-expecting request")]
    UnexpectedContinue,
}

/// The complete set of error kinds this crate can produce, per the error
/// handling design: storage and origin errors are recoverable and logged;
/// compliance and protocol errors are surfaced because they change the
/// response the caller receives.
#[derive(Error, Diagnostic, Debug)]
pub enum CacheCoreError {
    /// The inbound request could not be made compliant and must be answered
    /// with a synthetic error response instead of being forwarded.
    #[error("request is fatally non-compliant: {0}")]
    #[diagnostic(code(http_cache_core::request_non_compliant))]
    RequestFatallyNonCompliant(RequestNonComplianceReason),

    /// The origin response violates a mandatory HTTP/1.1 constraint.
    #[error("response is protocol non-compliant: {0}")]
    #[diagnostic(code(http_cache_core::protocol_non_compliant))]
    ProtocolNonCompliantResponse(ProtocolNonComplianceReason),

    /// The origin executor failed at the transport level.
    #[error("origin request failed: {0}")]
    #[diagnostic(code(http_cache_core::origin_io))]
    OriginIoError(String),

    /// The entry store failed at the storage level. The orchestrator logs
    /// this and proceeds as if the lookup/store had missed.
    #[error("cache storage failed: {0}")]
    #[diagnostic(code(http_cache_core::storage_io))]
    StorageIoError(String),

    /// `EntryStore::update` exhausted its retry budget without committing.
    #[error("entry update conflict for key {key:?} after {attempts} attempt(s)")]
    #[diagnostic(code(http_cache_core::update_conflict))]
    EntryUpdateConflict {
        /// The cache-key the update targeted.
        key: String,
        /// How many CAS attempts were made before giving up.
        attempts: usize,
    },

    /// Entry (de)serialization failed, e.g. for an out-of-process store.
    /// Treated identically to [`CacheCoreError::StorageIoError`] by the
    /// orchestrator.
    #[error("entry serialization failed: {0}")]
    #[diagnostic(code(http_cache_core::serialization))]
    SerializationError(String),

    /// Origin declared `Content-Length` larger than the body actually
    /// delivered.
    #[error("origin declared Content-Length {declared} but body ended after {actual} bytes")]
    #[diagnostic(code(http_cache_core::truncated_body))]
    TruncatedBody {
        /// The `Content-Length` the origin declared.
        declared: u64,
        /// The number of bytes actually read before the stream ended.
        actual: u64,
    },

    /// Error constructing or manipulating `http` crate types.
    #[error(transparent)]
    #[diagnostic(code(http_cache_core::http))]
    Http(#[from] http::Error),

    /// Error parsing a header value as UTF-8.
    #[error(transparent)]
    #[diagnostic(code(http_cache_core::header_to_str))]
    HeaderToStr(#[from] http::header::ToStrError),

    /// Error parsing a header value.
    #[error(transparent)]
    #[diagnostic(code(http_cache_core::invalid_header_value))]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Error parsing a header name.
    #[error(transparent)]
    #[diagnostic(code(http_cache_core::invalid_header_name))]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
}

impl CacheCoreError {
    /// True for the two kinds the orchestrator treats as best-effort
    /// degradation rather than a surfaced error (§7: storage errors never
    /// cross the core boundary).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CacheCoreError::StorageIoError(_)
                | CacheCoreError::SerializationError(_)
                | CacheCoreError::EntryUpdateConflict { .. }
        )
    }
}
