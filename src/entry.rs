//! The stored cache entry and its supporting value types (§3 Data Model).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use http::{Method, StatusCode};

use crate::headers::HeaderList;
use crate::resource::Resource;

/// The HTTP version an entry or response was produced with. A small closed
/// set rather than `http::Version` directly, so serialization (§6) has a
/// stable, minimal wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpVersion {
    /// HTTP/1.0.
    Http10,
    /// HTTP/1.1.
    Http11,
}

impl HttpVersion {
    /// The wire representation, e.g. `"HTTP/1.1"`.
    pub fn as_str(self) -> &'static str {
        match self {
            HttpVersion::Http10 => "HTTP/1.0",
            HttpVersion::Http11 => "HTTP/1.1",
        }
    }
}

impl From<http::Version> for HttpVersion {
    fn from(v: http::Version) -> Self {
        if v == http::Version::HTTP_10 {
            HttpVersion::Http10
        } else {
            HttpVersion::Http11
        }
    }
}

impl From<HttpVersion> for http::Version {
    fn from(v: HttpVersion) -> Self {
        match v {
            HttpVersion::Http10 => http::Version::HTTP_10,
            HttpVersion::Http11 => http::Version::HTTP_11,
        }
    }
}

/// One stored response, per §3. Immutable once placed in the store: the
/// [Entry Updater](crate::update) never mutates an entry in place, it always
/// produces a replacement.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Wall-clock instant the request that produced this entry was issued.
    pub request_date: SystemTime,
    /// Wall-clock instant the response was received. Always `>= request_date`.
    pub response_date: SystemTime,
    /// The stored response's status code.
    pub status: StatusCode,
    /// The stored response's reason phrase, if non-canonical.
    pub reason: Option<String>,
    /// The stored response's HTTP version.
    pub version: HttpVersion,
    /// The stored response's headers.
    pub headers: HeaderList,
    /// Absent for 204/304-derived entries with no entity.
    pub body_ref: Option<Arc<dyn Resource>>,
    /// The method that produced this entry (almost always GET, occasionally
    /// HEAD), used when reconstructing responses.
    pub request_method: Method,
    /// variant-key -> full cache-key, for each stored variant. Empty for a
    /// non-varying entry. A non-empty map marks this entry as a "root" entry.
    pub variant_map: BTreeMap<String, String>,
}

impl CacheEntry {
    /// Whether this entry is a "root" entry carrying a non-empty
    /// `variant_map` (§3's Vary negotiation).
    pub fn is_root_with_variants(&self) -> bool {
        !self.variant_map.is_empty()
    }
}

/// Transient tuple used only during 304-matching of variant responses
/// (§3 Variant).
#[derive(Debug, Clone)]
pub struct Variant {
    /// The normalized value of the varying request headers named by `Vary`.
    pub variant_key: String,
    /// The full store key this variant is kept under.
    pub variant_cache_key: String,
    /// The stored entry for this variant.
    pub entry: CacheEntry,
}
