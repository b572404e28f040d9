#![forbid(unsafe_code, future_incompatible)]
#![deny(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    nonstandard_style,
    unused_qualifications,
    unused_import_braces,
    unused_extern_crates,
    trivial_casts,
    trivial_numeric_casts
)]
#![allow(clippy::doc_lazy_continuation)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! A conditionally-compliant RFC 7234 cache decision engine for HTTP/1.1,
//! decoupled from any particular transport or storage backend.
//!
//! This crate implements the core decision logic an HTTP cache needs --
//! freshness and age arithmetic, response cacheability, request
//! servability, cached-response suitability, conditional revalidation,
//! `Vary`-based variant negotiation, and invalidation -- behind three
//! small collaborator traits: [`OriginExecutor`], [`EntryStore`], and
//! [`ResourceFactory`]. Callers supply the concrete storage and transport;
//! this crate supplies the protocol.
//!
//! ## Basic usage
//!
//! ```rust
//! use http_cache_core::{CacheConfig, CacheOrchestrator, ExecuteOptions};
//! use http_cache_core::store::MemoryEntryStore;
//! use http_cache_core::resource::MemoryResourceFactory;
//! use http_cache_core::failure_cache::MemoryFailureCache;
//! use http_cache_core::test_support::{ScriptedOrigin, ScriptedOutcome};
//! use http_cache_core::origin::empty_body;
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let origin = ScriptedOrigin::new(vec![]);
//! let orchestrator = CacheOrchestrator::new(
//!     MemoryEntryStore::new(),
//!     origin,
//!     MemoryResourceFactory,
//!     CacheConfig::default(),
//!     Arc::new(MemoryFailureCache::new()),
//! );
//! let request = http::Request::builder()
//!     .uri("http://example.com/")
//!     .body(empty_body())
//!     .unwrap();
//! let _ = orchestrator.execute(request, ExecuteOptions::default()).await;
//! # }
//! ```
//!
//! ## Non-goals
//!
//! This crate does not implement byte-range (206) caching beyond passing
//! such responses through uncached, does not attempt to multiplex
//! concurrent requests for the same resource into a single origin call
//! the way a shared proxy might, and does not persist statistics across
//! process restarts -- [`CacheOrchestrator::cache_hits`] and friends are
//! in-memory counters only.

pub mod age;
pub mod body;
pub mod cacheability;
pub mod compliance;
pub mod conditional;
pub mod config;
pub mod dates;
pub mod entry;
pub mod error;
pub mod failure_cache;
pub mod generate;
pub mod headers;
pub mod invalidate;
pub mod key;
pub mod orchestrator;
pub mod origin;
pub mod resource;
pub mod revalidate;
pub mod servability;
pub mod store;
pub mod suitability;
pub mod update;
pub mod wire;

/// A scriptable [`OriginExecutor`] test double, exposed so downstream
/// crates building on [`CacheOrchestrator`] can drive it in their own
/// tests without standing up a real transport.
pub mod test_support;

pub use config::CacheConfig;
pub use entry::{CacheEntry, HttpVersion, Variant};
pub use error::{CacheCoreError, ProtocolNonComplianceReason, RequestNonComplianceReason, Result};
pub use headers::{CacheControl, Header, HeaderList};
pub use orchestrator::{CacheOrchestrator, ExecuteOptions};
pub use origin::{CoreBody, OriginExecutor};
pub use resource::{Resource, ResourceFactory};
pub use store::{EntryStore, UpdateAction, UpdateOutcome};
pub use wire::{deserialize, serialize};
