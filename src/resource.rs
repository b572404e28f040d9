//! The `Resource` / `ResourceFactory` collaborator boundary (§6): an opaque,
//! re-readable body handle owned by the entry store, so a `CacheEntry` never
//! embeds raw bytes directly and storage backends are free to back a
//! resource with heap bytes, a temp file, or a remote blob.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

use crate::error::{CacheCoreError, Result};

/// An opaque, re-readable entity body owned by the entry store.
#[async_trait]
pub trait Resource: Send + Sync + fmt::Debug {
    /// The resource's length in bytes.
    fn length(&self) -> u64;

    /// Reads the full resource. May be called more than once (e.g. once to
    /// serve a response, again later to serve a subsequent request for the
    /// same entry), so implementations must support repeat reads.
    async fn bytes(&self) -> Result<Bytes>;
}

/// Produces and clones [`Resource`] handles for the entry store.
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    /// Writes `bytes` to storage under `key` and returns a handle to it.
    /// `bytes` has already passed through the
    /// [Size-Limited Body Reader](crate::body) cap, so the factory itself
    /// never needs to enforce `max_object_size_bytes`.
    async fn generate(&self, key: &str, bytes: Bytes) -> Result<Arc<dyn Resource>>;

    /// Produces an independent handle to the same content as `resource`,
    /// stored under `key` (used when a variant entry shares body bytes with
    /// its root, or when an entry is copied rather than moved).
    async fn copy(&self, key: &str, resource: &Arc<dyn Resource>) -> Result<Arc<dyn Resource>>;
}

/// An in-memory [`Resource`] backed by `bytes::Bytes`. The reference
/// [`crate::store::MemoryEntryStore`]'s factory produces these; it is not a
/// production storage backend, only a concrete type the crate's own tests
/// and doctests can drive the orchestrator with.
#[derive(Debug, Clone)]
pub struct BytesResource(pub Bytes);

#[async_trait]
impl Resource for BytesResource {
    fn length(&self) -> u64 {
        self.0.len() as u64
    }

    async fn bytes(&self) -> Result<Bytes> {
        Ok(self.0.clone())
    }
}

/// A [`ResourceFactory`] that stores bodies in-process as `Bytes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryResourceFactory;

#[async_trait]
impl ResourceFactory for MemoryResourceFactory {
    async fn generate(&self, _key: &str, bytes: Bytes) -> Result<Arc<dyn Resource>> {
        Ok(Arc::new(BytesResource(bytes)))
    }

    async fn copy(&self, _key: &str, resource: &Arc<dyn Resource>) -> Result<Arc<dyn Resource>> {
        let data = resource.bytes().await.map_err(|e| {
            CacheCoreError::StorageIoError(format!("failed to copy resource: {e}"))
        })?;
        Ok(Arc::new(BytesResource(data)))
    }
}
