//! Failure Counter (§3, §6): tracks consecutive revalidation failures per
//! identifier so the async revalidator can back off pathological keys.

use async_trait::async_trait;
use dashmap::DashMap;

/// Optional collaborator used by the async revalidator to implement
/// exponential back-off. A no-op implementation is a valid `FailureCache`;
/// the orchestrator treats it as best-effort.
#[async_trait]
pub trait FailureCache: Send + Sync + 'static {
    /// The current consecutive-failure count for `id`.
    async fn get_error_count(&self, id: &str) -> u32;
    /// Clears the failure count for `id`, called after a successful
    /// revalidation.
    async fn reset(&self, id: &str);
    /// Increments and returns the failure count for `id`.
    async fn increase(&self, id: &str) -> u32;
}

/// An in-memory `FailureCache`. Reference implementation only.
#[derive(Debug, Default)]
pub struct MemoryFailureCache {
    counts: DashMap<String, u32>,
}

impl MemoryFailureCache {
    /// Builds an empty failure cache.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FailureCache for MemoryFailureCache {
    async fn get_error_count(&self, id: &str) -> u32 {
        self.counts.get(id).map(|v| *v).unwrap_or(0)
    }

    async fn reset(&self, id: &str) {
        self.counts.remove(id);
    }

    async fn increase(&self, id: &str) -> u32 {
        let mut entry = self.counts.entry(id.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn increase_and_reset() {
        let cache = MemoryFailureCache::new();
        assert_eq!(cache.get_error_count("k").await, 0);
        assert_eq!(cache.increase("k").await, 1);
        assert_eq!(cache.increase("k").await, 2);
        cache.reset("k").await;
        assert_eq!(cache.get_error_count("k").await, 0);
    }
}
