//! The cache store contract (component C3, §4.3, §6).

mod cacache_store;
mod memory;

pub use cacache_store::CacacheStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use http_cache_semantics::CachePolicy;

use crate::error::Result;
use crate::response::HttpResponse;

/// Persists and retrieves cache entries keyed by the fingerprint from
/// `key::compute`. Implementors own the storage medium; the orchestrator
/// never touches it directly.
#[async_trait]
pub trait CacheManager: Send + Sync + 'static {
    /// Looks up a stored response and its policy by cache key.
    async fn get(&self, cache_key: &str) -> Result<Option<(HttpResponse, CachePolicy)>>;

    /// Stores `res` and `policy` under `cache_key`, returning the response
    /// that should be handed back to the caller (by convention, unchanged).
    async fn put(&self, cache_key: String, res: HttpResponse, policy: CachePolicy) -> Result<HttpResponse>;

    /// Re-associates the content already stored under `cache_key`'s prior
    /// integrity with a fresh `res`/`policy` (refreshed headers only), used
    /// for 304 merges and HEAD responses so the body is never rewritten.
    /// Falls back to `put` when no such content exists.
    async fn put_metadata_only(&self, cache_key: String, res: HttpResponse, policy: CachePolicy) -> Result<HttpResponse> {
        self.put(cache_key, res, policy).await
    }

    /// Removes the entry for `cache_key`. Not finding one is not an error.
    async fn delete(&self, cache_key: &str) -> Result<()>;

    /// The store's root, reported in the `x-local-cache` header (§6). Empty
    /// for stores with no meaningful filesystem location.
    fn root(&self) -> &str {
        ""
    }
}
