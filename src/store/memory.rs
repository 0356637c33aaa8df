//! A trivial in-memory [`CacheManager`], useful for tests and ephemeral
//! callers that don't want a disk footprint.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use http_cache_semantics::CachePolicy;

use crate::error::Result;
use crate::response::HttpResponse;
use crate::store::CacheManager;

/// An in-process cache store backed by a `HashMap`. Entries do not survive
/// past the process and are not shared across `MemoryStore` instances.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (HttpResponse, CachePolicy)>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheManager for MemoryStore {
    async fn get(&self, cache_key: &str) -> Result<Option<(HttpResponse, CachePolicy)>> {
        Ok(self.entries.lock().unwrap().get(cache_key).cloned())
    }

    async fn put(&self, cache_key: String, res: HttpResponse, policy: CachePolicy) -> Result<HttpResponse> {
        self.entries.lock().unwrap().insert(cache_key, (res.clone(), policy));
        Ok(res)
    }

    async fn delete(&self, cache_key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(cache_key);
        Ok(())
    }
}
