#![forbid(unsafe_code, future_incompatible)]
#![deny(
    missing_debug_implementations,
    nonstandard_style,
    unused_qualifications,
    unused_import_braces,
    unused_extern_crates,
    trivial_casts,
    trivial_numeric_casts
)]
#![allow(clippy::doc_lazy_continuation)]
//! A client-side `fetch()` with an RFC 7234 HTTP cache in front of a
//! pluggable transport, following the design of
//! [`make-fetch-happen`](https://github.com/npm/make-fetch-happen) and
//! built on [`http-cache-semantics`](https://github.com/kornelski/rusty-http-cache-semantics)
//! for the caching rules and [`cacache`](https://github.com/zkat/cacache-rs)
//! for the default on-disk store.
//!
//! ```no_run
//! use fetch_cache::{Client, Options};
//!
//! # async fn run() -> fetch_cache::Result<()> {
//! let client = Client::new("./cache")?;
//! let res = client.fetch("https://example.com".parse().unwrap(), Options::default()).await?;
//! println!("status: {}", res.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Cache modes
//!
//! [`CacheMode`] selects how a request is weighed against the cache:
//! `Default` follows RFC 7234 freshness/revalidation rules, `NoStore`
//! bypasses the cache entirely, `Reload` always fetches but still writes
//! the result, `NoCache` always revalidates a cached entry, `ForceCache`
//! and `OnlyIfCached` serve whatever is cached unconditionally (differing
//! only in what happens on a miss), and `IgnoreRules` caches and serves
//! every `200`/`HEAD` response regardless of `Cache-Control`.

mod body;
mod cache;
mod defaults;
mod error;
mod key;
mod options;
mod pool;
mod response;
mod retry;
mod store;
mod transport;

pub use body::{tee, StreamingBody, TeeOutcome};
pub use cache::{Cache, Request};
pub use defaults::Defaults;
pub use error::{Error, Result};
pub use options::{
    AgentOptions, CacheBustFn, CacheMode, CacheModeFn, MetadataProvider, Options, ResponseCacheModeFn,
    RetryOptions,
};
pub use response::{HitOrMiss, HttpHeaders, HttpResponse};
pub use store::{CacacheStore, CacheManager, MemoryStore};
pub use transport::OutgoingRequest;

use std::sync::Arc;

use url::Url;

/// A cache-backed HTTP client: a [`cache::Cache`] plus the convenience
/// constructors callers actually reach for.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<cache::Cache<CacacheStore>>,
}

impl Client {
    /// Opens (creating if absent) a disk-backed client rooted at `path`.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        Ok(Self { inner: Arc::new(cache::Cache::new(CacacheStore::new(path))) })
    }

    /// Performs `url` with `options`, per the cache-mode state machine (§4.8).
    pub async fn fetch(&self, url: Url, options: Options) -> Result<HttpResponse> {
        let req = Request::get(url);
        self.inner.run(&req, &options).await
    }

    /// Performs a fully-specified `req` with `options`.
    pub async fn execute(&self, req: Request, options: Options) -> Result<HttpResponse> {
        self.inner.run(&req, &options).await
    }

    /// Builds a [`Defaults`] wrapper pre-binding `base_url`/`base_options`
    /// onto this client (§4.9).
    pub fn defaults(&self, base_url: Option<Url>, base_options: Options) -> Defaults<CacacheStore> {
        Defaults::new(self.inner.clone(), base_url, base_options)
    }
}

/// Builds a client over an arbitrary [`CacheManager`], for callers who want
/// [`MemoryStore`] or their own store implementation instead of the default
/// disk-backed [`CacacheStore`].
pub fn client_with_manager<M: CacheManager>(manager: M) -> cache::Cache<M> {
    cache::Cache::new(manager)
}
