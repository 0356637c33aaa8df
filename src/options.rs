//! Per-call configuration: cache mode, retry policy, proxy/agent hints, and
//! the override hooks threaded through the orchestrator.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::request;
use http_cache_semantics::CacheOptions;

use crate::key::CacheKeyFn;
use crate::response::HttpResponse;

/// How the orchestrator should treat a request against the cache (§4.8).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Standard HTTP caching rules: serve if fresh, revalidate if stale,
    /// fetch on miss, fall back to stale-on-error unless `must-revalidate`.
    #[default]
    Default,
    /// Never read or write the cache.
    NoStore,
    /// Bypass the cache on read but write the response that comes back.
    Reload,
    /// Always revalidate a cached entry; fetch normally on a miss.
    NoCache,
    /// Serve any cached entry unconditionally, even if stale; fetch on miss.
    ForceCache,
    /// Serve any cached entry unconditionally; fail with `NotCached` on a miss.
    OnlyIfCached,
    /// Cache every 200/HEAD response and always serve what's cached,
    /// ignoring `Cache-Control` entirely (additive mode, not in RFC 7234).
    IgnoreRules,
}

/// Exponential backoff parameters for the retry engine (C4, §4.4).
#[derive(Debug, Clone, Copy)]
pub struct RetryOptions {
    /// Maximum number of retry attempts after the first. `0` disables retry.
    pub retries: u32,
    /// Backoff multiplier applied per attempt.
    pub factor: f64,
    /// Minimum backoff delay.
    pub min_timeout: Duration,
    /// Maximum backoff delay regardless of `factor`.
    pub max_timeout: Duration,
    /// Whether to jitter the computed delay.
    pub randomize: bool,
    /// Per-attempt wall-clock deadline.
    pub timeout: Option<Duration>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            retries: 2,
            factor: 2.0,
            min_timeout: Duration::from_millis(1000),
            max_timeout: Duration::from_secs(30),
            randomize: true,
            timeout: None,
        }
    }
}

/// Connection-pool / proxy hints (C5, §4.5).
#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    /// Explicit proxy URL; overrides environment lookup.
    pub proxy: Option<String>,
    /// `false` disables pooling for this request (one-shot, `Connection: close`).
    pub pooled: bool,
    /// Maximum sockets per pooled agent.
    pub max_sockets: Option<usize>,
}

/// A caller hook that may override the effective cache mode per-request.
pub type CacheModeFn = Arc<dyn Fn(&request::Parts) -> CacheMode + Send + Sync>;
/// A caller hook invoked after a response arrives that may override the mode
/// used to decide storability for that single response (§2.1).
pub type ResponseCacheModeFn =
    Arc<dyn Fn(&request::Parts, &HttpResponse) -> Option<CacheMode> + Send + Sync>;
/// A caller hook naming additional cache keys to invalidate before the
/// request is served (§2.1).
pub type CacheBustFn = Arc<dyn Fn(&request::Parts, &str) -> Vec<String> + Send + Sync>;
/// A caller hook computing metadata to store alongside a cached entry (§2.1).
pub type MetadataProvider =
    Arc<dyn Fn(&request::Parts, &http::response::Parts) -> Option<Vec<u8>> + Send + Sync>;

/// The full per-call option set (§3).
#[derive(Clone)]
pub struct Options {
    /// Cache mode for this request.
    pub cache: CacheMode,
    /// Subresource-integrity constraint on the served body, if any.
    pub integrity: Option<ssri::Integrity>,
    /// Retry/backoff configuration.
    pub retry: RetryOptions,
    /// Agent/pool/proxy configuration.
    pub agent: AgentOptions,
    /// RFC 7234 policy tuning (clock skew tolerance, shared vs private cache).
    pub cache_options: Option<CacheOptions>,
    /// Override cache-key derivation.
    pub cache_key_fn: Option<CacheKeyFn>,
    /// Override cache-mode derivation per-request.
    pub cache_mode_fn: Option<CacheModeFn>,
    /// Override cache-mode after a response arrives.
    pub response_cache_mode_fn: Option<ResponseCacheModeFn>,
    /// Additional keys to bust before this request runs.
    pub cache_bust_fn: Option<CacheBustFn>,
    /// Metadata to store alongside a cached entry.
    pub metadata_provider: Option<MetadataProvider>,
    /// Clamp on the effective freshness lifetime regardless of server headers.
    pub max_ttl: Option<Duration>,
    /// Whether to set `x-cache`/`x-cache-lookup` on responses.
    pub cache_status_headers: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cache: CacheMode::default(),
            integrity: None,
            retry: RetryOptions::default(),
            agent: AgentOptions { pooled: true, ..Default::default() },
            cache_options: None,
            cache_key_fn: None,
            cache_mode_fn: None,
            response_cache_mode_fn: None,
            cache_bust_fn: None,
            metadata_provider: None,
            max_ttl: None,
            cache_status_headers: true,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("cache", &self.cache)
            .field("integrity", &self.integrity)
            .field("retry", &self.retry)
            .field("agent", &self.agent)
            .field("cache_options", &self.cache_options)
            .field("cache_key_fn", &self.cache_key_fn.as_ref().map(|_| "Fn(..)"))
            .field("cache_mode_fn", &self.cache_mode_fn.as_ref().map(|_| "Fn(..)"))
            .field("max_ttl", &self.max_ttl)
            .field("cache_status_headers", &self.cache_status_headers)
            .finish_non_exhaustive()
    }
}

impl Options {
    /// Applies `max_ttl` by clamping any `max-age`/`s-maxage` directive on
    /// `cache_control` down to the configured ceiling (§4.2 ADDED).
    pub fn clamp_max_age(&self, cache_control: &str) -> String {
        let Some(max_ttl) = self.max_ttl else { return cache_control.to_owned() };
        let ceiling = max_ttl.as_secs();
        let existing = cache_control.split(',').find_map(|d| {
            let d = d.trim();
            d.strip_prefix("max-age=").and_then(|v| v.parse::<u64>().ok())
        });
        let effective = existing.map_or(ceiling, |e| e.min(ceiling));
        let mut directives: Vec<String> = cache_control
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty() && !d.starts_with("max-age="))
            .map(str::to_owned)
            .collect();
        directives.push(format!("max-age={effective}"));
        directives.join(", ")
    }
}
