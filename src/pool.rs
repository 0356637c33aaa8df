//! Agent pool (component C5, §4.5).
//!
//! `reqwest::Client` is the analogue of a Node `http.Agent`: it owns a
//! connection pool and should be reused across requests to the same
//! destination profile rather than rebuilt per call. This pool memoizes
//! clients in a bounded LRU keyed by whether the scheme is HTTPS and the
//! resolved proxy, mirroring the teacher's (unused) optional `lru`
//! dependency repurposed here for its intended job.

use std::sync::Mutex;

use lru::LruCache;

use crate::error::Result;
use crate::options::AgentOptions;

const DEFAULT_CAPACITY: usize = 50;
const DEFAULT_MAX_SOCKETS: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AgentKey {
    is_https: bool,
    proxy: Option<String>,
    max_sockets: usize,
}

/// A bounded, thread-safe cache of `reqwest::Client`s keyed by destination
/// profile.
pub struct AgentPool {
    clients: Mutex<LruCache<AgentKey, reqwest::Client>>,
}

impl std::fmt::Debug for AgentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPool").finish_non_exhaustive()
    }
}

impl Default for AgentPool {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl AgentPool {
    /// A pool holding at most `capacity` distinct client profiles.
    pub fn new(capacity: usize) -> Self {
        Self { clients: Mutex::new(LruCache::new(std::num::NonZeroUsize::new(capacity.max(1)).unwrap())) }
    }

    /// Number of distinct destination profiles currently memoized.
    pub fn len(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    /// Whether the pool currently holds no profiles.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a client for `url` honoring `opts`. `opts.pooled == false`
    /// builds a fresh one-shot client every call instead of consulting the
    /// pool (disables keepalive reuse for that request).
    pub fn client_for(&self, url: &url::Url, opts: &AgentOptions) -> Result<reqwest::Client> {
        let is_https = url.scheme() == "https";
        let proxy = resolve_proxy(url, opts);
        let max_sockets = opts.max_sockets.unwrap_or(DEFAULT_MAX_SOCKETS);

        if !opts.pooled {
            return Ok(build_client(is_https, proxy.as_deref(), max_sockets)?);
        }

        let key = AgentKey { is_https, proxy: proxy.clone(), max_sockets };
        let mut guard = self.clients.lock().unwrap();
        if let Some(client) = guard.get(&key) {
            return Ok(client.clone());
        }
        let client = build_client(is_https, proxy.as_deref(), max_sockets)?;
        guard.put(key, client.clone());
        Ok(client)
    }
}

fn build_client(_is_https: bool, proxy: Option<&str>, max_sockets: usize) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().pool_max_idle_per_host(max_sockets);
    if let Some(proxy_url) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url).map_err(crate::error::Error::from)?);
    } else {
        builder = builder.no_proxy();
    }
    builder.build().map_err(crate::error::Error::from)
}

/// Resolves the effective proxy for `url`, per §4.5's precedence: explicit
/// option wins; otherwise `https_proxy` applies to any scheme; `http_proxy`
/// applies only to `http://` URLs. Each environment variable is looked up
/// verbatim, then uppercased, then lowercased.
fn resolve_proxy(url: &url::Url, opts: &AgentOptions) -> Option<String> {
    if let Some(p) = &opts.proxy {
        return Some(p.clone());
    }
    if let Some(p) = env_lookup("https_proxy") {
        return Some(p);
    }
    if url.scheme() == "http" {
        if let Some(p) = env_lookup("http_proxy") {
            return Some(p);
        }
    }
    env_lookup("proxy")
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name)
        .or_else(|_| std::env::var(name.to_ascii_uppercase()))
        .or_else(|_| std::env::var(name.to_ascii_lowercase()))
        .ok()
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_proxy_wins_over_env() {
        let opts = AgentOptions { proxy: Some("http://explicit:8080".into()), pooled: true, max_sockets: None };
        let url = url::Url::parse("https://example.com").unwrap();
        assert_eq!(resolve_proxy(&url, &opts).as_deref(), Some("http://explicit:8080"));
    }

    #[test]
    fn pool_reuses_client_for_same_profile() {
        let pool = AgentPool::new(4);
        let opts = AgentOptions { pooled: true, ..Default::default() };
        let url = url::Url::parse("https://example.com").unwrap();
        pool.client_for(&url, &opts).unwrap();
        pool.client_for(&url, &opts).unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn one_shot_requests_do_not_populate_pool() {
        let pool = AgentPool::new(4);
        let opts = AgentOptions { pooled: false, ..Default::default() };
        let url = url::Url::parse("https://example.com").unwrap();
        pool.client_for(&url, &opts).unwrap();
        assert!(pool.is_empty());
    }
}
