//! The orchestrator (component C8, §4.8): drives the cache-mode state
//! machine and composes the cache key, cache policy, cache store, retry
//! engine, and transport into a single `run` call. Grounded on the
//! teacher's `HttpCache::run`/`remote_fetch`/`conditional_fetch`, adapted
//! from its generic `Middleware`/`CacheManager` split onto this crate's
//! concrete `AgentPool`-backed transport.
//!
//! `Options` (including its `cache` mode field) is threaded through `run`
//! as an explicit argument rather than fixed at construction time, so the
//! defaults wrapper (C9) can overlay per-call options onto a shared
//! `Cache` without rebuilding the store or connection pool.

use std::time::SystemTime;

use bytes::Bytes;
use http::{request, HeaderMap, Method, StatusCode};
use http_cache_semantics::{AfterResponse, BeforeRequest, CachePolicy};
use url::Url;

use crate::error::{Error, Result};
use crate::key;
use crate::options::{CacheMode, Options};
use crate::pool::AgentPool;
use crate::response::{HitOrMiss, HttpResponse};
use crate::store::CacheManager;
use crate::transport::{self, OutgoingRequest};

/// A request as seen by the orchestrator, before it becomes a cache key or
/// a wire attempt.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Target URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body. `None` for GET/HEAD.
    pub body: Option<Bytes>,
}

impl Request {
    /// A plain GET request to `url`.
    pub fn get(url: Url) -> Self {
        Self { method: Method::GET, url, headers: HeaderMap::new(), body: None }
    }

    fn parts(&self) -> Result<request::Parts> {
        let mut builder = http::Request::builder().method(self.method.clone()).uri(self.url.as_str());
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers.clone();
        }
        Ok(builder.body(())?.into_parts().0)
    }

    fn to_outgoing(&self) -> OutgoingRequest {
        OutgoingRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    fn is_get_head(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }
}

fn requests_own_validation(headers: &HeaderMap) -> bool {
    const NAMES: [&str; 5] =
        ["if-modified-since", "if-none-match", "if-unmodified-since", "if-match", "if-range"];
    NAMES.iter().any(|n| headers.contains_key(*n))
}

/// The cache: owns the backing store and the shared connection pool. Does
/// not own a fixed mode or option set -- every call supplies its own
/// [`Options`] (see module docs).
#[derive(Debug)]
pub struct Cache<M: CacheManager> {
    /// The backing store.
    pub manager: M,
    pool: AgentPool,
}

impl<M: CacheManager> Cache<M> {
    /// Builds a cache over `manager` with a fresh agent pool.
    pub fn new(manager: M) -> Self {
        Self { manager, pool: AgentPool::default() }
    }

    /// Runs `req` through the cache-mode state machine (§4.8) using `options`.
    pub async fn run(&self, req: &Request, options: &Options) -> Result<HttpResponse> {
        let parts = req.parts()?;
        let mut mode = options.cache_mode_fn.as_ref().map(|f| f(&parts)).unwrap_or(options.cache);
        if mode == CacheMode::Default && requests_own_validation(&req.headers) {
            mode = CacheMode::NoStore;
        }

        if let Some(cache_bust) = &options.cache_bust_fn {
            let key = key::compute(options.cache_key_fn.as_ref(), &parts, None);
            for busted in cache_bust(&parts, &key) {
                self.manager.delete(&busted).await.ok();
            }
        }

        let res = if !req.is_get_head() {
            let res = self.remote_fetch(req, &parts, mode, options).await?;
            let get_key = key::compute(options.cache_key_fn.as_ref(), &parts, Some("GET"));
            self.manager.delete(&get_key).await.ok();
            res
        } else if matches!(mode, CacheMode::NoStore | CacheMode::Reload) {
            self.remote_fetch(req, &parts, mode, options).await?
        } else {
            let cache_key = key::compute(options.cache_key_fn.as_ref(), &parts, None);
            let cached = self.manager.get(&cache_key).await?;
            // Integrity filter (§4.3): an entry that doesn't satisfy the
            // caller's requested integrity is treated as no match at all,
            // not surfaced as a mismatch -- the request falls through to
            // whatever that cache mode does on a miss.
            let cached = match cached {
                Some((cr, policy)) => match &options.integrity {
                    Some(expected) if cr.verify_integrity(expected).is_err() => None,
                    _ => Some((cr, policy)),
                },
                None => None,
            };

            match (mode, cached) {
                (CacheMode::OnlyIfCached, None) => return Err(Error::NotCached(req.url.to_string())),
                (CacheMode::OnlyIfCached, Some((cr, _)))
                | (CacheMode::ForceCache, Some((cr, _)))
                | (CacheMode::IgnoreRules, Some((cr, _))) => {
                    self.serve_disconnected(cr, req, &cache_key, options)
                }
                (CacheMode::ForceCache, None) | (CacheMode::IgnoreRules, None) => {
                    self.remote_fetch(req, &parts, mode, options).await?
                }
                (CacheMode::NoCache, Some((mut cr, policy))) | (CacheMode::Default, Some((mut cr, policy))) => {
                    cr.strip_stale_warning();
                    if options.cache_status_headers {
                        cr.cache_lookup_status(HitOrMiss::Hit);
                    }
                    self.conditional_fetch(req, &parts, cr, policy, &cache_key, options).await?
                }
                (CacheMode::NoCache, None) | (CacheMode::Default, None) => {
                    self.remote_fetch(req, &parts, mode, options).await?
                }
                (CacheMode::NoStore, _) | (CacheMode::Reload, _) => {
                    unreachable!("no-store/reload never reach a cache lookup")
                }
            }
        };

        // P4: the served bytes, whether from cache or network, must satisfy
        // any caller-supplied integrity constraint.
        if let Some(expected) = &options.integrity {
            res.verify_integrity(expected)?;
        }
        Ok(res)
    }

    /// Serves a cached entry unconditionally (force-cache / only-if-cached /
    /// ignore-rules), tagging it with Warning 112 per §6 and the `x-local-cache*`
    /// metadata headers.
    fn serve_disconnected(&self, mut cr: HttpResponse, req: &Request, cache_key: &str, options: &Options) -> HttpResponse {
        cr.strip_stale_warning();
        cr.add_warning(&req.url, 112, "Disconnected operation");
        if options.cache_status_headers {
            cr.cache_status(HitOrMiss::Hit);
            cr.cache_lookup_status(HitOrMiss::Hit);
        }
        let integrity = cr.content_integrity().to_string();
        cr.local_cache_headers(self.manager.root(), cache_key, &integrity, SystemTime::now());
        cr
    }

    fn build_policy(options: &Options, req_parts: &request::Parts, res_parts: &http::response::Parts) -> CachePolicy {
        let cache_options = options.cache_options.unwrap_or_default();
        if options.max_ttl.is_some() {
            let cache_control = res_parts
                .headers
                .get(http::header::CACHE_CONTROL)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            let clamped = options.clamp_max_age(cache_control);
            let mut modified = res_parts.clone();
            if let Ok(value) = http::HeaderValue::from_str(&clamped) {
                modified.headers.insert(http::header::CACHE_CONTROL, value);
            }
            CachePolicy::new_options(req_parts, &modified, SystemTime::now(), cache_options)
        } else {
            CachePolicy::new_options(req_parts, res_parts, SystemTime::now(), cache_options)
        }
    }

    /// Whether `res` should be written to the store under `mode`, enforcing
    /// I3 (non-GET/HEAD never writes) ahead of any mode-specific override.
    fn should_cache(mode: CacheMode, res: &HttpResponse, is_get_head: bool, policy: &CachePolicy) -> bool {
        if !is_get_head {
            return false;
        }
        let cacheable_status =
            matches!(res.status, 200 | 203 | 204 | 206 | 300 | 301 | 404 | 405 | 410 | 414 | 501);
        if !cacheable_status {
            return false;
        }
        match mode {
            CacheMode::NoStore => false,
            CacheMode::ForceCache | CacheMode::IgnoreRules => true,
            _ => policy.is_storable(),
        }
    }

    async fn remote_fetch(
        &self,
        req: &Request,
        parts: &request::Parts,
        mode: CacheMode,
        options: &Options,
    ) -> Result<HttpResponse> {
        let (mut res, _attempts) = transport::fetch(&self.pool, &req.to_outgoing(), options).await?;
        if options.cache_status_headers {
            res.cache_status(HitOrMiss::Miss);
            res.cache_lookup_status(HitOrMiss::Miss);
        }

        let res_parts = res.parts()?;
        let policy = Self::build_policy(options, parts, &res_parts);

        let mut effective_mode = mode;
        if let Some(f) = &options.response_cache_mode_fn {
            if let Some(over) = f(parts, &res) {
                effective_mode = over;
            }
        }

        let is_get_head = req.is_get_head();
        if Self::should_cache(effective_mode, &res, is_get_head, &policy) {
            let response_parts = res.parts()?;
            res.metadata = options.metadata_provider.as_ref().and_then(|p| p(parts, &response_parts));
            let key = key::compute(options.cache_key_fn.as_ref(), parts, None);
            Ok(self.manager.put(key, res, policy).await?)
        } else {
            Ok(res)
        }
    }

    async fn conditional_fetch(
        &self,
        req: &Request,
        parts: &request::Parts,
        mut cached_res: HttpResponse,
        mut policy: CachePolicy,
        cache_key: &str,
        options: &Options,
    ) -> Result<HttpResponse> {
        let before_req = policy.before_request(parts, SystemTime::now());
        let revalidation_parts = match before_req {
            BeforeRequest::Fresh(fresh_parts) => {
                cached_res.update_headers(&fresh_parts)?;
                if options.cache_status_headers {
                    cached_res.cache_status(HitOrMiss::Hit);
                    cached_res.cache_lookup_status(HitOrMiss::Hit);
                }
                let integrity = cached_res.content_integrity().to_string();
                cached_res.local_cache_headers(self.manager.root(), cache_key, &integrity, SystemTime::now());
                return Ok(cached_res);
            }
            BeforeRequest::Stale { request, matches } => matches.then_some(request),
        };

        let mut revalidation_req = req.clone();
        if let Some(new_parts) = &revalidation_parts {
            revalidation_req.headers = new_parts.headers.clone();
        }

        match transport::fetch(&self.pool, &revalidation_req.to_outgoing(), options).await {
            Ok((mut cond_res, _attempts)) => {
                let status = StatusCode::from_u16(cond_res.status)?;
                if status.is_server_error() && cached_res.must_revalidate() {
                    cached_res.add_warning(&req.url, 111, "Revalidation failed");
                    if options.cache_status_headers {
                        cached_res.cache_status(HitOrMiss::Hit);
                    }
                    Ok(cached_res)
                } else if cond_res.status == 304 {
                    let after_res = policy.after_response(parts, &cond_res.parts()?, SystemTime::now());
                    let (new_policy, merged_parts, revalidation_failed) = match after_res {
                        AfterResponse::Modified(p, pt) => (p, pt, true),
                        AfterResponse::NotModified(p, pt) => (p, pt, false),
                    };
                    policy = new_policy;
                    cached_res.update_headers(&merged_parts)?;
                    cached_res.strip_stale_warning();
                    let message = if revalidation_failed {
                        "Revalidation failed even with 304 response. Using stale body with new headers."
                    } else {
                        "Local cached response stale"
                    };
                    cached_res.add_warning(&req.url, 110, message);
                    if options.cache_status_headers {
                        cached_res.cache_status(HitOrMiss::Hit);
                        cached_res.cache_lookup_status(HitOrMiss::Hit);
                    }
                    let integrity = cached_res.content_integrity().to_string();
                    cached_res.local_cache_headers(self.manager.root(), cache_key, &integrity, SystemTime::now());
                    let response_parts = cached_res.parts()?;
                    cached_res.metadata =
                        options.metadata_provider.as_ref().and_then(|p| p(parts, &response_parts));
                    Ok(self.manager.put_metadata_only(cache_key.to_owned(), cached_res, policy).await?)
                } else if cond_res.status == 200 {
                    let res_parts = cond_res.parts()?;
                    let new_policy = Self::build_policy(options, parts, &res_parts);
                    if options.cache_status_headers {
                        cond_res.cache_status(HitOrMiss::Miss);
                        cond_res.cache_lookup_status(HitOrMiss::Hit);
                    }
                    let response_parts = cond_res.parts()?;
                    cond_res.metadata =
                        options.metadata_provider.as_ref().and_then(|p| p(parts, &response_parts));
                    if Self::should_cache(options.cache, &cond_res, true, &new_policy) {
                        Ok(self.manager.put(cache_key.to_owned(), cond_res, new_policy).await?)
                    } else {
                        Ok(cond_res)
                    }
                } else {
                    if options.cache_status_headers {
                        cond_res.cache_status(HitOrMiss::Miss);
                        cond_res.cache_lookup_status(HitOrMiss::Hit);
                    }
                    Ok(cond_res)
                }
            }
            Err(e) => {
                if cached_res.must_revalidate() {
                    Err(e)
                } else {
                    cached_res.add_warning(&req.url, 111, &format!("Revalidation failed: {e}"));
                    if options.cache_status_headers {
                        cached_res.cache_status(HitOrMiss::Hit);
                    }
                    Ok(cached_res)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_validation_headers_are_detected() {
        let mut headers = HeaderMap::new();
        headers.insert("if-none-match", "\"abc\"".parse().unwrap());
        assert!(requests_own_validation(&headers));
        assert!(!requests_own_validation(&HeaderMap::new()));
    }

    #[test]
    fn non_get_head_request_is_never_cached() {
        let options = Options::default();
        let res = HttpResponse {
            body: vec![],
            headers: crate::response::HttpHeaders::new(),
            status: 200,
            url: Url::parse("https://example.com").unwrap(),
            metadata: None,
        };
        let req_parts = Request { method: Method::POST, url: res.url.clone(), headers: HeaderMap::new(), body: None }
            .parts()
            .unwrap();
        let policy = Cache::<crate::store::MemoryStore>::build_policy(&options, &req_parts, &res.parts().unwrap());
        assert!(!Cache::<crate::store::MemoryStore>::should_cache(CacheMode::IgnoreRules, &res, false, &policy));
    }
}
