//! Cache key derivation (component C1).
//!
//! The default key is `METHOD:scheme://host:port/path?query`, built straight
//! from the request's canonical URI. HEAD and GET share a key so a HEAD can
//! be served against a GET-populated entry with the body elided. Query-string
//! equivalence is handled at match time (see `store::Match`), not folded out
//! of the key here -- either placement is defensible, this crate keeps the
//! query in the key and never special-cases it during lookup.

use std::sync::Arc;

use http::request;

/// A caller-supplied override for cache-key derivation.
pub type CacheKeyFn = Arc<dyn Fn(&request::Parts) -> String + Send + Sync>;

/// Derives the default cache key for `parts`, substituting `method_override`
/// for the request's own method when present (used to look up/invalidate a
/// GET entry from a HEAD or a mutating request).
pub fn default_key(parts: &request::Parts, method_override: Option<&str>) -> String {
    format!("{}:{}", method_override.unwrap_or_else(|| parts.method.as_str()), parts.uri)
}

/// Computes the key to use for `parts`, honoring `override_fn` when set.
pub fn compute(
    override_fn: Option<&CacheKeyFn>,
    parts: &request::Parts,
    method_override: Option<&str>,
) -> String {
    match (override_fn, method_override) {
        (Some(f), None) => f(parts),
        _ => default_key(parts, method_override),
    }
}
