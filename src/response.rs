//! The response descriptor stored in and served from the cache.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use http::{header::CACHE_CONTROL, response, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// `x-cache`: `HIT` if this response was served from cache, `MISS` if not.
pub const XCACHE: &str = "x-cache";
/// `x-cache-lookup`: `HIT` if a response existed in cache for the key, `MISS` if not.
pub const XCACHELOOKUP: &str = "x-cache-lookup";
/// `x-local-cache`: URL-encoded cache root path.
pub const XLOCALCACHE: &str = "x-local-cache";
/// `x-local-cache-key`: URL-encoded cache key.
pub const XLOCALCACHEKEY: &str = "x-local-cache-key";
/// `x-local-cache-hash`: the stored integrity digest.
pub const XLOCALCACHEHASH: &str = "x-local-cache-hash";
/// `x-local-cache-time`: write timestamp (seconds since epoch).
pub const XLOCALCACHETIME: &str = "x-local-cache-time";
const WARNING: &str = "warning";

/// Hit/miss status recorded in the `x-cache`/`x-cache-lookup` headers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HitOrMiss {
    /// There was a hit.
    Hit,
    /// There was no hit.
    Miss,
}

impl fmt::Display for HitOrMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Miss => write!(f, "MISS"),
        }
    }
}

/// Request/response header bag. Keys are normalized to lowercase per RFC 7230,
/// values preserve insertion order and support multiple values per key.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HttpHeaders(HashMap<String, Vec<String>>);

impl HttpHeaders {
    /// An empty header bag.
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Replaces any existing values for `key` with a single `value`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into().to_ascii_lowercase(), vec![value.into()]);
    }

    /// Appends `value`, preserving any existing values for `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into().to_ascii_lowercase()).or_default().push(value.into());
    }

    /// The first value stored for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_ascii_lowercase()).and_then(|v| v.first()).map(String::as_str)
    }

    /// All values stored for `key`.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.0.get(&key.to_ascii_lowercase()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Removes `key` and all of its values.
    pub fn remove(&mut self, key: &str) {
        self.0.remove(&key.to_ascii_lowercase());
    }

    /// Whether `key` has at least one value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(&key.to_ascii_lowercase())
    }

    /// Iterates `(name, value)` pairs, one per value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }
}

impl From<&http::HeaderMap> for HttpHeaders {
    fn from(headers: &http::HeaderMap) -> Self {
        let mut out: HashMap<String, Vec<String>> = HashMap::new();
        for name in headers.keys() {
            let values: Vec<String> = headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .map(str::to_owned)
                .collect();
            if !values.is_empty() {
                out.insert(name.as_str().to_owned(), values);
            }
        }
        Self(out)
    }
}

/// A stored or fetched HTTP response.
///
/// This is the unit the cache store persists: it carries the body as a
/// `Vec<u8>` once fully materialized (the streaming tee handles the case
/// where the body is large enough to avoid buffering before this point).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpResponse {
    /// Response body.
    pub body: Vec<u8>,
    /// Response headers.
    pub headers: HttpHeaders,
    /// Response status code.
    pub status: u16,
    /// The URL this response was fetched from.
    pub url: Url,
    /// Caller-supplied metadata computed by `Options::metadata_provider`.
    #[serde(default)]
    pub metadata: Option<Vec<u8>>,
}

impl HttpResponse {
    /// Reconstructs `http::response::Parts` for cache-policy evaluation.
    pub fn parts(&self) -> Result<response::Parts> {
        let mut builder = response::Builder::new().status(self.status).body(())?;
        {
            let headers = builder.headers_mut();
            for (name, value) in self.headers.iter() {
                headers.append(
                    http::header::HeaderName::from_str(name)?,
                    HeaderValue::from_str(value)?,
                );
            }
        }
        Ok(builder.into_parts().0)
    }

    fn warning_code(&self) -> Option<usize> {
        self.headers.get(WARNING).and_then(|hdr| hdr.chars().take(3).collect::<String>().parse().ok())
    }

    /// Appends a `Warning` header per RFC 7234 §5.5 (warn-code SP warn-agent SP warn-text SP warn-date).
    pub fn add_warning(&mut self, url: &Url, code: usize, message: &str) {
        let host = url.host_str().unwrap_or("unknown");
        let escaped = message.replace('"', "'").replace(['\n', '\r'], " ");
        self.headers.insert(
            WARNING,
            format!("{code} {host} \"{escaped}\" \"{}\"", httpdate::fmt_http_date(SystemTime::now())),
        );
    }

    /// Strips any stored `Warning` header with a 1xx warn-code, per RFC 7234 §4.3.4.
    pub fn strip_stale_warning(&mut self) {
        if let Some(code) = self.warning_code() {
            if (100..200).contains(&code) {
                self.headers.remove(WARNING);
            }
        }
    }

    /// Overlays `parts`' headers onto this response (used after a 304 merge
    /// or when serving a still-fresh cached response with refreshed headers).
    pub fn update_headers(&mut self, parts: &response::Parts) -> Result<()> {
        for (name, value) in parts.headers.iter() {
            self.headers.insert(name.as_str(), value.to_str()?);
        }
        Ok(())
    }

    /// The content-addressed digest of this response's body (§4.3, I1).
    pub fn content_integrity(&self) -> ssri::Integrity {
        ssri::IntegrityOpts::new().algorithm(ssri::Algorithm::Sha256).input(&self.body).result()
    }

    /// Verifies this response's body against `expected`, per the integrity
    /// filter (§4.3) and P4. `expected` may name a different algorithm than
    /// this crate's own SHA-256 default; [`ssri::Integrity::matches`] picks
    /// the strongest algorithm the two have in common.
    pub fn verify_integrity(&self, expected: &ssri::Integrity) -> Result<()> {
        if expected.matches(&self.content_integrity()).is_some() {
            Ok(())
        } else {
            Err(Error::BadChecksum(self.url.to_string()))
        }
    }

    /// Whether `Cache-Control` carries `must-revalidate`, which forbids the
    /// stale-on-error fallback.
    pub fn must_revalidate(&self) -> bool {
        self.headers
            .get(CACHE_CONTROL.as_str())
            .is_some_and(|v| v.to_ascii_lowercase().contains("must-revalidate"))
    }

    /// Sets the `x-cache` header.
    pub fn cache_status(&mut self, status: HitOrMiss) {
        self.headers.insert(XCACHE, status.to_string());
    }

    /// Sets the `x-cache-lookup` header.
    pub fn cache_lookup_status(&mut self, status: HitOrMiss) {
        self.headers.insert(XCACHELOOKUP, status.to_string());
    }

    /// Sets the `x-local-cache*` observability headers (§6).
    pub fn local_cache_headers(&mut self, root: &str, key: &str, integrity: &str, when: SystemTime) {
        let secs = when.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_secs();
        self.headers.insert(XLOCALCACHE, urlencode(root));
        self.headers.insert(XLOCALCACHEKEY, urlencode(key));
        self.headers.insert(XLOCALCACHEHASH, integrity.to_owned());
        self.headers.insert(XLOCALCACHETIME, secs.to_string());
    }
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
