//! Crate-wide error type.

use miette::Diagnostic;
use thiserror::Error;

/// A `Result` typedef to use with the [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by every fallible operation in this crate.
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// A general error used as a catch-all for other errors via anyhow.
    #[error(transparent)]
    #[diagnostic(code(fetch_cache::general))]
    General(#[from] anyhow::Error),

    /// Error constructing or inspecting an `http` request/response.
    #[error(transparent)]
    #[diagnostic(code(fetch_cache::http))]
    Http(#[from] http::Error),

    /// Error parsing an HTTP status code.
    #[error(transparent)]
    #[diagnostic(code(fetch_cache::invalid_status_code))]
    InvalidStatusCode(#[from] http::status::InvalidStatusCode),

    /// Error converting a header value to a string.
    #[error(transparent)]
    #[diagnostic(code(fetch_cache::header_to_str))]
    HeaderToStr(#[from] http::header::ToStrError),

    /// Error parsing an HTTP header value.
    #[error(transparent)]
    #[diagnostic(code(fetch_cache::invalid_header_value))]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Error parsing an HTTP header name.
    #[error(transparent)]
    #[diagnostic(code(fetch_cache::invalid_header_name))]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Error parsing a URL.
    #[error(transparent)]
    #[diagnostic(code(fetch_cache::invalid_url))]
    InvalidUrl(#[from] url::ParseError),

    /// Error from the content-addressed store.
    #[error(transparent)]
    #[diagnostic(code(fetch_cache::cacache))]
    CaCache(#[from] cacache::Error),

    /// Error (de)serializing a stored cache entry.
    #[error(transparent)]
    #[diagnostic(code(fetch_cache::postcard))]
    Postcard(#[from] postcard::Error),

    /// Error performing the network exchange.
    #[error(transparent)]
    #[diagnostic(code(fetch_cache::transport))]
    Transport(#[from] reqwest::Error),

    /// I/O error from the streaming tee or the cache store.
    #[error(transparent)]
    #[diagnostic(code(fetch_cache::io))]
    Io(#[from] std::io::Error),

    /// A request body was not cloneable (a non-rewindable stream) on a retry
    /// or a revalidation attempt.
    #[error("request body is not cloneable; are you passing a streaming body?")]
    #[diagnostic(code(fetch_cache::unrewindable_body))]
    UnrewindableBody,

    /// `cache: only-if-cached` was requested and no usable entry was found.
    #[error("request to {0} failed because cache mode is only-if-cached and no cached response was found")]
    #[diagnostic(code(fetch_cache::not_cached))]
    NotCached(String),

    /// Subresource integrity check failed for a served body.
    #[error("integrity checksum mismatch for {0}")]
    #[diagnostic(code(fetch_cache::bad_checksum))]
    BadChecksum(String),

    /// A per-attempt deadline elapsed before the exchange completed.
    #[error("request to {0} timed out")]
    #[diagnostic(code(fetch_cache::request_timeout))]
    RequestTimeout(String),

    /// A `must-revalidate` entry failed revalidation and has no fallback.
    #[error("revalidation required by must-revalidate failed: {0}")]
    #[diagnostic(code(fetch_cache::must_revalidate_failed))]
    MustRevalidateFailed(String),
}
