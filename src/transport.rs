//! The pluggable HTTP transport (§4.3, §6).
//!
//! Wraps `reqwest` behind the retry engine (C4) and the agent pool (C5),
//! and exposes the single `fetch` entry point the orchestrator calls for
//! both the initial network attempt and conditional revalidation requests.
//! Grounded on `http-cache-reqwest/src/lib.rs`'s `ReqwestMiddleware`, whose
//! `remote_fetch`/`clone_req`/`convert_response` trio is the shape this
//! module reproduces against this crate's own `HttpResponse`/`Options`
//! types instead of the teacher's generic `Middleware` trait.

use bytes::Bytes;
use http::{HeaderMap, Method};
use url::Url;

use crate::body::{tee, StreamingBody, TeeOutcome};
use crate::error::{Error, Result};
use crate::options::Options;
use crate::pool::AgentPool;
use crate::response::HttpResponse;
use crate::retry::{self, AttemptOutcome, TransportErrorKind};

/// A request about to go out over the wire.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    /// HTTP method.
    pub method: Method,
    /// Target URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body, if any. `None` for GET/HEAD.
    pub body: Option<Bytes>,
}

impl OutgoingRequest {
    /// Whether this request's body can be safely replayed on retry. Bodies
    /// are always buffered `Bytes` here, so any request is rewindable; the
    /// one case retry must still refuse is POST, handled in [`retry::should_retry`].
    fn is_rewindable(&self) -> bool {
        true
    }
}

/// Bodies whose declared (or undeclared) size exceeds this are read through
/// the streaming tee (§4.7) a chunk at a time instead of being buffered by a
/// single `reqwest::Response::bytes()` call (I5).
pub const MAX_MEM_SIZE: usize = 5 * 1024 * 1024;

/// Performs `req`, retrying per `opts.retry` and §4.4's idempotence rules,
/// using a client drawn from `pool` for `opts.agent`.
pub async fn fetch(pool: &AgentPool, req: &OutgoingRequest, opts: &Options) -> Result<(HttpResponse, u32)> {
    let client = pool.client_for(&req.url, &opts.agent)?;
    let method_str = req.method.as_str().to_owned();
    let is_rewindable = req.is_rewindable();

    let (response, attempts) = retry::run(
        &opts.retry,
        &method_str,
        is_rewindable,
        |res: &HttpResponse| Some(AttemptOutcome::Status(res.status)),
        |err: &Error| match err {
            Error::Transport(e) => Some(AttemptOutcome::TransportError(TransportErrorKind::classify(e))),
            _ => None,
        },
        |attempt| {
            let client = client.clone();
            let req = req.clone();
            async move { attempt_once(&client, &req, attempt).await }
        },
    )
    .await?;

    Ok((response, attempts))
}

async fn attempt_once(client: &reqwest::Client, req: &OutgoingRequest, attempt: u32) -> Result<HttpResponse> {
    let mut builder = client.request(req.method.clone(), req.url.clone());
    builder = builder.headers(req.headers.clone());
    if let Some(body) = &req.body {
        builder = builder.body(body.clone());
    }

    let res = builder.send().await.map_err(classify_and_wrap)?;
    let status = res.status().as_u16();
    let headers = crate::response::HttpHeaders::from(res.headers());
    let url = Url::parse(res.url().as_str())?;
    let content_length = res.content_length().map(|n| n as usize);

    let body = if content_length.is_none_or(|n| n > MAX_MEM_SIZE) {
        let (_streaming, handle) = tee(res.bytes_stream());
        let outcome = handle.await.map_err(|e| Error::General(anyhow::anyhow!(e)))??;
        outcome.bytes
    } else {
        res.bytes().await.map_err(classify_and_wrap)?
    };

    let mut response = HttpResponse { body: body.to_vec(), headers, status, url, metadata: None };
    response.headers.insert(crate::retry::ATTEMPTS_HEADER, attempt.to_string());
    Ok(response)
}

fn classify_and_wrap(e: reqwest::Error) -> Error {
    Error::from(e)
}

/// Performs `req` with the response body streamed to the caller rather than
/// fully buffered, tee'd into a background writer that accumulates the same
/// bytes for the cache (§4.7). Not retried: streaming responses are assumed
/// large enough that a failed mid-stream retry is not worth re-buffering.
pub async fn fetch_streaming(
    pool: &AgentPool,
    req: &OutgoingRequest,
    opts: &Options,
) -> Result<(HttpResponse, StreamingBody, tokio::task::JoinHandle<Result<TeeOutcome>>)> {
    let client = pool.client_for(&req.url, &opts.agent)?;
    let mut builder = client.request(req.method.clone(), req.url.clone());
    builder = builder.headers(req.headers.clone());
    if let Some(body) = &req.body {
        builder = builder.body(body.clone());
    }
    let res = builder.send().await.map_err(classify_and_wrap)?;
    let status = res.status().as_u16();
    let headers = crate::response::HttpHeaders::from(res.headers());
    let url = Url::parse(res.url().as_str())?;

    let (body, handle) = tee(res.bytes_stream());
    let response = HttpResponse { body: Vec::new(), headers, status, url, metadata: None };
    Ok((response, body, handle))
}
