//! The streaming response body (component C7, §4.7).
//!
//! Two pieces live here:
//!
//! - [`StreamingBody`], the body type handed back to the caller. It wraps
//!   either already-buffered bytes (served from cache, or small enough that
//!   buffering never mattered) or a byte stream still in flight from
//!   upstream. Grounded on the teacher's `http-cache/src/body.rs`, trimmed
//!   of the `cacache::Reader`-backed `File` variant (disk-backed serving is
//!   handled by reading the stored body back as bytes via the store trait,
//!   not by keeping a raw file handle in the body type).
//! - [`tee`], which fans a single upstream byte stream into the caller's
//!   `StreamingBody` and a background writer that persists the body to the
//!   cache store and verifies integrity, without buffering the whole
//!   response before the caller sees the first byte.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use tokio::sync::mpsc;

use crate::error::Error;

pin_project! {
    /// A body that is either fully buffered or still streaming from upstream.
    #[project = StreamingBodyProj]
    pub enum StreamingBody {
        /// Already-materialized bytes (cache hit, or a small enough response
        /// that nothing downstream benefited from streaming).
        Buffered { data: Option<Bytes> },
        /// Bytes arriving from the tee as the upstream response is read.
        Streaming { #[pin] rx: mpsc::Receiver<std::result::Result<Bytes, Error>> },
    }
}

impl StreamingBody {
    /// Wraps already-materialized bytes.
    pub fn buffered(data: Bytes) -> Self {
        Self::Buffered { data: Some(data) }
    }

    fn streaming(rx: mpsc::Receiver<std::result::Result<Bytes, Error>>) -> Self {
        Self::Streaming { rx }
    }
}

impl Body for StreamingBody {
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<std::result::Result<Frame<Bytes>, Error>>> {
        match self.project() {
            StreamingBodyProj::Buffered { data } => {
                Poll::Ready(data.take().filter(|b| !b.is_empty()).map(|b| Ok(Frame::data(b))))
            }
            StreamingBodyProj::Streaming { mut rx } => match rx.as_mut().poll_recv(cx) {
                Poll::Ready(Some(Ok(bytes))) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffered { data } => data.is_none(),
            Self::Streaming { .. } => false,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            Self::Buffered { data } => SizeHint::with_exact(data.as_ref().map_or(0, |b| b.len() as u64)),
            Self::Streaming { .. } => SizeHint::default(),
        }
    }
}

/// The result of draining a tee's background writer.
pub struct TeeOutcome {
    /// The full response body, accumulated for the cache write.
    pub bytes: Bytes,
    /// Integrity digest of `bytes`, in SRI form.
    pub integrity: ssri::Integrity,
}

/// Fans `upstream` out to a caller-facing [`StreamingBody`] and a background
/// task that both accumulates the bytes for the cache write and computes
/// their integrity digest.
///
/// The cache branch is the back-pressure authority: each chunk is pushed
/// into the bounded channel *before* being handed to the caller, so a slow
/// or absent caller never causes bytes to be written to the cache without
/// also having been queued for the caller, and a full channel (cache
/// consumer lagging) applies back-pressure to the upstream read loop itself
/// since both branches share the one `rx` the caller drains.
pub fn tee<S>(mut upstream: S) -> (StreamingBody, tokio::task::JoinHandle<std::result::Result<TeeOutcome, Error>>)
where
    S: futures_util::Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + Send + 'static,
{
    use futures_util::StreamExt;

    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(async move {
        let mut acc = Vec::new();
        let mut builder = ssri::IntegrityOpts::new().algorithm(ssri::Algorithm::Sha256);
        loop {
            match upstream.next().await {
                Some(Ok(chunk)) => {
                    acc.extend_from_slice(&chunk);
                    builder = builder.input(&chunk);
                    if tx.send(Ok(chunk)).await.is_err() {
                        // Caller dropped the body; keep draining upstream so
                        // the cache write still completes.
                    }
                }
                Some(Err(e)) => {
                    let err = Error::from(e);
                    let _ = tx.send(Err(Error::General(anyhow::anyhow!(err.to_string())))).await;
                    return Err(Error::General(anyhow::anyhow!("tee upstream read failed")));
                }
                None => break,
            }
        }
        Ok(TeeOutcome { bytes: Bytes::from(acc), integrity: builder.result() })
    });
    (StreamingBody::streaming(rx), handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn buffered_body_emits_one_frame_then_ends() {
        let mut body = StreamingBody::buffered(Bytes::from_static(b"hi"));
        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"hi"));
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn empty_buffered_body_ends_immediately() {
        let mut body = StreamingBody::buffered(Bytes::new());
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn tee_forwards_bytes_and_computes_integrity() {
        let chunks: Vec<std::result::Result<Bytes, reqwest::Error>> =
            vec![Ok(Bytes::from_static(b"hello, ")), Ok(Bytes::from_static(b"world!"))];
        let stream = futures_util::stream::iter(chunks);
        let (mut body, handle) = tee(stream);

        let mut collected = Vec::new();
        while let Some(frame) = body.frame().await {
            collected.extend_from_slice(&frame.unwrap().into_data().unwrap());
        }
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(collected, b"hello, world!");
        assert_eq!(outcome.bytes, Bytes::from_static(b"hello, world!"));
        assert!(outcome.integrity.to_string().starts_with("sha256-"));
    }
}
