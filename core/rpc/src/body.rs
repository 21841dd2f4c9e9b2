// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Request, response and stream message bodies
//!
//! A [`Body`] is read at most once: [`Body::read_all`] consumes it, which also
//! closes it and hands any pooled buffer back to its pool. Callers that send
//! the same logical body several times (retries, fan-out, hedging) snapshot it
//! once into a [`ReReader`] and take one fresh [`Body`] per attempt.

use std::fmt;
use std::io;

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

use crate::buffer::PooledBuffer;
use crate::context::Context;
use crate::error::RpcError;

/// A once-readable body
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Bytes),
    /// Marshal output still owned by its pool
    Pooled(PooledBuffer),
    /// Chunks produced by a transport
    Stream(BoxStream<'static, io::Result<Bytes>>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Bytes(bytes) => write!(f, "Body::Bytes({} bytes)", bytes.len()),
            Body::Pooled(buf) => write!(f, "Body::Pooled({} bytes)", buf.len()),
            Body::Stream(_) => f.write_str("Body::Stream"),
        }
    }
}

impl Body {
    pub fn empty() -> Self {
        Body::Empty
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Body::Stream(stream.boxed())
    }

    /// Size of the body when it is known without reading it
    pub fn size_hint(&self) -> Option<usize> {
        match self {
            Body::Empty => Some(0),
            Body::Bytes(bytes) => Some(bytes.len()),
            Body::Pooled(buf) => Some(buf.len()),
            Body::Stream(_) => None,
        }
    }

    /// Read the whole body, bounded by the context. The body is closed once
    /// this returns, whatever the outcome.
    pub async fn read_all(self, ctx: &Context) -> Result<Bytes, RpcError> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Bytes(bytes) => Ok(bytes),
            Body::Pooled(buf) => Ok(Bytes::copy_from_slice(buf.as_slice())),
            Body::Stream(mut stream) => {
                ctx.run(async move {
                    let mut out = BytesMut::new();
                    while let Some(chunk) = stream.next().await {
                        let chunk = chunk.map_err(|e| {
                            RpcError::unknown(format!("failed to read body: {e}"))
                        })?;
                        out.extend_from_slice(&chunk);
                    }
                    Ok::<_, RpcError>(out.freeze())
                })
                .await?
            }
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(data: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(data))
    }
}

impl From<&'static [u8]> for Body {
    fn from(data: &'static [u8]) -> Self {
        Body::Bytes(Bytes::from_static(data))
    }
}

impl From<String> for Body {
    fn from(data: String) -> Self {
        Body::Bytes(Bytes::from(data))
    }
}

impl From<PooledBuffer> for Body {
    fn from(buf: PooledBuffer) -> Self {
        Body::Pooled(buf)
    }
}

/// Immutable snapshot of a body that can be re-sent any number of times
#[derive(Debug, Clone)]
pub struct ReReader {
    data: Bytes,
}

impl ReReader {
    /// Read `body` once and keep its bytes
    pub async fn new(ctx: &Context, body: Body) -> Result<Self, RpcError> {
        Ok(ReReader {
            data: body.read_all(ctx).await?,
        })
    }

    pub fn from_bytes(data: Bytes) -> Self {
        ReReader { data }
    }

    /// A fresh body positioned at the start, independent from the others
    pub fn body(&self) -> Body {
        Body::Bytes(self.data.clone())
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Code;
    use crate::buffer::BufferPool;
    use bytes::BufMut;
    use std::time::Duration;

    #[tokio::test]
    async fn test_read_all_variants() {
        let ctx = Context::new();
        assert!(Body::empty().read_all(&ctx).await.unwrap().is_empty());
        assert_eq!(
            Body::from(b"abc".to_vec()).read_all(&ctx).await.unwrap(),
            Bytes::from_static(b"abc")
        );

        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ]);
        let body = Body::from_stream(chunks);
        assert_eq!(body.size_hint(), None);
        assert_eq!(body.read_all(&ctx).await.unwrap().as_ref(), b"hello world");
    }

    #[tokio::test]
    async fn test_pooled_body_released_after_read() {
        let pool = BufferPool::default();
        let mut buf = pool.acquire();
        buf.put_slice(b"payload");

        let body = Body::from(buf);
        assert_eq!(pool.outstanding(), 1);
        let data = body.read_all(&Context::new()).await.unwrap();
        assert_eq!(data.as_ref(), b"payload");
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_stream_error() {
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::other("connection reset")),
        ]);
        let err = Body::from_stream(chunks)
            .read_all(&Context::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unknown);
        assert!(err.message().contains("connection reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_read_honours_deadline() {
        let ctx = Context::with_timeout(Duration::from_millis(10));
        let err = Body::from_stream(futures::stream::pending())
            .read_all(&ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_rereader_hands_out_independent_bodies() {
        let ctx = Context::new();
        let reader = ReReader::new(&ctx, Body::from(b"same bytes".to_vec()))
            .await
            .unwrap();

        let first = reader.body().read_all(&ctx).await.unwrap();
        let second = reader.body().read_all(&ctx).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(reader.len(), 10);
    }
}
