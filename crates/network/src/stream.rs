use core::fmt;
use core::time::Duration;
use std::io;

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use libp2p::{Stream as P2pStream, StreamProtocol};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt};

use crate::config::StreamConfig;

mod codec;

use codec::FrameCodec;

pub const POST_PROTOCOL: StreamProtocol = StreamProtocol::new("/postmesh/post/1.0.0");

/// A single-use channel carrying exactly one length-prefixed frame.
///
/// [`Stream::send`] and [`Stream::recv`] take the stream by value, so a
/// stream can never carry a second payload.
pub struct Stream<T = Compat<P2pStream>> {
    inner: Framed<T, FrameCodec>,
    io_timeout: Duration,
}

impl Stream {
    #[must_use]
    pub fn new(stream: P2pStream, config: &StreamConfig) -> Self {
        Self::with_io(stream.compat(), config)
    }
}

impl<T> Stream<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn with_io(io: T, config: &StreamConfig) -> Self {
        Self {
            inner: Framed::new(io, FrameCodec::new(config.max_frame_size)),
            io_timeout: config.io_timeout,
        }
    }

    /// Writes `payload` as one frame, then closes the write half.
    pub async fn send(mut self, payload: Bytes) -> Result<(), StreamError> {
        let io_timeout = self.io_timeout;

        timeout(io_timeout, async {
            self.inner.send(payload).await?;
            self.inner.close().await
        })
        .await
        .map_err(|_| StreamError::Timeout(io_timeout))?
    }

    /// Reads one frame. Anything the peer writes after it is discarded.
    pub async fn recv(mut self) -> Result<Bytes, StreamError> {
        let io_timeout = self.io_timeout;

        match timeout(io_timeout, self.inner.next()).await {
            Err(_) => Err(StreamError::Timeout(io_timeout)),
            Ok(None) => Err(StreamError::Closed),
            Ok(Some(frame)) => frame.map(BytesMut::freeze),
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("io_timeout", &self.io_timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("stream operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("peer closed the stream without sending a payload")]
    Closed,
    #[error("stream ended mid-frame after {received} bytes (frame length {expected:?})")]
    Truncated {
        expected: Option<usize>,
        received: usize,
    },
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },
}

impl StreamError {
    /// Whether the peer sent bytes that do not form a complete, acceptable
    /// frame.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Truncated { .. } | Self::FrameTooLarge { .. })
    }
}
