//! Framed stream I/O with per-operation deadlines.
//!
//! Wraps the tunneled byte stream and moves whole frames across it. Control
//! reads carry a whole-frame deadline; streaming reads are bounded only by a
//! stall deadline requiring byte progress, so a slow but live bulk transfer
//! is never killed.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::trace;

use crate::config::TransferConfig;
use crate::constants::ERROR_FLUSH_DEADLINE;
use crate::error::{Error, Result};
use crate::protocol::frame::Frame;

/// Initial capacity of the receive accumulation buffer.
const READ_BUF_CAPACITY: usize = 8 * 1024;

/// A reliable byte stream carrying length-prefixed frames.
#[derive(Debug)]
pub struct FrameStream<S> {
    inner: S,
    read_buf: BytesMut,
    control_deadline: Duration,
    stall_deadline: Duration,
    closed: bool,
}

impl<S> FrameStream<S> {
    /// Wrap a stream using the deadlines from `config`.
    pub fn new(inner: S, config: &TransferConfig) -> Self {
        Self::with_deadlines(inner, config.control_frame_deadline, config.stall_deadline)
    }

    /// Wrap a stream with explicit deadlines.
    pub fn with_deadlines(inner: S, control_deadline: Duration, stall_deadline: Duration) -> Self {
        Self {
            inner,
            read_buf: BytesMut::with_capacity(READ_BUF_CAPACITY),
            control_deadline,
            stall_deadline,
            closed: false,
        }
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Unwrap the underlying stream, dropping any buffered unread bytes.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> FrameStream<S> {
    /// Read one control frame, bounded by the control-frame deadline.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        let deadline = self.control_deadline;
        match timeout(deadline, self.read_frame_inner()).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout("control frame read")),
        }
    }

    /// Read one frame during bulk transfer.
    ///
    /// No whole-frame bound; each underlying read must make byte progress
    /// within the stall deadline.
    pub async fn read_frame_streaming(&mut self) -> Result<Frame> {
        self.read_frame_inner().await
    }

    /// Accumulate bytes until [`Frame::decode`] yields a whole frame.
    ///
    /// Unknown kinds and oversized lengths fail from the buffered header
    /// alone, before any payload arrives.
    async fn read_frame_inner(&mut self) -> Result<Frame> {
        let stall = self.stall_deadline;
        loop {
            if let Some(frame) = Frame::decode(&mut self.read_buf)? {
                trace!(kind = ?frame.kind, len = frame.payload.len(), "frame read");
                return Ok(frame);
            }

            let n = timeout(stall, self.inner.read_buf(&mut self.read_buf))
                .await
                .map_err(|_| Error::timeout("stalled read"))??;
            if n == 0 {
                return Err(Error::unexpected_eof("frame read"));
            }
        }
    }

    /// Write one frame fully and flush it.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let encoded = frame.encode()?;
        let stall = self.stall_deadline;
        timeout(stall, async {
            self.inner.write_all(&encoded).await?;
            self.inner.flush().await
        })
        .await
        .map_err(|_| Error::timeout("stalled write"))??;
        trace!(kind = ?frame.kind, len = frame.payload.len(), "frame written");
        Ok(())
    }

    /// Send an `ERROR` frame on a best-effort basis.
    ///
    /// Every failure is swallowed; the stream may already be closed by the
    /// peer.
    pub async fn send_error_best_effort(&mut self, reason: &str) {
        let frame = Frame::error(reason);
        let Ok(encoded) = frame.encode() else {
            return;
        };
        let _ = timeout(ERROR_FLUSH_DEADLINE, async {
            self.inner.write_all(&encoded).await?;
            self.inner.flush().await
        })
        .await;
    }

    /// Shut down the write side. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            let _ = self.inner.shutdown().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::FrameKind;

    fn short_deadlines<S>(stream: S) -> FrameStream<S> {
        FrameStream::with_deadlines(stream, Duration::from_millis(200), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let mut left = short_deadlines(a);
        let mut right = short_deadlines(b);

        left.write_frame(&Frame::message("HELLO")).await.unwrap();
        let frame = right.read_frame().await.unwrap();
        assert_eq!(frame.kind, FrameKind::Message);
        assert_eq!(frame.text().unwrap(), "HELLO");
    }

    #[tokio::test]
    async fn control_read_times_out_on_silence() {
        let (a, _b) = tokio::io::duplex(1024);
        let mut stream = short_deadlines(a);

        let err = stream.read_frame().await.unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err}");
    }

    #[tokio::test]
    async fn peer_close_mid_frame_is_unexpected_eof() {
        let (a, mut b) = tokio::io::duplex(1024);
        let mut stream = short_deadlines(a);

        // Header promising 100 bytes, then close.
        b.write_all(&[0x03, 0, 0, 0, 100]).await.unwrap();
        b.write_all(&[1, 2, 3]).await.unwrap();
        drop(b);

        let err = stream.read_frame().await.unwrap_err();
        assert!(err.is_unexpected_eof(), "expected eof, got {err}");
    }

    #[tokio::test]
    async fn oversized_header_is_rejected_without_payload() {
        let (a, mut b) = tokio::io::duplex(1024);
        let mut stream = short_deadlines(a);

        // payload_len = 2^31: only the 5 header bytes are ever sent.
        b.write_all(&[0x03, 0x80, 0, 0, 0]).await.unwrap();

        let err = stream.read_frame().await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }), "got {err}");
    }

    #[tokio::test]
    async fn unknown_kind_is_rejected() {
        let (a, mut b) = tokio::io::duplex(1024);
        let mut stream = short_deadlines(a);

        b.write_all(&[0x2A, 0, 0, 0, 0]).await.unwrap();

        let err = stream.read_frame().await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (a, _b) = tokio::io::duplex(1024);
        let mut stream = short_deadlines(a);

        stream.close().await.unwrap();
        assert!(stream.is_closed());
        stream.close().await.unwrap();
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn best_effort_error_survives_closed_peer() {
        let (a, b) = tokio::io::duplex(16);
        let mut stream = short_deadlines(a);
        drop(b);

        stream.send_error_best_effort("cancelled").await;
        stream.send_error_best_effort("cancelled again").await;
    }

    #[tokio::test]
    async fn streaming_read_survives_chunked_arrival() {
        let (a, mut b) = tokio::io::duplex(1024);
        let mut stream = short_deadlines(a);

        let encoded = Frame::file_data(vec![7u8; 64]).encode().unwrap();
        let (first, rest) = encoded.split_at(3);
        let first = first.to_vec();
        let rest = rest.to_vec();

        let writer = tokio::spawn(async move {
            b.write_all(&first).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            b.write_all(&rest).await.unwrap();
            b
        });

        let frame = stream.read_frame_streaming().await.unwrap();
        assert_eq!(frame.kind, FrameKind::FileData);
        assert_eq!(frame.payload.len(), 64);
        writer.await.unwrap();
    }
}
