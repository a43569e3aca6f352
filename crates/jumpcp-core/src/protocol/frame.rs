//! Frame codec for the jumpcp wire protocol.
//!
//! The codec ensures:
//! - Frames are length-prefixed for stream framing
//! - The 16 MiB payload bound is enforced from the header, before any
//!   payload bytes are buffered or allocated
//! - Partial input returns `Ok(None)` to support streaming decode

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::{FRAME_HEADER_LEN, MAX_PAYLOAD_SIZE};
use crate::error::{Error, Result};

/// Wire kind byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// UTF-8 text command (`HELLO`, `READY`, `ACK`).
    Message = 0x01,
    /// JSON file metadata record.
    FileInfo = 0x02,
    /// Opaque file bytes.
    FileData = 0x03,
    /// End of file data, empty payload.
    FileEnd = 0x04,
    /// Latency probe, empty payload.
    Ping = 0x05,
    /// Latency probe reply, empty payload.
    Pong = 0x06,
    /// UTF-8 human-readable failure reason.
    Error = 0x07,
}

impl TryFrom<u8> for FrameKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(FrameKind::Message),
            0x02 => Ok(FrameKind::FileInfo),
            0x03 => Ok(FrameKind::FileData),
            0x04 => Ok(FrameKind::FileEnd),
            0x05 => Ok(FrameKind::Ping),
            0x06 => Ok(FrameKind::Pong),
            0x07 => Ok(FrameKind::Error),
            other => Err(Error::protocol(format!(
                "unknown frame kind 0x{other:02x}"
            ))),
        }
    }
}

/// One length-prefixed typed unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame from a kind and payload.
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Create a text command frame.
    pub fn message(text: &str) -> Self {
        Self::new(FrameKind::Message, Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Create a file data frame.
    pub fn file_data(data: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::FileData, data)
    }

    /// Create an empty end-of-file frame.
    pub fn file_end() -> Self {
        Self::new(FrameKind::FileEnd, Bytes::new())
    }

    /// Create an empty latency probe frame.
    pub fn ping() -> Self {
        Self::new(FrameKind::Ping, Bytes::new())
    }

    /// Create an empty latency probe reply.
    pub fn pong() -> Self {
        Self::new(FrameKind::Pong, Bytes::new())
    }

    /// Create an error report frame.
    pub fn error(reason: &str) -> Self {
        Self::new(FrameKind::Error, Bytes::copy_from_slice(reason.as_bytes()))
    }

    /// Interpret the payload as UTF-8 text (MESSAGE and ERROR frames).
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.payload)
            .map_err(|_| Error::protocol(format!("{:?} payload is not valid UTF-8", self.kind)))
    }

    /// Encode the frame with its header.
    pub fn encode(&self) -> Result<Bytes> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::protocol(format!(
                "payload too large: {} bytes (max {})",
                self.payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + self.payload.len());
        buf.put_u8(self.kind as u8);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Decode a frame from a buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was decoded (buffer advanced)
    /// - `Ok(None)` if more data is needed (buffer unchanged)
    /// - `Err` on an unknown kind or an oversized length
    ///
    /// The length bound is checked from the peeked header, so an oversized
    /// frame fails before its payload is ever waited for.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>> {
        if buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&buf[..FRAME_HEADER_LEN]);
        let (kind, len) = parse_header(&header)?;

        if buf.len() < FRAME_HEADER_LEN + len {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_LEN);
        let payload = buf.split_to(len).freeze();
        Ok(Some(Frame { kind, payload }))
    }
}

/// Parse a frame header into its kind and payload length.
///
/// Fails on an unknown kind byte or a length beyond the 16 MiB bound, so
/// callers reject bad frames before allocating a payload buffer.
pub fn parse_header(header: &[u8; FRAME_HEADER_LEN]) -> Result<(FrameKind, usize)> {
    let kind = FrameKind::try_from(header[0])?;
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if len > MAX_PAYLOAD_SIZE {
        return Err(Error::protocol(format!(
            "payload length {len} exceeds maximum {MAX_PAYLOAD_SIZE}"
        )));
    }
    Ok((kind, len))
}
