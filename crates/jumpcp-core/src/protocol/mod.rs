//! Wire protocol: frame codec and structured payloads.
//!
//! Format: 1-byte kind + 4-byte big-endian payload length + payload.
//! The codec never interprets payloads; `FILE_INFO` content is handled by
//! [`info::FileInfo`].

pub mod frame;
pub mod info;

pub use frame::{Frame, FrameKind};
pub use info::FileInfo;
