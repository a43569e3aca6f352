//! jumpcp-core: protocol, adaptive transport and progress pipeline.
//!
//! This crate provides:
//! - Length-prefixed wire framing and the `FILE_INFO` payload
//! - Framed stream I/O with control-frame and stall deadlines
//! - RTT probing and the adaptive buffer manager
//! - The progress event subject/observer fabric and its renderers
//! - The file transfer engine (sender and receiver state machines)
//!
//! The tunneled socket is treated as an already-established reliable byte
//! stream; SSH tunnel management lives outside this crate.

pub mod buffer;
pub mod config;
pub mod constants;
pub mod error;
pub mod latency;
pub mod logging;
pub mod progress;
pub mod protocol;
pub mod session;
pub mod transfer;
pub mod transport;

pub use buffer::{AdaptationStrategy, BufferManager, BufferMetrics};
pub use config::TransferConfig;
pub use error::{Error, Result};
pub use logging::{LogFormat, init_logging};
pub use progress::{
    EventKind, ProgressEvent, ProgressObserver, ProgressSubject, RichObserver, SimpleObserver,
};
pub use protocol::{FileInfo, Frame, FrameKind};
pub use session::{Role, SessionState, TransferSession};
pub use transfer::TransferEngine;
pub use transport::FrameStream;
