//! File metadata carried in `FILE_INFO` frames.

use std::path::Path;
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::frame::{Frame, FrameKind};

/// Metadata announcing the file about to be streamed.
///
/// Serialized as a UTF-8 JSON object: `{"name": …, "size": …, "mtime": …}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// File name, without directory components.
    pub name: String,
    /// Total file size in bytes.
    pub size: u64,
    /// Modification time as seconds since the Unix epoch, when known.
    pub mtime: Option<u64>,
}

impl FileInfo {
    /// Build metadata for a local file from its path and `std::fs` metadata.
    pub fn for_file(path: &Path, meta: &std::fs::Metadata) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
            .ok_or_else(|| {
                Error::protocol(format!("file has no usable name: {}", path.display()))
            })?;

        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs());

        Ok(Self {
            name,
            size: meta.len(),
            mtime,
        })
    }

    /// Encode into a `FILE_INFO` frame.
    pub fn to_frame(&self) -> Result<Frame> {
        let payload = serde_json::to_vec(self)
            .map_err(|e| Error::protocol(format!("file info serialization failed: {e}")))?;
        Ok(Frame::new(FrameKind::FileInfo, Bytes::from(payload)))
    }

    /// Decode from a `FILE_INFO` frame payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| Error::protocol(format!("malformed file info: {e}")))
    }
}
