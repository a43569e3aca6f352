//! Receiving side of the transfer engine.
//!
//! State flow: Idle → Handshake → AwaitInfo → Streaming → Finalize →
//! Done | Failed. Data lands in `<name>.part` and is renamed into place only
//! after the byte count checks out; a failed transfer leaves the `.part`
//! file behind.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};
use uuid::Uuid;

use crate::constants::{MSG_ACK, MSG_HELLO, MSG_READY, PART_SUFFIX};
use crate::error::{Error, Result};
use crate::latency::InterPingEstimator;
use crate::progress::ProgressEvent;
use crate::protocol::frame::{Frame, FrameKind};
use crate::protocol::info::FileInfo;
use crate::session::Role;

use super::{TransferEngine, expect_message};

impl<S: AsyncRead + AsyncWrite + Unpin> TransferEngine<S> {
    /// Receive one file into `output_dir`. Returns the final path.
    ///
    /// The output directory must already exist; creating it is the caller's
    /// concern.
    pub async fn receive_file(&mut self, output_dir: &Path) -> Result<PathBuf> {
        if self.session.role() != Role::Receiver {
            return Err(Error::protocol("receive_file called on a sender session"));
        }

        let info = match self.receiver_handshake().await {
            Ok(info) => info,
            Err(err) => return Err(self.fail_setup(err).await),
        };

        let task_id = Uuid::new_v4();
        self.subject.publish(ProgressEvent::task_started(
            task_id,
            format!("recv {}", info.name),
            info.size,
        ));

        match self.stream_to_disk(task_id, output_dir, &info).await {
            Ok(path) => {
                self.subject
                    .publish(ProgressEvent::task_finished(task_id, true));
                self.session.succeed();
                info!(
                    session = %self.session.id(),
                    path = %path.display(),
                    bytes = info.size,
                    "file received"
                );
                Ok(path)
            }
            Err(err) => Err(self.fail_task(task_id, err).await),
        }
    }

    /// HELLO in, READY out, then echo probes until the metadata arrives.
    ///
    /// Consecutive PINGs arrive one round-trip apart (the sender blocks on
    /// each PONG), so their gaps seed this side's buffer manager.
    async fn receiver_handshake(&mut self) -> Result<FileInfo> {
        self.check_cancelled()?;
        let hello = self.stream.read_frame().await?;
        expect_message(&hello, MSG_HELLO)?;
        self.stream.write_frame(&Frame::message(MSG_READY)).await?;

        let mut estimator = InterPingEstimator::default();
        let info = loop {
            let frame = self.stream.read_frame().await?;
            match frame.kind {
                FrameKind::Ping => {
                    estimator.observe_ping();
                    self.stream.write_frame(&Frame::pong()).await?;
                }
                FrameKind::FileInfo => break FileInfo::from_payload(&frame.payload)?,
                FrameKind::Error => {
                    return Err(Error::peer(frame.text().unwrap_or("<invalid utf-8>")));
                }
                other => {
                    return Err(Error::protocol(format!(
                        "unexpected {other:?} frame during handshake"
                    )));
                }
            }
        };

        let rtt = estimator.estimate();
        self.session.set_rtt(rtt);
        if self.config.initial_buffer_size.is_none() {
            self.buffer.seed_from_rtt(rtt, self.config.strategy);
        } else {
            self.buffer.set_rtt(rtt);
        }
        self.session.set_chunk_size(self.buffer.current_size());

        debug!(
            session = %self.session.id(),
            rtt_ms = rtt.as_millis() as u64,
            probe_gaps = estimator.samples(),
            file = %info.name,
            size = info.size,
            "receiver handshake complete"
        );
        Ok(info)
    }

    async fn stream_to_disk(
        &mut self,
        task_id: Uuid,
        output_dir: &Path,
        info: &FileInfo,
    ) -> Result<PathBuf> {
        let file_name = sanitize_file_name(&info.name)?;
        let final_path = output_dir.join(&file_name);
        let part_path = output_dir.join(format!("{file_name}.{PART_SUFFIX}"));

        let mut file = File::create(&part_path).await?;
        let mut received: u64 = 0;

        loop {
            self.check_cancelled()?;

            let started = Instant::now();
            let frame = self.stream.read_frame_streaming().await?;
            match frame.kind {
                FrameKind::FileData => {
                    let len = frame.payload.len() as u64;
                    if received + len > info.size {
                        return Err(Error::protocol(format!(
                            "peer sent more than the announced {} bytes",
                            info.size
                        )));
                    }
                    file.write_all(&frame.payload).await?;
                    let elapsed = started.elapsed();

                    received += len;
                    self.session.add_bytes(len);
                    self.buffer.adaptive_adjust(len, elapsed);
                    self.session.set_chunk_size(self.buffer.current_size());
                    self.subject
                        .publish(ProgressEvent::progress_advanced(task_id, len));
                }
                FrameKind::FileEnd => break,
                // Mid-transfer probes are echoed immediately.
                FrameKind::Ping => self.stream.write_frame(&Frame::pong()).await?,
                FrameKind::Error => {
                    return Err(Error::peer(frame.text().unwrap_or("<invalid utf-8>")));
                }
                other => {
                    return Err(Error::protocol(format!(
                        "unexpected {other:?} frame during file data"
                    )));
                }
            }
        }

        if received != info.size {
            return Err(Error::protocol(format!(
                "size mismatch: expected {} bytes, wrote {received}",
                info.size
            )));
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&part_path, &final_path).await?;

        self.stream.write_frame(&Frame::message(MSG_ACK)).await?;
        Ok(final_path)
    }
}

/// Reduce a peer-supplied name to a bare file name.
fn sanitize_file_name(name: &str) -> Result<String> {
    match Path::new(name).file_name().and_then(|n| n.to_str()) {
        Some(bare) if !bare.is_empty() => Ok(bare.to_owned()),
        _ => Err(Error::protocol(format!(
            "unusable file name in metadata: {name:?}"
        ))),
    }
}
