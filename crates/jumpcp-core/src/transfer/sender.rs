//! Sending side of the transfer engine.
//!
//! State flow: Idle → Handshake → Negotiate → Streaming → Finalize →
//! Done | Failed. The next disk read is gated on the previous socket write,
//! so a slow network back-pressures naturally.

use std::path::Path;
use std::time::Instant;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, info};
use uuid::Uuid;

use crate::constants::{DEFAULT_PROBE_SAMPLES, MSG_ACK, MSG_HELLO, MSG_READY};
use crate::error::{Error, Result};
use crate::latency::measure_rtt;
use crate::progress::ProgressEvent;
use crate::protocol::frame::Frame;
use crate::protocol::info::FileInfo;
use crate::session::Role;

use super::{TransferEngine, expect_message};

impl<S: AsyncRead + AsyncWrite + Unpin> TransferEngine<S> {
    /// Send one file to the peer. Returns the number of payload bytes sent.
    pub async fn send_file(&mut self, path: &Path) -> Result<u64> {
        if self.session.role() != Role::Sender {
            return Err(Error::protocol("send_file called on a receiver session"));
        }

        let info = match self.describe_source(path).await {
            Ok(info) => info,
            Err(err) => return Err(self.fail_setup(err).await),
        };

        if let Err(err) = self.sender_handshake().await {
            return Err(self.fail_setup(err).await);
        }

        let task_id = Uuid::new_v4();
        self.subject.publish(ProgressEvent::task_started(
            task_id,
            format!("send {}", info.name),
            info.size,
        ));

        match self.stream_file(task_id, path, &info).await {
            Ok(sent) => {
                self.subject
                    .publish(ProgressEvent::task_finished(task_id, true));
                self.session.succeed();
                info!(
                    session = %self.session.id(),
                    file = %info.name,
                    bytes = sent,
                    "file sent"
                );
                Ok(sent)
            }
            Err(err) => Err(self.fail_task(task_id, err).await),
        }
    }

    /// Resolve the source file's metadata before touching the wire.
    async fn describe_source(&self, path: &Path) -> Result<FileInfo> {
        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            )));
        }
        FileInfo::for_file(path, &meta)
    }

    /// HELLO/READY exchange, then RTT probing and buffer seeding.
    async fn sender_handshake(&mut self) -> Result<()> {
        self.check_cancelled()?;
        self.stream.write_frame(&Frame::message(MSG_HELLO)).await?;
        let reply = self.stream.read_frame().await?;
        expect_message(&reply, MSG_READY)?;

        let rtt = measure_rtt(&mut self.stream, DEFAULT_PROBE_SAMPLES).await;
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
            chunk = self.buffer.current_size(),
            "sender handshake complete"
        );
        Ok(())
    }

    async fn stream_file(&mut self, task_id: Uuid, path: &Path, info: &FileInfo) -> Result<u64> {
        self.stream.write_frame(&info.to_frame()?).await?;

        let mut file = File::open(path).await?;
        let mut buf = vec![0u8; self.buffer.current_size()];
        let mut sent: u64 = 0;

        loop {
            self.check_cancelled()?;

            let chunk_size = self.buffer.current_size();
            if buf.len() != chunk_size {
                buf.resize(chunk_size, 0);
            }

            let n = read_up_to(&mut file, &mut buf).await?;
            if n == 0 {
                break;
            }

            let started = Instant::now();
            self.stream
                .write_frame(&Frame::file_data(Bytes::copy_from_slice(&buf[..n])))
                .await?;
            let elapsed = started.elapsed();

            sent += n as u64;
            self.session.add_bytes(n as u64);
            self.buffer.adaptive_adjust(n as u64, elapsed);
            self.session.set_chunk_size(self.buffer.current_size());
            self.subject
                .publish(ProgressEvent::progress_advanced(task_id, n as u64));
        }

        self.stream.write_frame(&Frame::file_end()).await?;

        let reply = self.stream.read_frame().await?;
        expect_message(&reply, MSG_ACK)?;
        Ok(sent)
    }
}

/// Fill `buf` from the file, stopping early only at EOF.
async fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
