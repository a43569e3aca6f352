//! File transfer engine: the sender and receiver state machines.
//!
//! One [`TransferEngine`] owns one connection for its lifetime: the framed
//! stream, the adaptive buffer manager, the progress subject and the session
//! record. Observers are shared and attached from outside.

mod receiver;
mod sender;

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::buffer::BufferManager;
use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::progress::{ProgressEvent, ProgressObserver, ProgressSubject};
use crate::protocol::frame::{Frame, FrameKind};
use crate::session::{Role, TransferSession};
use crate::transport::FrameStream;

/// Drives one file transfer over one connection.
pub struct TransferEngine<S> {
    stream: FrameStream<S>,
    buffer: BufferManager,
    subject: ProgressSubject,
    session: TransferSession,
    config: TransferConfig,
    cancel: CancellationToken,
}

impl<S> TransferEngine<S> {
    /// Build an engine around an established stream.
    ///
    /// Validates the configuration; the only fallible step before the
    /// handshake.
    pub fn new(
        stream: S,
        role: Role,
        peer: impl Into<String>,
        config: TransferConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        let buffer = BufferManager::new(&config)?;
        Ok(Self {
            stream: FrameStream::new(stream, &config),
            buffer,
            subject: ProgressSubject::new(),
            session: TransferSession::new(role, peer),
            config,
            cancel,
        })
    }

    /// Attach a shared observer to this session's subject.
    pub fn attach_observer(&self, observer: Arc<dyn ProgressObserver>) {
        self.subject.attach(observer);
    }

    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    pub fn subject(&self) -> &ProgressSubject {
        &self.subject
    }

    /// Current adaptive chunk size.
    pub fn chunk_size(&self) -> usize {
        self.buffer.current_size()
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> TransferEngine<S> {
    /// Close the underlying stream. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        self.stream.close().await
    }

    /// Common failure path for a task that already started: publish
    /// `TaskError`, flush a best-effort `ERROR` frame, close the stream and
    /// drive the session to its terminal state.
    async fn fail_task(&mut self, task_id: Uuid, err: Error) -> Error {
        self.subject
            .publish(ProgressEvent::task_error(task_id, err.kind_str(), err.to_string()));

        match &err {
            // The failure was reported by the peer's own ERROR frame.
            Error::Peer { .. } => {}
            Error::Cancelled => self.stream.send_error_best_effort("cancelled").await,
            other => self.stream.send_error_best_effort(&other.to_string()).await,
        }
        let _ = self.stream.close().await;

        match &err {
            Error::Cancelled => self.session.cancel(),
            other => self.session.fail(other.to_string()),
        }
        debug!(session = %self.session.id(), error = %err, "transfer failed");
        err
    }

    /// Failure before any task exists: same teardown, no task event.
    async fn fail_setup(&mut self, err: Error) -> Error {
        match &err {
            Error::Peer { .. } => {}
            other => self.stream.send_error_best_effort(&other.to_string()).await,
        }
        let _ = self.stream.close().await;
        match &err {
            Error::Cancelled => self.session.cancel(),
            other => self.session.fail(other.to_string()),
        }
        debug!(session = %self.session.id(), error = %err, "handshake failed");
        err
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Check that a frame is the expected control message.
fn expect_message(frame: &Frame, expected: &str) -> Result<()> {
    match frame.kind {
        FrameKind::Message => {
            let text = frame.text()?;
            if text == expected {
                Ok(())
            } else {
                Err(Error::protocol(format!(
                    "expected {expected:?} message, got {text:?}"
                )))
            }
        }
        FrameKind::Error => Err(Error::peer(frame.text().unwrap_or("<invalid utf-8>"))),
        other => Err(Error::protocol(format!(
            "expected {expected:?} message, got {other:?} frame"
        ))),
    }
}
