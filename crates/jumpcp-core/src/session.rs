//! Per-connection transfer session bookkeeping.

use std::time::{Duration, Instant};

use uuid::Uuid;

/// Which side of the transfer this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

/// Lifecycle state of a session. Terminal states admit no further
/// transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Success,
    Failed(String),
    Cancelled,
}

/// One accepted or dialed connection, from handshake to terminal state.
#[derive(Debug)]
pub struct TransferSession {
    id: Uuid,
    role: Role,
    peer: String,
    started_at: Instant,
    bytes: u64,
    chunk_size: usize,
    rtt: Option<Duration>,
    state: SessionState,
}

impl TransferSession {
    /// Start a new session record.
    pub fn new(role: Role, peer: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            peer: peer.into(),
            started_at: Instant::now(),
            bytes: 0,
            chunk_size: 0,
            rtt: None,
            state: SessionState::Running,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Cumulative payload bytes moved in this session.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn rtt(&self) -> Option<Duration> {
        self.rtt
    }

    pub fn add_bytes(&mut self, n: u64) {
        self.bytes = self.bytes.saturating_add(n);
    }

    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = size;
    }

    pub fn set_rtt(&mut self, rtt: Duration) {
        self.rtt = Some(rtt);
    }

    /// Time since the session started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Mean throughput in bytes/second over the session lifetime.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 { self.bytes as f64 / secs } else { 0.0 }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.state, SessionState::Running)
    }

    /// Mark the session successful. No-op once terminal.
    pub fn succeed(&mut self) {
        if !self.is_terminal() {
            self.state = SessionState::Success;
        }
    }

    /// Mark the session failed with a reason. No-op once terminal.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.is_terminal() {
            self.state = SessionState::Failed(reason.into());
        }
    }

    /// Mark the session cancelled. No-op once terminal.
    pub fn cancel(&mut self) {
        if !self.is_terminal() {
            self.state = SessionState::Cancelled;
        }
    }
}
