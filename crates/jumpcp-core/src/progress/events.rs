//! Progress events published by transfer sessions.

use std::time::SystemTime;

use uuid::Uuid;

/// One progress event, stamped at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// The task this event belongs to.
    pub task_id: Uuid,
    /// Creation time of the event.
    pub timestamp: SystemTime,
    pub kind: EventKind,
}

/// Event payloads. Observers match exhaustively; adding a variant is a
/// compile-time visible change everywhere.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A task came into existence.
    TaskStarted { description: String, total: u64 },
    /// The task moved forward by `advance` bytes.
    ProgressAdvanced { advance: u64 },
    /// The task reached a terminal state without an error event.
    TaskFinished { success: bool },
    /// The task failed; `kind` is the stable machine-readable error kind.
    TaskError {
        kind: &'static str,
        message: String,
    },
}

impl ProgressEvent {
    fn now(task_id: Uuid, kind: EventKind) -> Self {
        Self {
            task_id,
            timestamp: SystemTime::now(),
            kind,
        }
    }

    pub fn task_started(task_id: Uuid, description: impl Into<String>, total: u64) -> Self {
        Self::now(
            task_id,
            EventKind::TaskStarted {
                description: description.into(),
                total,
            },
        )
    }

    pub fn progress_advanced(task_id: Uuid, advance: u64) -> Self {
        Self::now(task_id, EventKind::ProgressAdvanced { advance })
    }

    pub fn task_finished(task_id: Uuid, success: bool) -> Self {
        Self::now(task_id, EventKind::TaskFinished { success })
    }

    pub fn task_error(task_id: Uuid, kind: &'static str, message: impl Into<String>) -> Self {
        Self::now(
            task_id,
            EventKind::TaskError {
                kind,
                message: message.into(),
            },
        )
    }

    /// Whether this event ends its task.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::TaskFinished { .. } | EventKind::TaskError { .. }
        )
    }
}
