//! Line-based progress output for terminals without a live display.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use uuid::Uuid;

use crate::constants::SIMPLE_PRINT_INTERVAL;

use super::events::{EventKind, ProgressEvent};
use super::subject::ProgressObserver;

/// Prints one line per event to stderr.
///
/// Progress lines are throttled to one per task per 200 ms; start and
/// terminal events always print.
#[derive(Default)]
pub struct SimpleObserver {
    last_printed: Mutex<HashMap<Uuid, Instant>>,
}

impl SimpleObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn due(last: Option<Instant>, now: Instant) -> bool {
        last.is_none_or(|at| now.duration_since(at) >= SIMPLE_PRINT_INTERVAL)
    }
}

impl ProgressObserver for SimpleObserver {
    fn on_event(&self, event: &ProgressEvent) {
        let id = short_id(event.task_id);
        match &event.kind {
            EventKind::TaskStarted { description, total } => {
                eprintln!("[{id}] started: {description} ({total} bytes)");
            }
            EventKind::ProgressAdvanced { advance } => {
                let mut last_printed = self.last_printed.lock().unwrap();
                let now = Instant::now();
                if Self::due(last_printed.get(&event.task_id).copied(), now) {
                    last_printed.insert(event.task_id, now);
                    eprintln!("[{id}] +{advance} bytes");
                }
            }
            EventKind::TaskFinished { success } => {
                self.last_printed.lock().unwrap().remove(&event.task_id);
                if *success {
                    eprintln!("[{id}] done");
                } else {
                    eprintln!("[{id}] finished with errors");
                }
            }
            EventKind::TaskError { kind, message } => {
                self.last_printed.lock().unwrap().remove(&event.task_id);
                eprintln!("[{id}] error ({kind}): {message}");
            }
        }
    }
}

fn short_id(id: Uuid) -> String {
    let mut s = id.simple().to_string();
    s.truncate(8);
    s
}
