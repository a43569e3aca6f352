//! Aggregating renderer on top of indicatif.
//!
//! One [`RichObserver`] merges events from any number of sessions into a
//! single `MultiProgress` surface. Terminal tasks stay visible (and in the
//! task map) until [`RichObserver::reap`] runs or the observer is dropped,
//! so the user always sees the terminal state.

use std::collections::HashMap;
use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::warn;
use uuid::Uuid;

use super::events::{EventKind, ProgressEvent};
use super::subject::ProgressObserver;

/// Display state of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Finished,
    Errored,
}

/// Aggregated view of one task.
#[derive(Debug, Clone)]
pub struct ProgressTask {
    pub description: String,
    pub total: u64,
    pub completed: u64,
    pub state: TaskState,
}

struct TaskEntry {
    task: ProgressTask,
    bar: ProgressBar,
}

/// Thread-safe observer driving exactly one rendering sink.
pub struct RichObserver {
    multi: MultiProgress,
    tasks: Mutex<HashMap<Uuid, TaskEntry>>,
}

impl RichObserver {
    /// Render to stderr.
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    /// Aggregate without rendering (tests, headless runs).
    pub fn hidden() -> Self {
        Self::with_draw_target(ProgressDrawTarget::hidden())
    }

    pub fn with_draw_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}",
            )
            .unwrap()
            .progress_chars("=>-")
    }

    /// Snapshot of every known task, terminal ones included.
    pub fn tasks(&self) -> Vec<ProgressTask> {
        self.tasks
            .lock()
            .unwrap()
            .values()
            .map(|e| e.task.clone())
            .collect()
    }

    /// Look up one task by id.
    pub fn task(&self, task_id: Uuid) -> Option<ProgressTask> {
        self.tasks
            .lock()
            .unwrap()
            .get(&task_id)
            .map(|e| e.task.clone())
    }

    /// Evict terminal tasks from the map and the display. Returns how many
    /// were removed.
    pub fn reap(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|_, entry| {
            if entry.task.state == TaskState::Running {
                true
            } else {
                self.multi.remove(&entry.bar);
                false
            }
        });
        before - tasks.len()
    }
}

impl Default for RichObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for RichObserver {
    fn on_event(&self, event: &ProgressEvent) {
        let mut tasks = self.tasks.lock().unwrap();

        match &event.kind {
            EventKind::TaskStarted { description, total } => {
                if tasks.contains_key(&event.task_id) {
                    warn!(task_id = %event.task_id, "duplicate TaskStarted ignored");
                    return;
                }
                let bar = self.multi.add(ProgressBar::new(*total));
                bar.set_style(Self::bar_style());
                bar.set_message(description.clone());
                tasks.insert(
                    event.task_id,
                    TaskEntry {
                        task: ProgressTask {
                            description: description.clone(),
                            total: *total,
                            completed: 0,
                            state: TaskState::Running,
                        },
                        bar,
                    },
                );
            }
            EventKind::ProgressAdvanced { advance } => {
                let Some(entry) = tasks.get_mut(&event.task_id) else {
                    warn!(task_id = %event.task_id, "progress for unknown task ignored");
                    return;
                };
                entry.task.completed = entry
                    .task
                    .completed
                    .saturating_add(*advance)
                    .min(entry.task.total);
                entry.bar.set_position(entry.task.completed);
            }
            EventKind::TaskFinished { success } => {
                let Some(entry) = tasks.get_mut(&event.task_id) else {
                    warn!(task_id = %event.task_id, "finish for unknown task ignored");
                    return;
                };
                if *success {
                    entry.task.state = TaskState::Finished;
                    entry
                        .bar
                        .finish_with_message(format!("{} ✓", entry.task.description));
                } else {
                    entry.task.state = TaskState::Errored;
                    entry
                        .bar
                        .abandon_with_message(format!("{} ✗", entry.task.description));
                }
            }
            EventKind::TaskError { message, .. } => {
                let Some(entry) = tasks.get_mut(&event.task_id) else {
                    warn!(task_id = %event.task_id, "error for unknown task ignored");
                    return;
                };
                entry.task.state = TaskState::Errored;
                entry
                    .bar
                    .abandon_with_message(format!("{} ✗ {message}", entry.task.description));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(observer: &RichObserver, desc: &str, total: u64) -> Uuid {
        let id = Uuid::new_v4();
        observer.on_event(&ProgressEvent::task_started(id, desc, total));
        id
    }

    #[test]
    fn two_sessions_aggregate_into_one_view() {
        let observer = RichObserver::hidden();
        let first = started(&observer, "send a.bin", 1024 * 1024);
        let second = started(&observer, "send b.bin", 1024 * 1024);

        // Interleaved progress from two publishers.
        for _ in 0..16 {
            observer.on_event(&ProgressEvent::progress_advanced(first, 64 * 1024));
            observer.on_event(&ProgressEvent::progress_advanced(second, 64 * 1024));
        }
        observer.on_event(&ProgressEvent::task_finished(first, true));
        observer.on_event(&ProgressEvent::task_finished(second, true));

        let tasks = observer.tasks();
        assert_eq!(tasks.len(), 2);
        for task in tasks {
            assert_eq!(task.state, TaskState::Finished);
            assert_eq!(task.completed, task.total);
        }
    }

    #[test]
    fn completed_is_clamped_to_total() {
        let observer = RichObserver::hidden();
        let id = started(&observer, "t", 100);

        observer.on_event(&ProgressEvent::progress_advanced(id, 70));
        observer.on_event(&ProgressEvent::progress_advanced(id, 70));

        let task = observer.task(id).unwrap();
        assert_eq!(task.completed, 100);
    }

    #[test]
    fn unknown_task_events_are_ignored() {
        let observer = RichObserver::hidden();
        observer.on_event(&ProgressEvent::progress_advanced(Uuid::new_v4(), 10));
        observer.on_event(&ProgressEvent::task_finished(Uuid::new_v4(), true));
        assert!(observer.tasks().is_empty());
    }

    #[test]
    fn errored_task_is_retained_until_reap() {
        let observer = RichObserver::hidden();
        let failed = started(&observer, "broken", 100);
        let running = started(&observer, "alive", 100);

        observer.on_event(&ProgressEvent::task_error(failed, "io", "connection reset"));

        // Terminal task still visible.
        assert_eq!(observer.task(failed).unwrap().state, TaskState::Errored);
        assert_eq!(observer.tasks().len(), 2);

        // Reap removes only the terminal one.
        assert_eq!(observer.reap(), 1);
        assert!(observer.task(failed).is_none());
        assert_eq!(observer.task(running).unwrap().state, TaskState::Running);
    }

    #[test]
    fn unsuccessful_finish_marks_errored() {
        let observer = RichObserver::hidden();
        let id = started(&observer, "t", 10);
        observer.on_event(&ProgressEvent::task_finished(id, false));
        assert_eq!(observer.task(id).unwrap().state, TaskState::Errored);
    }
}
