//! Event publisher with observer fan-out.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

use tracing::warn;

use super::events::ProgressEvent;

/// Receives progress events. Implementations must be safe to call from any
/// session task; delivery is synchronous on the publisher's task.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Per-session event publisher.
///
/// The observer list is read-mostly: publishes happen per chunk, attach and
/// detach are rare. Publishing snapshots the list under a short read lock and
/// invokes observers outside it, so no observer ever runs while the registry
/// is locked.
#[derive(Default)]
pub struct ProgressSubject {
    observers: RwLock<Vec<Arc<dyn ProgressObserver>>>,
}

impl ProgressSubject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Attaching the same instance twice is a no-op.
    pub fn attach(&self, observer: Arc<dyn ProgressObserver>) {
        let mut observers = self.observers.write().unwrap();
        if !observers.iter().any(|o| Arc::ptr_eq(o, &observer)) {
            observers.push(observer);
        }
    }

    /// Remove an observer by identity.
    pub fn detach(&self, observer: &Arc<dyn ProgressObserver>) {
        self.observers
            .write()
            .unwrap()
            .retain(|o| !Arc::ptr_eq(o, observer));
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().unwrap().len()
    }

    /// Deliver an event to every attached observer.
    ///
    /// A panicking observer is isolated: the panic is caught and logged, and
    /// the remaining observers still receive the event.
    pub fn publish(&self, event: ProgressEvent) {
        let snapshot: Vec<Arc<dyn ProgressObserver>> =
            self.observers.read().unwrap().clone();

        for observer in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| observer.on_event(&event))).is_err() {
                warn!(task_id = %event.task_id, "progress observer panicked; event dropped for it");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::events::EventKind;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl ProgressObserver for Recording {
        fn on_event(&self, event: &ProgressEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    struct Panicking;

    impl ProgressObserver for Panicking {
        fn on_event(&self, _event: &ProgressEvent) {
            panic!("renderer exploded");
        }
    }

    #[test]
    fn publish_preserves_order() {
        let subject = ProgressSubject::new();
        let observer = Arc::new(Recording::default());
        subject.attach(observer.clone());

        let id = Uuid::new_v4();
        subject.publish(ProgressEvent::task_started(id, "t", 30));
        subject.publish(ProgressEvent::progress_advanced(id, 10));
        subject.publish(ProgressEvent::progress_advanced(id, 20));
        subject.publish(ProgressEvent::task_finished(id, true));

        let events = observer.events.lock().unwrap();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0].kind, EventKind::TaskStarted { .. }));
        assert!(matches!(
            events[1].kind,
            EventKind::ProgressAdvanced { advance: 10 }
        ));
        assert!(matches!(
            events[2].kind,
            EventKind::ProgressAdvanced { advance: 20 }
        ));
        assert!(matches!(
            events[3].kind,
            EventKind::TaskFinished { success: true }
        ));
    }

    #[test]
    fn attach_is_idempotent_by_identity() {
        let subject = ProgressSubject::new();
        let observer = Arc::new(Recording::default());
        subject.attach(observer.clone());
        subject.attach(observer.clone());
        assert_eq!(subject.observer_count(), 1);

        subject.publish(ProgressEvent::progress_advanced(Uuid::new_v4(), 1));
        assert_eq!(observer.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn detach_removes_only_that_instance() {
        let subject = ProgressSubject::new();
        let first = Arc::new(Recording::default());
        let second = Arc::new(Recording::default());
        subject.attach(first.clone());
        subject.attach(second.clone());

        let handle: Arc<dyn ProgressObserver> = first.clone();
        subject.detach(&handle);
        assert_eq!(subject.observer_count(), 1);

        subject.publish(ProgressEvent::progress_advanced(Uuid::new_v4(), 5));
        assert!(first.events.lock().unwrap().is_empty());
        assert_eq!(second.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn panicking_observer_does_not_block_others() {
        let subject = ProgressSubject::new();
        let survivor = Arc::new(Recording::default());
        subject.attach(Arc::new(Panicking));
        subject.attach(survivor.clone());

        let id = Uuid::new_v4();
        subject.publish(ProgressEvent::task_started(id, "t", 1));
        subject.publish(ProgressEvent::task_finished(id, true));

        assert_eq!(survivor.events.lock().unwrap().len(), 2);
    }
}
