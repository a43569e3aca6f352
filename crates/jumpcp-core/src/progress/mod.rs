//! Progress event fabric: events, the publishing subject and observers.
//!
//! Sessions publish [`ProgressEvent`]s into their own [`ProgressSubject`];
//! shared observers aggregate events from any number of sessions onto one
//! rendering surface.

pub mod events;
pub mod rich;
pub mod simple;
pub mod subject;

pub use events::{EventKind, ProgressEvent};
pub use rich::{ProgressTask, RichObserver, TaskState};
pub use simple::SimpleObserver;
pub use subject::{ProgressObserver, ProgressSubject};
