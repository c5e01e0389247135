//! Lifecycle transition events.

use crate::record::{Kind, RecordState};

/// Default capacity of the lifecycle event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// A single state transition of a module or extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// Registry of the record.
    pub kind: Kind,
    /// The record's reference.
    pub reference: String,
    /// Previous state; `None` when the record was just installed.
    pub from: Option<RecordState>,
    /// New state.
    pub to: RecordState,
}
