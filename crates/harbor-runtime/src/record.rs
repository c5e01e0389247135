//! Records, lifecycle states and record kinds.

use std::collections::BTreeMap;
use std::fmt;

use crate::gateway::LoadedUnit;
use crate::reference::{self, ReferenceKind};

/// Metadata key mirroring a record's lifecycle state.
pub const STATE_KEY: &str = "State";

/// Lifecycle state of a module or extension.
///
/// ```text
/// INSTALLED -> RESOLVED -> STARTING -> ACTIVE
///                 ^                      |
///                 +------ STOPPING <-----+
/// any -> UNINSTALLED (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// Loaded by the gateway, dependencies not yet wired.
    Installed,
    /// Dependencies wired; ready to start.
    Resolved,
    /// Activation in progress.
    Starting,
    /// Running.
    Active,
    /// Deactivation in progress.
    Stopping,
    /// Removed from its registry.
    Uninstalled,
}

impl RecordState {
    /// Upper-case label used in metadata and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installed => "INSTALLED",
            Self::Resolved => "RESOLVED",
            Self::Starting => "STARTING",
            Self::Active => "ACTIVE",
            Self::Stopping => "STOPPING",
            Self::Uninstalled => "UNINSTALLED",
        }
    }

    /// Whether `self -> next` is an edge of the lifecycle state machine.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == Self::Uninstalled {
            return false;
        }
        matches!(
            (self, next),
            (_, Self::Uninstalled)
                | (Self::Installed | Self::Starting | Self::Stopping, Self::Resolved)
                | (Self::Resolved, Self::Starting)
                | (Self::Starting | Self::Stopping, Self::Active)
                | (Self::Active, Self::Stopping)
        )
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which registry a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Hosted application code.
    Module,
    /// Code that augments the container itself.
    Extension,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Module => "module",
            Self::Extension => "extension",
        })
    }
}

/// Type-level record kind used to parameterize a [`Registry`](crate::Registry).
pub trait RecordKind: Send + Sync + 'static {
    /// The runtime value of this kind.
    const KIND: Kind;
}

/// Marker for the module registry.
#[derive(Debug, Clone, Copy)]
pub struct ModuleKind;

impl RecordKind for ModuleKind {
    const KIND: Kind = Kind::Module;
}

/// Marker for the extension registry.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionKind;

impl RecordKind for ExtensionKind {
    const KIND: Kind = Kind::Extension;
}

/// A module or extension tracked by a registry.
///
/// Records handed out by the runtime are snapshots; they do not follow
/// later transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    kind: Kind,
    reference: String,
    name: String,
    state: RecordState,
    start_level: i32,
    unit: LoadedUnit,
    sequence: u64,
}

impl Record {
    pub(crate) fn installed(
        kind: Kind,
        reference: &str,
        unit: LoadedUnit,
        default_start_level: i32,
        sequence: u64,
    ) -> Self {
        let name = unit
            .symbolic_name
            .clone()
            .unwrap_or_else(|| reference::short_name(reference));
        Self {
            kind,
            reference: reference.to_owned(),
            name,
            state: RecordState::Installed,
            start_level: unit.start_level.unwrap_or(default_start_level),
            unit,
            sequence,
        }
    }

    pub(crate) fn set_state(&mut self, state: RecordState) {
        self.state = state;
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Registry the record belongs to.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// The exact reference string the record was added with.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Shape of the reference string.
    #[must_use]
    pub fn reference_kind(&self) -> ReferenceKind {
        ReferenceKind::classify(&self.reference)
    }

    /// Display name: the unit's symbolic name, or the reference's short form.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Whether the record is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == RecordState::Active
    }

    /// Activation priority; lower levels start first.
    #[must_use]
    pub fn start_level(&self) -> i32 {
        self.start_level
    }

    /// The unit the gateway loaded for this record.
    #[must_use]
    pub fn unit(&self) -> &LoadedUnit {
        &self.unit
    }

    /// String view of the record: the unit's headers plus [`STATE_KEY`].
    ///
    /// Derived from the typed state on every call.
    #[must_use]
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = self.unit.headers.clone();
        metadata.insert(STATE_KEY.to_owned(), self.state.as_str().to_owned());
        metadata
    }
}
