//! Keyed record registry.
//!
//! One [`Registry`] exists per record kind. Its mutex guards the whole key
//! space for the full duration of every operation, gateway calls included,
//! so two concurrent first-time adds of the same reference cost exactly one
//! gateway load: the second caller waits and then finds the first's record.
//! The module and extension registries lock independently.

use std::collections::HashMap;
use std::marker::PhantomData;

use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::events::LifecycleEvent;
use crate::gateway::{GatewayError, LoaderGateway};
use crate::record::{Record, RecordKind, RecordState};
use crate::report::{LifecycleReport, Stage};

#[derive(Debug, Default)]
struct Entries {
    records: HashMap<String, Record>,
    next_sequence: u64,
    /// Set by `start_all`, cleared by `stop_all`; new records activate
    /// immediately while set.
    started: bool,
}

/// Registry of modules or extensions, keyed by reference.
pub struct Registry<K: RecordKind> {
    entries: Mutex<Entries>,
    events: broadcast::Sender<LifecycleEvent>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: RecordKind> Registry<K> {
    /// Create an empty registry publishing transitions on `events`.
    #[must_use]
    pub fn new(events: broadcast::Sender<LifecycleEvent>) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            events,
            _kind: PhantomData,
        }
    }

    /// Install `reference`, or return the existing record if it is already
    /// registered (the gateway is not consulted again).
    ///
    /// While the registry is started (see [`start_all`](Self::start_all)),
    /// a newly installed record is also driven to ACTIVE before the registry
    /// is updated; if that fails the unit is uninstalled again and the
    /// registry is left unchanged. The decision is made under the registry
    /// lock, so an add racing `stop_all` never activates after it returns.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::LoadFailure`] if the gateway cannot load the
    /// reference and [`RuntimeError::ResolutionFailure`] if activation fails.
    pub async fn add(
        &self,
        gateway: &dyn LoaderGateway,
        reference: &str,
        default_start_level: i32,
    ) -> RuntimeResult<Record> {
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.records.get(reference) {
            debug!(kind = %K::KIND, reference, state = %existing.state(), "Already installed");
            return Ok(existing.clone());
        }

        let unit = gateway
            .resolve(reference)
            .await
            .map_err(|source| RuntimeError::LoadFailure {
                kind: K::KIND,
                reference: reference.to_owned(),
                source,
            })?;

        let sequence = entries.next_sequence;
        entries.next_sequence = sequence.wrapping_add(1);
        let mut record = Record::installed(K::KIND, reference, unit, default_start_level, sequence);
        self.emit(&record, None);
        info!(
            kind = %K::KIND,
            reference,
            name = record.name(),
            start_level = record.start_level(),
            "Installed"
        );

        if entries.started && let Err((stage, source)) = self.bring_up(gateway, &mut record).await {
            warn!(kind = %K::KIND, reference, %stage, error = %source, "Activation failed; rolling back install");
            if let Err(e) = gateway.uninstall(record.unit()).await {
                warn!(kind = %K::KIND, reference, error = %e, "Uninstall after failed activation failed");
            }
            self.transition(&mut record, RecordState::Uninstalled);
            return Err(RuntimeError::ResolutionFailure {
                kind: K::KIND,
                reference: reference.to_owned(),
                stage,
                source,
            });
        }

        entries.records.insert(reference.to_owned(), record.clone());
        Ok(record)
    }

    /// Stop (if active), uninstall and forget `reference`.
    ///
    /// Returns the final UNINSTALLED snapshot, or `None` if the reference
    /// was not registered. With `force`, stop and uninstall errors are
    /// logged and swallowed and the record is always removed.
    ///
    /// # Errors
    ///
    /// Without `force`: [`RuntimeError::StopFailure`] if deactivation fails
    /// (the record stays ACTIVE) and [`RuntimeError::UninstallFailure`] if
    /// the gateway refuses to release the unit (the record stays RESOLVED or
    /// INSTALLED).
    pub async fn remove(
        &self,
        gateway: &dyn LoaderGateway,
        reference: &str,
        force: bool,
    ) -> RuntimeResult<Option<Record>> {
        let mut entries = self.entries.lock().await;
        let Some(record) = entries.records.get_mut(reference) else {
            debug!(kind = %K::KIND, reference, "Not installed; nothing to remove");
            return Ok(None);
        };

        if record.is_active()
            && let Err(source) = self.bring_down(gateway, record).await
        {
            if !force {
                return Err(RuntimeError::StopFailure {
                    kind: K::KIND,
                    reference: reference.to_owned(),
                    source,
                });
            }
            warn!(kind = %K::KIND, reference, error = %source, "Stop failed during forced removal");
        }

        if let Err(source) = gateway.uninstall(record.unit()).await {
            if !force {
                return Err(RuntimeError::UninstallFailure {
                    kind: K::KIND,
                    reference: reference.to_owned(),
                    source,
                });
            }
            warn!(kind = %K::KIND, reference, error = %source, "Uninstall failed during forced removal");
        }

        let Some(mut record) = entries.records.remove(reference) else {
            return Ok(None);
        };
        self.transition(&mut record, RecordState::Uninstalled);
        info!(kind = %K::KIND, reference, "Uninstalled");
        Ok(Some(record))
    }

    /// Drive every record that is not yet active to ACTIVE, in ascending
    /// start level order with ties broken by insertion order.
    ///
    /// Failures are appended to `report` per record and do not stop the
    /// batch. A record that fails to resolve stays INSTALLED; one that fails
    /// to activate falls back to RESOLVED. Both are retried on the next call.
    /// Later adds activate immediately until [`stop_all`](Self::stop_all).
    pub async fn start_all(&self, gateway: &dyn LoaderGateway, report: &mut LifecycleReport) {
        let mut entries = self.entries.lock().await;
        entries.started = true;
        let mut pending: Vec<&mut Record> = entries
            .records
            .values_mut()
            .filter(|r| matches!(r.state(), RecordState::Installed | RecordState::Resolved))
            .collect();
        pending.sort_by_key(|r| (r.start_level(), r.sequence()));

        for record in pending {
            match self.bring_up(gateway, record).await {
                Ok(()) => report.record_success(K::KIND, record.reference()),
                Err((stage, error)) => {
                    warn!(
                        kind = %K::KIND,
                        reference = record.reference(),
                        %stage,
                        %error,
                        "Failed to start"
                    );
                    report.record_failure(K::KIND, record.reference(), stage, error);
                },
            }
        }
    }

    /// Stop every active record, in descending start level order.
    ///
    /// A record whose deactivation fails stays ACTIVE and is reported.
    /// Later adds only install.
    pub async fn stop_all(&self, gateway: &dyn LoaderGateway, report: &mut LifecycleReport) {
        let mut entries = self.entries.lock().await;
        entries.started = false;
        let mut active: Vec<&mut Record> = entries
            .records
            .values_mut()
            .filter(|r| r.is_active())
            .collect();
        active.sort_by_key(|r| std::cmp::Reverse((r.start_level(), r.sequence())));

        for record in active {
            match self.bring_down(gateway, record).await {
                Ok(()) => report.record_success(K::KIND, record.reference()),
                Err(error) => {
                    warn!(kind = %K::KIND, reference = record.reference(), %error, "Failed to stop");
                    report.record_failure(K::KIND, record.reference(), Stage::Deactivate, error);
                },
            }
        }
    }

    /// Whether new records are activated on add.
    pub async fn is_started(&self) -> bool {
        self.entries.lock().await.started
    }

    /// Forget the started flag without touching any record.
    pub(crate) async fn reset_started(&self) {
        self.entries.lock().await.started = false;
    }

    /// Snapshot of the record for `reference`.
    pub async fn get(&self, reference: &str) -> Option<Record> {
        self.entries.lock().await.records.get(reference).cloned()
    }

    /// Whether `reference` is registered.
    pub async fn contains(&self, reference: &str) -> bool {
        self.entries.lock().await.records.contains_key(reference)
    }

    /// Snapshots of every record, in insertion order.
    pub async fn all(&self) -> Vec<Record> {
        let entries = self.entries.lock().await;
        let mut records: Vec<Record> = entries.records.values().cloned().collect();
        records.sort_by_key(Record::sequence);
        records
    }

    /// Registered references, in insertion order.
    pub async fn references(&self) -> Vec<String> {
        self.all()
            .await
            .into_iter()
            .map(|r| r.reference().to_owned())
            .collect()
    }

    /// Number of registered records.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.records.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.records.is_empty()
    }

    /// INSTALLED/RESOLVED -> RESOLVED -> STARTING -> ACTIVE.
    async fn bring_up(
        &self,
        gateway: &dyn LoaderGateway,
        record: &mut Record,
    ) -> Result<(), (Stage, GatewayError)> {
        if record.state() == RecordState::Installed {
            gateway
                .link(record.unit())
                .await
                .map_err(|e| (Stage::Resolve, e))?;
            self.transition(record, RecordState::Resolved);
        }

        self.transition(record, RecordState::Starting);
        if let Err(e) = gateway.activate(record.unit()).await {
            self.transition(record, RecordState::Resolved);
            return Err((Stage::Activate, e));
        }
        self.transition(record, RecordState::Active);
        Ok(())
    }

    /// ACTIVE -> STOPPING -> RESOLVED, or back to ACTIVE on failure.
    async fn bring_down(
        &self,
        gateway: &dyn LoaderGateway,
        record: &mut Record,
    ) -> Result<(), GatewayError> {
        self.transition(record, RecordState::Stopping);
        if let Err(e) = gateway.deactivate(record.unit()).await {
            self.transition(record, RecordState::Active);
            return Err(e);
        }
        self.transition(record, RecordState::Resolved);
        Ok(())
    }

    fn transition(&self, record: &mut Record, to: RecordState) {
        let from = record.state();
        debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");
        record.set_state(to);
        debug!(kind = %K::KIND, reference = record.reference(), %from, %to, "State changed");
        self.emit(record, Some(from));
    }

    fn emit(&self, record: &Record, from: Option<RecordState>) {
        // No subscribers is fine
        let _ = self.events.send(LifecycleEvent {
            kind: K::KIND,
            reference: record.reference().to_owned(),
            from,
            to: record.state(),
        });
    }
}

impl<K: RecordKind> std::fmt::Debug for Registry<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("Registry");
        debug.field("kind", &K::KIND);
        // Skipped while an operation holds the lock
        if let Ok(entries) = self.entries.try_lock() {
            debug.field("record_count", &entries.records.len());
        }
        debug.finish_non_exhaustive()
    }
}
