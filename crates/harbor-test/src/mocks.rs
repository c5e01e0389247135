//! Mock implementations for testing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use harbor_config::Config;
use harbor_runtime::{
    GatewayError, GatewayFactory, GatewayResult, LoadedUnit, LoaderGateway, UnitId,
};
use tracing::trace;

/// A gateway operation recorded by [`MockGateway`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    /// `resolve`
    Resolve,
    /// `link`
    Link,
    /// `activate`
    Activate,
    /// `deactivate`
    Deactivate,
    /// `uninstall`
    Uninstall,
}

#[derive(Debug, Clone, Default)]
struct Script {
    symbolic_name: Option<String>,
    start_level: Option<i32>,
    headers: BTreeMap<String, String>,
    failures: HashSet<Call>,
    delays: HashMap<Call, Duration>,
}

/// Scripted in-memory [`LoaderGateway`].
///
/// Every reference resolves unless scripted otherwise; unscripted references
/// get no symbolic name, so records fall back to the reference's short form.
/// Every call is logged per reference.
#[derive(Debug, Default)]
pub struct MockGateway {
    scripts: Mutex<HashMap<String, Script>>,
    log: Mutex<Vec<(Call, String)>>,
    next_id: AtomicU64,
    resolve_delay: Option<Duration>,
}

impl MockGateway {
    /// Create a gateway that loads everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `symbolic_name` for `reference`.
    #[must_use]
    pub fn with_unit(mut self, reference: &str, symbolic_name: &str) -> Self {
        self.script(reference).symbolic_name = Some(symbolic_name.to_owned());
        self
    }

    /// Report `level` as the start level of `reference`.
    #[must_use]
    pub fn with_start_level(mut self, reference: &str, level: i32) -> Self {
        self.script(reference).start_level = Some(level);
        self
    }

    /// Report a header for `reference`.
    #[must_use]
    pub fn with_header(mut self, reference: &str, key: &str, value: &str) -> Self {
        self.script(reference)
            .headers
            .insert(key.to_owned(), value.to_owned());
        self
    }

    /// Fail `call` for `reference`.
    #[must_use]
    pub fn with_failure(mut self, reference: &str, call: Call) -> Self {
        self.script(reference).failures.insert(call);
        self
    }

    /// Make `reference` unloadable.
    #[must_use]
    pub fn failing_load(self, reference: &str) -> Self {
        self.with_failure(reference, Call::Resolve)
    }

    /// Make `reference` load but fail to resolve its dependencies.
    #[must_use]
    pub fn failing_link(self, reference: &str) -> Self {
        self.with_failure(reference, Call::Link)
    }

    /// Make `reference` fail to activate.
    #[must_use]
    pub fn failing_activate(self, reference: &str) -> Self {
        self.with_failure(reference, Call::Activate)
    }

    /// Make `reference` fail to deactivate.
    #[must_use]
    pub fn failing_deactivate(self, reference: &str) -> Self {
        self.with_failure(reference, Call::Deactivate)
    }

    /// Make `reference` fail to uninstall.
    #[must_use]
    pub fn failing_uninstall(self, reference: &str) -> Self {
        self.with_failure(reference, Call::Uninstall)
    }

    /// Sleep for `delay` inside every `call` for `reference`.
    #[must_use]
    pub fn with_delay(mut self, reference: &str, call: Call, delay: Duration) -> Self {
        self.script(reference).delays.insert(call, delay);
        self
    }

    /// Let every later call for `reference` succeed.
    pub fn clear_failures(&self, reference: &str) {
        if let Some(script) = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(reference)
        {
            script.failures.clear();
        }
    }

    /// Sleep for `delay` inside every `resolve`.
    #[must_use]
    pub fn with_resolve_delay(mut self, delay: Duration) -> Self {
        self.resolve_delay = Some(delay);
        self
    }

    /// Number of `call`s made for `reference`.
    #[must_use]
    pub fn calls(&self, call: Call, reference: &str) -> usize {
        self.lock_log()
            .iter()
            .filter(|(c, r)| *c == call && r == reference)
            .count()
    }

    /// Number of `call`s made for any reference.
    #[must_use]
    pub fn total_calls(&self, call: Call) -> usize {
        self.lock_log().iter().filter(|(c, _)| *c == call).count()
    }

    /// References `call` was made for, in call order.
    #[must_use]
    pub fn references_for(&self, call: Call) -> Vec<String> {
        self.lock_log()
            .iter()
            .filter(|(c, _)| *c == call)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Every call made, in order.
    #[must_use]
    pub fn call_log(&self) -> Vec<(Call, String)> {
        self.lock_log().clone()
    }

    fn script(&mut self, reference: &str) -> &mut Script {
        self.scripts
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(reference.to_owned())
            .or_default()
    }

    fn scripted(&self, reference: &str) -> Script {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(reference)
            .cloned()
            .unwrap_or_default()
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, Vec<(Call, String)>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn call(&self, call: Call, reference: &str) -> GatewayResult<Script> {
        let delay = self.scripted(reference).delays.get(&call).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(call, reference)
    }

    fn record(&self, call: Call, reference: &str) -> GatewayResult<Script> {
        trace!(?call, reference, "Mock gateway call");
        self.lock_log().push((call, reference.to_owned()));
        let script = self.scripted(reference);
        if script.failures.contains(&call) {
            return Err(match call {
                Call::Resolve => GatewayError::Unresolved(reference.to_owned()),
                _ => GatewayError::Failed(format!("{call:?} refused for {reference}")),
            });
        }
        Ok(script)
    }
}

#[async_trait]
impl LoaderGateway for MockGateway {
    async fn resolve(&self, reference: &str) -> GatewayResult<LoadedUnit> {
        if let Some(delay) = self.resolve_delay {
            tokio::time::sleep(delay).await;
        }
        let script = self.call(Call::Resolve, reference).await?;

        let id = UnitId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut unit = LoadedUnit::new(id, reference);
        unit.symbolic_name = script.symbolic_name;
        unit.start_level = script.start_level;
        unit.headers = script.headers;
        Ok(unit)
    }

    async fn link(&self, unit: &LoadedUnit) -> GatewayResult<()> {
        self.call(Call::Link, &unit.location).await.map(drop)
    }

    async fn activate(&self, unit: &LoadedUnit) -> GatewayResult<()> {
        self.call(Call::Activate, &unit.location).await.map(drop)
    }

    async fn deactivate(&self, unit: &LoadedUnit) -> GatewayResult<()> {
        self.call(Call::Deactivate, &unit.location).await.map(drop)
    }

    async fn uninstall(&self, unit: &LoadedUnit) -> GatewayResult<()> {
        self.call(Call::Uninstall, &unit.location).await.map(drop)
    }
}

/// Factory handing out `gateway` on every `init`.
pub fn mock_factory(gateway: Arc<MockGateway>) -> impl GatewayFactory {
    move |_config: &Config| -> GatewayResult<Arc<dyn LoaderGateway>> {
        Ok(Arc::clone(&gateway) as Arc<dyn LoaderGateway>)
    }
}

/// Factory that always fails with `error`.
pub fn failing_factory(error: GatewayError) -> impl GatewayFactory {
    move |_config: &Config| -> GatewayResult<Arc<dyn LoaderGateway>> { Err(error.clone()) }
}
