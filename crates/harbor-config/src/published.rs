//! Process-wide published values.
//!
//! Collaborators that are never handed a [`Config`](crate::Config) (loader
//! gateways, hosted modules) read the resolved directory layout from here.
//! [`ConfigBuilder::build`](crate::ConfigBuilder::build) publishes
//! [`DATA_DIR`] and [`ETC_DIR`]; the last build wins.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Key under which the data directory is published.
pub const DATA_DIR: &str = "harbor.data";

/// Key under which the config (`etc`) directory is published.
pub const ETC_DIR: &str = "harbor.etc";

static PUBLISHED: RwLock<BTreeMap<String, String>> = RwLock::new(BTreeMap::new());

/// Publish `value` under `key`, replacing any previous value.
pub fn publish(key: impl Into<String>, value: impl Into<String>) {
    let mut values = PUBLISHED.write().unwrap_or_else(PoisonError::into_inner);
    values.insert(key.into(), value.into());
}

/// Read a published value.
#[must_use]
pub fn get(key: &str) -> Option<String> {
    PUBLISHED
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(key)
        .cloned()
}

/// Copy of every published value.
#[must_use]
pub fn snapshot() -> BTreeMap<String, String> {
    PUBLISHED
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
