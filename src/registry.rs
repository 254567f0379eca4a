//! Process-wide registry of named cache configurations.
//!
//! Configs are published once at cache startup and read by name on every
//! operation, so lookups must stay O(1) and contention-free. A sharded
//! concurrent map inside a `OnceLock` gives lock-free reads after
//! publication.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::config::{CacheConfig, ConfigValue};
use crate::error::CacheError;

static REGISTRY: OnceLock<DashMap<String, Arc<CacheConfig>>> = OnceLock::new();

fn registry() -> &'static DashMap<String, Arc<CacheConfig>> {
    REGISTRY.get_or_init(DashMap::new)
}

/// Publish a config under its cache name.
///
/// Starting a cache under an existing name replaces the published config.
pub fn store(config: CacheConfig) -> Arc<CacheConfig> {
    let config = Arc::new(config);
    registry().insert(config.name.clone(), Arc::clone(&config));
    config
}

/// The full config of a named cache.
pub fn get(name: &str) -> Result<Arc<CacheConfig>, CacheError> {
    registry()
        .get(name)
        .map(|entry| Arc::clone(entry.value()))
        .ok_or_else(|| CacheError::UnknownCache(name.to_string()))
}

/// One configuration field of a named cache.
pub fn value_of(name: &str, key: &str) -> Result<ConfigValue, CacheError> {
    get(name)?.value_of(key)
}
