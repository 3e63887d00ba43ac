//! Cache of discovered stored-procedure signatures
//!
//! Discovery costs a catalog round trip per procedure, so signatures are
//! cached per (data source, procedure, return-flag) key. The cache hands
//! out deep copies with every value unset; callers bind values on their
//! private copy, so concurrent executions never share parameter state.

use parking_lot::Mutex;
use sqlgate_core::{CacheKey, ParameterSet, ParameterSource, Result};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Cache of stored-procedure parameter sets
#[derive(Default)]
pub struct ParameterCache {
    entries: Mutex<HashMap<CacheKey, ParameterSet>>,
}

impl ParameterCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide shared cache
    pub fn global() -> Arc<ParameterCache> {
        static GLOBAL: OnceLock<Arc<ParameterCache>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ParameterCache::new())))
    }

    /// Get the parameter set for a procedure, discovering it on first use.
    ///
    /// Discovery runs outside the cache lock, so two callers racing on a
    /// cold key may both hit the catalog; the last insert wins, which is
    /// harmless because both derive the same signature. Discovery failures
    /// are returned to the caller and never cached.
    pub async fn parameter_set(
        &self,
        source: &dyn ParameterSource,
        procedure: &str,
        include_return: bool,
    ) -> Result<ParameterSet> {
        let key = CacheKey::new(source.data_source(), procedure, include_return);

        if let Some(cached) = self.entries.lock().get(&key) {
            tracing::trace!(procedure = procedure, "parameter cache hit");
            return Ok(cached.clone());
        }

        tracing::debug!(procedure = procedure, "parameter cache miss, deriving");
        let mut derived = source.derive_parameters(procedure, include_return).await?;
        // The cached template never carries values
        derived.clear_values();

        self.entries.lock().insert(key, derived.clone());
        Ok(derived)
    }

    /// Seed the cache with a known signature, bypassing discovery.
    ///
    /// The stored template is normalized to unset values.
    pub fn cache_parameter_set(&self, key: CacheKey, mut parameters: ParameterSet) {
        parameters.clear_values();
        self.entries.lock().insert(key, parameters);
    }

    /// Remove every cached signature
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of cached signatures
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for ParameterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterCache")
            .field("entries", &self.len())
            .finish()
    }
}
