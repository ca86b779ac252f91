use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::{DetectionCapability, DetectorBackend};
use super::backends::SyntheticBackend;

/// Thread-safe registry holding at most one detector backend per capability.
///
/// Backends are wrapped in `Mutex` because `DetectorBackend::detect` takes `&mut self`
/// and concurrent stream connections share the registry.
pub struct DetectorRegistry {
    backends: HashMap<DetectionCapability, Arc<Mutex<dyn DetectorBackend>>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Registry populated with the built-in synthetic detectors.
    pub fn synthetic(seed: u64) -> Self {
        let mut registry = Self::new();
        for backend in SyntheticBackend::full_set(seed) {
            registry.register(backend);
        }
        registry
    }

    /// Register a backend under its capability. A later registration for the
    /// same capability replaces the earlier one.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let capability = backend.capability();
        let name = backend.name();
        if self
            .backends
            .insert(capability, Arc::new(Mutex::new(backend)))
            .is_some()
        {
            log::warn!(
                "detector registry: {} backend replaced by '{}'",
                capability,
                name
            );
        }
    }

    /// Get the backend for a capability.
    pub fn get(&self, capability: DetectionCapability) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        self.backends.get(&capability).cloned()
    }

    /// Registered backends as (capability, backend name), in pipeline order.
    pub fn list(&self) -> Vec<(DetectionCapability, String)> {
        DetectionCapability::PIPELINE_ORDER
            .iter()
            .filter_map(|capability| {
                let backend = self.backends.get(capability)?;
                let name = match backend.lock() {
                    Ok(guard) => guard.name().to_string(),
                    Err(poisoned) => poisoned.into_inner().name().to_string(),
                };
                Some((*capability, name))
            })
            .collect()
    }

    /// Capabilities with no registered backend. Their results are always absent.
    pub fn missing(&self) -> Vec<DetectionCapability> {
        DetectionCapability::PIPELINE_ORDER
            .iter()
            .copied()
            .filter(|capability| !self.backends.contains_key(capability))
            .collect()
    }

    /// Run every backend's warm-up hook.
    pub fn warm_up(&self) -> Result<()> {
        for capability in DetectionCapability::PIPELINE_ORDER {
            let Some(backend) = self.backends.get(&capability) else {
                continue;
            };
            let mut guard = backend
                .lock()
                .map_err(|_| anyhow!("{} backend lock poisoned", capability))?;
            guard
                .warm_up()
                .map_err(|err| anyhow!("{} backend warm-up failed: {:#}", capability, err))?;
        }
        Ok(())
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
