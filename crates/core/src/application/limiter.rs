//! Concurrency Limiter - Per-language admission gates
//!
//! One default gate serves every language without an override. A language
//! with an override gets its own dedicated gate, so a capacity of 1 fully
//! serializes that language while the others keep running in parallel.

use crate::application::constants::DEFAULT_CONCURRENCY;
use crate::domain::ConnectorLanguage;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Gate capacities for one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_capacity")]
    pub default_capacity: usize,

    #[serde(default)]
    pub class_overrides: HashMap<ConnectorLanguage, usize>,
}

fn default_capacity() -> usize {
    DEFAULT_CONCURRENCY
}

impl ConcurrencyConfig {
    /// Config with a default gate only
    pub fn new(default_capacity: usize) -> Self {
        Self {
            default_capacity,
            class_overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, language: ConnectorLanguage, capacity: usize) -> Self {
        self.class_overrides.insert(language, capacity);
        self
    }
}

impl Default for ConcurrencyConfig {
    /// Java integration tests run out of memory when run in parallel,
    /// so the stock config serializes them.
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY).with_override(ConnectorLanguage::Java, 1)
    }
}

/// Counting admission gate handed to a work function.
///
/// Cloning shares the same slots. The scheduler never acquires a gate
/// itself: the work function decides which section of its work needs a slot.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(AppError::Config(
                "concurrency gate capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently held
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a free slot. The slot is released when the permit drops,
    /// including when the holding task is cancelled or panics.
    pub async fn acquire(&self) -> Result<GatePermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| AppError::Internal(format!("concurrency gate closed: {}", e)))?;
        Ok(GatePermit { _permit: permit })
    }

    /// Take a slot only if one is free right now
    pub fn try_acquire(&self) -> Option<GatePermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| GatePermit { _permit: permit })
    }

    /// True if both values share the same slots
    pub fn same_gate(&self, other: &ConcurrencyGate) -> bool {
        Arc::ptr_eq(&self.semaphore, &other.semaphore)
    }
}

/// Scoped slot of a `ConcurrencyGate`
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

/// Gate table built once per batch. Immutable after construction, so
/// lookups need no locking.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    default_gate: ConcurrencyGate,
    dedicated: HashMap<ConnectorLanguage, ConcurrencyGate>,
}

impl ConcurrencyLimiter {
    pub fn new(config: &ConcurrencyConfig) -> Result<Self> {
        let default_gate = ConcurrencyGate::new(config.default_capacity)?;
        let dedicated = config
            .class_overrides
            .iter()
            .map(|(language, capacity)| {
                ConcurrencyGate::new(*capacity)
                    .map(|gate| (*language, gate))
                    .map_err(|_| {
                        AppError::Config(format!(
                            "concurrency override for {} must be at least 1",
                            language
                        ))
                    })
            })
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            default_gate,
            dedicated,
        })
    }

    /// Dedicated gate of `language` if one is registered, else the default gate
    pub fn gate_for(&self, language: ConnectorLanguage) -> ConcurrencyGate {
        self.dedicated
            .get(&language)
            .unwrap_or(&self.default_gate)
            .clone()
    }

    pub fn default_gate(&self) -> &ConcurrencyGate {
        &self.default_gate
    }

    pub fn has_dedicated_gate(&self, language: ConnectorLanguage) -> bool {
        self.dedicated.contains_key(&language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(ConcurrencyGate::new(0).is_err());
        assert!(ConcurrencyLimiter::new(&ConcurrencyConfig::new(0)).is_err());

        let config = ConcurrencyConfig::new(4).with_override(ConnectorLanguage::Java, 0);
        let err = ConcurrencyLimiter::new(&config).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_gate_for_falls_back_to_default() {
        let config = ConcurrencyConfig::new(4).with_override(ConnectorLanguage::Java, 1);
        let limiter = ConcurrencyLimiter::new(&config).unwrap();

        let python = limiter.gate_for(ConnectorLanguage::Python);
        let low_code = limiter.gate_for(ConnectorLanguage::LowCode);
        let java = limiter.gate_for(ConnectorLanguage::Java);

        assert!(python.same_gate(&low_code));
        assert!(python.same_gate(limiter.default_gate()));
        assert!(!java.same_gate(&python));
        assert_eq!(python.capacity(), 4);
        assert_eq!(java.capacity(), 1);
        assert!(limiter.has_dedicated_gate(ConnectorLanguage::Java));
    }

    #[test]
    fn test_default_config_serializes_java() {
        let config = ConcurrencyConfig::default();
        assert_eq!(config.default_capacity, DEFAULT_CONCURRENCY);
        assert_eq!(config.class_overrides.get(&ConnectorLanguage::Java), Some(&1));
    }

    #[test]
    fn test_permit_released_on_drop() {
        let gate = ConcurrencyGate::new(1).unwrap();

        let permit = gate.try_acquire();
        assert!(permit.is_some());
        assert_eq!(gate.available(), 0);
        assert!(gate.try_acquire().is_none());

        drop(permit);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_permit_released_when_holder_cancelled() {
        let gate = ConcurrencyGate::new(1).unwrap();
        let held = gate.clone();

        let handle = tokio::spawn(async move {
            let _permit = held.acquire().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });

        // Wait for the task to take the slot
        while gate.available() != 0 {
            tokio::task::yield_now().await;
        }

        handle.abort();
        let _ = handle.await;

        assert_eq!(gate.available(), 1);
    }
}
