use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use weatherwatch_core::TemperatureUnit;

use crate::persistence::Persistence;

/// Persisted display preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub temperature_unit: TemperatureUnit,
}

/// Process-wide temperature unit.
///
/// Changing the unit here never touches cached weather; callers invalidate.
pub struct UnitPreferenceStore {
    unit: watch::Sender<TemperatureUnit>,
    persistence: Option<Arc<dyn Persistence<Preferences>>>,
    warning: RwLock<Option<String>>,
}

impl UnitPreferenceStore {
    /// In-memory store starting at `default`.
    pub fn new(default: TemperatureUnit) -> Self {
        let (unit, _) = watch::channel(default);
        Self {
            unit,
            persistence: None,
            warning: RwLock::new(None),
        }
    }

    /// Restore the last saved unit, falling back to `default`.
    pub fn open(persistence: Arc<dyn Persistence<Preferences>>, default: TemperatureUnit) -> Self {
        let (initial, warning) = match persistence.load() {
            Ok(Some(preferences)) => (preferences.temperature_unit, None),
            Ok(None) => (default, None),
            Err(e) => {
                tracing::warn!("Failed to load preferences, using {}: {}", default, e);
                (default, Some(e.user_message().to_string()))
            }
        };

        let (unit, _) = watch::channel(initial);
        Self {
            unit,
            persistence: Some(persistence),
            warning: RwLock::new(warning),
        }
    }

    pub fn unit(&self) -> TemperatureUnit {
        *self.unit.borrow()
    }

    /// Advance to the next unit (wrapping) and return it.
    pub fn toggle_unit(&self) -> TemperatureUnit {
        let mut next = self.unit();
        self.unit.send_modify(|unit| {
            *unit = unit.next();
            next = *unit;
        });
        tracing::info!("Temperature unit set to {}", next);
        self.persist(next);
        next
    }

    /// Returns whether the unit changed.
    pub fn set_unit(&self, unit: TemperatureUnit) -> bool {
        let changed = self.unit.send_if_modified(|current| {
            if *current == unit {
                false
            } else {
                *current = unit;
                true
            }
        });
        if changed {
            tracing::info!("Temperature unit set to {}", unit);
            self.persist(unit);
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<TemperatureUnit> {
        self.unit.subscribe()
    }

    pub fn persistence_warning(&self) -> Option<String> {
        self.warning.read().clone()
    }

    fn persist(&self, unit: TemperatureUnit) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let preferences = Preferences {
            temperature_unit: unit,
        };
        match persistence.save(&preferences) {
            Ok(()) => *self.warning.write() = None,
            Err(e) => {
                tracing::warn!("Failed to save preferences: {}", e);
                *self.warning.write() = Some(e.user_message().to_string());
            }
        }
    }
}
