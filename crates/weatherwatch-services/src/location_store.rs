//! The watch list: a persisted, deduplicated, insertion-ordered set of
//! locations.
//!
//! Reads come from the in-memory mirror. Every effective mutation is written
//! through to the persistence layer; a failed save is recorded as a warning
//! and the in-memory list stays authoritative.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use weatherwatch_core::StorageError;
use weatherwatch_weather::Location;

use crate::persistence::Persistence;

pub struct LocationStore {
    locations: RwLock<Vec<Location>>,
    persistence: Arc<dyn Persistence<Vec<Location>>>,
    warning: RwLock<Option<String>>,
    snapshot: watch::Sender<Vec<Location>>,
}

impl LocationStore {
    /// Load the persisted list. A failed load starts empty with a warning.
    pub fn open(persistence: Arc<dyn Persistence<Vec<Location>>>) -> Self {
        let (initial, warning) = match persistence.load() {
            Ok(Some(stored)) => (dedup_by_id(stored), None),
            Ok(None) => (Vec::new(), None),
            Err(e) => {
                tracing::warn!("Failed to load watched locations: {}", e);
                (Vec::new(), Some(e.user_message().to_string()))
            }
        };

        tracing::info!("Loaded {} watched locations", initial.len());
        let (snapshot, _) = watch::channel(initial.clone());
        Self {
            locations: RwLock::new(initial),
            persistence,
            warning: RwLock::new(warning),
            snapshot,
        }
    }

    /// Insert `location` unless one with the same id is already watched.
    /// Returns whether the list changed.
    pub fn add_location(&self, location: Location) -> bool {
        let mut locations = self.locations.write();
        if locations.iter().any(|l| l.id == location.id) {
            tracing::debug!("Location {} already watched", location.id);
            return false;
        }

        tracing::info!("Watching {} ({})", location.display_place, location.id);
        locations.push(location);
        self.commit(&locations);
        true
    }

    /// Returns whether anything was removed.
    pub fn remove_location(&self, id: &str) -> bool {
        let mut locations = self.locations.write();
        let before = locations.len();
        locations.retain(|l| l.id != id);
        if locations.len() == before {
            tracing::debug!("Location {} not watched, nothing to remove", id);
            return false;
        }

        tracing::info!("Stopped watching {}", id);
        self.commit(&locations);
        true
    }

    pub fn locations(&self) -> Vec<Location> {
        self.locations.read().clone()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.locations.read().iter().any(|l| l.id == id)
    }

    pub fn len(&self) -> usize {
        self.locations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.read().is_empty()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Location>> {
        self.snapshot.subscribe()
    }

    /// Set after a failed load or save, cleared by the next successful save.
    pub fn persistence_warning(&self) -> Option<String> {
        self.warning.read().clone()
    }

    // Called with the write lock held so saves land in mutation order.
    fn commit(&self, locations: &[Location]) {
        let list = locations.to_vec();
        match self.persistence.save(&list) {
            Ok(()) => *self.warning.write() = None,
            Err(e) => self.record_failure(&e),
        }
        self.snapshot.send_replace(list);
    }

    fn record_failure(&self, error: &StorageError) {
        tracing::warn!("Failed to save watched locations: {}", error);
        *self.warning.write() = Some(error.user_message().to_string());
    }
}

fn dedup_by_id(stored: Vec<Location>) -> Vec<Location> {
    let mut seen = HashSet::new();
    let before = stored.len();
    let unique: Vec<Location> = stored
        .into_iter()
        .filter(|l| seen.insert(l.id.clone()))
        .collect();
    if unique.len() != before {
        tracing::warn!(
            "Dropped {} duplicate watched locations from storage",
            before - unique.len()
        );
    }
    unique
}
