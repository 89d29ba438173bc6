use std::sync::Arc;

use dashmap::{DashMap, DashSet};

use deepguard_core::ids::ElementId;

use crate::controller::{ScanController, ScanStatus};

/// Owns every live controller, keyed by the synthetic element id assigned
/// at discovery time. The registry is the sole owner of controller
/// lifetime; lookups hand out shared references only.
///
/// The processed set is separate from the controller map: an element stays
/// marked after its controller is discarded (or when it was consumed
/// without ever getting one), so overlapping observation passes register
/// each element at most once.
pub struct ControllerRegistry {
    controllers: DashMap<ElementId, Arc<ScanController>>,
    processed: DashSet<ElementId>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self {
            controllers: DashMap::new(),
            processed: DashSet::new(),
        }
    }

    pub fn insert(&self, controller: Arc<ScanController>) {
        self.controllers
            .insert(controller.id().clone(), controller);
    }

    pub fn get(&self, id: &ElementId) -> Option<Arc<ScanController>> {
        self.controllers.get(id).map(|entry| Arc::clone(&entry))
    }

    pub fn remove(&self, id: &ElementId) -> Option<Arc<ScanController>> {
        self.controllers.remove(id).map(|(_, controller)| controller)
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        self.controllers.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.controllers.len()
    }

    /// Flip the processed flag. Returns false when the element was already
    /// marked by an earlier pass.
    pub fn mark_processed(&self, id: &ElementId) -> bool {
        self.processed.insert(id.clone())
    }

    pub fn is_processed(&self, id: &ElementId) -> bool {
        self.processed.contains(id)
    }

    /// Registered and not stopped. Completion handlers consult this before
    /// touching render or stats state, so a request that resolves after
    /// teardown is discarded.
    pub fn is_active(&self, id: &ElementId) -> bool {
        self.get(id)
            .map(|controller| controller.status() != ScanStatus::Stopped)
            .unwrap_or(false)
    }

    pub fn ids(&self) -> Vec<ElementId> {
        let mut ids: Vec<ElementId> = self
            .controllers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }
}

impl Default for ControllerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
