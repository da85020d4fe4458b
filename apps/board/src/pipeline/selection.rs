#![allow(dead_code)]

use std::sync::Mutex;

use serde::Serialize;

use crate::pipeline::entity::EntityId;
use crate::pipeline::lock;
use crate::pipeline::store::{EntityStore, StoreChange, StoreObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleResult {
    Added,
    Removed,
    LimitReached,
}

/// Multi-select set over store ids, in pick order.
///
/// Subscribed to the store so removed (or no longer loaded) entities are pruned.
#[derive(Default)]
pub struct SelectionManager {
    ids: Mutex<Vec<EntityId>>,
}

impl SelectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&self, id: &EntityId) -> ToggleResult {
        let mut ids = lock(&self.ids);
        if let Some(pos) = ids.iter().position(|existing| existing == id) {
            ids.remove(pos);
            ToggleResult::Removed
        } else {
            ids.push(id.clone());
            ToggleResult::Added
        }
    }

    /// Like `toggle`, but refuses a new id once `max` ids are selected.
    /// Deselecting is always allowed.
    pub fn toggle_with_cap(&self, id: &EntityId, max: usize) -> ToggleResult {
        let mut ids = lock(&self.ids);
        if let Some(pos) = ids.iter().position(|existing| existing == id) {
            ids.remove(pos);
            return ToggleResult::Removed;
        }
        if ids.len() >= max {
            return ToggleResult::LimitReached;
        }
        ids.push(id.clone());
        ToggleResult::Added
    }

    pub fn clear(&self) {
        lock(&self.ids).clear();
    }

    pub fn is_selected(&self, id: &EntityId) -> bool {
        lock(&self.ids).contains(id)
    }

    pub fn selected(&self) -> Vec<EntityId> {
        lock(&self.ids).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.ids).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.ids).is_empty()
    }

    pub fn deselect(&self, remove: &[EntityId]) {
        lock(&self.ids).retain(|id| !remove.contains(id));
    }
}

impl StoreObserver for SelectionManager {
    fn on_change(&self, change: &StoreChange, store: &EntityStore) {
        match change {
            StoreChange::Removed(id) => lock(&self.ids).retain(|existing| existing != id),
            StoreChange::Loaded => lock(&self.ids).retain(|existing| store.contains(existing)),
            StoreChange::StageChanged { .. } => {}
        }
    }
}
