use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::pipeline::entity::{EntityId, PipelineEntity};
use crate::pipeline::stage::{StageId, StageRegistry};

#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    Loaded,
    StageChanged {
        id: EntityId,
        from: StageId,
        to: StageId,
    },
    Removed(EntityId),
}

/// Notified synchronously after every store mutation.
pub trait StoreObserver: Send + Sync {
    fn on_change(&self, change: &StoreChange, store: &EntityStore);
}

/// Normalized in-memory collection of board entities, keyed by id.
///
/// Iteration follows fetch order so columns render stably.
pub struct EntityStore {
    registry: Arc<StageRegistry>,
    order: Vec<EntityId>,
    entities: HashMap<EntityId, PipelineEntity>,
    observers: Vec<Arc<dyn StoreObserver>>,
}

impl EntityStore {
    pub fn new(registry: Arc<StageRegistry>) -> Self {
        Self {
            registry,
            order: Vec::new(),
            entities: HashMap::new(),
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: Arc<dyn StoreObserver>) {
        self.observers.push(observer);
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Replaces the whole collection.
    /// Entities on an unregistered stage are dropped; a repeated id keeps its last copy.
    pub fn load(&mut self, entities: Vec<PipelineEntity>) {
        self.order.clear();
        self.entities.clear();

        for entity in entities {
            if !self.registry.contains(&entity.stage) {
                warn!(
                    "Dropping entity {} on unregistered stage '{}'",
                    entity.id, entity.stage
                );
                continue;
            }
            let id = entity.id.clone();
            if self.entities.insert(id.clone(), entity).is_none() {
                self.order.push(id);
            }
        }

        self.notify(StoreChange::Loaded);
    }

    pub fn get(&self, id: &EntityId) -> Option<&PipelineEntity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PipelineEntity> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    /// Moves an entity to another stage in memory only.
    /// No-op (returns false) for unknown ids, unregistered stages and same-stage moves.
    pub fn update_stage(&mut self, id: &EntityId, stage: &StageId) -> bool {
        if !self.registry.contains(stage) {
            return false;
        }
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        if &entity.stage == stage {
            return false;
        }

        let from = std::mem::replace(&mut entity.stage, stage.clone());
        entity.updated_at = Utc::now();

        self.notify(StoreChange::StageChanged {
            id: id.clone(),
            from,
            to: stage.clone(),
        });
        true
    }

    pub fn remove(&mut self, id: &EntityId) -> Option<PipelineEntity> {
        let removed = self.entities.remove(id)?;
        self.order.retain(|existing| existing != id);
        self.notify(StoreChange::Removed(id.clone()));
        Some(removed)
    }

    fn notify(&self, change: StoreChange) {
        for observer in &self.observers {
            observer.on_change(&change, self);
        }
    }
}
