//! Pipeline Engine: optimistic stage transitions with rollback.
//!
//! Protocol per request: capture the current stage, apply the move to the
//! store, make exactly one backend call, then either discard the pending
//! mutation or revert it. Requests on the same entity are not queued; each
//! one tracks its own baseline so that reverts compose:
//!
//! - a failure reverts the store to the stage captured just before that
//!   request, whatever else is still in flight;
//! - a success supersedes every earlier in-flight request for that entity, so
//!   their eventual failures leave the store alone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::PipelineBackend;
use crate::pipeline::entity::EntityId;
use crate::pipeline::lock;
use crate::pipeline::stage::{Stage, StageId};
use crate::pipeline::store::EntityStore;
use crate::pipeline::PipelineError;

/// An optimistic move awaiting backend confirmation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingMutation {
    pub id: Uuid,
    pub entity_id: EntityId,
    pub previous_stage: StageId,
    pub next_stage: StageId,
    pub started_at: DateTime<Utc>,
    #[serde(skip)]
    superseded: bool,
}

impl PendingMutation {
    fn new(entity_id: EntityId, previous_stage: StageId, next_stage: StageId) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_id,
            previous_stage,
            next_stage,
            started_at: Utc::now(),
            superseded: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// Target equals the current stage; nothing was sent.
    Unchanged,
    Committed(PendingMutation),
}

/// Result of a batched move: ids confirmed by the single bulk call, and ids
/// that were not on the board.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchTransition {
    pub committed: Vec<EntityId>,
    pub missing: Vec<EntityId>,
}

pub struct PipelineEngine {
    store: Arc<Mutex<EntityStore>>,
    backend: Arc<dyn PipelineBackend>,
    in_flight: Mutex<HashMap<EntityId, Vec<PendingMutation>>>,
}

impl PipelineEngine {
    pub fn new(store: Arc<Mutex<EntityStore>>, backend: Arc<dyn PipelineBackend>) -> Self {
        Self {
            store,
            backend,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Moves one entity to `target`. The target must come from the registry,
    /// which is where unknown stage ids are rejected.
    ///
    /// On backend failure the store has already been reverted when the error
    /// is returned.
    pub async fn request_transition(
        &self,
        id: &EntityId,
        target: &Stage,
    ) -> Result<TransitionOutcome, PipelineError> {
        let Some(pending) = self.apply_optimistic(id, &target.id)? else {
            return Ok(TransitionOutcome::Unchanged);
        };

        match self.backend.update_stage(id, &target.id).await {
            Ok(()) => {
                self.settle_success(&pending);
                debug!(
                    "Committed {} {} -> {}",
                    id, pending.previous_stage, pending.next_stage
                );
                Ok(TransitionOutcome::Committed(pending))
            }
            Err(err) => {
                self.settle_failure(&pending);
                warn!(
                    "Rolled back {} {} -> {}: {}",
                    id, pending.next_stage, pending.previous_stage, err
                );
                Err(PipelineError::Backend(err))
            }
        }
    }

    /// Moves several entities with one bulk backend call.
    /// All-or-nothing: on failure every optimistic move of the batch is reverted.
    pub async fn request_batch_transition(
        &self,
        ids: &[EntityId],
        target: &Stage,
    ) -> Result<BatchTransition, PipelineError> {
        let mut result = BatchTransition::default();
        let mut pending = Vec::new();
        let mut moved = Vec::new();

        for id in ids {
            match self.apply_optimistic(id, &target.id) {
                Ok(Some(p)) => {
                    moved.push(id.clone());
                    pending.push(p);
                }
                Ok(None) => result.committed.push(id.clone()),
                Err(_) => result.missing.push(id.clone()),
            }
        }

        if moved.is_empty() {
            return Ok(result);
        }

        match self.backend.bulk_update_stage(&moved, &target.id).await {
            Ok(()) => {
                for p in &pending {
                    self.settle_success(p);
                }
                debug!("Committed batch of {} -> {}", moved.len(), target.id);
                let missing = &result.missing;
                result.committed = ids
                    .iter()
                    .filter(|id| !missing.contains(id))
                    .cloned()
                    .collect();
                Ok(result)
            }
            Err(err) => {
                for p in pending.iter().rev() {
                    self.settle_failure(p);
                }
                warn!(
                    "Rolled back batch of {} -> {}: {}",
                    moved.len(),
                    target.id,
                    err
                );
                Err(PipelineError::Backend(err))
            }
        }
    }

    /// Number of requests still waiting on the backend for `id`.
    pub fn in_flight(&self, id: &EntityId) -> usize {
        lock(&self.in_flight).get(id).map_or(0, Vec::len)
    }

    /// Captures the baseline and applies the move. `None` when already at `target`.
    fn apply_optimistic(
        &self,
        id: &EntityId,
        target: &StageId,
    ) -> Result<Option<PendingMutation>, PipelineError> {
        let mut store = lock(&self.store);
        let current = store
            .get(id)
            .ok_or_else(|| PipelineError::NotFound(id.clone()))?
            .stage
            .clone();

        if &current == target {
            return Ok(None);
        }

        let pending = PendingMutation::new(id.clone(), current, target.clone());
        store.update_stage(id, target);
        lock(&self.in_flight)
            .entry(id.clone())
            .or_default()
            .push(pending.clone());
        Ok(Some(pending))
    }

    fn settle_success(&self, pending: &PendingMutation) {
        let mut in_flight = lock(&self.in_flight);
        let Some(queue) = in_flight.get_mut(&pending.entity_id) else {
            return;
        };
        if let Some(pos) = queue.iter().position(|m| m.id == pending.id) {
            queue.remove(pos);
            for earlier in &mut queue[..pos] {
                earlier.superseded = true;
            }
        }
        if queue.is_empty() {
            in_flight.remove(&pending.entity_id);
        }
    }

    fn settle_failure(&self, pending: &PendingMutation) {
        let mut store = lock(&self.store);
        let mut in_flight = lock(&self.in_flight);
        let Some(queue) = in_flight.get_mut(&pending.entity_id) else {
            return;
        };
        let Some(pos) = queue.iter().position(|m| m.id == pending.id) else {
            return;
        };

        let failed = queue.remove(pos);
        // Superseded: a later success already confirmed a newer stage.
        if !failed.superseded {
            store.update_stage(&failed.entity_id, &failed.previous_stage);
        }
        if queue.is_empty() {
            in_flight.remove(&pending.entity_id);
        }
    }
}
