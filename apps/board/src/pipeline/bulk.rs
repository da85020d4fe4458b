use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::{Exporter, Messenger};
use crate::pipeline::engine::PipelineEngine;
use crate::pipeline::entity::{EntityId, PipelineEntity};
use crate::pipeline::lock;
use crate::pipeline::selection::SelectionManager;
use crate::pipeline::stage::{Stage, StageId, StageKind, StageRegistry};
use crate::pipeline::store::EntityStore;
use crate::pipeline::PipelineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    Reject,
    AdvanceStage { target: StageId },
    Export,
    Notify { job_id: String, message: String },
}

impl ActionKind {
    pub fn changes_stage(&self) -> bool {
        matches!(self, ActionKind::Reject | ActionKind::AdvanceStage { .. })
    }
}

/// How stage-changing bulk actions reach the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BulkMode {
    /// One status update per entity; members succeed or fail independently.
    #[default]
    PerEntity,
    /// A single bulk-status call; the batch succeeds or fails as a whole.
    Batched,
}

impl FromStr for BulkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "per_entity" | "per-entity" => Ok(BulkMode::PerEntity),
            "batched" => Ok(BulkMode::Batched),
            other => Err(format!("unknown bulk mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkFailure {
    pub id: EntityId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkReport {
    pub succeeded: Vec<EntityId>,
    pub failed: Vec<BulkFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<String>,
}

impl BulkReport {
    fn fail(&mut self, id: EntityId, reason: impl Into<String>) {
        self.failed.push(BulkFailure {
            id,
            reason: reason.into(),
        });
    }

    pub fn failed_ids(&self) -> Vec<EntityId> {
        self.failed.iter().map(|f| f.id.clone()).collect()
    }
}

/// Applies one action to many entities and reports per-entity outcomes.
///
/// Never all-or-nothing for the whole request: members fail individually, and
/// only succeeded ids leave the selection so the recruiter can retry the rest.
pub struct BulkDispatcher {
    registry: Arc<StageRegistry>,
    store: Arc<Mutex<EntityStore>>,
    engine: Arc<PipelineEngine>,
    selection: Arc<SelectionManager>,
    messenger: Arc<dyn Messenger>,
    exporter: Arc<dyn Exporter>,
    mode: BulkMode,
}

impl BulkDispatcher {
    pub fn new(
        registry: Arc<StageRegistry>,
        store: Arc<Mutex<EntityStore>>,
        engine: Arc<PipelineEngine>,
        selection: Arc<SelectionManager>,
        messenger: Arc<dyn Messenger>,
        exporter: Arc<dyn Exporter>,
        mode: BulkMode,
    ) -> Self {
        Self {
            registry,
            store,
            engine,
            selection,
            messenger,
            exporter,
            mode,
        }
    }

    pub async fn apply(
        &self,
        action: &ActionKind,
        ids: &[EntityId],
    ) -> Result<BulkReport, PipelineError> {
        let ids = dedup(ids);
        if ids.is_empty() {
            return Err(PipelineError::Validation(
                "no entities selected for bulk action".to_string(),
            ));
        }

        let report = match action {
            ActionKind::Reject => {
                let target = self
                    .registry
                    .by_kind(StageKind::Rejected)
                    .ok_or_else(|| {
                        PipelineError::Validation("board has no rejection stage".to_string())
                    })?
                    .clone();
                self.transition_all(&ids, &target).await
            }
            ActionKind::AdvanceStage { target } => {
                let target = self.registry.resolve(target.as_str())?.clone();
                self.transition_all(&ids, &target).await
            }
            ActionKind::Export => self.export(&ids).await,
            ActionKind::Notify { job_id, message } => {
                if message.trim().is_empty() {
                    return Err(PipelineError::Validation(
                        "invitation message is empty".to_string(),
                    ));
                }
                self.notify(&ids, job_id, message).await
            }
        };

        self.selection.deselect(&report.succeeded);
        if !report.failed.is_empty() {
            warn!("Bulk {:?} left {:?} selected for retry", action, report.failed_ids());
        }
        info!(
            "Bulk {:?}: {} succeeded, {} failed",
            action,
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn transition_all(&self, ids: &[EntityId], target: &Stage) -> BulkReport {
        match self.mode {
            BulkMode::PerEntity => self.transition_each(ids, target).await,
            BulkMode::Batched => self.transition_batch(ids, target).await,
        }
    }

    async fn transition_each(&self, ids: &[EntityId], target: &Stage) -> BulkReport {
        let mut report = BulkReport::default();
        for id in ids {
            match self.engine.request_transition(id, target).await {
                Ok(_) => report.succeeded.push(id.clone()),
                Err(err) => {
                    warn!("Bulk move of {} to {} failed: {}", id, target.id, err);
                    report.fail(id.clone(), err.to_string());
                }
            }
        }
        report
    }

    async fn transition_batch(&self, ids: &[EntityId], target: &Stage) -> BulkReport {
        let mut report = BulkReport::default();
        match self.engine.request_batch_transition(ids, target).await {
            Ok(batch) => {
                report.succeeded = batch.committed;
                for id in batch.missing {
                    let reason = PipelineError::NotFound(id.clone()).to_string();
                    report.fail(id, reason);
                }
            }
            Err(err) => {
                warn!("Bulk move to {} failed: {}", target.id, err);
                for id in ids {
                    report.fail(id.clone(), err.to_string());
                }
            }
        }
        report
    }

    async fn export(&self, ids: &[EntityId]) -> BulkReport {
        let mut report = BulkReport::default();
        let (found, missing) = self.snapshot(ids);
        for id in missing {
            let reason = PipelineError::NotFound(id.clone()).to_string();
            report.fail(id, reason);
        }
        if found.is_empty() {
            return report;
        }

        match self.exporter.export(&found).await {
            Ok(document) => {
                report.succeeded.extend(found.into_iter().map(|e| e.id));
                report.export = Some(document);
            }
            Err(err) => {
                warn!("Export of {} entities failed: {}", found.len(), err);
                for entity in found {
                    report.fail(entity.id, err.to_string());
                }
            }
        }
        report
    }

    async fn notify(&self, ids: &[EntityId], job_id: &str, message: &str) -> BulkReport {
        let mut report = BulkReport::default();
        let (found, missing) = self.snapshot(ids);
        for id in missing {
            let reason = PipelineError::NotFound(id.clone()).to_string();
            report.fail(id, reason);
        }

        for entity in found {
            match self
                .messenger
                .send_invitation(entity.invitee(), job_id, message)
                .await
            {
                Ok(()) => report.succeeded.push(entity.id),
                Err(err) => {
                    warn!("Invitation for {} failed: {}", entity.id, err);
                    report.fail(entity.id, err.to_string());
                }
            }
        }
        report
    }

    /// Copies the requested entities out of the store so no lock is held across awaits.
    fn snapshot(&self, ids: &[EntityId]) -> (Vec<PipelineEntity>, Vec<EntityId>) {
        let store = lock(&self.store);
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for id in ids {
            match store.get(id) {
                Some(entity) => found.push(entity.clone()),
                None => missing.push(id.clone()),
            }
        }
        (found, missing)
    }
}

fn dedup(ids: &[EntityId]) -> Vec<EntityId> {
    let mut seen = HashSet::new();
    ids.iter().filter(|id| seen.insert(*id)).cloned().collect()
}
