//! Scriptable in-memory backend for pipeline tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::backend::{
    ApplicationPayload, BackendError, CandidatePayload, Messenger, PipelineBackend, ServerStats,
};
use crate::pipeline::entity::EntityId;
use crate::pipeline::stage::StageId;

#[derive(Default)]
pub struct MockBackend {
    pub applications: Mutex<Vec<ApplicationPayload>>,
    pub candidates: Mutex<Vec<CandidatePayload>>,
    pub fail_ids: Mutex<HashSet<EntityId>>,
    pub fail_list: AtomicBool,
    pub fail_bulk: AtomicBool,
    pub fail_stats: AtomicBool,
    pub update_calls: Mutex<Vec<(EntityId, StageId)>>,
    pub bulk_calls: Mutex<Vec<(Vec<EntityId>, StageId)>>,
    pub invitations: Mutex<Vec<(EntityId, String)>>,
    pub stats_calls: AtomicUsize,
    /// Pending outcomes for upcoming `update_stage` calls (`true` = success),
    /// consumed in call order. Calls with no gate resolve immediately.
    gates: Mutex<VecDeque<oneshot::Receiver<bool>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_applications(rows: &[(&str, &str)]) -> Self {
        let backend = Self::new();
        *backend.applications.lock().unwrap() = rows
            .iter()
            .map(|(id, status)| ApplicationPayload {
                id: EntityId::from(*id),
                status: status.to_string(),
                match_score: None,
                rating: None,
                candidate_id: None,
                fields: Default::default(),
            })
            .collect();
        backend
    }

    pub fn fail_for(&self, id: &str) {
        self.fail_ids.lock().unwrap().insert(EntityId::from(id));
    }

    /// Holds the next `update_stage` call until the returned sender decides its outcome.
    pub fn gate_next_update(&self) -> oneshot::Sender<bool> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(rx);
        tx
    }

    pub fn update_count(&self) -> usize {
        self.update_calls.lock().unwrap().len()
    }

    fn refused(id: &EntityId) -> BackendError {
        BackendError::Api {
            status: 503,
            message: format!("update of {id} refused"),
        }
    }
}

#[async_trait]
impl PipelineBackend for MockBackend {
    async fn list_applications(&self, _limit: u32) -> Result<Vec<ApplicationPayload>, BackendError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 500,
                message: "listing failed".to_string(),
            });
        }
        Ok(self.applications.lock().unwrap().clone())
    }

    async fn search_candidates(
        &self,
        _job_id: &str,
        min_match_score: f64,
        limit: u32,
    ) -> Result<Vec<CandidatePayload>, BackendError> {
        Ok(self
            .candidates
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.match_score.unwrap_or(0.0) >= min_match_score)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn update_stage(&self, id: &EntityId, stage: &StageId) -> Result<(), BackendError> {
        self.update_calls
            .lock()
            .unwrap()
            .push((id.clone(), stage.clone()));

        let gate = self.gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            return match gate.await {
                Ok(true) => Ok(()),
                _ => Err(Self::refused(id)),
            };
        }

        if self.fail_ids.lock().unwrap().contains(id) {
            return Err(Self::refused(id));
        }
        Ok(())
    }

    async fn bulk_update_stage(
        &self,
        ids: &[EntityId],
        stage: &StageId,
    ) -> Result<(), BackendError> {
        self.bulk_calls
            .lock()
            .unwrap()
            .push((ids.to_vec(), stage.clone()));
        if self.fail_bulk.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected("bulk update refused".to_string()));
        }
        Ok(())
    }

    async fn fetch_stats(&self) -> Result<ServerStats, BackendError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stats.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected("stats unavailable".to_string()));
        }
        Ok(ServerStats {
            total: self.applications.lock().unwrap().len() as u64,
            by_status: Default::default(),
        })
    }
}

#[async_trait]
impl Messenger for MockBackend {
    async fn send_invitation(
        &self,
        candidate_id: &EntityId,
        _job_id: &str,
        message: &str,
    ) -> Result<(), BackendError> {
        if self.fail_ids.lock().unwrap().contains(candidate_id) {
            return Err(BackendError::Rejected(format!(
                "cannot message {candidate_id}"
            )));
        }
        self.invitations
            .lock()
            .unwrap()
            .push((candidate_id.clone(), message.to_string()));
        Ok(())
    }
}
