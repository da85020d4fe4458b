//! Backend seam: the consumed REST contract, held as trait objects so the
//! board never depends on the transport.
//!
//! Match scores and component scores are computed by the backend and taken
//! as opaque inputs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::pipeline::entity::{ComponentScores, EntityId, PipelineEntity};
use crate::pipeline::stage::StageId;

pub mod export;
pub mod http;

pub use export::CsvExporter;
pub use http::HttpBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The backend answered 2xx but reported the operation as failed.
    #[error("Rejected by backend: {0}")]
    Rejected(String),

    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
}

/// One row of `GET /applications`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationPayload {
    pub id: EntityId,
    pub status: String,
    #[serde(default)]
    pub match_score: Option<f64>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub candidate_id: Option<EntityId>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

/// One row of `GET /candidates/search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatePayload {
    pub id: EntityId,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub match_score: Option<f64>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub component_scores: Option<ComponentScores>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

/// `GET /applications/stats` returns server-side counts keyed by status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerStats {
    #[serde(default)]
    pub total: u64,
    #[serde(flatten)]
    pub by_status: BTreeMap<String, Value>,
}

/// Every backend call makes exactly one attempt; retries are the caller's decision.
#[async_trait]
pub trait PipelineBackend: Send + Sync {
    async fn list_applications(&self, limit: u32) -> Result<Vec<ApplicationPayload>, BackendError>;

    async fn search_candidates(
        &self,
        job_id: &str,
        min_match_score: f64,
        limit: u32,
    ) -> Result<Vec<CandidatePayload>, BackendError>;

    async fn update_stage(&self, id: &EntityId, stage: &StageId) -> Result<(), BackendError>;

    async fn bulk_update_stage(
        &self,
        ids: &[EntityId],
        stage: &StageId,
    ) -> Result<(), BackendError>;

    async fn fetch_stats(&self) -> Result<ServerStats, BackendError>;
}

/// Candidate messaging (`POST /invitations`).
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_invitation(
        &self,
        candidate_id: &EntityId,
        job_id: &str,
        message: &str,
    ) -> Result<(), BackendError>;
}

/// Renders a set of entities into a downloadable document.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, entities: &[PipelineEntity]) -> Result<String, BackendError>;
}
