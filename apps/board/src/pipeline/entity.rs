#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::backend::{ApplicationPayload, CandidatePayload};
use crate::pipeline::stage::{StageId, StageRegistry};
use crate::pipeline::PipelineError;

/// Identity of an application or candidate. The backend sends either strings or integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => EntityId(s),
            RawId::Number(n) => EntityId(n.to_string()),
        })
    }
}

/// Externally computed sub-scores behind a match score. Opaque to the board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    #[serde(default)]
    pub qualification: f64,
    #[serde(default)]
    pub experience: f64,
    #[serde(default)]
    pub skills: f64,
    #[serde(default)]
    pub location: f64,
}

/// An application or candidate tracked through the pipeline.
/// `stage` is the only field the pipeline mutates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineEntity {
    pub id: EntityId,
    pub stage: StageId,
    pub display_fields: BTreeMap<String, Value>,
    pub match_score: Option<f64>,
    pub rating: Option<f64>,
    pub candidate_id: Option<EntityId>,
    pub component_scores: Option<ComponentScores>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineEntity {
    pub fn new(id: impl Into<EntityId>, stage: impl Into<StageId>) -> Self {
        Self {
            id: id.into(),
            stage: stage.into(),
            display_fields: BTreeMap::new(),
            match_score: None,
            rating: None,
            candidate_id: None,
            component_scores: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_match_score(mut self, score: f64) -> Self {
        self.match_score = Some(score);
        self
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.display_fields.insert(key.to_string(), value.into());
        self
    }

    /// The candidate an invitation for this entity is addressed to.
    /// Candidate boards use the entity id itself.
    pub fn invitee(&self) -> &EntityId {
        self.candidate_id.as_ref().unwrap_or(&self.id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Maps an application list onto board entities.
///
/// All-or-nothing: a single unknown status or duplicate id rejects the whole payload.
pub fn from_applications(
    payload: Vec<ApplicationPayload>,
    registry: &StageRegistry,
) -> Result<Vec<PipelineEntity>, PipelineError> {
    let now = Utc::now();
    let mut seen = HashSet::new();
    let mut entities = Vec::with_capacity(payload.len());

    for app in payload {
        let stage = registry
            .resolve(&app.status)
            .map_err(|_| {
                PipelineError::MalformedPayload(format!(
                    "application {} has unknown status '{}'",
                    app.id, app.status
                ))
            })?
            .id
            .clone();

        if !seen.insert(app.id.clone()) {
            return Err(PipelineError::MalformedPayload(format!(
                "application {} appears twice",
                app.id
            )));
        }

        entities.push(PipelineEntity {
            id: app.id,
            stage,
            display_fields: app.fields,
            match_score: app.match_score,
            rating: app.rating,
            candidate_id: app.candidate_id,
            component_scores: None,
            updated_at: now,
        });
    }

    Ok(entities)
}

/// Maps a candidate search result onto board entities.
/// Candidates without a stage start in the first column.
pub fn from_candidates(
    payload: Vec<CandidatePayload>,
    registry: &StageRegistry,
) -> Result<Vec<PipelineEntity>, PipelineError> {
    let now = Utc::now();
    let mut seen = HashSet::new();
    let mut entities = Vec::with_capacity(payload.len());

    for candidate in payload {
        let stage = match candidate.stage.as_deref() {
            Some(raw) => registry
                .resolve(raw)
                .map_err(|_| {
                    PipelineError::MalformedPayload(format!(
                        "candidate {} has unknown stage '{raw}'",
                        candidate.id
                    ))
                })?
                .id
                .clone(),
            None => registry.first().id.clone(),
        };

        if !seen.insert(candidate.id.clone()) {
            return Err(PipelineError::MalformedPayload(format!(
                "candidate {} appears twice",
                candidate.id
            )));
        }

        entities.push(PipelineEntity {
            candidate_id: Some(candidate.id.clone()),
            id: candidate.id,
            stage,
            display_fields: candidate.fields,
            match_score: candidate.match_score,
            rating: candidate.rating,
            component_scores: candidate.component_scores,
            updated_at: now,
        });
    }

    Ok(entities)
}
