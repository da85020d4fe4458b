use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pipeline::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(String);

impl StageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Open,
    Hired,
    Rejected,
}

/// A column of the board. Defined once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub label: String,
    pub order: u32,
    pub color_tag: String,
    pub kind: StageKind,
}

impl Stage {
    fn new(id: &str, label: &str, order: u32, color_tag: &str, kind: StageKind) -> Self {
        Self {
            id: StageId::new(id),
            label: label.to_string(),
            order,
            color_tag: color_tag.to_string(),
            kind,
        }
    }
}

/// Ordered, fixed list of the stages an entity may occupy.
///
/// Transitions between registered stages are unrestricted; the registry only
/// answers "does this stage exist".
#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: Vec<Stage>,
}

impl StageRegistry {
    pub fn new(mut stages: Vec<Stage>) -> Result<Self, PipelineError> {
        if stages.is_empty() {
            return Err(PipelineError::Validation(
                "a stage registry needs at least one stage".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.id.as_str().to_lowercase()) {
                return Err(PipelineError::Validation(format!(
                    "duplicate stage id '{}'",
                    stage.id
                )));
            }
        }

        stages.sort_by_key(|s| s.order);
        Ok(Self { stages })
    }

    /// Stages of the Applications Kanban.
    pub fn applications() -> Result<Self, PipelineError> {
        Self::new(vec![
            Stage::new("new", "New", 0, "blue", StageKind::Open),
            Stage::new("screening", "Screening", 1, "amber", StageKind::Open),
            Stage::new("interview", "Interview", 2, "purple", StageKind::Open),
            Stage::new("offer", "Offer", 3, "teal", StageKind::Open),
            Stage::new("hired", "Hired", 4, "green", StageKind::Hired),
            Stage::new("rejected", "Rejected", 5, "red", StageKind::Rejected),
        ])
    }

    /// Stages of the Candidates Kanban and talent pools.
    pub fn candidates() -> Result<Self, PipelineError> {
        Self::new(vec![
            Stage::new("sourced", "Sourced", 0, "slate", StageKind::Open),
            Stage::new("contacted", "Contacted", 1, "blue", StageKind::Open),
            Stage::new("screening", "Screening", 2, "amber", StageKind::Open),
            Stage::new("interview", "Interview", 3, "purple", StageKind::Open),
            Stage::new("offer", "Offer", 4, "teal", StageKind::Open),
            Stage::new("hired", "Hired", 5, "green", StageKind::Hired),
            Stage::new("rejected", "Rejected", 6, "red", StageKind::Rejected),
        ])
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn get(&self, id: &StageId) -> Option<&Stage> {
        self.stages.iter().find(|s| &s.id == id)
    }

    pub fn contains(&self, id: &StageId) -> bool {
        self.get(id).is_some()
    }

    pub fn first(&self) -> &Stage {
        // Construction guarantees at least one stage.
        &self.stages[0]
    }

    pub fn by_kind(&self, kind: StageKind) -> Option<&Stage> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    /// Resolves a raw stage id coming from a request or a payload.
    /// Matching ignores case and surrounding whitespace.
    pub fn resolve(&self, raw: &str) -> Result<&Stage, PipelineError> {
        let wanted = raw.trim();
        self.stages
            .iter()
            .find(|s| s.id.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| PipelineError::Validation(format!("unknown stage '{wanted}'")))
    }
}
