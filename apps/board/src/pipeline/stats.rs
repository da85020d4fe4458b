//! Aggregate statistics derived from the Entity Store.
//!
//! Everything here is a pure O(n) projection. `StatsProjector` recomputes it on
//! every store change so dashboard cards never read a stale snapshot.

use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::pipeline::entity::PipelineEntity;
use crate::pipeline::stage::StageId;
use crate::pipeline::store::{EntityStore, StoreChange, StoreObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericField {
    MatchScore,
    Rating,
}

impl NumericField {
    fn read(self, entity: &PipelineEntity) -> Option<f64> {
        match self {
            NumericField::MatchScore => entity.match_score,
            NumericField::Rating => entity.rating,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageCount {
    pub stage: StageId,
    pub label: String,
    pub color_tag: String,
    pub count: usize,
    pub percentage: f64,
    pub average_match_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoardStats {
    pub total: usize,
    pub stages: Vec<StageCount>,
    pub average_match_score: f64,
    pub average_rating: f64,
}

impl BoardStats {
    pub fn stage(&self, stage: &StageId) -> Option<&StageCount> {
        self.stages.iter().find(|s| &s.stage == stage)
    }
}

pub fn count(store: &EntityStore, stage: &StageId) -> usize {
    store.iter().filter(|e| &e.stage == stage).count()
}

/// Share of the board sitting in `stage`, 0–100. An empty board yields 0 for every stage.
pub fn percentage(store: &EntityStore, stage: &StageId) -> f64 {
    share(count(store, stage), store.len())
}

fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 / total as f64 * 100.0
}

/// Mean of `field` over the entities matching `filter` that carry a value.
/// Returns 0 when no entity qualifies.
pub fn average_where<F>(store: &EntityStore, field: NumericField, filter: F) -> f64
where
    F: Fn(&PipelineEntity) -> bool,
{
    let (sum, n) = store
        .iter()
        .filter(|e| filter(e))
        .filter_map(|e| field.read(e))
        .fold((0.0_f64, 0_usize), |(sum, n), v| (sum + v, n + 1));

    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

pub fn average(store: &EntityStore, field: NumericField) -> f64 {
    average_where(store, field, |_| true)
}

pub fn average_in_stage(store: &EntityStore, field: NumericField, stage: &StageId) -> f64 {
    average_where(store, field, |e| &e.stage == stage)
}

/// Rounds a percentage to one decimal for display.
pub fn round_percentage(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Computes the full dashboard projection, one row per registered stage.
pub fn project(store: &EntityStore) -> BoardStats {
    let total = store.len();
    let stages = store
        .registry()
        .stages()
        .iter()
        .map(|stage| {
            let n = count(store, &stage.id);
            StageCount {
                stage: stage.id.clone(),
                label: stage.label.clone(),
                color_tag: stage.color_tag.clone(),
                count: n,
                percentage: share(n, total),
                average_match_score: average_in_stage(store, NumericField::MatchScore, &stage.id),
            }
        })
        .collect();

    BoardStats {
        total,
        stages,
        average_match_score: average(store, NumericField::MatchScore),
        average_rating: average(store, NumericField::Rating),
    }
}

/// Keeps the latest projection, recomputed on every store change.
#[derive(Default)]
pub struct StatsProjector {
    latest: RwLock<BoardStats>,
}

impl StatsProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BoardStats {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StoreObserver for StatsProjector {
    fn on_change(&self, _change: &StoreChange, store: &EntityStore) {
        let stats = project(store);
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = stats;
    }
}
