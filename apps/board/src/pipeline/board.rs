//! Board: one recruiter's pipeline, assembled from its parts.
//!
//! Owns the store and wires the observers (selection sets, stats projector)
//! into it. This is also the input boundary: raw stage ids coming from the
//! dashboard are resolved against the registry here, before the engine or
//! the backend see them.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;
use tracing::{info, warn};

use crate::backend::{Exporter, Messenger, PipelineBackend, ServerStats};
use crate::pipeline::bulk::{ActionKind, BulkDispatcher, BulkMode, BulkReport};
use crate::pipeline::engine::{PipelineEngine, TransitionOutcome};
use crate::pipeline::entity::{self, EntityId, PipelineEntity};
use crate::pipeline::lock;
use crate::pipeline::selection::{SelectionManager, ToggleResult};
use crate::pipeline::stage::{Stage, StageRegistry};
use crate::pipeline::stats::{BoardStats, StatsProjector};
use crate::pipeline::store::EntityStore;
use crate::pipeline::PipelineError;

/// Where the board's entities come from.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardSource {
    Applications {
        limit: u32,
    },
    Candidates {
        job_id: String,
        min_match_score: f64,
        limit: u32,
    },
}

#[derive(Debug, Clone)]
pub struct BoardOptions {
    pub source: BoardSource,
    pub compare_cap: usize,
    pub bulk_mode: BulkMode,
}

/// Read-only view of an entity with its derived selection flags.
#[derive(Debug, Clone, Serialize)]
pub struct EntityView {
    #[serde(flatten)]
    pub entity: PipelineEntity,
    pub selected: bool,
    pub compared: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardSnapshot {
    pub stages: Vec<Stage>,
    pub entities: Vec<EntityView>,
}

pub struct Board {
    registry: Arc<StageRegistry>,
    store: Arc<Mutex<EntityStore>>,
    selection: Arc<SelectionManager>,
    compare: Arc<SelectionManager>,
    stats: Arc<StatsProjector>,
    engine: Arc<PipelineEngine>,
    dispatcher: BulkDispatcher,
    backend: Arc<dyn PipelineBackend>,
    server_stats: RwLock<Option<ServerStats>>,
    options: BoardOptions,
}

impl Board {
    pub fn new(
        registry: Arc<StageRegistry>,
        backend: Arc<dyn PipelineBackend>,
        messenger: Arc<dyn Messenger>,
        exporter: Arc<dyn Exporter>,
        options: BoardOptions,
    ) -> Self {
        let selection = Arc::new(SelectionManager::new());
        let compare = Arc::new(SelectionManager::new());
        let stats = Arc::new(StatsProjector::new());

        let mut store = EntityStore::new(registry.clone());
        store.subscribe(selection.clone());
        store.subscribe(compare.clone());
        store.subscribe(stats.clone());
        // Seed the projection so an unloaded board still lists every stage.
        store.load(Vec::new());
        let store = Arc::new(Mutex::new(store));

        let engine = Arc::new(PipelineEngine::new(store.clone(), backend.clone()));
        let dispatcher = BulkDispatcher::new(
            registry.clone(),
            store.clone(),
            engine.clone(),
            selection.clone(),
            messenger,
            exporter,
            options.bulk_mode,
        );

        Self {
            registry,
            store,
            selection,
            compare,
            stats,
            engine,
            dispatcher,
            backend,
            server_stats: RwLock::new(None),
            options,
        }
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Replaces the board with a fresh fetch.
    ///
    /// On any failure the board is emptied (never partially filled) and the
    /// error is returned for the caller to surface.
    pub async fn refresh(&self) -> Result<usize, PipelineError> {
        let fetched = self.fetch().await;
        let mut store = lock(&self.store);
        match fetched {
            Ok(entities) => {
                store.load(entities);
                info!("Board loaded with {} entities", store.len());
                Ok(store.len())
            }
            Err(err) => {
                store.load(Vec::new());
                warn!("Board load failed, showing an empty board: {err}");
                Err(err)
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<PipelineEntity>, PipelineError> {
        match &self.options.source {
            BoardSource::Applications { limit } => {
                let payload = self
                    .backend
                    .list_applications(*limit)
                    .await
                    .map_err(PipelineError::from_fetch)?;
                entity::from_applications(payload, &self.registry)
            }
            BoardSource::Candidates {
                job_id,
                min_match_score,
                limit,
            } => {
                let payload = self
                    .backend
                    .search_candidates(job_id, *min_match_score, *limit)
                    .await
                    .map_err(PipelineError::from_fetch)?;
                entity::from_candidates(payload, &self.registry)
            }
        }
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        let store = lock(&self.store);
        BoardSnapshot {
            stages: self.registry.stages().to_vec(),
            entities: store.iter().map(|e| self.view(e)).collect(),
        }
    }

    pub fn entity(&self, id: &EntityId) -> Result<EntityView, PipelineError> {
        let store = lock(&self.store);
        store
            .get(id)
            .map(|e| self.view(e))
            .ok_or_else(|| PipelineError::NotFound(id.clone()))
    }

    fn view(&self, entity: &PipelineEntity) -> EntityView {
        EntityView {
            selected: self.selection.is_selected(&entity.id),
            compared: self.compare.is_selected(&entity.id),
            entity: entity.clone(),
        }
    }

    /// Handles a drag-and-drop gesture: `id` dropped on the column `raw_stage`.
    pub async fn move_entity(
        &self,
        id: &EntityId,
        raw_stage: &str,
    ) -> Result<TransitionOutcome, PipelineError> {
        let target = self.registry.resolve(raw_stage)?.clone();
        let outcome = self.engine.request_transition(id, &target).await?;
        if matches!(outcome, TransitionOutcome::Committed(_)) {
            self.refresh_server_stats().await;
        }
        Ok(outcome)
    }

    /// Removes an entity from the local view (delete / unsave).
    pub fn remove(&self, id: &EntityId) -> Result<PipelineEntity, PipelineError> {
        lock(&self.store)
            .remove(id)
            .ok_or_else(|| PipelineError::NotFound(id.clone()))
    }

    pub fn toggle_selection(&self, id: &EntityId) -> Result<ToggleResult, PipelineError> {
        self.with_existing(id, || self.selection.toggle(id))
    }

    /// Compare picks are capped; a refused pick leaves the set unchanged.
    pub fn toggle_compare(&self, id: &EntityId) -> Result<ToggleResult, PipelineError> {
        let result =
            self.with_existing(id, || self.compare.toggle_with_cap(id, self.options.compare_cap))?;
        match result {
            ToggleResult::LimitReached => Err(PipelineError::LimitReached {
                max: self.options.compare_cap,
            }),
            result => Ok(result),
        }
    }

    pub fn clear_selection(&self) {
        self.selection.clear();
    }

    pub fn clear_compare(&self) {
        self.compare.clear();
    }

    pub fn selection(&self) -> Vec<EntityId> {
        self.selection.selected()
    }

    pub fn compared(&self) -> Vec<EntityId> {
        self.compare.selected()
    }

    /// Runs `f` while holding the store lock, so a concurrent `remove` cannot
    /// slip in between the existence check and the toggle. Lock order is
    /// store then selection, same as the observer path.
    fn with_existing<R>(&self, id: &EntityId, f: impl FnOnce() -> R) -> Result<R, PipelineError> {
        let store = lock(&self.store);
        if !store.contains(id) {
            return Err(PipelineError::NotFound(id.clone()));
        }
        Ok(f())
    }

    /// Runs a bulk action over `ids`, or over the current selection when `None`.
    pub async fn bulk(
        &self,
        action: &ActionKind,
        ids: Option<Vec<EntityId>>,
    ) -> Result<BulkReport, PipelineError> {
        let ids = ids.unwrap_or_else(|| self.selection.selected());
        let report = self.dispatcher.apply(action, &ids).await?;
        if action.changes_stage() && !report.succeeded.is_empty() {
            self.refresh_server_stats().await;
        }
        Ok(report)
    }

    pub fn stats(&self) -> BoardStats {
        self.stats.snapshot()
    }

    pub fn server_stats(&self) -> Option<ServerStats> {
        self.server_stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-reads the backend's own counts after a committed change.
    /// Failures only cost freshness, so they are logged and swallowed.
    pub async fn refresh_server_stats(&self) {
        match self.backend.fetch_stats().await {
            Ok(stats) => {
                *self
                    .server_stats
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(stats);
            }
            Err(err) => warn!("Server stats refresh failed: {err}"),
        }
    }
}
