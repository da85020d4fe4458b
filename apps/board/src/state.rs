use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::board::Board;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub board: Arc<Board>,
    #[allow(dead_code)]
    pub config: Config,
}
