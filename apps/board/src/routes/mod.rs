pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::pipeline::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/board", get(handlers::handle_get_board))
        .route("/api/v1/board/refresh", post(handlers::handle_refresh))
        .route("/api/v1/board/stats", get(handlers::handle_stats))
        .route("/api/v1/board/bulk", post(handlers::handle_bulk))
        .route(
            "/api/v1/board/entities/:id/transition",
            post(handlers::handle_transition),
        )
        .route(
            "/api/v1/board/entities/:id",
            delete(handlers::handle_remove),
        )
        .route(
            "/api/v1/board/selection",
            delete(handlers::handle_clear_selection),
        )
        .route(
            "/api/v1/board/selection/:id",
            post(handlers::handle_toggle_selection),
        )
        .route(
            "/api/v1/board/compare",
            delete(handlers::handle_clear_compare),
        )
        .route(
            "/api/v1/board/compare/:id",
            post(handlers::handle_toggle_compare),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CsvExporter;
    use crate::config::{BoardKind, Config};
    use crate::pipeline::board::{Board, BoardOptions, BoardSource};
    use crate::pipeline::bulk::BulkMode;
    use crate::pipeline::stage::StageRegistry;
    use crate::pipeline::testing::MockBackend;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config {
            backend_url: "http://backend.invalid".to_string(),
            backend_token: None,
            board_kind: BoardKind::Applications,
            job_id: None,
            min_match_score: 0.0,
            load_limit: 50,
            compare_cap: 3,
            bulk_mode: BulkMode::PerEntity,
            request_timeout_secs: 5,
            port: 0,
            rust_log: "info".to_string(),
        }
    }

    async fn test_app(backend: Arc<MockBackend>) -> Router {
        let board = Arc::new(Board::new(
            Arc::new(StageRegistry::applications().unwrap()),
            backend.clone(),
            backend,
            Arc::new(CsvExporter),
            BoardOptions {
                source: BoardSource::Applications { limit: 50 },
                compare_cap: 3,
                bulk_mode: BulkMode::PerEntity,
            },
        ));
        board.refresh().await.unwrap();
        build_router(AppState {
            board,
            config: test_config(),
        })
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(v) => Body::from(v.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn backend() -> Arc<MockBackend> {
        Arc::new(MockBackend::with_applications(&[
            ("1", "new"),
            ("2", "new"),
            ("3", "interview"),
        ]))
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(backend()).await;
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_transition_then_stats() {
        let app = test_app(backend()).await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/board/entities/2/transition",
            Some(json!({ "stage": "screening" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "committed");
        assert_eq!(body["previous_stage"], "new");
        assert_eq!(body["entity"]["stage"], "screening");
        assert_eq!(body["entity"]["selected"], false);

        let (_, stats) = call(&app, Method::GET, "/api/v1/board/stats", None).await;
        assert_eq!(stats["local"]["total"], 3);
        assert_eq!(stats["server"]["total"], 3);
    }

    #[tokio::test]
    async fn test_transition_error_statuses() {
        let backend = backend();
        backend.fail_for("3");
        let app = test_app(backend).await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/board/entities/1/transition",
            Some(json!({ "stage": "archived" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/board/entities/42/transition",
            Some(json!({ "stage": "offer" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/board/entities/3/transition",
            Some(json!({ "stage": "offer" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "BACKEND_ERROR");

        let (_, board) = call(&app, Method::GET, "/api/v1/board", None).await;
        assert_eq!(board["entities"][2]["stage"], "interview");
    }

    #[tokio::test]
    async fn test_compare_set_is_pruned_on_remove() {
        let app = test_app(backend()).await;
        for id in ["1", "2", "3"] {
            let (status, _) =
                call(&app, Method::POST, &format!("/api/v1/board/compare/{id}"), None).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, _) = call(&app, Method::DELETE, "/api/v1/board/entities/3", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = call(&app, Method::POST, "/api/v1/board/compare/2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], "removed");
        assert_eq!(body["selected"], json!(["1"]));
    }

    #[tokio::test]
    async fn test_bulk_reject_over_selection() {
        let backend = backend();
        backend.fail_for("2");
        let app = test_app(backend).await;
        for id in ["1", "2", "3"] {
            call(&app, Method::POST, &format!("/api/v1/board/selection/{id}"), None).await;
        }

        let (status, report) = call(
            &app,
            Method::POST,
            "/api/v1/board/bulk",
            Some(json!({ "action": { "kind": "reject" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["succeeded"], json!(["1", "3"]));
        assert_eq!(report["failed"][0]["id"], "2");

        let (_, board) = call(&app, Method::GET, "/api/v1/board", None).await;
        let selected: Vec<&Value> = board["entities"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|e| e["selected"] == true)
            .collect();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0]["id"], "2");
    }

    #[tokio::test]
    async fn test_bulk_with_no_selection_is_bad_request() {
        let app = test_app(backend()).await;
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/board/bulk",
            Some(json!({ "action": { "kind": "export" } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
