use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::backend::{
    ApplicationPayload, BackendError, CandidatePayload, Messenger, PipelineBackend, ServerStats,
};
use crate::pipeline::entity::EntityId;
use crate::pipeline::stage::StageId;

#[derive(Debug, Deserialize)]
struct ApplicationsEnvelope {
    applications: Vec<ApplicationPayload>,
}

#[derive(Debug, Serialize)]
struct StatusUpdate<'a> {
    status: &'a str,
}

#[derive(Debug, Serialize)]
struct BulkStatusUpdate<'a> {
    ids: &'a [EntityId],
    status: &'a str,
}

#[derive(Debug, Serialize)]
struct InvitationRequest<'a> {
    candidate_id: &'a EntityId,
    job_id: &'a str,
    message: &'a str,
}

/// reqwest client for the recruiting backend.
///
/// Single attempt per call. Stage updates go to `/{resource}/{id}/status`,
/// where `resource` is `applications` or `candidates` depending on the board.
/// Path segments are percent-encoded, so ids may carry any characters.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    token: Option<String>,
    resource: String,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        resource: &str,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BackendError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url,
            token,
            resource: resource.to_string(),
        })
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let mut url = self.base_url.clone();
        // Checked in `new`: the base can always take more segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, BackendError> {
        let body = self.send(builder).await?;
        serde_json::from_str(&body).map_err(BackendError::Parse)
    }

    /// Sends a command whose 2xx body is either empty or a `{success, error}` ack.
    async fn send_command(&self, builder: RequestBuilder) -> Result<(), BackendError> {
        let body = self.send(builder).await?;
        if let Ok(Value::Object(ack)) = serde_json::from_str::<Value>(&body) {
            if ack.get("success") == Some(&Value::Bool(false)) {
                return Err(BackendError::Rejected(error_message(&body)));
            }
        }
        Ok(())
    }

    async fn send(&self, builder: RequestBuilder) -> Result<String, BackendError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        debug!("Backend answered {} ({} bytes)", status, body.len());
        Ok(body)
    }
}

/// Pulls a human-readable message out of an error body: `{error}`, `{error: {message}}`
/// or `{message}`, falling back to the raw body.
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.get("error")
            .and_then(|e| e.as_str().or_else(|| e.get("message").and_then(Value::as_str)))
            .or_else(|| v.get("message").and_then(Value::as_str))
            .map(str::to_string)
    });
    message.unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl PipelineBackend for HttpBackend {
    async fn list_applications(&self, limit: u32) -> Result<Vec<ApplicationPayload>, BackendError> {
        let envelope: ApplicationsEnvelope = self
            .send_json(self.request(Method::GET, &["applications"]).query(&[("limit", limit)]))
            .await?;
        Ok(envelope.applications)
    }

    async fn search_candidates(
        &self,
        job_id: &str,
        min_match_score: f64,
        limit: u32,
    ) -> Result<Vec<CandidatePayload>, BackendError> {
        let builder = self.request(Method::GET, &["candidates", "search"]).query(&[
            ("job_id", job_id.to_string()),
            ("min_match_score", min_match_score.to_string()),
            ("limit", limit.to_string()),
        ]);
        self.send_json(builder).await
    }

    async fn update_stage(&self, id: &EntityId, stage: &StageId) -> Result<(), BackendError> {
        let builder = self
            .request(Method::PATCH, &[self.resource.as_str(), id.as_str(), "status"])
            .json(&StatusUpdate { status: stage.as_str() });
        self.send_command(builder).await
    }

    async fn bulk_update_stage(
        &self,
        ids: &[EntityId],
        stage: &StageId,
    ) -> Result<(), BackendError> {
        let builder = self
            .request(Method::POST, &[self.resource.as_str(), "bulk-status"])
            .json(&BulkStatusUpdate {
            ids,
            status: stage.as_str(),
        });
        self.send_command(builder).await
    }

    async fn fetch_stats(&self) -> Result<ServerStats, BackendError> {
        self.send_json(self.request(Method::GET, &[self.resource.as_str(), "stats"]))
            .await
    }
}

#[async_trait]
impl Messenger for HttpBackend {
    async fn send_invitation(
        &self,
        candidate_id: &EntityId,
        job_id: &str,
        message: &str,
    ) -> Result<(), BackendError> {
        let builder = self.request(Method::POST, &["invitations"]).json(&InvitationRequest {
            candidate_id,
            job_id,
            message,
        });
        self.send_command(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode},
        routing::{get, patch, post},
        Json, Router,
    };
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[derive(Clone, Default)]
    struct Recorded {
        requests: Arc<Mutex<Vec<(String, Value)>>>,
    }

    async fn list_applications(
        State(rec): State<Recorded>,
        headers: HeaderMap,
        Query(q): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        let auth = headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default()
            .to_string();
        rec.requests
            .lock()
            .unwrap()
            .push(("list".to_string(), json!({ "limit": q.get("limit"), "auth": auth })));
        Json(json!({
            "applications": [
                { "id": 1, "status": "new", "candidate_name": "Ada", "match_score": 88 },
                { "id": 2, "status": "interview" }
            ]
        }))
    }

    async fn update_status(
        State(rec): State<Recorded>,
        Path(id): Path<String>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        rec.requests
            .lock()
            .unwrap()
            .push((format!("patch {id}"), body));
        match id.as_str() {
            "500" => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": { "message": "database unavailable" } })),
            ),
            "refused" => (
                StatusCode::OK,
                Json(json!({ "success": false, "error": "application is locked" })),
            ),
            _ => (StatusCode::OK, Json(json!({ "success": true }))),
        }
    }

    async fn bulk_status(State(rec): State<Recorded>, Json(body): Json<Value>) -> StatusCode {
        rec.requests.lock().unwrap().push(("bulk".to_string(), body));
        StatusCode::NO_CONTENT
    }

    async fn stats() -> Json<Value> {
        Json(json!({ "total": 5, "new": 2, "screening": 3 }))
    }

    async fn search(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
        Json(json!([
            {
                "id": "c1",
                "name": "Grace",
                "match_score": 93.5,
                "component_scores": { "qualification": 90, "experience": 95, "skills": 92, "location": 100 },
                "job_id": q.get("job_id")
            }
        ]))
    }

    async fn invitations(State(rec): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
        rec.requests.lock().unwrap().push(("invite".to_string(), body));
        Json(json!({ "success": true }))
    }

    async fn spawn_server() -> (String, Recorded) {
        let rec = Recorded::default();
        let app = Router::new()
            .route("/applications", get(list_applications))
            .route("/applications/stats", get(stats))
            .route("/applications/bulk-status", post(bulk_status))
            .route("/applications/:id/status", patch(update_status))
            .route("/candidates/search", get(search))
            .route("/invitations", post(invitations))
            .with_state(rec.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/"), rec)
    }

    fn backend(base_url: &str, token: Option<&str>) -> HttpBackend {
        HttpBackend::new(
            base_url,
            token.map(str::to_string),
            "applications",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_list_applications_sends_limit_and_token() {
        let (url, rec) = spawn_server().await;
        let apps = backend(&url, Some("secret"))
            .list_applications(25)
            .await
            .unwrap();

        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].id, EntityId::from("1"));
        assert_eq!(apps[0].match_score, Some(88.0));
        assert_eq!(apps[0].fields.get("candidate_name"), Some(&json!("Ada")));

        let requests = rec.requests.lock().unwrap();
        assert_eq!(requests[0].1["limit"], json!("25"));
        assert_eq!(requests[0].1["auth"], json!("Bearer secret"));
    }

    #[tokio::test]
    async fn test_update_stage_patches_status() {
        let (url, rec) = spawn_server().await;
        backend(&url, None)
            .update_stage(&EntityId::from("7"), &StageId::from("offer"))
            .await
            .unwrap();

        let requests = rec.requests.lock().unwrap();
        assert_eq!(requests[0].0, "patch 7");
        assert_eq!(requests[0].1, json!({ "status": "offer" }));
    }

    #[tokio::test]
    async fn test_update_stage_encodes_id_segment() {
        let (url, rec) = spawn_server().await;
        backend(&url, None)
            .update_stage(&EntityId::from("a b/7?x"), &StageId::from("offer"))
            .await
            .unwrap();

        let requests = rec.requests.lock().unwrap();
        assert_eq!(requests[0].0, "patch a b/7?x");
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        let err = HttpBackend::new("not a url", None, "applications", Duration::from_secs(1));
        assert!(matches!(err, Err(BackendError::InvalidUrl(_))));
        let err = HttpBackend::new(
            "mailto:ops@example.com",
            None,
            "applications",
            Duration::from_secs(1),
        );
        assert!(matches!(err, Err(BackendError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_update_stage_surfaces_api_error_message() {
        let (url, _) = spawn_server().await;
        let err = backend(&url, None)
            .update_stage(&EntityId::from("500"), &StageId::from("offer"))
            .await
            .unwrap_err();

        match err {
            BackendError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "database unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unsuccessful_ack_is_rejected() {
        let (url, _) = spawn_server().await;
        let err = backend(&url, None)
            .update_stage(&EntityId::from("refused"), &StageId::from("offer"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected(m) if m == "application is locked"));
    }

    #[tokio::test]
    async fn test_bulk_update_posts_ids_and_status() {
        let (url, rec) = spawn_server().await;
        backend(&url, None)
            .bulk_update_stage(
                &[EntityId::from("1"), EntityId::from("2")],
                &StageId::from("rejected"),
            )
            .await
            .unwrap();

        let requests = rec.requests.lock().unwrap();
        assert_eq!(
            requests[0].1,
            json!({ "ids": ["1", "2"], "status": "rejected" })
        );
    }

    #[tokio::test]
    async fn test_fetch_stats_and_search() {
        let (url, _) = spawn_server().await;
        let backend = backend(&url, None);

        let stats = backend.fetch_stats().await.unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.by_status.get("screening"), Some(&json!(3)));

        let candidates = backend.search_candidates("job-1", 70.0, 10).await.unwrap();
        assert_eq!(candidates[0].match_score, Some(93.5));
        assert_eq!(candidates[0].component_scores.unwrap().location, 100.0);
        assert_eq!(candidates[0].fields.get("job_id"), Some(&json!("job-1")));
    }

    #[tokio::test]
    async fn test_send_invitation() {
        let (url, rec) = spawn_server().await;
        backend(&url, None)
            .send_invitation(&EntityId::from("c1"), "job-1", "Let's talk")
            .await
            .unwrap();

        let requests = rec.requests.lock().unwrap();
        assert_eq!(
            requests[0].1,
            json!({ "candidate_id": "c1", "job_id": "job-1", "message": "Let's talk" })
        );
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(r#"{"error":"nope"}"#), "nope");
        assert_eq!(error_message(r#"{"error":{"message":"deep"}}"#), "deep");
        assert_eq!(error_message(r#"{"message":"flat"}"#), "flat");
        assert_eq!(error_message(" plain text "), "plain text");
    }
}
