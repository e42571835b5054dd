use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::error::StoreError;
use crate::harvest::{Harvester, RunSummary};
use crate::record::FieldMap;

#[derive(Clone)]
pub struct AppState {
    pub harvester: Arc<Harvester>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/run", post(run_now))
        .route("/latest", get(latest))
        .route("/jobs/:id/status", post(update_status))
        .with_state(state)
}

pub enum ApiError {
    NotFound(String),
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::NotFound(id) => (StatusCode::NOT_FOUND, format!("job {} not found", id)),
            ApiError::Store(e @ StoreError::InvalidStatus { .. }) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Store(e) => {
                error!(error = %e, "store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn run_now(State(state): State<AppState>) -> Json<RunSummary> {
    info!("Run triggered over HTTP");
    Json(state.harvester.run_once().await)
}

#[derive(Deserialize)]
struct LatestParams {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    20
}

async fn latest(
    State(state): State<AppState>,
    Query(params): Query<LatestParams>,
) -> Result<Json<Vec<FieldMap>>, ApiError> {
    let records = state.harvester.store().latest(params.limit)?;
    Ok(Json(records.iter().map(|r| r.to_map()).collect()))
}

#[derive(Deserialize)]
struct StatusUpdate {
    status: String,
    #[serde(default)]
    notes: Option<String>,
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state
        .harvester
        .store()
        .update_status(&id, &body.status, body.notes.as_deref())?;
    if !updated {
        return Err(ApiError::NotFound(id));
    }
    Ok(Json(json!({ "ok": true, "id": id, "status": body.status })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::db::Store;
    use crate::enrich::ContentEnricher;
    use crate::record::{Record, Source};
    use crate::scorer::LlmScorer;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(dir: &TempDir) -> (Router, Arc<Harvester>) {
        let mut vars = config::Map::new();
        vars.insert(
            "OUTPUT_DIR".to_string(),
            dir.path().join("out").to_string_lossy().into_owned(),
        );
        let settings = Settings::from_vars(vars).unwrap();
        let store = Store::open(&dir.path().join("jobs.db"), &settings.job_status_choices).unwrap();
        let enricher = ContentEnricher::new(false, Duration::from_secs(1), 1_000).unwrap();
        let harvester = Arc::new(Harvester::new(
            settings,
            Arc::new(store),
            vec![],
            enricher,
            LlmScorer::disabled(),
        ));
        let router = router(AppState {
            harvester: Arc::clone(&harvester),
        });
        (router, harvester)
    }

    fn seed(harvester: &Harvester) {
        let mut r = Record::new("job1", "Head of Data", "Acme", "https://acme/1", Source::SearchJobs);
        harvester.store().upsert(&mut r).unwrap();
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn status_request(id: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(format!("/jobs/{}/status", id))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_ok() {
        let dir = TempDir::new().unwrap();
        let (router, _) = app(&dir);
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn run_with_no_sources() {
        let dir = TempDir::new().unwrap();
        let (router, _) = app(&dir);
        let response = router
            .oneshot(Request::post("/run").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!({ "inserted": 0, "csv": null }));
    }

    #[tokio::test]
    async fn latest_returns_flat_maps() {
        let dir = TempDir::new().unwrap();
        let (router, harvester) = app(&dir);
        seed(&harvester);
        let response = router
            .oneshot(Request::get("/latest?limit=5").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body[0]["id"], "job1");
        assert_eq!(body[0]["status"], "harvested");
        assert_eq!(body[0]["assessment_flag"], 0);
    }

    #[tokio::test]
    async fn status_update_codes() {
        let dir = TempDir::new().unwrap();
        let (router, harvester) = app(&dir);
        seed(&harvester);

        let ok = router
            .clone()
            .oneshot(status_request("job1", json!({ "status": "applied", "notes": "sent" })))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let missing = router
            .clone()
            .oneshot(status_request("nope", json!({ "status": "applied" })))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let invalid = router
            .oneshot(status_request("job1", json!({ "status": "hired" })))
            .await
            .unwrap();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let row = &harvester.store().latest(1).unwrap()[0];
        assert_eq!(row.status, "applied");
        assert_eq!(row.notes, "sent");
    }
}
