//! Scheduled-trigger HTTP server.
//!
//! An external cron calls one `POST /cron/*` route per job with
//! `Authorization: Bearer <secret>`. Each job runs at most once at a time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use tracing::{error, info, warn};

use postforge_core::RunSummary;
use postforge_core::jobs::{TOPIC_BATCH, TRANSLATION_BATCH, VIDEO_BATCH};
use postforge_shared::{PostforgeError, Result};

use crate::context::{AppContext, publish_scheduled};

const PUBLISH_JOB: &str = "publish-scheduled";

pub(crate) struct ServerState {
    ctx: AppContext,
    /// `None` when the secret env var is unset; every trigger is then refused.
    secret: Option<String>,
    running: Mutex<HashSet<&'static str>>,
}

impl ServerState {
    pub fn new(ctx: AppContext, secret: Option<String>) -> Self {
        Self {
            ctx,
            secret: secret.filter(|s| !s.trim().is_empty()),
            running: Mutex::new(HashSet::new()),
        }
    }

    fn try_start(&self, job: &'static str) -> Option<RunSlot<'_>> {
        let mut running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        running.insert(job).then(|| RunSlot { state: self, job })
    }
}

/// Marks a job as running until dropped.
struct RunSlot<'a> {
    state: &'a ServerState,
    job: &'static str,
}

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        self.state
            .running
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(self.job);
    }
}

pub(crate) fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/cron/youtube-sync", post(youtube_sync))
        .route("/cron/generate-daily-posts", post(generate_daily_posts))
        .route("/cron/translate-daily", post(translate_daily))
        .route("/cron/publish-scheduled", post(publish_due_posts))
        .with_state(state)
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

/// Bind and serve until the process is stopped.
pub(crate) async fn serve(state: ServerState, bind: &str) -> color_eyre::eyre::Result<()> {
    if state.secret.is_none() {
        warn!("cron secret is not configured; every trigger will be rejected");
    }
    let app = router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(bind, "trigger server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn youtube_sync(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    trigger(&state, &headers, VIDEO_BATCH, state.ctx.run_youtube_sync()).await
}

async fn generate_daily_posts(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    trigger(&state, &headers, TOPIC_BATCH, state.ctx.run_daily_posts(Utc::now())).await
}

async fn translate_daily(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    trigger(&state, &headers, TRANSLATION_BATCH, state.ctx.run_translations()).await
}

async fn publish_due_posts(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    trigger(
        &state,
        &headers,
        PUBLISH_JOB,
        publish_scheduled(&state.ctx.storage, Utc::now()),
    )
    .await
}

/// Authorize, claim the job slot, then run. The run future is lazy, so a
/// rejected request does no work.
async fn trigger(
    state: &ServerState,
    headers: &HeaderMap,
    job: &'static str,
    run: impl Future<Output = Result<RunSummary>>,
) -> Response {
    if !authorized(headers, state.secret.as_deref()) {
        warn!(job, "unauthorized trigger");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    let Some(_slot) = state.try_start(job) else {
        return conflict(job);
    };

    info!(job, "trigger accepted");
    match run.await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(PostforgeError::Conflict(_)) => conflict(job),
        Err(e) => {
            error!(job, error = %e, "triggered run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

fn conflict(job: &str) -> Response {
    (
        StatusCode::CONFLICT,
        Json(serde_json::json!({"error": format!("{job} is already running")})),
    )
        .into_response()
}

fn authorized(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret else { return false };
    let Some(value) = headers.get(header::AUTHORIZATION) else { return false };
    let Ok(value) = value.to_str() else { return false };
    let Some(token) = value.strip_prefix("Bearer ") else { return false };
    constant_time_eq(token.trim().as_bytes(), secret.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use chrono::Duration;
    use postforge_core::OpenRouterClient;
    use postforge_shared::{AppConfig, Post, PostId, PostStatus};
    use postforge_storage::Storage;
    use tower::ServiceExt;

    use super::*;

    async fn test_state(secret: Option<&str>) -> Arc<ServerState> {
        let dir = std::env::temp_dir().join(format!("postforge_server_{}", PostId::new()));
        let mut config = AppConfig::default();
        config.batch.checkpoint_dir = dir.join("checkpoints").to_string_lossy().into_owned();
        let storage = Arc::new(Storage::open(&dir.join("posts.db")).await.unwrap());
        let client = Arc::new(
            OpenRouterClient::new("http://127.0.0.1:9", "sk-test", "test/model", 5).unwrap(),
        );
        let ctx = AppContext::from_parts(config, storage, client, None).unwrap();
        Arc::new(ServerState::new(ctx, secret.map(String::from)))
    }

    fn cron(path: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri(path);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn scheduled_post(slug: &str, at: chrono::DateTime<Utc>) -> Post {
        Post {
            id: PostId::new(),
            source_id: None,
            slug: slug.into(),
            title: "Scheduled".into(),
            excerpt: "Excerpt".into(),
            content: "Body".into(),
            tags: Vec::new(),
            status: PostStatus::Draft,
            language: "en".into(),
            cover_image: None,
            seo_title: "Scheduled".into(),
            seo_description: "Excerpt".into(),
            scheduled_at: Some(at),
            published_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn bearer_token_must_match_exactly() {
        let mut headers = HeaderMap::new();
        assert!(!authorized(&headers, Some("s3cret")));

        headers.insert(header::AUTHORIZATION, "Bearer s3cret".parse().unwrap());
        assert!(authorized(&headers, Some("s3cret")));
        assert!(!authorized(&headers, Some("s3cret2")));
        assert!(!authorized(&headers, None));

        headers.insert(header::AUTHORIZATION, "Basic s3cret".parse().unwrap());
        assert!(!authorized(&headers, Some("s3cret")));
    }

    #[tokio::test]
    async fn health_needs_no_auth() {
        let app = router(test_state(None).await);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rejects_missing_or_wrong_secret_without_work() {
        let state = test_state(Some("s3cret")).await;
        let due = scheduled_post("due", Utc::now() - Duration::minutes(1));
        state.ctx.storage.upsert_post(&due).await.unwrap();

        for auth in [None, Some("Bearer wrong")] {
            let response = router(state.clone())
                .oneshot(cron("/cron/publish-scheduled", auth))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        let stored = state.ctx.storage.get_post(&due.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Draft);

        let unconfigured = router(test_state(None).await)
            .oneshot(cron("/cron/publish-scheduled", Some("Bearer ")))
            .await
            .unwrap();
        assert_eq!(unconfigured.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn publish_trigger_returns_summary() {
        let state = test_state(Some("s3cret")).await;
        let due = scheduled_post("due", Utc::now() - Duration::minutes(1));
        state.ctx.storage.upsert_post(&due).await.unwrap();

        let response = router(state.clone())
            .oneshot(cron("/cron/publish-scheduled", Some("Bearer s3cret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let summary: RunSummary = serde_json::from_slice(&body).unwrap();
        assert_eq!(summary.succeeded, 1);

        let stored = state.ctx.storage.get_post(&due.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Published);
    }

    #[tokio::test]
    async fn concurrent_run_is_a_conflict() {
        let state = test_state(Some("s3cret")).await;
        let _slot = state.try_start(PUBLISH_JOB).unwrap();

        let response = router(state.clone())
            .oneshot(cron("/cron/publish-scheduled", Some("Bearer s3cret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn failed_run_is_a_server_error() {
        // No YouTube key configured
        let state = test_state(Some("s3cret")).await;
        let response = router(state)
            .oneshot(cron("/cron/youtube-sync", Some("Bearer s3cret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
