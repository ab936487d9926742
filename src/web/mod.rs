//! Keep-alive HTTP server.
//!
//! Hosting platforms probe the container over HTTP; `/` answers with a plain
//! liveness string and `/health` reports the schedule as JSON.

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::info;

use crate::scheduler::ScheduleState;

/// Shared state of the web handlers.
#[derive(Clone)]
struct WebState {
    schedule: Arc<RwLock<ScheduleState>>,
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    schedule: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<&'static str>,
}

/// Builds the keep-alive router.
pub fn router(schedule: Arc<RwLock<ScheduleState>>) -> Router {
    Router::new()
        .route("/", get(alive))
        .route("/health", get(health))
        .with_state(WebState { schedule })
}

async fn alive() -> &'static str {
    "Bot is alive!"
}

async fn health(State(state): State<WebState>) -> Json<HealthResponse> {
    let schedule = state.schedule.read().await;
    let mode = schedule.schedule.as_ref().map(|s| s.mode.label());

    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        schedule: if mode.is_some() { "running" } else { "idle" },
        mode,
    })
}

/// Binds `host:port` and serves until `shutdown` resolves.
pub async fn serve(
    host: &str,
    port: u16,
    schedule: Arc<RwLock<ScheduleState>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    info!("Keep-alive server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(schedule))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use tower::ServiceExt;

    use super::*;
    use crate::scheduler::{AnnouncementMode, Schedule};

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_root_is_alive() {
        let app = router(Arc::new(RwLock::new(ScheduleState::new())));
        let (status, body) = get_body(app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Bot is alive!");
    }

    #[tokio::test]
    async fn test_health_reports_schedule() {
        let state = Arc::new(RwLock::new(ScheduleState::new()));

        let (_, body) = get_body(router(Arc::clone(&state)), "/health").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["schedule"], "idle");
        assert!(json.get("mode").is_none());

        state.write().await.start(
            Schedule::new(
                1,
                1.0,
                AnnouncementMode::Automatic {
                    prompt: "p".to_owned(),
                },
            ),
            Utc::now(),
        );

        let (_, body) = get_body(router(state), "/health").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["schedule"], "running");
        assert_eq!(json["mode"], "Automatic (AI)");
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = router(Arc::new(RwLock::new(ScheduleState::new())));
        let (status, _) = get_body(app, "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
