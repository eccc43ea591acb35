use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::SignalError;
use crate::state::AppState;

/// Applied when the query omits `timeout_seconds`; tuned to a client
/// heartbeat cadence of well under two minutes.
pub const DEFAULT_PRESENCE_TIMEOUT_SECS: i64 = 120;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/heartbeat", post(heartbeat))
        .route("/offline", post(mark_offline))
        .route("/:user_id/online", get(is_online))
}

#[derive(Debug, Deserialize)]
pub struct PresenceRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct OnlineQuery {
    pub timeout_seconds: Option<i64>,
}

/// Returns false (and writes nothing) for unknown users.
async fn heartbeat(
    State(state): State<AppState>,
    Json(req): Json<PresenceRequest>,
) -> Result<Json<bool>, SignalError> {
    let recorded = state.store.heartbeat(req.user_id).await?;
    Ok(Json(recorded))
}

async fn mark_offline(
    State(state): State<AppState>,
    Json(req): Json<PresenceRequest>,
) -> Result<Json<bool>, SignalError> {
    let recorded = state.store.mark_offline(req.user_id).await?;
    Ok(Json(recorded))
}

async fn is_online(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<OnlineQuery>,
) -> Result<Json<bool>, SignalError> {
    let timeout = query
        .timeout_seconds
        .unwrap_or(DEFAULT_PRESENCE_TIMEOUT_SECS);
    let online = state.store.is_online(user_id, timeout).await?;
    Ok(Json(online))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SignalingStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn test_app(prefix: &str) -> (Router, SignalingStore, std::path::PathBuf) {
        let db_path =
            std::env::temp_dir().join(format!("{}-{}.sqlite", prefix, Uuid::new_v4()));
        let store = SignalingStore::new(db_path.clone()).await.expect("store init");
        let app = Router::new()
            .nest("/api/presence", router())
            .with_state(AppState::new(store.clone()));
        (app, store, db_path)
    }

    async fn bool_body(response: axum::response::Response) -> bool {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("bool body")
    }

    #[tokio::test]
    async fn heartbeat_then_online_over_http() {
        let (app, store, db_path) = test_app("presence-routes").await;
        let user = Uuid::new_v4();
        store.insert_user(user, "alice").await.expect("insert user");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/presence/heartbeat")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({ "user_id": user }).to_string(),
                    ))
                    .expect("request"),
            )
            .await
            .expect("heartbeat response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(bool_body(response).await);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/presence/{user}/online?timeout_seconds=120"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("online response");
        assert!(bool_body(response).await);

        // A user who never heartbeats reads offline, default window.
        let ghost = Uuid::new_v4();
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/presence/{ghost}/online"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("online response");
        assert!(!bool_body(response).await);

        let _ = std::fs::remove_file(db_path);
    }
}
