use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use call_proto::signaling::{CallStatus, IceCandidate};

use crate::error::SignalError;
use crate::models::Call;
use crate::state::AppState;
use crate::validation::{validate_candidate_attr, validate_sdp};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_call))
        .route("/pending", get(pending_call))
        .route("/:id", get(get_call))
        .route("/:id/status", post(set_status))
        .route("/:id/sdp", post(set_negotiation_payload))
        .route("/:id/ice", post(append_ice_candidate))
}

#[derive(Debug, Deserialize)]
pub struct CreateCallRequest {
    pub caller_id: Uuid,
    pub receiver_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ParticipantQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: CallStatus,
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NegotiationRequest {
    pub user_id: Uuid,
    #[validate(custom(function = "validate_sdp"))]
    pub offer_sdp: Option<String>,
    #[validate(custom(function = "validate_sdp"))]
    pub answer_sdp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IceCandidateRequest {
    pub user_id: Uuid,
    pub candidate: IceCandidate,
}

/// Start a call attempt; the callee discovers it by polling `/pending`.
async fn create_call(
    State(state): State<AppState>,
    Json(req): Json<CreateCallRequest>,
) -> Result<Json<Call>, SignalError> {
    let call = state.store.create_call(req.caller_id, req.receiver_id).await?;
    Ok(Json(call))
}

/// Latest pending call where the user is the receiver. Older pending calls
/// stay hidden until this one resolves.
async fn pending_call(
    State(state): State<AppState>,
    Query(query): Query<ParticipantQuery>,
) -> Result<Json<Option<Call>>, SignalError> {
    let call = state.store.pending_call_for(query.user_id).await?;
    Ok(Json(call))
}

/// Visible only to the two participants; anyone else gets 404.
async fn get_call(
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
    Query(query): Query<ParticipantQuery>,
) -> Result<Json<Call>, SignalError> {
    let call = state
        .store
        .call_for_participant(call_id, query.user_id)
        .await?
        .ok_or(SignalError::NotFound)?;
    Ok(Json(call))
}

async fn set_status(
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Call>, SignalError> {
    let call = state
        .store
        .set_call_status(call_id, req.status, req.user_id)
        .await?;
    Ok(Json(call))
}

async fn set_negotiation_payload(
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
    Json(req): Json<NegotiationRequest>,
) -> Result<Json<Call>, SignalError> {
    req.validate()
        .map_err(|e| SignalError::Validation(e.to_string()))?;

    let call = state
        .store
        .set_negotiation_payload(call_id, req.user_id, req.offer_sdp, req.answer_sdp)
        .await?;
    Ok(Json(call))
}

async fn append_ice_candidate(
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
    Json(req): Json<IceCandidateRequest>,
) -> Result<StatusCode, SignalError> {
    validate_candidate_attr(&req.candidate.candidate)
        .map_err(|e| SignalError::Validation(e.to_string()))?;

    state
        .store
        .append_ice_candidate(call_id, req.user_id, req.candidate)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SignalingStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn test_app(prefix: &str) -> (Router, SignalingStore, std::path::PathBuf) {
        let db_path =
            std::env::temp_dir().join(format!("{}-{}.sqlite", prefix, Uuid::new_v4()));
        let store = SignalingStore::new(db_path.clone()).await.expect("store init");
        let app = Router::new()
            .nest("/api/calls", router())
            .with_state(AppState::new(store.clone()));
        (app, store, db_path)
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn create_accept_complete_over_http() {
        let (app, store, db_path) = test_app("routes-lifecycle").await;
        let caller = Uuid::new_v4();
        let receiver = Uuid::new_v4();
        store.insert_user(caller, "alice").await.expect("insert caller");
        store.insert_user(receiver, "bob").await.expect("insert receiver");

        let response = app
            .clone()
            .oneshot(json_post(
                "/api/calls",
                serde_json::json!({ "caller_id": caller, "receiver_id": receiver }),
            ))
            .await
            .expect("create response");
        assert_eq!(response.status(), StatusCode::OK);
        let call = json_body(response).await;
        assert_eq!(call["status"], "pending");
        let call_id = call["id"].as_str().expect("call id").to_string();

        let response = app
            .clone()
            .oneshot(json_post(
                &format!("/api/calls/{call_id}/status"),
                serde_json::json!({ "status": "accepted", "user_id": receiver }),
            ))
            .await
            .expect("accept response");
        assert_eq!(response.status(), StatusCode::OK);
        let call = json_body(response).await;
        assert_eq!(call["status"], "accepted");
        assert!(!call["answered_at"].is_null());

        let response = app
            .clone()
            .oneshot(json_post(
                &format!("/api/calls/{call_id}/status"),
                serde_json::json!({ "status": "completed", "user_id": caller }),
            ))
            .await
            .expect("complete response");
        let call = json_body(response).await;
        assert_eq!(call["status"], "completed");
        assert!(call["offer_sdp"].is_null());

        let _ = std::fs::remove_file(db_path);
    }

    #[tokio::test]
    async fn strangers_get_not_found_over_http() {
        let (app, store, db_path) = test_app("routes-stranger").await;
        let caller = Uuid::new_v4();
        let receiver = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        store.insert_user(caller, "alice").await.expect("insert caller");
        store.insert_user(receiver, "bob").await.expect("insert receiver");

        let call = store.create_call(caller, receiver).await.expect("create call");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/calls/{}?user_id={stranger}", call.id))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("get response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let _ = std::fs::remove_file(db_path);
    }

    #[tokio::test]
    async fn self_call_is_a_bad_request() {
        let (app, store, db_path) = test_app("routes-self").await;
        let user = Uuid::new_v4();
        store.insert_user(user, "alice").await.expect("insert user");

        let response = app
            .oneshot(json_post(
                "/api/calls",
                serde_json::json!({ "caller_id": user, "receiver_id": user }),
            ))
            .await
            .expect("create response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let _ = std::fs::remove_file(db_path);
    }
}
