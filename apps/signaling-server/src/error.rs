use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("caller and receiver must differ")]
    InvalidParticipants,
    #[error("unknown user")]
    UnknownUser,
    /// Also covers "exists but the requester is not a participant" so a
    /// probe cannot learn whether someone else's call exists.
    #[error("call not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("payload encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("validation error: {0}")]
    Validation(String),
}

impl IntoResponse for SignalError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            SignalError::InvalidParticipants => (StatusCode::BAD_REQUEST, self.to_string()),
            SignalError::UnknownUser => (StatusCode::BAD_REQUEST, self.to_string()),
            SignalError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            SignalError::Database(_) | SignalError::Io(_) | SignalError::Encoding(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Storage error".to_string(),
            ),
            SignalError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
