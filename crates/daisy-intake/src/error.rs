//! Intake errors and their HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use daisy_core::QueryId;
use daisy_ledger::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("prompt is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("query {0} not found")]
    NotFound(QueryId),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("ledger rejected the request: {0}")]
    Rejected(String),
}

impl IntakeError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::TooLong { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Rejected(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<GatewayError> for IntakeError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Transient(m) => Self::Unavailable(m),
            other => Self::Rejected(other.to_string()),
        }
    }
}

impl From<daisy_core::Error> for IntakeError {
    fn from(e: daisy_core::Error) -> Self {
        match e {
            daisy_core::Error::TextTooLong { len, max } => Self::TooLong { len, max },
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}
