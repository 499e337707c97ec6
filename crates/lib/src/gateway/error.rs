//! Request-level failures and their HTTP mapping.

use axum::http::StatusCode;

use crate::command::Field;

/// Why a request was rejected before (or instead of) running its command.
/// Command failures are not errors here; they travel in the result's `error` field.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0} param is not allowed")]
    PermissionDenied(Field),

    #[error("handler not found")]
    RouteNotFound,

    #[error("invalid request method")]
    MethodNotAllowed,

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::BadRequest(e.to_string())
    }
}

impl From<Field> for GatewayError {
    fn from(field: Field) -> Self {
        GatewayError::PermissionDenied(field)
    }
}
