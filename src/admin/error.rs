//! Mapping of control-plane errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::gateway::GatewayError;
use crate::model::ValidationError;

#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            GatewayError::Validation(
                ValidationError::DuplicateSlug(_)
                | ValidationError::DuplicateProxyPath(_)
                | ValidationError::OverlappingProxyPath { .. },
            ) => StatusCode::CONFLICT,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::InactiveResource(_) => StatusCode::CONFLICT,
            GatewayError::Compile(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Admin request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let dup = ApiError(GatewayError::Validation(ValidationError::DuplicateSlug("a".into())));
        assert_eq!(dup.status(), StatusCode::CONFLICT);

        let bad = ApiError(GatewayError::Validation(ValidationError::InvalidTimeout(0)));
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let missing = ApiError(GatewayError::NotFound { kind: "grant", id: 3 });
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
