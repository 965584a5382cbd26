use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::kb::store::KbError;
use crate::kb::writer::PersistError;
use crate::resolution::session::ResolutionError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("KB error: {0}")]
    Kb(#[from] KbError),

    #[error("Persist error: {0}")]
    Persist(#[from] PersistError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn kb_load_failure(e: &KbError) -> (StatusCode, &'static str, String) {
    tracing::error!("KB load error: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "KB_LOAD_ERROR",
        "The role knowledge base could not be loaded".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Kb(e) => kb_load_failure(e),
            AppError::Persist(PersistError::InvalidTitle(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Persist(PersistError::Index(e)) => kb_load_failure(e),
            AppError::Persist(e) => {
                tracing::error!("Persist error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PERSIST_ERROR",
                    "The custom role could not be saved".to_string(),
                )
            }
            AppError::Resolution(e @ ResolutionError::RoleIndex(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", e.to_string())
            }
            AppError::Resolution(e) => (StatusCode::CONFLICT, "CONFLICT", e.to_string()),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                AppError::Persist(PersistError::InvalidTitle("blank".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Kb(KbError::DuplicateId("dup".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::Resolution(ResolutionError::RoleIndex(3)),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::Resolution(ResolutionError::NotOffered("x".into())),
                StatusCode::CONFLICT,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
