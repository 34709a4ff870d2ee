use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::pipeline::artifacts::ArtifactError;
use crate::pipeline::errors::{PipelineError, RunFailure};
use crate::profiles::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A letter run failed; carries the failing stage.
    #[error(transparent)]
    Pipeline(#[from] RunFailure),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AppError::NotFound(format!("Profile {id} not found")),
            StoreError::Invalid(msg) => AppError::UnprocessableEntity(msg),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

impl From<ArtifactError> for AppError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::NotFound(id) => AppError::NotFound(format!("Artifact {id} not found")),
            other => AppError::Storage(other.to_string()),
        }
    }
}

fn pipeline_status(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Validation(_) | PipelineError::InsufficientProfileData(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        PipelineError::TimeoutExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
        PipelineError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
        PipelineError::StructuralViolation(_) | PipelineError::RenderFailed(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn pipeline_response(failure: &RunFailure) -> Response {
    let status = pipeline_status(&failure.error);
    if status.is_server_error() {
        tracing::error!("Letter run failed: {failure}");
    }
    let body = Json(json!({
        "error": {
            "code": failure.error.code(),
            "message": failure.error.to_string(),
            "stage": failure.stage,
            "run_id": failure.run_id,
            "elapsed_ms": failure.elapsed_ms
        }
    }));
    (status, body).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Upstream(msg) => {
                tracing::warn!("Upstream error: {msg}");
                (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg.clone())
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Pipeline(failure) => return pipeline_response(failure),
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
    use std::time::Duration;

    use serde_json::Value;
    use uuid::Uuid;

    use super::*;
    use crate::pipeline::errors::Severity;
    use crate::pipeline::stage::StageName;

    fn failure(stage: StageName, error: PipelineError) -> AppError {
        AppError::Pipeline(RunFailure {
            run_id: Uuid::new_v4(),
            stage,
            error,
            elapsed_ms: 12,
        })
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_pipeline_failure_carries_stage_and_code() {
        let response = failure(
            StageName::Experience,
            PipelineError::InsufficientProfileData("only one entry".to_string()),
        )
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INSUFFICIENT_PROFILE_DATA");
        assert_eq!(body["error"]["stage"], "experience");
    }

    #[test]
    fn test_pipeline_status_mapping() {
        let cases = [
            (
                PipelineError::TimeoutExceeded {
                    deadline: Duration::from_secs(1),
                    pending: vec![StageName::Research],
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                PipelineError::ExternalService {
                    severity: Severity::Permanent,
                    message: "no".to_string(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                PipelineError::StructuralViolation("dup".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                PipelineError::RenderFailed("disk".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                PipelineError::Validation("short".to_string()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(pipeline_status(&error), status, "{error}");
        }
    }

    #[tokio::test]
    async fn test_store_errors_map_to_client_statuses() {
        let missing: AppError = StoreError::NotFound("abc".to_string()).into();
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let conflict: AppError = StoreError::Conflict("last profile".to_string()).into();
        let response = conflict.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error"]["code"], "CONFLICT");
    }
}
