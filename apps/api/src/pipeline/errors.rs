//! Pipeline error taxonomy. Exactly one of these is surfaced per failed run,
//! together with the stage it came from.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::pipeline::ports::ServiceError;
use crate::pipeline::stage::StageName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Transient,
    Permanent,
}

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Bad or missing upstream input. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("External service error ({severity:?}): {message}")]
    ExternalService { severity: Severity, message: String },

    #[error("Insufficient profile data: {0}")]
    InsufficientProfileData(String),

    /// An assembly invariant was broken. Indicates a defect upstream of assembly.
    #[error("Structural violation: {0}")]
    StructuralViolation(String),

    /// Both the rich and the plain writer failed (environment fault).
    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("Run deadline of {}ms exceeded; pending stages: {pending:?}", .deadline.as_millis())]
    TimeoutExceeded {
        deadline: Duration,
        pending: Vec<StageName>,
    },
}

impl PipelineError {
    /// Stable machine-readable code, used in API error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "VALIDATION_ERROR",
            PipelineError::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            PipelineError::InsufficientProfileData(_) => "INSUFFICIENT_PROFILE_DATA",
            PipelineError::StructuralViolation(_) => "STRUCTURAL_VIOLATION",
            PipelineError::RenderFailed(_) => "RENDER_FAILED",
            PipelineError::TimeoutExceeded { .. } => "TIMEOUT_EXCEEDED",
        }
    }

    pub fn from_service(context: &str, error: &ServiceError) -> Self {
        let severity = if error.is_transient() {
            Severity::Transient
        } else {
            Severity::Permanent
        };
        PipelineError::ExternalService {
            severity,
            message: format!("{context}: {error}"),
        }
    }
}

/// The single fatal outcome of a run.
#[derive(Debug, Clone, Error)]
#[error("Run {run_id} failed in {stage} stage after {elapsed_ms}ms: {error}")]
pub struct RunFailure {
    pub run_id: Uuid,
    pub stage: StageName,
    pub error: PipelineError,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_service_error_maps_to_transient_severity() {
        let err = PipelineError::from_service(
            "generation",
            &ServiceError::RateLimited("429".to_string()),
        );
        match err {
            PipelineError::ExternalService { severity, message } => {
                assert_eq!(severity, Severity::Transient);
                assert!(message.starts_with("generation:"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_permanent_service_error_maps_to_permanent_severity() {
        let err = PipelineError::from_service(
            "generation",
            &ServiceError::Provider {
                message: "bad request".to_string(),
                transient: false,
            },
        );
        assert!(matches!(
            err,
            PipelineError::ExternalService {
                severity: Severity::Permanent,
                ..
            }
        ));
    }

    #[test]
    fn test_timeout_message_lists_pending_stages() {
        let err = PipelineError::TimeoutExceeded {
            deadline: Duration::from_secs(2),
            pending: vec![StageName::Research],
        };
        assert_eq!(err.code(), "TIMEOUT_EXCEEDED");
        assert!(err.to_string().contains("2000ms"));
        assert!(err.to_string().contains("Research"));
    }
}
