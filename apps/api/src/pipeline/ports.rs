//! Contracts the pipeline consumes from its external collaborators.
//!
//! Production adapters live outside the pipeline (`llm_client`, `search_client`,
//! `convert`); tests substitute fakes from `pipeline::test_support`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Failure of a search or generation call.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Provider error: {message}")]
    Provider { message: String, transient: bool },
}

impl ServiceError {
    /// Transient errors are retried under the stage policy; permanent ones are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::RateLimited(_) | ServiceError::Timeout(_) => true,
            ServiceError::Provider { transient, .. } => *transient,
        }
    }
}

/// Text-generation provider.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates text for `prompt` under `system`. `max_words` is the hard bound
    /// the caller will enforce; providers use it to size their token budget.
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        max_words: usize,
    ) -> Result<String, ServiceError>;
}

/// Company information source. `Ok(None)` means the company was not found,
/// which is not an error.
#[async_trait]
pub trait InformationSource: Send + Sync {
    async fn lookup(&self, company_name: &str) -> Result<Option<String>, ServiceError>;
}

#[derive(Debug, Clone, Error)]
pub enum ConversionError {
    /// The conversion utility is not installed or not configured.
    #[error("Conversion unavailable: {0}")]
    Unavailable(String),

    #[error("Conversion failed: {0}")]
    Failed(String),
}

/// Upgrades the plain Markdown rendering toward a rich document format.
#[async_trait]
pub trait FormatConverter: Send + Sync {
    async fn convert(&self, markdown: &str) -> Result<Bytes, ConversionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_and_timeout_are_transient() {
        assert!(ServiceError::RateLimited("slow down".to_string()).is_transient());
        assert!(ServiceError::Timeout(Duration::from_secs(1)).is_transient());
    }

    #[test]
    fn test_provider_error_transience_is_explicit() {
        let transient = ServiceError::Provider {
            message: "503".to_string(),
            transient: true,
        };
        let permanent = ServiceError::Provider {
            message: "401".to_string(),
            transient: false,
        };
        assert!(transient.is_transient());
        assert!(!permanent.is_transient());
    }
}
