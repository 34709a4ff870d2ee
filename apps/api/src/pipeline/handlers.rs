//! Axum route handlers for the Letters API.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipeline::models::{
    ArtifactFormat, ArtifactId, JobPosting, MediaKind, Paragraph, RunReport,
};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GenerateLetterRequest {
    pub company_name: String,
    pub job_title: String,
    pub job_description: String,
    /// Falls back to the store's default profile.
    #[serde(default)]
    pub profile_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ArtifactRef {
    pub file_name: String,
    pub format: ArtifactFormat,
    pub media: MediaKind,
    pub size_bytes: usize,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateLetterResponse {
    pub run_id: Uuid,
    pub profile_id: String,
    pub letter: String,
    pub paragraphs: Vec<Paragraph>,
    pub word_count: usize,
    pub artifacts: Vec<ArtifactRef>,
    pub report: RunReport,
}

#[derive(Debug, Serialize)]
pub struct CompanyInfoResponse {
    pub company_name: String,
    pub found: bool,
    pub summary: Option<String>,
}

fn artifact_url(id: &ArtifactId) -> String {
    format!("/api/v1/letters/{}/artifacts/{}", id.run_id, id.file_name)
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/letters
///
/// Runs the full pipeline against a profile snapshot. A failed run returns the
/// error kind and failing stage, never a partial letter.
pub async fn handle_generate_letter(
    State(state): State<AppState>,
    Json(request): Json<GenerateLetterRequest>,
) -> Result<Json<GenerateLetterResponse>, AppError> {
    let profile_id = match request.profile_id {
        Some(id) => id,
        None => state.profiles.default_id().await?.ok_or_else(|| {
            AppError::Validation("no profile_id given and no default profile exists".to_string())
        })?,
    };
    let profile = Arc::new(state.profiles.get(&profile_id).await?);

    let posting = JobPosting::new(
        request.company_name,
        request.job_title,
        request.job_description,
    );

    let success = state.orchestrator.run(posting, profile).await?;

    let artifacts = success
        .artifacts
        .iter()
        .map(|a| ArtifactRef {
            file_name: a.id.file_name.clone(),
            format: a.format,
            media: a.media,
            size_bytes: a.size_bytes,
            url: artifact_url(&a.id),
        })
        .collect();

    Ok(Json(GenerateLetterResponse {
        run_id: success.report.run_id,
        profile_id,
        letter: success.letter.body(),
        paragraphs: success.letter.paragraphs.to_vec(),
        word_count: success.letter.word_count,
        artifacts,
        report: success.report,
    }))
}

/// GET /api/v1/letters/:run_id/artifacts/:file_name
pub async fn handle_get_artifact(
    State(state): State<AppState>,
    Path((run_id, file_name)): Path<(Uuid, String)>,
) -> Result<Response, AppError> {
    let media = MediaKind::from_file_name(&file_name)
        .ok_or_else(|| AppError::NotFound(format!("Artifact {run_id}/{file_name} not found")))?;
    let id = ArtifactId::new(run_id, file_name).map_err(AppError::NotFound)?;

    let content = state.artifacts.get(&id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, media.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", id.file_name),
            ),
        ],
        content,
    )
        .into_response())
}

/// GET /api/v1/company-info/:company_name
///
/// Preview of what the research stage would see for a company.
pub async fn handle_company_info(
    State(state): State<AppState>,
    Path(company_name): Path<String>,
) -> Result<Json<CompanyInfoResponse>, AppError> {
    if company_name.trim().is_empty() {
        return Err(AppError::Validation(
            "company_name cannot be empty".to_string(),
        ));
    }

    let summary = tokio::time::timeout(
        state.config.lookup_timeout,
        state.source.lookup(&company_name),
    )
    .await
    .map_err(|_| AppError::Upstream("company lookup timed out".to_string()))?
    .map_err(|e| AppError::Upstream(e.to_string()))?;

    Ok(Json(CompanyInfoResponse {
        company_name,
        found: summary.is_some(),
        summary,
    }))
}
