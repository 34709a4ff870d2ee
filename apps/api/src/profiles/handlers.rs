//! Axum route handlers for the Profiles API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::profiles::models::{CandidateProfile, ProfileSummary};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProfileListResponse {
    pub profiles: Vec<ProfileSummary>,
    pub default_profile: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileDetailResponse {
    pub id: String,
    pub profile: CandidateProfile,
}

/// GET /api/v1/profiles
pub async fn handle_list_profiles(
    State(state): State<AppState>,
) -> Result<Json<ProfileListResponse>, AppError> {
    let profiles = state.profiles.list().await?;
    let default_profile = state.profiles.default_id().await?;
    Ok(Json(ProfileListResponse {
        profiles,
        default_profile,
    }))
}

/// POST /api/v1/profiles
pub async fn handle_create_profile(
    State(state): State<AppState>,
    Json(profile): Json<CandidateProfile>,
) -> Result<(StatusCode, Json<ProfileSummary>), AppError> {
    let summary = state.profiles.create(profile).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// GET /api/v1/profiles/:id
pub async fn handle_get_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProfileDetailResponse>, AppError> {
    let profile = state.profiles.get(&id).await?;
    Ok(Json(ProfileDetailResponse { id, profile }))
}

/// PUT /api/v1/profiles/:id
///
/// Replaces the whole profile document.
pub async fn handle_update_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(profile): Json<CandidateProfile>,
) -> Result<Json<ProfileSummary>, AppError> {
    Ok(Json(state.profiles.update(&id, profile).await?))
}

/// DELETE /api/v1/profiles/:id
pub async fn handle_delete_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.profiles.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/profiles/:id/default
pub async fn handle_set_default_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProfileSummary>, AppError> {
    Ok(Json(state.profiles.set_default(&id).await?))
}
