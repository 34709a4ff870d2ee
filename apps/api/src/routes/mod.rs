pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::pipeline::handlers as letters;
use crate::profiles::handlers as profiles;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Profiles API
        .route(
            "/api/v1/profiles",
            get(profiles::handle_list_profiles).post(profiles::handle_create_profile),
        )
        .route(
            "/api/v1/profiles/:id",
            get(profiles::handle_get_profile)
                .put(profiles::handle_update_profile)
                .delete(profiles::handle_delete_profile),
        )
        .route(
            "/api/v1/profiles/:id/default",
            post(profiles::handle_set_default_profile),
        )
        // Letters API
        .route("/api/v1/letters", post(letters::handle_generate_letter))
        .route(
            "/api/v1/letters/:run_id/artifacts/:file_name",
            get(letters::handle_get_artifact),
        )
        .route(
            "/api/v1/company-info/:company_name",
            get(letters::handle_company_info),
        )
        .with_state(state)
}
