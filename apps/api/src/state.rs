use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::artifacts::ArtifactStore;
use crate::pipeline::ports::InformationSource;
use crate::pipeline::Orchestrator;
use crate::profiles::ProfileStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub profiles: Arc<dyn ProfileStore>,
    pub orchestrator: Arc<Orchestrator>,
    /// Same store the render stage writes to; serves artifact downloads.
    pub artifacts: Arc<dyn ArtifactStore>,
    /// Same source the research stage reads; backs the company-info preview.
    pub source: Arc<dyn InformationSource>,
}
