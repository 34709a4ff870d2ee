mod config;
mod convert;
mod errors;
mod llm_client;
mod pipeline;
mod profiles;
mod routes;
mod search_client;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::convert::PandocConverter;
use crate::llm_client::LlmClient;
use crate::pipeline::artifacts::{ArtifactStore, FsArtifactStore};
use crate::pipeline::ports::{FormatConverter, InformationSource};
use crate::pipeline::writers::{MarkdownLetterWriter, PdfLetterWriter};
use crate::pipeline::{Collaborators, Orchestrator};
use crate::profiles::{JsonFileProfileStore, ProfileStore};
use crate::routes::build_router;
use crate::search_client::SearchClient;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Lettersmith API v{}", env!("CARGO_PKG_VERSION"));

    let profiles: Arc<dyn ProfileStore> =
        Arc::new(JsonFileProfileStore::open(&config.profiles_dir).await?);

    let artifacts: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(&config.output_dir));
    info!("Artifacts stored under {}", config.output_dir.display());

    let llm = LlmClient::new(
        config.llm_api_key.clone(),
        &config.llm_api_base,
        config.llm_model.clone(),
        config.generation_timeout,
    )?;
    info!("LLM client initialized (model: {})", llm.model());

    let source: Arc<dyn InformationSource> = Arc::new(SearchClient::new(
        config.search_api_url.clone(),
        config.lookup_timeout,
    )?);

    let converter = config.pandoc_path.as_ref().map(|path| {
        info!("DOCX conversion enabled via {}", path.display());
        Arc::new(PandocConverter::new(path)) as Arc<dyn FormatConverter>
    });
    if converter.is_none() {
        info!("DOCX conversion disabled");
    }

    let orchestrator = Orchestrator::new(
        config.pipeline_config(),
        Collaborators {
            generator: Arc::new(llm),
            source: source.clone(),
            converter,
            artifacts: artifacts.clone(),
            primary_writer: Arc::new(PdfLetterWriter),
            fallback_writer: Arc::new(MarkdownLetterWriter),
        },
    );

    // Build app state
    let state = AppState {
        config: config.clone(),
        profiles,
        orchestrator: Arc::new(orchestrator),
        artifacts,
        source,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
