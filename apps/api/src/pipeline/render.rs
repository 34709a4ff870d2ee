//! Render stage: primary writer, then the plain fallback, then optional conversion.
//!
//! `AttemptPrimary -> Done | AttemptFallback -> DoneDegraded | Failed`.
//! A converter error never fails the stage; only losing both writers does.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::pipeline::artifacts::ArtifactStore;
use crate::pipeline::errors::PipelineError;
use crate::pipeline::models::{
    ArtifactFormat, ArtifactId, AssembledLetter, MediaKind, RenderedArtifact,
};
use crate::pipeline::ports::FormatConverter;
use crate::pipeline::stage::{Stage, StageName};
use crate::pipeline::writers::{file_name, LetterWriter};

#[derive(Debug, Clone)]
pub struct RenderInput {
    pub run_id: Uuid,
    pub letter: AssembledLetter,
}

#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub artifacts: Vec<RenderedArtifact>,
    /// Empty when the primary writer succeeded.
    pub degradations: Vec<String>,
}

enum RenderState {
    AttemptPrimary,
    AttemptFallback { primary_error: String },
    Done(RenderOutcome),
    Failed(PipelineError),
}

pub struct RenderStage {
    primary: Arc<dyn LetterWriter>,
    fallback: Arc<dyn LetterWriter>,
    converter: Option<Arc<dyn FormatConverter>>,
    store: Arc<dyn ArtifactStore>,
    conversion_timeout: Duration,
}

impl RenderStage {
    pub fn new(
        primary: Arc<dyn LetterWriter>,
        fallback: Arc<dyn LetterWriter>,
        converter: Option<Arc<dyn FormatConverter>>,
        store: Arc<dyn ArtifactStore>,
        conversion_timeout: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            converter,
            store,
            conversion_timeout,
        }
    }

    /// Writes the letter with `writer` on the blocking pool and stores the result.
    async fn emit(
        &self,
        writer: &Arc<dyn LetterWriter>,
        input: &RenderInput,
    ) -> Result<RenderedArtifact, String> {
        let media = writer.media();
        let id = ArtifactId::new(input.run_id, file_name(&input.letter, media))?;

        let task_writer = writer.clone();
        let letter = input.letter.clone();
        let content = tokio::task::spawn_blocking(move || task_writer.write(&letter))
            .await
            .map_err(|e| format!("{} writer panicked: {e}", media.extension()))?
            .map_err(|e| e.to_string())?;

        self.store_artifact(id, writer.format(), media, content).await
    }

    async fn store_artifact(
        &self,
        id: ArtifactId,
        format: ArtifactFormat,
        media: MediaKind,
        content: Bytes,
    ) -> Result<RenderedArtifact, String> {
        self.store
            .put(&id, content.clone())
            .await
            .map_err(|e| e.to_string())?;
        Ok(RenderedArtifact {
            id,
            format,
            media,
            size_bytes: content.len(),
            content,
        })
    }

    /// Tries to upgrade the plain artifact. Returns the converted artifact or the reason it was skipped.
    async fn convert(
        &self,
        plain: &RenderedArtifact,
        input: &RenderInput,
    ) -> Result<RenderedArtifact, String> {
        let converter = self
            .converter
            .as_ref()
            .ok_or_else(|| "no format converter configured".to_string())?;

        let markdown = String::from_utf8_lossy(&plain.content).into_owned();
        let converted = tokio::time::timeout(self.conversion_timeout, converter.convert(&markdown))
            .await
            .map_err(|_| {
                format!(
                    "conversion timed out after {}ms",
                    self.conversion_timeout.as_millis()
                )
            })?
            .map_err(|e| e.to_string())?;

        let id = ArtifactId::new(input.run_id, file_name(&input.letter, MediaKind::Docx))?;
        self.store_artifact(id, ArtifactFormat::Fallback, MediaKind::Docx, converted)
            .await
    }
}

#[async_trait]
impl Stage for RenderStage {
    type Input = RenderInput;
    type Output = RenderOutcome;

    const NAME: StageName = StageName::Render;

    async fn run(&self, input: RenderInput) -> Result<RenderOutcome, PipelineError> {
        let mut state = RenderState::AttemptPrimary;
        loop {
            state = match state {
                RenderState::AttemptPrimary => match self.emit(&self.primary, &input).await {
                    Ok(artifact) => {
                        info!(stage = %Self::NAME, artifact = %artifact.id, "Primary artifact rendered");
                        RenderState::Done(RenderOutcome {
                            artifacts: vec![artifact],
                            degradations: Vec::new(),
                        })
                    }
                    Err(primary_error) => {
                        warn!(stage = %Self::NAME, error = %primary_error, "Primary writer failed, using fallback");
                        RenderState::AttemptFallback { primary_error }
                    }
                },
                RenderState::AttemptFallback { primary_error } => {
                    match self.emit(&self.fallback, &input).await {
                        Ok(plain) => {
                            let mut degradations =
                                vec![format!("primary writer failed: {primary_error}")];
                            let mut artifacts = Vec::with_capacity(2);
                            match self.convert(&plain, &input).await {
                                Ok(converted) => {
                                    info!(stage = %Self::NAME, artifact = %converted.id, "Fallback artifact converted");
                                    artifacts.push(plain);
                                    artifacts.push(converted);
                                }
                                Err(reason) => {
                                    warn!(stage = %Self::NAME, reason = %reason, "Conversion skipped");
                                    degradations.push(format!("conversion skipped: {reason}"));
                                    artifacts.push(plain);
                                }
                            }
                            RenderState::Done(RenderOutcome {
                                artifacts,
                                degradations,
                            })
                        }
                        Err(fallback_error) => RenderState::Failed(PipelineError::RenderFailed(
                            format!("primary: {primary_error}; fallback: {fallback_error}"),
                        )),
                    }
                }
                RenderState::Done(outcome) => return Ok(outcome),
                RenderState::Failed(error) => return Err(error),
            };
        }
    }
}
