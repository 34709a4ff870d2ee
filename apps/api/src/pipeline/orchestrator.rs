//! Run orchestration.
//!
//! Sequences the stages as `Classifier → (Research ∥ Experience) → Assembly →
//! Render` under a single run deadline and produces exactly one terminal outcome.
//! Pending stages are published on a watch channel so a deadline expiry can name
//! them; artifacts stored by a run that does not succeed are discarded.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::pipeline::artifacts::ArtifactStore;
use crate::pipeline::assembly::{AssemblyContext, AssemblyInput, AssemblyStage};
use crate::pipeline::classifier::Classifier;
use crate::pipeline::errors::{PipelineError, RunFailure};
use crate::pipeline::experience::{ExperienceInput, ExperienceStage};
use crate::pipeline::models::{Degradation, JobPosting, LetterHeader, RunReport, RunSuccess};
use crate::pipeline::policy::StagePolicy;
use crate::pipeline::ports::{FormatConverter, InformationSource, TextGenerator};
use crate::pipeline::render::{RenderInput, RenderStage};
use crate::pipeline::research::ResearchStage;
use crate::pipeline::stage::{Stage, StageName};
use crate::pipeline::text_bounds::LengthBounds;
use crate::pipeline::writers::LetterWriter;
use crate::profiles::models::CandidateProfile;

/// Stage policies, bounds and deadlines for every run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub research_policy: StagePolicy,
    pub lookup_policy: StagePolicy,
    pub experience_policy: StagePolicy,
    pub bounds: LengthBounds,
    pub run_deadline: Duration,
    pub conversion_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            research_policy: StagePolicy::research_default(),
            lookup_policy: StagePolicy::research_default().with_call_timeout(Duration::from_secs(10)),
            experience_policy: StagePolicy::experience_default(),
            bounds: LengthBounds::default(),
            run_deadline: Duration::from_secs(180),
            conversion_timeout: Duration::from_secs(30),
        }
    }
}

/// External collaborators shared (read-only) by all runs.
pub struct Collaborators {
    pub generator: Arc<dyn TextGenerator>,
    pub source: Arc<dyn InformationSource>,
    pub converter: Option<Arc<dyn FormatConverter>>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub primary_writer: Arc<dyn LetterWriter>,
    pub fallback_writer: Arc<dyn LetterWriter>,
}

pub struct Orchestrator {
    classifier: Classifier,
    research: ResearchStage,
    experience: ExperienceStage,
    assembly: AssemblyStage,
    render: RenderStage,
    artifacts: Arc<dyn ArtifactStore>,
    run_deadline: Duration,
}

type StageFailure = (StageName, PipelineError);

async fn timed<T>(fut: impl Future<Output = T>) -> (T, u64) {
    let start = Instant::now();
    let out = fut.await;
    (out, start.elapsed().as_millis() as u64)
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Self {
        Self {
            classifier: Classifier,
            research: ResearchStage::new(
                collaborators.generator.clone(),
                collaborators.source,
                config.research_policy,
                config.lookup_policy,
                config.bounds.opening_closing_words,
            ),
            experience: ExperienceStage::new(
                collaborators.generator,
                config.experience_policy,
                config.bounds.experience_words,
            ),
            assembly: AssemblyStage::new(config.bounds),
            render: RenderStage::new(
                collaborators.primary_writer,
                collaborators.fallback_writer,
                collaborators.converter,
                collaborators.artifacts.clone(),
                config.conversion_timeout,
            ),
            artifacts: collaborators.artifacts,
            run_deadline: config.run_deadline,
        }
    }

    /// Runs the whole pipeline for one posting against one profile snapshot.
    pub async fn run(
        &self,
        posting: JobPosting,
        profile: Arc<CandidateProfile>,
    ) -> Result<RunSuccess, RunFailure> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let span = info_span!("run", run_id = %run_id);

        let all_stages: BTreeSet<StageName> = [
            StageName::Classifier,
            StageName::Research,
            StageName::Experience,
            StageName::Assembly,
            StageName::Render,
        ]
        .into_iter()
        .collect();
        let (progress, pending_rx) = watch::channel(all_stages);

        info!(
            parent: &span,
            company = %posting.company_name,
            job_title = %posting.job_title,
            "Run started"
        );

        let outcome = tokio::time::timeout(
            self.run_deadline,
            self.execute(run_id, started, posting, profile, &progress)
                .instrument(span.clone()),
        )
        .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let (stage, error) = match outcome {
            Ok(Ok(success)) => {
                info!(
                    parent: &span,
                    label = %success.report.label,
                    degraded = success.report.is_degraded(),
                    artifacts = success.artifacts.len(),
                    total_elapsed_ms = success.report.total_elapsed_ms,
                    "Run complete"
                );
                return Ok(success);
            }
            Ok(Err(failure)) => failure,
            Err(_) => {
                let pending: Vec<StageName> = pending_rx.borrow().iter().copied().collect();
                let stage = pending.first().copied().unwrap_or(StageName::Render);
                (
                    stage,
                    PipelineError::TimeoutExceeded {
                        deadline: self.run_deadline,
                        pending,
                    },
                )
            }
        };

        if let Err(e) = self.artifacts.discard_run(run_id).await {
            warn!(parent: &span, error = %e, "Failed to discard artifacts of failed run");
        }

        error!(
            parent: &span,
            stage = %stage,
            code = error.code(),
            error = %error,
            elapsed_ms,
            "Run failed"
        );
        Err(RunFailure {
            run_id,
            stage,
            error,
            elapsed_ms,
        })
    }

    async fn execute(
        &self,
        run_id: Uuid,
        started: Instant,
        posting: JobPosting,
        profile: Arc<CandidateProfile>,
        progress: &watch::Sender<BTreeSet<StageName>>,
    ) -> Result<RunSuccess, StageFailure> {
        let done = |stage: StageName| {
            progress.send_modify(|pending| {
                pending.remove(&stage);
            });
        };
        let mut stage_elapsed_ms = BTreeMap::new();
        let mut degradations = Vec::new();
        let generated_at = Utc::now();

        posting.validate().map_err(|e| (StageName::Intake, e))?;

        let (classification, ms) = timed(self.classifier.run(posting.clone())).await;
        let classification = classification.map_err(|e| (StageName::Classifier, e))?;
        stage_elapsed_ms.insert(StageName::Classifier, ms);
        done(StageName::Classifier);

        let research_fut = async {
            let out = timed(self.research.run(posting.clone())).await;
            done(StageName::Research);
            out
        };
        let experience_fut = async {
            let out = timed(self.experience.run(ExperienceInput {
                classification: classification.clone(),
                profile: profile.clone(),
                posting: posting.clone(),
            }))
            .await;
            done(StageName::Experience);
            out
        };
        let ((research, research_ms), (experience, experience_ms)) =
            tokio::join!(research_fut, experience_fut);

        let research = research.map_err(|e| (StageName::Research, e))?;
        let experience = experience.map_err(|e| (StageName::Experience, e))?;
        stage_elapsed_ms.insert(StageName::Research, research_ms);
        stage_elapsed_ms.insert(StageName::Experience, experience_ms);

        if let Some(reason) = &research.degradation {
            degradations.push(Degradation {
                stage: StageName::Research,
                reason: reason.clone(),
            });
        }
        if let Some(reason) = &experience.degradation {
            degradations.push(Degradation {
                stage: StageName::Experience,
                reason: reason.clone(),
            });
        }

        let context = AssemblyContext {
            header: LetterHeader {
                candidate_name: profile.name.clone(),
                email: profile.email.clone(),
                phone: profile.phone.clone(),
                company_name: posting.company_name.clone(),
                job_title: posting.job_title.clone(),
            },
            motivation: profile.motivation.clone(),
            generated_at,
        };
        let (letter, ms) = timed(self.assembly.run(AssemblyInput {
            research: research.sections(),
            experience: experience.sections(),
            context,
        }))
        .await;
        let letter = letter.map_err(|e| (StageName::Assembly, e))?;
        stage_elapsed_ms.insert(StageName::Assembly, ms);
        done(StageName::Assembly);

        let (rendered, ms) = timed(self.render.run(RenderInput {
            run_id,
            letter: letter.clone(),
        }))
        .await;
        let rendered = rendered.map_err(|e| (StageName::Render, e))?;
        stage_elapsed_ms.insert(StageName::Render, ms);
        done(StageName::Render);

        degradations.extend(rendered.degradations.into_iter().map(|reason| Degradation {
            stage: StageName::Render,
            reason,
        }));

        let report = RunReport {
            run_id,
            label: classification.label,
            research_score: classification.research_score,
            product_score: classification.product_score,
            tie_break: classification.tie_break,
            selected_tags: experience.selected_tags(),
            selection_fallbacks: experience.selection_fallbacks.clone(),
            degradations,
            stage_elapsed_ms,
            total_elapsed_ms: started.elapsed().as_millis() as u64,
        };

        Ok(RunSuccess {
            letter,
            artifacts: rendered.artifacts,
            report,
        })
    }
}
