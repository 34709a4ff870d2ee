//! Research stage: company lookup plus generation of the opening/closing pair.
//!
//! Policy: a missing company is fine, a failed lookup or exhausted generation
//! budget degrades to a static template when the stage policy allows it. The
//! template uses only the company name and job title, so it is never blank.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::llm_client::strip_json_fences;
use crate::pipeline::errors::{PipelineError, Severity};
use crate::pipeline::models::{JobPosting, ResearchDraft, SectionDraft, SectionName};
use crate::pipeline::policy::{call_with_retry, StagePolicy};
use crate::pipeline::ports::{InformationSource, TextGenerator};
use crate::pipeline::prompts::{
    denylist_clause, with_rejection, NO_COMPANY_CONTEXT, RESEARCH_PROMPT_TEMPLATE,
    RESEARCH_SYSTEM,
};
use crate::pipeline::stage::{Stage, StageName};
use crate::pipeline::text_bounds::check_section;

/// Generation attempts per run: the first answer plus one regeneration after a rejection.
const CONTENT_ATTEMPTS: u32 = 2;

#[derive(Debug, Deserialize)]
struct ResearchJson {
    opening: String,
    closing: String,
}

pub struct ResearchStage {
    generator: Arc<dyn TextGenerator>,
    source: Arc<dyn InformationSource>,
    generation_policy: StagePolicy,
    lookup_policy: StagePolicy,
    max_words: usize,
}

impl ResearchStage {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        source: Arc<dyn InformationSource>,
        generation_policy: StagePolicy,
        lookup_policy: StagePolicy,
        max_words: usize,
    ) -> Self {
        Self {
            generator,
            source,
            generation_policy,
            lookup_policy,
            max_words,
        }
    }

    /// Returns the company context, `None` when the company is unknown.
    async fn lookup(&self, company_name: &str) -> Result<Option<String>, PipelineError> {
        let source = self.source.clone();
        call_with_retry(&self.lookup_policy, Self::NAME, "lookup", || {
            let source = source.clone();
            let company_name = company_name.to_string();
            async move { source.lookup(&company_name).await }
        })
        .await
        .map_err(|e| PipelineError::from_service("company lookup", &e))
    }

    async fn generate(
        &self,
        posting: &JobPosting,
        company_context: Option<&str>,
    ) -> Result<(SectionDraft, SectionDraft), PipelineError> {
        let base_prompt = RESEARCH_PROMPT_TEMPLATE
            .replace("{company_name}", &posting.company_name)
            .replace("{job_title}", &posting.job_title)
            .replace("{job_description}", &posting.description)
            .replace("{company_context}", company_context.unwrap_or(NO_COMPANY_CONTEXT))
            .replace("{max_words}", &self.max_words.to_string())
            .replace("{denylist}", &denylist_clause());

        let mut prompt = base_prompt.clone();
        let mut last_rejection = String::new();

        for content_attempt in 1..=CONTENT_ATTEMPTS {
            debug!(
                stage = %Self::NAME,
                content_attempt,
                prompt_chars = prompt.len(),
                "Requesting opening and closing"
            );

            let generator = self.generator.clone();
            let max_words = self.max_words;
            let raw = call_with_retry(&self.generation_policy, Self::NAME, "generate", || {
                let generator = generator.clone();
                let prompt = prompt.clone();
                async move { generator.generate(RESEARCH_SYSTEM, &prompt, max_words).await }
            })
            .await
            .map_err(|e| PipelineError::from_service("research generation", &e))?;

            debug!(stage = %Self::NAME, response_chars = raw.len(), "Received response");

            match self.accept(posting, &raw) {
                Ok(pair) => return Ok(pair),
                Err(reason) => {
                    warn!(
                        stage = %Self::NAME,
                        content_attempt,
                        reason = %reason,
                        "Generated sections rejected"
                    );
                    prompt = with_rejection(&base_prompt, &reason);
                    last_rejection = reason;
                }
            }
        }

        Err(PipelineError::ExternalService {
            severity: Severity::Permanent,
            message: format!("research output rejected twice: {last_rejection}"),
        })
    }

    /// Parses and validates a raw response. The error string is fed back to the model.
    fn accept(
        &self,
        posting: &JobPosting,
        raw: &str,
    ) -> Result<(SectionDraft, SectionDraft), String> {
        let parsed: ResearchJson = serde_json::from_str(strip_json_fences(raw))
            .map_err(|e| format!("response was not the requested JSON ({e})"))?;

        let opening = SectionDraft::new(SectionName::Opening, parsed.opening);
        let closing = SectionDraft::new(SectionName::Closing, parsed.closing);
        for draft in [&opening, &closing] {
            check_section(draft.text(), self.max_words, &exempt_names(posting))
                .map_err(|r| format!("{} {r}", draft.name()))?;
        }
        Ok((opening, closing))
    }

    fn degrade_or_fail(
        &self,
        posting: &JobPosting,
        company_context_found: bool,
        error: PipelineError,
    ) -> Result<ResearchDraft, PipelineError> {
        if !self.generation_policy.degrade_on_exhaustion {
            return Err(error);
        }
        let reason = error.to_string();
        warn!(stage = %Self::NAME, reason = %reason, "Falling back to template opening and closing");
        let (opening, closing) = template_sections(posting);
        Ok(ResearchDraft {
            opening,
            closing,
            company_context_found,
            degradation: Some(reason),
        })
    }
}

/// Words the letter is allowed to repeat from the posting itself.
pub fn exempt_names(posting: &JobPosting) -> [&str; 2] {
    [posting.company_name.as_str(), posting.job_title.as_str()]
}

/// Static opening/closing built from the company name and job title alone.
pub fn template_sections(posting: &JobPosting) -> (SectionDraft, SectionDraft) {
    let company = posting.company_name.trim();
    let title = posting.job_title.trim();
    let opening = format!(
        "I am writing to apply for the {title} position at {company}. \
        The role lines up closely with the work I have been doing, and I would \
        value the chance to bring that experience to {company}."
    );
    let closing = format!(
        "Thank you for considering my application for the {title} role. \
        I would be glad to talk about how my background could support the work \
        at {company}, and I look forward to hearing from you."
    );
    (
        SectionDraft::new(SectionName::Opening, opening),
        SectionDraft::new(SectionName::Closing, closing),
    )
}

#[async_trait]
impl Stage for ResearchStage {
    type Input = JobPosting;
    type Output = ResearchDraft;

    const NAME: StageName = StageName::Research;

    async fn run(&self, posting: JobPosting) -> Result<ResearchDraft, PipelineError> {
        let company_context = match self.lookup(&posting.company_name).await {
            Ok(context) => context,
            Err(e) => return self.degrade_or_fail(&posting, false, e),
        };
        let company_context_found = company_context.is_some();
        if !company_context_found {
            info!(
                stage = %Self::NAME,
                company = %posting.company_name,
                "No company information found, generating without context"
            );
        }

        match self.generate(&posting, company_context.as_deref()).await {
            Ok((opening, closing)) => {
                info!(
                    stage = %Self::NAME,
                    opening_words = opening.word_count(),
                    closing_words = closing.word_count(),
                    company_context_found,
                    "Research stage complete"
                );
                Ok(ResearchDraft {
                    opening,
                    closing,
                    company_context_found,
                    degradation: None,
                })
            }
            Err(e) => self.degrade_or_fail(&posting, company_context_found, e),
        }
    }
}
