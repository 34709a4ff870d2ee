//! Experience stage: picks two entries from the profile and writes a paragraph for each.
//!
//! Selection is deterministic and pure ([`select_entries`]). Writing goes through
//! the text generator; unlike research there is no templated fallback unless the
//! stage policy explicitly enables degradation.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::llm_client::strip_json_fences;
use crate::pipeline::errors::{PipelineError, Severity};
use crate::pipeline::models::{
    ClassificationResult, CompanyType, ExperienceDraft, JobPosting, SectionDraft, SectionName,
    SelectedEntry,
};
use crate::pipeline::policy::{call_with_retry, StagePolicy};
use crate::pipeline::ports::TextGenerator;
use crate::pipeline::prompts::{
    denylist_clause, with_rejection, EXPERIENCE_PROMPT_TEMPLATE, EXPERIENCE_SYSTEM,
};
use crate::pipeline::research::exempt_names;
use crate::pipeline::stage::{Stage, StageName};
use crate::pipeline::text_bounds::{check_section, tokens};
use crate::profiles::models::{CandidateProfile, ExperienceEntry, ExperienceTag};

const CONTENT_ATTEMPTS: u32 = 2;
const MAX_SHARED_KEYWORDS: usize = 8;

/// Tokens too common to count as a shared keyword.
const STOPWORDS: &[&str] = &[
    "about", "also", "and", "are", "been", "from", "have", "into", "more", "over", "such",
    "than", "that", "their", "them", "then", "they", "this", "using", "were", "which", "will",
    "with", "within", "work", "your",
];

/// Owned snapshot handed to the stage by the orchestrator.
#[derive(Debug, Clone)]
pub struct ExperienceInput {
    pub classification: ClassificationResult,
    pub profile: Arc<CandidateProfile>,
    pub posting: JobPosting,
}

/// Indices of the two chosen entries plus any rule that had to be relaxed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub preferred: usize,
    pub versatile: usize,
    pub fallbacks: Vec<String>,
}

/// Chooses the label-preferred entry and the versatile (`agent_development`) entry.
/// Entries are in recency order, so "first match" means "most recent".
pub fn select_entries(
    label: CompanyType,
    profile: &CandidateProfile,
) -> Result<Selection, PipelineError> {
    let entries = &profile.experience;
    if entries.len() < 2 {
        return Err(PipelineError::InsufficientProfileData(format!(
            "profile has {} experience entries, at least 2 are required",
            entries.len()
        )));
    }

    let mut fallbacks = Vec::new();
    let versatile = entries
        .iter()
        .position(|e| e.has_tag(ExperienceTag::AgentDevelopment));

    let wanted = label.preferred_tag();
    let preferred = match entries
        .iter()
        .enumerate()
        .position(|(i, e)| Some(i) != versatile && e.has_tag(wanted))
    {
        Some(i) => i,
        None => {
            let i = first_excluding(entries, versatile);
            fallbacks.push(format!(
                "no {} entry available; used most recent remaining entry '{}'",
                wanted.as_str(),
                entries[i].title
            ));
            i
        }
    };

    let versatile = match versatile {
        Some(i) => i,
        None => {
            let i = first_excluding(entries, Some(preferred));
            fallbacks.push(format!(
                "no {} entry available; used most recent remaining entry '{}'",
                ExperienceTag::AgentDevelopment.as_str(),
                entries[i].title
            ));
            i
        }
    };

    Ok(Selection {
        preferred,
        versatile,
        fallbacks,
    })
}

// Callers guarantee at least two entries, so some index always remains.
fn first_excluding(entries: &[ExperienceEntry], excluded: Option<usize>) -> usize {
    (0..entries.len())
        .find(|i| Some(*i) != excluded)
        .unwrap_or_default()
}

/// Tokens present in both the entry description and the posting, in entry order.
pub fn shared_keywords(entry: &ExperienceEntry, posting: &JobPosting) -> Vec<String> {
    let posting_tokens: HashSet<String> = tokens(&posting.scoring_text()).into_iter().collect();
    let mut seen = HashSet::new();
    tokens(&entry.description)
        .into_iter()
        .filter(|t| t.len() > 3 && !STOPWORDS.contains(&t.as_str()))
        .filter(|t| posting_tokens.contains(t))
        .filter(|t| seen.insert(t.clone()))
        .take(MAX_SHARED_KEYWORDS)
        .collect()
}

fn selected(index: usize, entry: &ExperienceEntry) -> SelectedEntry {
    SelectedEntry {
        index,
        title: entry.title.clone(),
        organization: entry.organization.clone(),
        tags: entry.tags.clone(),
    }
}

fn focus_for(section: SectionName, label: CompanyType) -> &'static str {
    match (section, label) {
        (SectionName::Experience2, _) => {
            "Show versatility: building autonomous agents that serve both research and product goals."
        }
        (_, CompanyType::TechnicalResearch) => {
            "Show research depth: the problem studied, the method used and the measured result."
        }
        (_, CompanyType::Product) => {
            "Show delivery: what shipped, who relied on it and what changed for them."
        }
    }
}

#[derive(Debug, Deserialize)]
struct ParagraphJson {
    paragraph: String,
}

pub struct ExperienceStage {
    generator: Arc<dyn TextGenerator>,
    policy: StagePolicy,
    max_words: usize,
}

impl ExperienceStage {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: StagePolicy, max_words: usize) -> Self {
        Self {
            generator,
            policy,
            max_words,
        }
    }

    /// Writes one paragraph. Returns the draft and a degradation reason when the
    /// policy allowed a fallback to the entry's own description.
    async fn write(
        &self,
        section: SectionName,
        entry: &ExperienceEntry,
        input: &ExperienceInput,
    ) -> Result<(SectionDraft, Option<String>), PipelineError> {
        let keywords = shared_keywords(entry, &input.posting);
        let base_prompt = EXPERIENCE_PROMPT_TEMPLATE
            .replace("{company_name}", &input.posting.company_name)
            .replace("{job_title}", &input.posting.job_title)
            .replace("{entry_title}", &entry.title)
            .replace("{entry_organization}", &entry.organization)
            .replace("{entry_period}", &entry.period)
            .replace("{entry_description}", &entry.description)
            .replace("{focus}", focus_for(section, input.classification.label))
            .replace(
                "{shared_keywords}",
                &if keywords.is_empty() {
                    "none".to_string()
                } else {
                    keywords.join(", ")
                },
            )
            .replace("{max_words}", &self.max_words.to_string())
            .replace("{denylist}", &denylist_clause());

        let mut prompt = base_prompt.clone();
        let mut last_rejection = String::new();

        for content_attempt in 1..=CONTENT_ATTEMPTS {
            debug!(
                stage = %Self::NAME,
                section = %section,
                content_attempt,
                shared_keywords = keywords.len(),
                prompt_chars = prompt.len(),
                "Requesting experience paragraph"
            );

            let generator = self.generator.clone();
            let max_words = self.max_words;
            let raw = match call_with_retry(&self.policy, Self::NAME, "generate", || {
                let generator = generator.clone();
                let prompt = prompt.clone();
                async move { generator.generate(EXPERIENCE_SYSTEM, &prompt, max_words).await }
            })
            .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    let error = PipelineError::from_service("experience generation", &e);
                    return self.degrade_or_fail(section, entry, error);
                }
            };

            match self.accept(section, &input.posting, &raw) {
                Ok(draft) => return Ok((draft, None)),
                Err(reason) => {
                    warn!(
                        stage = %Self::NAME,
                        section = %section,
                        content_attempt,
                        reason = %reason,
                        "Generated paragraph rejected"
                    );
                    prompt = with_rejection(&base_prompt, &reason);
                    last_rejection = reason;
                }
            }
        }

        let error = PipelineError::ExternalService {
            severity: Severity::Permanent,
            message: format!("{section} output rejected twice: {last_rejection}"),
        };
        self.degrade_or_fail(section, entry, error)
    }

    fn accept(
        &self,
        section: SectionName,
        posting: &JobPosting,
        raw: &str,
    ) -> Result<SectionDraft, String> {
        let parsed: ParagraphJson = serde_json::from_str(strip_json_fences(raw))
            .map_err(|e| format!("response was not the requested JSON ({e})"))?;
        let draft = SectionDraft::new(section, parsed.paragraph);
        check_section(draft.text(), self.max_words, &exempt_names(posting))
            .map_err(|r| r.to_string())?;
        Ok(draft)
    }

    fn degrade_or_fail(
        &self,
        section: SectionName,
        entry: &ExperienceEntry,
        error: PipelineError,
    ) -> Result<(SectionDraft, Option<String>), PipelineError> {
        if !self.policy.degrade_on_exhaustion {
            return Err(error);
        }
        warn!(stage = %Self::NAME, section = %section, error = %error, "Using entry description as paragraph");
        let intro = format!("As {} at {}, ", entry.title.trim(), entry.organization.trim());
        let budget = self.max_words.saturating_sub(intro.split_whitespace().count());
        let body: Vec<&str> = entry.description.split_whitespace().take(budget).collect();
        let text = format!("{intro}{}", body.join(" "));
        Ok((SectionDraft::new(section, text), Some(error.to_string())))
    }
}

#[async_trait]
impl Stage for ExperienceStage {
    type Input = ExperienceInput;
    type Output = ExperienceDraft;

    const NAME: StageName = StageName::Experience;

    async fn run(&self, input: ExperienceInput) -> Result<ExperienceDraft, PipelineError> {
        let selection = select_entries(input.classification.label, &input.profile)?;
        for fallback in &selection.fallbacks {
            warn!(stage = %Self::NAME, fallback = %fallback, "Selection rule relaxed");
        }

        let preferred_entry = &input.profile.experience[selection.preferred];
        let versatile_entry = &input.profile.experience[selection.versatile];

        let (first, second) = tokio::try_join!(
            self.write(SectionName::Experience1, preferred_entry, &input),
            self.write(SectionName::Experience2, versatile_entry, &input),
        )?;

        let degradation = match (first.1, second.1) {
            (None, None) => None,
            (a, b) => Some(
                a.into_iter()
                    .chain(b)
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
        };

        info!(
            stage = %Self::NAME,
            preferred = %preferred_entry.title,
            versatile = %versatile_entry.title,
            fallbacks = selection.fallbacks.len(),
            "Experience stage complete"
        );

        Ok(ExperienceDraft {
            experience_1: first.0,
            experience_2: second.0,
            preferred: selected(selection.preferred, preferred_entry),
            versatile: selected(selection.versatile, versatile_entry),
            selection_fallbacks: selection.fallbacks,
            degradation,
        })
    }
}
