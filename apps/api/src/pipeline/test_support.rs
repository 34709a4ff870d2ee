//! In-memory fakes for every external port, shared by the pipeline tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};

use crate::pipeline::assembly::{assemble, AssemblyContext};
use crate::pipeline::models::{
    ArtifactFormat, AssembledLetter, JobPosting, LetterHeader, MediaKind, SectionDraft,
    SectionName,
};
use crate::pipeline::ports::{
    ConversionError, FormatConverter, InformationSource, ServiceError, TextGenerator,
};
use crate::pipeline::text_bounds::LengthBounds;
use crate::pipeline::writers::{LetterWriter, WriteError};
use crate::profiles::models::{CandidateProfile, ExperienceEntry, ExperienceTag};

/// Neutral text appended to test descriptions so they pass intake validation
/// without matching either lexicon.
const DESCRIPTION_PADDING: &str =
    "Applicants should enjoy clear written communication across several offices.";

pub fn posting(title: &str, description: &str) -> JobPosting {
    JobPosting::new("Acme", title, format!("{description}. {DESCRIPTION_PADDING}"))
}

pub fn entry(title: &str, tags: &[ExperienceTag]) -> ExperienceEntry {
    ExperienceEntry {
        title: title.to_string(),
        organization: format!("{title} Org"),
        period: "2022 - 2024".to_string(),
        description: format!("Led the {title} work and measured its impact."),
        tags: tags.to_vec(),
    }
}

pub fn profile(experience: Vec<ExperienceEntry>) -> CandidateProfile {
    CandidateProfile {
        name: "Jordan Reyes".to_string(),
        email: "jordan@example.com".to_string(),
        phone: "+1 555 0100".to_string(),
        motivation: Some("building tools that people rely on every day".to_string()),
        skills: BTreeSet::from(["Rust".to_string(), "Python".to_string()]),
        experience,
    }
}

/// A profile with one entry per tag, most recent first.
pub fn sample_profile() -> CandidateProfile {
    profile(vec![
        entry("Agent Platform Engineer", &[ExperienceTag::AgentDevelopment]),
        entry("Research Engineer", &[ExperienceTag::AlgorithmResearch]),
        entry("Product Engineer", &[ExperienceTag::ProductDelivery]),
        entry("Teaching Assistant", &[ExperienceTag::General]),
    ])
}

/// A valid five-paragraph letter for Acme.
pub fn sample_letter() -> AssembledLetter {
    let research = [
        SectionDraft::new(SectionName::Opening, "I am applying for the Engineer role at Acme."),
        SectionDraft::new(SectionName::Closing, "Thank you for your time and consideration."),
    ];
    let experience = [
        SectionDraft::new(SectionName::Experience1, "I shipped a search product to analysts."),
        SectionDraft::new(SectionName::Experience2, "I built planning agents for operations."),
    ];
    let context = AssemblyContext {
        header: LetterHeader {
            candidate_name: "Jordan Reyes".to_string(),
            email: "jordan@example.com".to_string(),
            phone: "+1 555 0100".to_string(),
            company_name: "Acme".to_string(),
            job_title: "Engineer".to_string(),
        },
        motivation: None,
        generated_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
    };
    assemble(&research, &experience, &context, &LengthBounds::default()).unwrap()
}

type GenerateFn = dyn Fn(&str, &str, usize) -> Result<String, ServiceError> + Send + Sync;

/// Text generator backed by a closure. Records call count and prompts.
pub struct FnGenerator {
    respond: Box<GenerateFn>,
    calls: Arc<AtomicU32>,
    prompts: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

impl FnGenerator {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&str, &str, usize) -> Result<String, ServiceError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            calls: Arc::new(AtomicU32::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    pub fn constant(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_, _, _| Ok(text.clone()))
    }

    pub fn failing(error: ServiceError) -> Self {
        Self::new(move |_, _, _| Err(error.clone()))
    }

    /// Returns the responses in order, repeating the last one.
    pub fn sequence(responses: Vec<Result<String, ServiceError>>) -> Self {
        let cursor = AtomicU32::new(0);
        Self::new(move |_, _, _| {
            let i = cursor.fetch_add(1, Ordering::SeqCst) as usize;
            let i = i.min(responses.len().saturating_sub(1));
            responses
                .get(i)
                .cloned()
                .unwrap_or_else(|| Ok(String::new()))
        })
    }

    /// Answers every research and experience prompt with a valid, distinct section.
    pub fn well_behaved() -> Self {
        Self::new(|_, prompt, _| {
            if let Some(role) = prompt.lines().find_map(|l| l.strip_prefix("ROLE: ")) {
                Ok(format!(
                    r#"{{"paragraph": "In my time as {role} I shipped measurable improvements."}}"#
                ))
            } else {
                Ok(r#"{"opening": "I am excited to apply for this position.", "closing": "Thank you for your time and consideration."}"#.to_string())
            }
        })
    }

    /// Sleeps for `delay` before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Arc<AtomicU32> {
        self.calls.clone()
    }

    pub fn prompts(&self) -> Arc<Mutex<Vec<String>>> {
        self.prompts.clone()
    }
}

#[async_trait]
impl TextGenerator for FnGenerator {
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        max_words: usize,
    ) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(system, prompt, max_words)
    }
}

pub enum FakeSource {
    Found(String),
    NotFound,
    Failing,
}

impl FakeSource {
    pub fn found(text: &str) -> Self {
        FakeSource::Found(text.to_string())
    }

    pub fn not_found() -> Self {
        FakeSource::NotFound
    }

    pub fn failing() -> Self {
        FakeSource::Failing
    }
}

#[async_trait]
impl InformationSource for FakeSource {
    async fn lookup(&self, _company_name: &str) -> Result<Option<String>, ServiceError> {
        match self {
            FakeSource::Found(text) => Ok(Some(text.clone())),
            FakeSource::NotFound => Ok(None),
            FakeSource::Failing => Err(ServiceError::Provider {
                message: "search backend unreachable".to_string(),
                transient: true,
            }),
        }
    }
}

pub enum FakeConverter {
    Unavailable,
    Failing,
    Working,
}

#[async_trait]
impl FormatConverter for FakeConverter {
    async fn convert(&self, markdown: &str) -> Result<Bytes, ConversionError> {
        match self {
            FakeConverter::Unavailable => {
                Err(ConversionError::Unavailable("pandoc not installed".to_string()))
            }
            FakeConverter::Failing => Err(ConversionError::Failed("exit status 1".to_string())),
            FakeConverter::Working => Ok(Bytes::from(format!("DOCX:{markdown}"))),
        }
    }
}

/// Writer that always fails, standing in for a broken rich renderer.
pub struct FailingWriter {
    pub format: ArtifactFormat,
    pub media: MediaKind,
}

impl LetterWriter for FailingWriter {
    fn format(&self) -> ArtifactFormat {
        self.format
    }

    fn media(&self) -> MediaKind {
        self.media
    }

    fn write(&self, _letter: &AssembledLetter) -> Result<Bytes, WriteError> {
        Err(WriteError::Backend("font table corrupted".to_string()))
    }
}
