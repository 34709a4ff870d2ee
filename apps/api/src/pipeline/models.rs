//! Run-scoped data model for the letter pipeline.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::errors::PipelineError;
use crate::pipeline::stage::StageName;
use crate::pipeline::text_bounds::word_count;
use crate::profiles::models::ExperienceTag;

/// Minimum job description length accepted at intake.
pub const MIN_DESCRIPTION_CHARS: usize = 50;

// ────────────────────────────────────────────────────────────────────────────
// Inputs
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    pub company_name: String,
    pub job_title: String,
    pub description: String,
}

impl JobPosting {
    pub fn new(
        company_name: impl Into<String>,
        job_title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            company_name: company_name.into(),
            job_title: job_title.into(),
            description: description.into(),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.company_name.trim().is_empty() {
            return Err(PipelineError::Validation(
                "company_name cannot be empty".to_string(),
            ));
        }
        if self.job_title.trim().is_empty() {
            return Err(PipelineError::Validation(
                "job_title cannot be empty".to_string(),
            ));
        }
        let len = self.description.trim().chars().count();
        if len < MIN_DESCRIPTION_CHARS {
            return Err(PipelineError::Validation(format!(
                "job_description must be at least {MIN_DESCRIPTION_CHARS} characters (got {len})"
            )));
        }
        Ok(())
    }

    /// Title and description joined, as scored by the classifier.
    pub fn scoring_text(&self) -> String {
        format!("{} {}", self.job_title, self.description)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Classification
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyType {
    TechnicalResearch,
    Product,
}

impl CompanyType {
    /// The experience tag preferred for the second selected entry.
    pub fn preferred_tag(&self) -> ExperienceTag {
        match self {
            CompanyType::TechnicalResearch => ExperienceTag::AlgorithmResearch,
            CompanyType::Product => ExperienceTag::ProductDelivery,
        }
    }
}

impl fmt::Display for CompanyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompanyType::TechnicalResearch => f.write_str("technical_research"),
            CompanyType::Product => f.write_str("product"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub label: CompanyType,
    pub research_score: u32,
    pub product_score: u32,
    pub research_terms: Vec<String>,
    pub product_terms: Vec<String>,
    /// True when the scores were equal and the default label was applied.
    pub tie_break: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Section drafts
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionName {
    #[serde(rename = "opening")]
    Opening,
    #[serde(rename = "closing")]
    Closing,
    #[serde(rename = "experience_1")]
    Experience1,
    #[serde(rename = "experience_2")]
    Experience2,
}

impl SectionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionName::Opening => "opening",
            SectionName::Closing => "closing",
            SectionName::Experience1 => "experience_1",
            SectionName::Experience2 => "experience_2",
        }
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named text fragment. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionDraft {
    name: SectionName,
    text: String,
}

impl SectionDraft {
    pub fn new(name: SectionName, text: impl Into<String>) -> Self {
        Self {
            name,
            text: text.into().trim().to_string(),
        }
    }

    pub fn name(&self) -> SectionName {
        self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn word_count(&self) -> usize {
        word_count(&self.text)
    }
}

/// Output of the research stage.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchDraft {
    pub opening: SectionDraft,
    pub closing: SectionDraft,
    /// Whether the information source returned anything for the company.
    pub company_context_found: bool,
    /// Set when the drafts come from the static template.
    pub degradation: Option<String>,
}

impl ResearchDraft {
    pub fn sections(&self) -> Vec<SectionDraft> {
        vec![self.opening.clone(), self.closing.clone()]
    }
}

/// One experience entry chosen by the selection step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedEntry {
    /// Position in the profile's experience list (0 = most recent).
    pub index: usize,
    pub title: String,
    pub organization: String,
    pub tags: Vec<ExperienceTag>,
}

/// Output of the experience stage.
#[derive(Debug, Clone, Serialize)]
pub struct ExperienceDraft {
    pub experience_1: SectionDraft,
    pub experience_2: SectionDraft,
    /// Entry behind `experience_1` (label-preferred).
    pub preferred: SelectedEntry,
    /// Entry behind `experience_2` (versatile).
    pub versatile: SelectedEntry,
    /// Selection rules that could not be satisfied and the substitute used.
    pub selection_fallbacks: Vec<String>,
    pub degradation: Option<String>,
}

impl ExperienceDraft {
    pub fn sections(&self) -> Vec<SectionDraft> {
        vec![self.experience_1.clone(), self.experience_2.clone()]
    }

    pub fn selected_tags(&self) -> Vec<ExperienceTag> {
        let mut tags: Vec<ExperienceTag> = self
            .preferred
            .tags
            .iter()
            .chain(self.versatile.tags.iter())
            .copied()
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Assembled letter
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParagraphSlot {
    Opening,
    Experience1,
    Experience2,
    CulturalFit,
    Closing,
}

impl ParagraphSlot {
    /// The fixed paragraph order of every letter.
    pub const ORDER: [ParagraphSlot; 5] = [
        ParagraphSlot::Opening,
        ParagraphSlot::Experience1,
        ParagraphSlot::Experience2,
        ParagraphSlot::CulturalFit,
        ParagraphSlot::Closing,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paragraph {
    pub slot: ParagraphSlot,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LetterHeader {
    pub candidate_name: String,
    pub email: String,
    pub phone: String,
    pub company_name: String,
    pub job_title: String,
}

/// The five-paragraph letter. The array length is the paragraph-count invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssembledLetter {
    pub header: LetterHeader,
    pub paragraphs: [Paragraph; 5],
    pub word_count: usize,
    pub generated_at: DateTime<Utc>,
}

impl AssembledLetter {
    pub fn paragraph(&self, slot: ParagraphSlot) -> &str {
        // ORDER and `paragraphs` share indices
        let idx = ParagraphSlot::ORDER
            .iter()
            .position(|s| *s == slot)
            .unwrap_or_default();
        &self.paragraphs[idx].text
    }

    /// Paragraph texts separated by blank lines.
    pub fn body(&self) -> String {
        self.paragraphs
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rendered artifacts
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    Primary,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Pdf,
    Markdown,
    Docx,
}

impl MediaKind {
    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Pdf => "pdf",
            MediaKind::Markdown => "md",
            MediaKind::Docx => "docx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            MediaKind::Pdf => "application/pdf",
            MediaKind::Markdown => "text/markdown; charset=utf-8",
            MediaKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }

    pub fn from_file_name(file_name: &str) -> Option<Self> {
        match file_name.rsplit_once('.')?.1 {
            "pdf" => Some(MediaKind::Pdf),
            "md" => Some(MediaKind::Markdown),
            "docx" => Some(MediaKind::Docx),
            _ => None,
        }
    }
}

/// Retrieval key for a stored artifact: one directory per run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArtifactId {
    pub run_id: Uuid,
    pub file_name: String,
}

impl ArtifactId {
    /// Rejects names that could escape the run directory.
    pub fn new(run_id: Uuid, file_name: impl Into<String>) -> Result<Self, String> {
        let file_name = file_name.into();
        if file_name.is_empty()
            || file_name.starts_with('.')
            || file_name.contains(['/', '\\'])
            || file_name.contains("..")
        {
            return Err(format!("invalid artifact file name '{file_name}'"));
        }
        Ok(Self { run_id, file_name })
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.run_id, self.file_name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedArtifact {
    pub id: ArtifactId,
    pub format: ArtifactFormat,
    pub media: MediaKind,
    pub size_bytes: usize,
    #[serde(skip)]
    pub content: Bytes,
}

// ────────────────────────────────────────────────────────────────────────────
// Run report
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Degradation {
    pub stage: StageName,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub label: CompanyType,
    pub research_score: u32,
    pub product_score: u32,
    pub tie_break: bool,
    pub selected_tags: Vec<ExperienceTag>,
    pub selection_fallbacks: Vec<String>,
    pub degradations: Vec<Degradation>,
    pub stage_elapsed_ms: BTreeMap<StageName, u64>,
    pub total_elapsed_ms: u64,
}

impl RunReport {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    pub fn degraded_stages(&self) -> Vec<StageName> {
        let mut stages: Vec<StageName> = self.degradations.iter().map(|d| d.stage).collect();
        stages.dedup();
        stages
    }
}

/// Terminal success of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSuccess {
    pub letter: AssembledLetter,
    pub artifacts: Vec<RenderedArtifact>,
    pub report: RunReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(description: &str) -> JobPosting {
        JobPosting::new("Acme", "Engineer", description)
    }

    #[test]
    fn test_validate_rejects_short_description() {
        let err = posting("too short").validate().unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_blank_company() {
        let p = JobPosting::new(" ", "Engineer", "x".repeat(80));
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_minimum_length_description() {
        let p = posting(&"a".repeat(MIN_DESCRIPTION_CHARS));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_section_draft_trims_text() {
        let draft = SectionDraft::new(SectionName::Opening, "  Hello there.  ");
        assert_eq!(draft.text(), "Hello there.");
        assert_eq!(draft.word_count(), 2);
    }

    #[test]
    fn test_section_names_serialize_with_numeric_suffix() {
        assert_eq!(
            serde_json::to_string(&SectionName::Experience2).unwrap(),
            r#""experience_2""#
        );
    }

    #[test]
    fn test_artifact_id_rejects_traversal() {
        let run = Uuid::new_v4();
        assert!(ArtifactId::new(run, "../etc/passwd").is_err());
        assert!(ArtifactId::new(run, "a/b.pdf").is_err());
        assert!(ArtifactId::new(run, ".hidden").is_err());
        assert!(ArtifactId::new(run, "Letter_Acme.pdf").is_ok());
    }

    #[test]
    fn test_media_kind_from_file_name() {
        assert_eq!(MediaKind::from_file_name("a.pdf"), Some(MediaKind::Pdf));
        assert_eq!(MediaKind::from_file_name("a.md"), Some(MediaKind::Markdown));
        assert_eq!(MediaKind::from_file_name("a.docx"), Some(MediaKind::Docx));
        assert_eq!(MediaKind::from_file_name("a.txt"), None);
        assert_eq!(MediaKind::from_file_name("noext"), None);
    }

    #[test]
    fn test_preferred_tag_follows_label() {
        assert_eq!(
            CompanyType::TechnicalResearch.preferred_tag(),
            ExperienceTag::AlgorithmResearch
        );
        assert_eq!(
            CompanyType::Product.preferred_tag(),
            ExperienceTag::ProductDelivery
        );
    }
}
