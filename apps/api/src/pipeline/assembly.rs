//! Assembly: joins the research and experience drafts into the five-paragraph letter.
//!
//! Pure and deterministic. Every failure here is a `StructuralViolation` because
//! upstream stages are responsible for producing well-formed drafts. Content
//! quality is never judged here, only shape and length.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::pipeline::errors::PipelineError;
use crate::pipeline::models::{
    AssembledLetter, LetterHeader, Paragraph, ParagraphSlot, SectionDraft, SectionName,
};
use crate::pipeline::stage::{Stage, StageName};
use crate::pipeline::text_bounds::{check_length, normalize, word_count, LengthBounds};

/// Run-level facts assembly needs besides the drafts.
#[derive(Debug, Clone)]
pub struct AssemblyContext {
    pub header: LetterHeader,
    pub motivation: Option<String>,
    /// Fixed by the orchestrator at run start.
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AssemblyInput {
    pub research: Vec<SectionDraft>,
    pub experience: Vec<SectionDraft>,
    pub context: AssemblyContext,
}

/// Builds the deterministic cultural-fit paragraph.
pub fn cultural_fit_paragraph(
    company_name: &str,
    job_title: &str,
    motivation: Option<&str>,
) -> String {
    let company = company_name.trim();
    let title = job_title.trim();
    match motivation.map(|m| m.trim().trim_end_matches('.')).filter(|m| !m.is_empty()) {
        Some(motivation) => format!(
            "What keeps me going in this field is {motivation}. The {title} role at \
            {company} is a direct way to act on that, and I would bring the same \
            commitment to the people I work with there."
        ),
        None => format!(
            "The {title} role at {company} matches the direction I want my work to \
            take, and I would bring steady, careful effort to the people I work with there."
        ),
    }
}

fn take_one(
    drafts: &[SectionDraft],
    name: SectionName,
    source: StageName,
) -> Result<String, PipelineError> {
    let mut matching = drafts.iter().filter(|d| d.name() == name);
    let first = matching.next().ok_or_else(|| {
        PipelineError::StructuralViolation(format!(
            "required section '{name}' missing from {source} output"
        ))
    })?;
    if matching.next().is_some() {
        return Err(PipelineError::StructuralViolation(format!(
            "section '{name}' supplied more than once by {source}"
        )));
    }
    Ok(first.text().to_string())
}

fn expect_only(
    drafts: &[SectionDraft],
    allowed: &[SectionName],
    source: StageName,
) -> Result<(), PipelineError> {
    match drafts.iter().find(|d| !allowed.contains(&d.name())) {
        Some(stray) => Err(PipelineError::StructuralViolation(format!(
            "unexpected section '{}' in {source} output",
            stray.name()
        ))),
        None => Ok(()),
    }
}

/// Validates the drafts and produces the letter. Identical inputs give identical output.
pub fn assemble(
    research: &[SectionDraft],
    experience: &[SectionDraft],
    context: &AssemblyContext,
    bounds: &LengthBounds,
) -> Result<AssembledLetter, PipelineError> {
    expect_only(
        research,
        &[SectionName::Opening, SectionName::Closing],
        StageName::Research,
    )?;
    expect_only(
        experience,
        &[SectionName::Experience1, SectionName::Experience2],
        StageName::Experience,
    )?;

    let opening = take_one(research, SectionName::Opening, StageName::Research)?;
    let closing = take_one(research, SectionName::Closing, StageName::Research)?;
    let experience_1 = take_one(experience, SectionName::Experience1, StageName::Experience)?;
    let experience_2 = take_one(experience, SectionName::Experience2, StageName::Experience)?;

    let mut cultural_fit = cultural_fit_paragraph(
        &context.header.company_name,
        &context.header.job_title,
        context.motivation.as_deref(),
    );
    if word_count(&cultural_fit) > bounds.opening_closing_words {
        cultural_fit = cultural_fit_paragraph(
            &context.header.company_name,
            &context.header.job_title,
            None,
        );
    }

    let texts = [opening, experience_1, experience_2, cultural_fit, closing];

    for (slot, text) in ParagraphSlot::ORDER.iter().zip(&texts) {
        let max = match slot {
            ParagraphSlot::Experience1 | ParagraphSlot::Experience2 => bounds.experience_words,
            _ => bounds.opening_closing_words,
        };
        check_length(text, max).map_err(|r| {
            PipelineError::StructuralViolation(format!("paragraph {slot:?} out of bounds: {r}"))
        })?;
    }

    let normalized: Vec<String> = texts.iter().map(|t| normalize(t)).collect();
    for i in 0..normalized.len() {
        for j in (i + 1)..normalized.len() {
            if normalized[i] == normalized[j] {
                return Err(PipelineError::StructuralViolation(format!(
                    "paragraphs {:?} and {:?} have identical content",
                    ParagraphSlot::ORDER[i],
                    ParagraphSlot::ORDER[j]
                )));
            }
        }
    }

    let total_words: usize = texts.iter().map(|t| word_count(t)).sum();
    let [p0, p1, p2, p3, p4] = texts;
    let [s0, s1, s2, s3, s4] = ParagraphSlot::ORDER;
    let paragraphs = [
        Paragraph { slot: s0, text: p0 },
        Paragraph { slot: s1, text: p1 },
        Paragraph { slot: s2, text: p2 },
        Paragraph { slot: s3, text: p3 },
        Paragraph { slot: s4, text: p4 },
    ];

    Ok(AssembledLetter {
        header: context.header.clone(),
        paragraphs,
        word_count: total_words,
        generated_at: context.generated_at,
    })
}

pub struct AssemblyStage {
    bounds: LengthBounds,
}

impl AssemblyStage {
    pub fn new(bounds: LengthBounds) -> Self {
        Self { bounds }
    }
}

#[async_trait]
impl Stage for AssemblyStage {
    type Input = AssemblyInput;
    type Output = AssembledLetter;

    const NAME: StageName = StageName::Assembly;

    async fn run(&self, input: AssemblyInput) -> Result<AssembledLetter, PipelineError> {
        let letter = assemble(
            &input.research,
            &input.experience,
            &input.context,
            &self.bounds,
        )?;
        info!(stage = %Self::NAME, word_count = letter.word_count, "Letter assembled");
        Ok(letter)
    }
}
