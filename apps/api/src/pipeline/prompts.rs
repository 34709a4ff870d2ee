// Prompt constants for the generating stages.
// Templates carry `{placeholder}` markers filled with `str::replace` before sending.

use crate::pipeline::text_bounds::FILLER_DENYLIST;

/// System prompt for the research stage.
pub const RESEARCH_SYSTEM: &str =
    "You are a professional application-letter writer specialising in company research. \
    Write in sincere, specific, human English. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Research prompt. Replace `{company_name}`, `{job_title}`, `{job_description}`,
/// `{company_context}`, `{max_words}` and `{denylist}`.
pub const RESEARCH_PROMPT_TEMPLATE: &str = r#"Write the opening and closing paragraphs of an application letter.

COMPANY: {company_name}
POSITION: {job_title}

JOB DESCRIPTION:
{job_description}

COMPANY RESEARCH:
{company_context}

OPENING: state the position, show concrete knowledge of the company, and give one
sentence on why the candidate is drawn to this role.
CLOSING: restate interest, thank the reader, and ask for a conversation.

Rules:
- Each paragraph is at most {max_words} words.
- Never use any of these phrases: {denylist}.
- Do not invent facts about the company that the research does not support.

Return exactly this JSON shape:
{"opening": "...", "closing": "..."}"#;

/// Used when the information source had nothing for the company.
pub const NO_COMPANY_CONTEXT: &str =
    "No research available. Refer to the company only by name and the position.";

/// System prompt for the experience stage.
pub const EXPERIENCE_SYSTEM: &str =
    "You are a professional application-letter writer specialising in matching \
    a candidate's experience to a job. Describe what the candidate did, how, and \
    with what result, using only the facts supplied. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Experience prompt. Replace `{company_name}`, `{job_title}`, `{entry_title}`,
/// `{entry_organization}`, `{entry_period}`, `{entry_description}`, `{focus}`,
/// `{shared_keywords}`, `{max_words}` and `{denylist}`.
pub const EXPERIENCE_PROMPT_TEMPLATE: &str = r#"Write one paragraph of an application letter for the {job_title} position at {company_name}.

ROLE: {entry_title} at {entry_organization}
PERIOD: {entry_period}
DESCRIPTION:
{entry_description}

FOCUS: {focus}
KEYWORDS SHARED WITH THE POSTING: {shared_keywords}

Rules:
- First person, past tense for past roles.
- Prefer the shared keywords where they are true to the description.
- At most {max_words} words.
- Never use any of these phrases: {denylist}.

Return exactly this JSON shape:
{"paragraph": "..."}"#;

/// Appended to a prompt when the previous output was rejected. Replace `{reason}`.
pub const REJECTION_FEEDBACK: &str = "\n\nYour previous answer was rejected: {reason}. \
    Fix this and answer again with the same JSON shape.";

/// Denylist rendered for inclusion in prompts.
pub fn denylist_clause() -> String {
    FILLER_DENYLIST
        .iter()
        .map(|p| format!("\"{p}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn with_rejection(prompt: &str, reason: &str) -> String {
    format!("{prompt}{}", REJECTION_FEEDBACK.replace("{reason}", reason))
}
