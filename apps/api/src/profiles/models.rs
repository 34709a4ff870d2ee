use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category tags an experience entry may carry. The set is fixed: selection
/// logic in the experience stage keys off these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceTag {
    AlgorithmResearch,
    /// Satisfies both classification outcomes.
    AgentDevelopment,
    #[serde(alias = "news_dashboard")]
    ProductDelivery,
    General,
}

impl ExperienceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceTag::AlgorithmResearch => "algorithm_research",
            ExperienceTag::AgentDevelopment => "agent_development",
            ExperienceTag::ProductDelivery => "product_delivery",
            ExperienceTag::General => "general",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    pub title: String,
    pub organization: String,
    pub period: String,
    pub description: String,
    pub tags: Vec<ExperienceTag>,
}

impl ExperienceEntry {
    pub fn has_tag(&self, tag: ExperienceTag) -> bool {
        self.tags.contains(&tag)
    }
}

/// Structured resume data. `experience` is ordered most recent first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    /// Free-text statement of why the candidate wants this kind of role.
    #[serde(default)]
    pub motivation: Option<String>,
    #[serde(default)]
    pub skills: BTreeSet<String>,
    #[serde(default)]
    pub experience: Vec<ExperienceEntry>,
}

impl CandidateProfile {
    /// Checks the fields the store requires before persisting a profile.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name cannot be empty".to_string());
        }
        for (i, entry) in self.experience.iter().enumerate() {
            if entry.title.trim().is_empty() {
                return Err(format!("experience[{i}].title cannot be empty"));
            }
            if entry.tags.is_empty() {
                return Err(format!("experience[{i}] must carry at least one tag"));
            }
        }
        Ok(())
    }
}

/// Index row listed by the profile API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_default: bool,
}
