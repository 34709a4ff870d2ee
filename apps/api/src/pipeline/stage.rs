//! The shared stage interface. The set of stages is closed: every stage the
//! orchestrator composes is named in `StageName`.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::pipeline::errors::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Input checks performed by the orchestrator before any stage runs.
    Intake,
    Classifier,
    Research,
    Experience,
    Assembly,
    Render,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Intake => "intake",
            StageName::Classifier => "classifier",
            StageName::Research => "research",
            StageName::Experience => "experience",
            StageName::Assembly => "assembly",
            StageName::Render => "render",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of the pipeline: a single input/output contract with its own
/// failure policy. Inputs are owned snapshots; stages never share mutable state.
#[async_trait]
pub trait Stage: Send + Sync {
    type Input: Send + 'static;
    type Output: Send;

    const NAME: StageName;

    async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names_serialize_snake_case() {
        let json = serde_json::to_string(&StageName::Experience).unwrap();
        assert_eq!(json, r#""experience""#);
        assert_eq!(StageName::Render.to_string(), "render");
    }
}
