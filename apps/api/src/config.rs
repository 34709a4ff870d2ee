use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::pipeline::policy::StagePolicy;
use crate::pipeline::PipelineConfig;
use crate::search_client::DEFAULT_SEARCH_URL;

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm_api_key: String,
    pub llm_api_base: String,
    pub llm_model: String,
    pub search_api_url: String,
    pub profiles_dir: PathBuf,
    pub output_dir: PathBuf,
    /// `None` disables the DOCX upgrade.
    pub pandoc_path: Option<PathBuf>,
    pub run_deadline: Duration,
    pub lookup_timeout: Duration,
    pub generation_timeout: Duration,
    pub conversion_timeout: Duration,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            llm_api_key: require_env("LLM_API_KEY")?,
            llm_api_base: env_or("LLM_API_BASE", "https://api.openai.com/v1"),
            llm_model: env_or("LLM_MODEL", "gpt-4.1-mini"),
            search_api_url: env_or("SEARCH_API_URL", DEFAULT_SEARCH_URL),
            profiles_dir: PathBuf::from(env_or("PROFILES_DIR", "profiles")),
            output_dir: PathBuf::from(env_or("OUTPUT_DIR", "generated_letters")),
            pandoc_path: optional_path(&env_or("PANDOC_PATH", "pandoc")),
            run_deadline: env_secs("RUN_DEADLINE_SECS", 180)?,
            lookup_timeout: env_secs("LOOKUP_TIMEOUT_SECS", 10)?,
            generation_timeout: env_secs("GENERATION_TIMEOUT_SECS", 60)?,
            conversion_timeout: env_secs("CONVERSION_TIMEOUT_SECS", 30)?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Stage policies with the configured per-call timeouts applied.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            research_policy: StagePolicy::research_default()
                .with_call_timeout(self.generation_timeout),
            lookup_policy: StagePolicy::research_default().with_call_timeout(self.lookup_timeout),
            experience_policy: StagePolicy::experience_default()
                .with_call_timeout(self.generation_timeout),
            run_deadline: self.run_deadline,
            conversion_timeout: self.conversion_timeout,
            ..PipelineConfig::default()
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_secs(key: &str, default: u64) -> Result<Duration> {
    match std::env::var(key) {
        Ok(raw) => parse_secs(key, &raw),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration> {
    let secs = raw
        .trim()
        .parse::<u64>()
        .with_context(|| format!("{key} must be a whole number of seconds"))?;
    anyhow::ensure!(secs > 0, "{key} must be greater than zero");
    Ok(Duration::from_secs(secs))
}

fn optional_path(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}
