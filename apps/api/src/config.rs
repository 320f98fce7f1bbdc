use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

const DEFAULT_EMBEDDING_API_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or tuning values are out of range.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// Without a key the text-generation capability is unavailable and the Coach degrades.
    pub anthropic_api_key: Option<String>,
    /// Without a key the deterministic local hashing embedder is used.
    pub embedding_api_key: Option<String>,
    pub embedding_api_url: String,
    pub embedding_model: String,
    pub competency_dataset_path: PathBuf,
    pub competency_snapshot_path: Option<PathBuf>,
    pub question_bank_path: Option<PathBuf>,
    pub star_guide_path: Option<PathBuf>,
    /// Sessions untouched for this long are discarded.
    pub session_idle_ttl: Duration,
    pub coaching: CoachingConfig,
}

/// Tuning knobs for the critique pipeline. Calibrated values, not magic constants.
#[derive(Debug, Clone)]
pub struct CoachingConfig {
    /// τ: an entry is covered when similarity is strictly greater than this.
    pub coverage_threshold: f32,
    /// A rubric component is present when its cue confidence reaches this.
    pub rubric_presence_threshold: f32,
    /// Sampling temperature for the Coach rewrite step.
    pub coach_temperature: f32,
    /// Ceiling for one turn; past it the turn returns partial findings.
    pub latency_budget: Duration,
    pub max_answer_chars: usize,
}

impl Default for CoachingConfig {
    fn default() -> Self {
        Self {
            coverage_threshold: 0.45,
            rubric_presence_threshold: 0.5,
            coach_temperature: 0.2,
            latency_budget: Duration::from_millis(8000),
            max_answer_chars: 5000,
        }
    }
}

impl CoachingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.coverage_threshold > 0.0 && self.coverage_threshold < 1.0) {
            bail!(
                "COVERAGE_THRESHOLD must lie strictly between 0 and 1 (got {})",
                self.coverage_threshold
            );
        }
        if !(0.0..=1.0).contains(&self.rubric_presence_threshold) {
            bail!(
                "RUBRIC_PRESENCE_THRESHOLD must lie between 0 and 1 (got {})",
                self.rubric_presence_threshold
            );
        }
        if !(0.0..=1.0).contains(&self.coach_temperature) {
            bail!(
                "COACH_TEMPERATURE must lie between 0 and 1 (got {})",
                self.coach_temperature
            );
        }
        if self.latency_budget.is_zero() {
            bail!("LATENCY_BUDGET_MS must be greater than zero");
        }
        if self.max_answer_chars == 0 {
            bail!("MAX_ANSWER_CHARS must be greater than zero");
        }
        Ok(())
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let coaching = CoachingConfig {
            coverage_threshold: parse_env("COVERAGE_THRESHOLD", 0.45)?,
            rubric_presence_threshold: parse_env("RUBRIC_PRESENCE_THRESHOLD", 0.5)?,
            coach_temperature: parse_env("COACH_TEMPERATURE", 0.2)?,
            latency_budget: Duration::from_millis(parse_env("LATENCY_BUDGET_MS", 8000)?),
            max_answer_chars: parse_env("MAX_ANSWER_CHARS", 5000)?,
        };
        coaching.validate()?;

        let session_idle_ttl = Duration::from_secs(parse_env("SESSION_IDLE_TTL_SECS", 3600)?);
        if session_idle_ttl.is_zero() {
            bail!("SESSION_IDLE_TTL_SECS must be greater than zero");
        }

        Ok(Config {
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            embedding_api_key: optional_env("EMBEDDING_API_KEY"),
            embedding_api_url: optional_env("EMBEDDING_API_URL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_API_URL.to_string()),
            embedding_model: optional_env("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            competency_dataset_path: require_env("COMPETENCY_DATASET_PATH")?.into(),
            competency_snapshot_path: optional_env("COMPETENCY_SNAPSHOT_PATH").map(PathBuf::from),
            question_bank_path: optional_env("QUESTION_BANK_PATH").map(PathBuf::from),
            star_guide_path: optional_env("STAR_GUIDE_PATH").map(PathBuf::from),
            session_idle_ttl,
            coaching,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and blank values are both treated as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_coaching_config_is_valid() {
        assert!(CoachingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_threshold_of_one_is_rejected() {
        let cfg = CoachingConfig {
            coverage_threshold: 1.0,
            ..CoachingConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_latency_budget_is_rejected() {
        let cfg = CoachingConfig {
            latency_budget: Duration::ZERO,
            ..CoachingConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_out_of_range_temperature_is_rejected() {
        let cfg = CoachingConfig {
            coach_temperature: 1.5,
            ..CoachingConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
