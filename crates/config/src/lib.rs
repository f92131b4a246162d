use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Hard ceiling on follow-ups per main question.  Configuration may lower
/// the effective cap but can never raise it; `validate` clamps upward
/// attempts back down.
const FOLLOWUP_HARD_CAP: u8 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight of the semantic channel in the overall score.
    pub theoretical_weight: f64,
    /// Weight of the acoustic channel; must sum to 1.0 with
    /// `theoretical_weight`.
    pub speaking_weight: f64,
    /// Similarity at or above which no follow-up is asked.
    pub similarity_quality_threshold: f64,
    /// Speaking average reported when no answer carried voice metrics.
    pub speaking_default_when_absent: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            theoretical_weight: 0.7,
            speaking_weight: 0.3,
            similarity_quality_threshold: 0.8,
            speaking_default_when_absent: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowupConfig {
    pub max_per_question: u8,
    pub max_per_interview: u32,
}

impl Default for FollowupConfig {
    fn default() -> Self {
        Self {
            max_per_question: FOLLOWUP_HARD_CAP,
            max_per_interview: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub turn_deadline_seconds: u64,
    pub stt_seconds: u64,
    pub llm_seconds: u64,
    /// Deadline for the summary recommendation call, which is allowed to run
    /// longer than per-answer evaluation.
    pub llm_summary_seconds: u64,
    pub tts_seconds: u64,
    pub vector_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            turn_deadline_seconds: 30,
            stt_seconds: 10,
            llm_seconds: 15,
            llm_summary_seconds: 20,
            tts_seconds: 5,
            vector_seconds: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Swap every external adapter for its deterministic mock.  Dev/test
    /// only.
    pub use_mock_adapters: bool,
    pub llm_base_url: String,
    pub llm_model: String,
    /// Name of the environment variable holding the LLM API key.  The key
    /// itself never appears in config files.
    pub llm_api_key_env: String,
    pub stt_base_url: String,
    pub stt_language: String,
    pub tts_base_url: String,
    pub tts_voice: String,
    pub tts_speed: f64,
    pub embeddings_base_url: String,
    pub embeddings_model: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            use_mock_adapters: false,
            llm_base_url: "https://openrouter.ai/api/v1".to_string(),
            llm_model: "openai/gpt-4o-mini".to_string(),
            llm_api_key_env: "VIVA_LLM_API_KEY".to_string(),
            stt_base_url: "http://localhost:9001".to_string(),
            stt_language: "en".to_string(),
            tts_base_url: "http://localhost:9002".to_string(),
            tts_voice: "default".to_string(),
            tts_speed: 1.0,
            embeddings_base_url: "http://localhost:11434".to_string(),
            embeddings_model: "nomic-embed-text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8700".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Append-only journal the store replays at startup.  Empty disables
    /// durability (tests).
    pub journal_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            journal_path: ".viva/journal.jsonl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scoring: ScoringConfig,
    pub followups: FollowupConfig,
    pub timeouts: TimeoutConfig,
    pub adapters: AdapterConfig,
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load from a TOML file, falling back to defaults when the file does
    /// not exist.  Always validates before returning.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(value) = env::var("VIVA_USE_MOCK_ADAPTERS") {
            if !value.is_empty() && value != "0" {
                config.adapters.use_mock_adapters = true;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// Enforce cross-field constraints, clamping where the domain allows it
    /// and failing where it does not.
    pub fn validate(&mut self) -> Result<()> {
        let weight_sum = self.scoring.theoretical_weight + self.scoring.speaking_weight;
        if (weight_sum - 1.0).abs() > 1e-9 {
            bail!(
                "scoring weights must sum to 1.0 (theoretical {} + speaking {} = {weight_sum})",
                self.scoring.theoretical_weight,
                self.scoring.speaking_weight,
            );
        }
        if !(0.0..=1.0).contains(&self.scoring.similarity_quality_threshold) {
            bail!(
                "similarity_quality_threshold must be within [0, 1], got {}",
                self.scoring.similarity_quality_threshold
            );
        }
        if self.followups.max_per_question > FOLLOWUP_HARD_CAP {
            warn!(
                configured = self.followups.max_per_question,
                cap = FOLLOWUP_HARD_CAP,
                "followups.max_per_question exceeds the domain cap; clamping"
            );
            self.followups.max_per_question = FOLLOWUP_HARD_CAP;
        }
        if self.followups.max_per_question == 0 {
            bail!("followups.max_per_question must be at least 1");
        }
        self.adapters.tts_speed = self.adapters.tts_speed.clamp(0.5, 2.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let mut config = AppConfig::default();
        config.validate().expect("default config must be valid");
        assert_eq!(config.scoring.theoretical_weight, 0.7);
        assert_eq!(config.followups.max_per_question, 3);
    }

    #[test]
    fn mismatched_weights_are_rejected() {
        let mut config = AppConfig::default();
        config.scoring.speaking_weight = 0.4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn followup_cap_cannot_be_raised_past_the_domain_limit() {
        let mut config = AppConfig::default();
        config.followups.max_per_question = 9;
        config.validate().unwrap();
        assert_eq!(config.followups.max_per_question, 3);
    }

    #[test]
    fn tts_speed_is_clamped() {
        let mut config = AppConfig::default();
        config.adapters.tts_speed = 5.0;
        config.validate().unwrap();
        assert_eq!(config.adapters.tts_speed, 2.0);
    }

    #[test]
    fn load_from_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:8700");
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.followups.max_per_interview = 9;
        config.adapters.use_mock_adapters = true;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.followups.max_per_interview, 9);
        assert!(loaded.adapters.use_mock_adapters);
    }
}
