use crate::error::{CmdbError, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Runtime settings for the service.
///
/// Loaded from an optional `config.toml` with environment-variable overrides.
/// The OpenAI API key is only ever read from the environment (`OPENAI_API_KEY`),
/// never from the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Storage backend selector. Only "memory" is built in; document-store
    /// drivers are wired up by the embedding application.
    pub database_type: String,
    /// Enable AI-assisted entity detection and field mapping.
    pub enable_ai_field_mapping: bool,
    /// Model used for classification, mapping and query translation.
    pub openai_model: String,
    /// Minimum confidence to accept an AI-proposed field mapping.
    pub mapping_confidence_floor: f64,
    /// Minimum confidence to accept an AI entity-type classification.
    pub classify_confidence_floor: f64,
    /// Upper bound on any single AI assist call, in seconds.
    pub assist_timeout_secs: u64,
    /// Optional path to a schema override file (JSON). Absent means builtin.
    pub schema_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_type: "memory".to_string(),
            enable_ai_field_mapping: false,
            openai_model: "gpt-4".to_string(),
            mapping_confidence_floor: 0.7,
            classify_confidence_floor: 0.6,
            assist_timeout_secs: 20,
            schema_path: None,
        }
    }
}

impl Settings {
    /// Load settings from `config.toml` (if present) and the environment.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::load_from("config.toml")
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let mut settings = match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => {
                return Err(CmdbError::Config(format!(
                    "failed to read config file '{}': {}",
                    path, e
                )))
            }
        };
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CMDB_DATABASE_TYPE") {
            self.database_type = v;
        }
        if let Ok(v) = std::env::var("CMDB_ENABLE_AI_FIELD_MAPPING") {
            self.enable_ai_field_mapping = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("CMDB_OPENAI_MODEL") {
            self.openai_model = v;
        }
        if let Ok(v) = std::env::var("CMDB_SCHEMA_PATH") {
            self.schema_path = Some(v);
        }
        if let Some(v) = parse_env("CMDB_MAPPING_CONFIDENCE_FLOOR") {
            self.mapping_confidence_floor = v;
        }
        if let Some(v) = parse_env("CMDB_CLASSIFY_CONFIDENCE_FLOOR") {
            self.classify_confidence_floor = v;
        }
        if let Some(v) = parse_env("CMDB_ASSIST_TIMEOUT_SECS") {
            self.assist_timeout_secs = v;
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("mapping_confidence_floor", self.mapping_confidence_floor),
            ("classify_confidence_floor", self.classify_confidence_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CmdbError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// API key for the OpenAI assist, if configured.
    pub fn openai_api_key(&self) -> Option<String> {
        std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())
    }

    pub fn assist_timeout(&self) -> Duration {
        Duration::from_secs(self.assist_timeout_secs)
    }
}

/// Numeric environment override; unset or unparsable values are ignored.
fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}
