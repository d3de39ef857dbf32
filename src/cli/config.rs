//! Configuration management for ragbuddy
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.ragbuddy/config.toml

use crate::errors::{PipelineError, Result};
use crate::llm::client::{Credentials, DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_MODEL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete configuration for ragbuddy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub pipeline: PipelineConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Language model back-end configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub planner_temperature: f32,
    pub synthesizer_temperature: f32,
    pub request_timeout_secs: u64,
}

/// Vector store and retrieval configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub qdrant_url: String,
    pub collection: String,
    pub top_k: usize,
    pub score_threshold: f32,
    /// Document ingested when the collection does not exist yet
    pub source_document: PathBuf,
}

/// Orchestration policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Per-stage timeout; unset means no timeout
    pub stage_timeout_secs: Option<u64>,
    /// Drop answer sentences without a verified citation
    pub enforce_citations: bool,
}

/// Session scoping identifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

/// Log output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Shared append-only log file; unset disables file logging
    pub file: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            planner_temperature: 0.0,
            synthesizer_temperature: 0.2,
            request_timeout_secs: 60,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            qdrant_url: "http://localhost:6334".to_string(),
            collection: "aws_rag_guide".to_string(),
            top_k: 4,
            score_threshold: 0.3,
            source_document: PathBuf::from("rag_pdf.pdf"),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_base_delay_ms: 1000,
            stage_timeout_secs: None,
            enforce_citations: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            app_name: "aws_rag_agent_team".to_string(),
            user_id: "user_001".to_string(),
            session_id: "session_001".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some(PathBuf::from("agent_system.log")),
        }
    }
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(config_path) => Self::load_from_file(config_path),
            None => Self::load_default(),
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| PipelineError::Configuration(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    /// Standard config location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".ragbuddy").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.llm.base_url.trim().is_empty() {
            return Err(PipelineError::Configuration("llm.base_url must not be empty".to_string()));
        }

        if self.llm.model.trim().is_empty() {
            return Err(PipelineError::Configuration("llm.model must not be empty".to_string()));
        }

        if self.llm.api_key_env.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "llm.api_key_env must name an environment variable".to_string(),
            ));
        }

        for (name, value) in [
            ("llm.planner_temperature", self.llm.planner_temperature),
            ("llm.synthesizer_temperature", self.llm.synthesizer_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(PipelineError::Configuration(format!(
                    "{} must be between 0.0 and 2.0",
                    name
                )));
            }
        }

        if self.llm.request_timeout_secs == 0 {
            return Err(PipelineError::Configuration(
                "llm.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(PipelineError::Configuration(
                "retrieval.top_k must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.retrieval.score_threshold) {
            return Err(PipelineError::Configuration(
                "retrieval.score_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.retrieval.collection.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "retrieval.collection must not be empty".to_string(),
            ));
        }

        if self.pipeline.stage_timeout_secs == Some(0) {
            return Err(PipelineError::Configuration(
                "pipeline.stage_timeout_secs must be greater than 0 when set".to_string(),
            ));
        }

        for (name, value) in [
            ("session.app_name", &self.session.app_name),
            ("session.user_id", &self.session.user_id),
            ("session.session_id", &self.session.session_id),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::Configuration(format!("{} must not be empty", name)));
            }
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(PipelineError::Configuration(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        Ok(())
    }

    /// API key named by `llm.api_key_env`; absence is a configuration error
    pub fn credentials(&self) -> Result<Credentials> {
        Credentials::from_env(&self.llm.api_key_env)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Configuration(format!("Failed to serialize config: {}", e)))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::Configuration(format!("Failed to create config dir: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| PipelineError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.llm.model, "llama-3.3-70b-versatile");
        assert_eq!(config.llm.api_key_env, "GROQ_API_KEY");
        assert_eq!(config.pipeline.max_retries, 0);
        assert!(config.pipeline.stage_timeout().is_none());
        assert_eq!(config.session.session_id, "session_001");
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_top_k() {
        let mut config = Config::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_threshold() {
        let mut config = Config::default();
        config.retrieval.score_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_config_validation_blank_session_id() {
        let mut config = Config::default();
        config.session.session_id = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_credentials_are_configuration_error() {
        let mut config = Config::default();
        config.llm.api_key_env = "RAGBUDDY_TEST_ABSENT_CONFIG_KEY".to_string();
        assert!(config.credentials().unwrap_err().is_configuration());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[llm]\nmodel = \"llama-3.1-8b-instant\"\n\n[pipeline]\nmax_retries = 2\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.llm.model, "llama-3.1-8b-instant");
        assert_eq!(config.llm.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.pipeline.max_retries, 2);
        assert_eq!(config.retrieval, RetrievalConfig::default());
    }

    #[test]
    fn test_invalid_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retrieval]\ntop_k = \"many\"\n").unwrap();

        assert!(Config::load(Some(&path)).unwrap_err().is_configuration());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.pipeline.stage_timeout_secs = Some(45);
        config.save(&path).unwrap();

        assert_eq!(Config::load_from_file(&path).unwrap(), config);
    }
}
