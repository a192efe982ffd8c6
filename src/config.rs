//! Configuration module for experiment settings.
//!
//! Handles YAML configuration loading, environment overrides and the
//! startup validation that must pass before any model is called.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML configuration: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Base directory {0} does not exist")]
    MissingBaseDir(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("No models configured")]
    NoModels,
}

/// Experiment configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentConfig {
    /// Ollama server root URL
    #[serde(default = "default_base_url")]
    pub ollama_base_url: String,
    /// Models to evaluate, in order
    #[serde(default = "default_models")]
    pub llm_models: Vec<String>,
    /// Directory holding `data/` and the per-model data directories
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Question file name under `data/test/`
    #[serde(default = "default_test_file")]
    pub test_file: String,
    /// Paraphrases generated per question
    #[serde(default = "default_num_variants")]
    pub num_prompt_variants: usize,
    /// Where run reports and the experiment summary are written
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    /// Per-request timeout for model calls, in seconds
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_models() -> Vec<String> {
    vec!["qwen2.5:latest".to_string(), "llama3.2:latest".to_string()]
}
fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_test_file() -> String {
    "anatomy_test.csv".to_string()
}
const fn default_num_variants() -> usize {
    10
}
fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}
const fn default_timeout_secs() -> u64 {
    300
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            ollama_base_url: default_base_url(),
            llm_models: default_models(),
            base_dir: default_base_dir(),
            test_file: default_test_file(),
            num_prompt_variants: default_num_variants(),
            results_dir: default_results_dir(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

impl ExperimentConfig {
    /// Load configuration from YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load configuration from YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Build configuration from defaults plus process environment
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from environment-style variables.
    ///
    /// `lookup` maps a variable name to its value; recognised names are
    /// `OLLAMA_BASE_URL`, `LLM_MODELS` (comma separated), `BASE_DIR`,
    /// `TEST_FILE`, `NUM_PROMPT_VARIANTS` and `RESULTS_DIR`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `NUM_PROMPT_VARIANTS` is not a
    /// non-negative integer.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.ollama_base_url = url;
        }
        if let Some(models) = lookup("LLM_MODELS") {
            self.llm_models = parse_model_list(&models);
        }
        if let Some(dir) = lookup("BASE_DIR") {
            self.base_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("TEST_FILE") {
            self.test_file = file;
        }
        if let Some(raw) = lookup("NUM_PROMPT_VARIANTS") {
            self.num_prompt_variants =
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "NUM_PROMPT_VARIANTS".to_string(),
                        value: raw.clone(),
                    })?;
        }
        if let Some(dir) = lookup("RESULTS_DIR") {
            self.results_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Check startup prerequisites and create the results directory
    ///
    /// # Errors
    ///
    /// Returns an error if the base directory is missing, no models are
    /// configured, the variant count is zero, or the results directory
    /// cannot be created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_dir.exists() {
            return Err(ConfigError::MissingBaseDir(
                self.base_dir.display().to_string(),
            ));
        }
        if self.llm_models.is_empty() {
            return Err(ConfigError::NoModels);
        }
        if self.num_prompt_variants == 0 {
            return Err(ConfigError::InvalidValue {
                key: "num_prompt_variants".to_string(),
                value: "0".to_string(),
            });
        }
        std::fs::create_dir_all(&self.results_dir)?;
        Ok(())
    }

    /// Request timeout as a `Duration`
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Split a comma separated model list, dropping blanks
#[must_use]
pub fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_values() {
        let config = ExperimentConfig::default();
        assert_eq!(config.ollama_base_url, "http://localhost:11434");
        assert_eq!(config.llm_models, vec!["qwen2.5:latest", "llama3.2:latest"]);
        assert_eq!(config.base_dir, PathBuf::from("."));
        assert_eq!(config.test_file, "anatomy_test.csv");
        assert_eq!(config.num_prompt_variants, 10);
        assert_eq!(config.results_dir, PathBuf::from("results"));
        assert_eq!(config.request_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = ExperimentConfig::default();
        let yaml = serde_yaml::to_string(&config).expect("serialize");
        let parsed = ExperimentConfig::from_yaml(&yaml).expect("deserialize");
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r"
llm_models:
  - mistral:7b
num_prompt_variants: 3
";
        let config = ExperimentConfig::from_yaml(yaml).expect("parse yaml");
        assert_eq!(config.llm_models, vec!["mistral:7b"]);
        assert_eq!(config.num_prompt_variants, 3);
        // untouched fields fall back to defaults
        assert_eq!(config.test_file, "anatomy_test.csv");
        assert_eq!(config.request_timeout_secs, 300);
    }

    #[test]
    fn test_load_not_found() {
        let result = ExperimentConfig::load("/nonexistent/experiment.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_apply_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OLLAMA_BASE_URL", "http://gpu-box:11434"),
            ("LLM_MODELS", "phi3:mini, gemma2:2b ,"),
            ("TEST_FILE", "astronomy_test.csv"),
            ("NUM_PROMPT_VARIANTS", "5"),
            ("RESULTS_DIR", "out"),
        ]
        .into_iter()
        .collect();

        let mut config = ExperimentConfig::default();
        config
            .apply_env(|k| vars.get(k).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.ollama_base_url, "http://gpu-box:11434");
        assert_eq!(config.llm_models, vec!["phi3:mini", "gemma2:2b"]);
        assert_eq!(config.test_file, "astronomy_test.csv");
        assert_eq!(config.num_prompt_variants, 5);
        assert_eq!(config.results_dir, PathBuf::from("out"));
        assert_eq!(config.base_dir, PathBuf::from("."));
    }

    #[test]
    fn test_apply_env_invalid_count() {
        let mut config = ExperimentConfig::default();
        let result = config.apply_env(|k| {
            (k == "NUM_PROMPT_VARIANTS").then(|| "ten".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_validate_missing_base_dir() {
        let config = ExperimentConfig {
            base_dir: PathBuf::from("/nonexistent/base"),
            ..ExperimentConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingBaseDir(_)));
        assert!(err.to_string().contains("/nonexistent/base"));
    }

    #[test]
    fn test_validate_creates_results_dir() {
        let temp = tempfile::tempdir().unwrap();
        let config = ExperimentConfig {
            base_dir: temp.path().to_path_buf(),
            results_dir: temp.path().join("results"),
            ..ExperimentConfig::default()
        };
        config.validate().unwrap();
        assert!(temp.path().join("results").is_dir());
    }

    #[test]
    fn test_validate_rejects_empty_models_and_zero_variants() {
        let temp = tempfile::tempdir().unwrap();
        let base = ExperimentConfig {
            base_dir: temp.path().to_path_buf(),
            results_dir: temp.path().join("results"),
            ..ExperimentConfig::default()
        };

        let no_models = ExperimentConfig {
            llm_models: Vec::new(),
            ..base.clone()
        };
        assert!(matches!(no_models.validate(), Err(ConfigError::NoModels)));

        let no_variants = ExperimentConfig {
            num_prompt_variants: 0,
            ..base
        };
        assert!(matches!(
            no_variants.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_parse_model_list() {
        assert_eq!(parse_model_list("a,b"), vec!["a", "b"]);
        assert!(parse_model_list(" , ").is_empty());
    }
}
