//! Configuration for the remediate server.
//!
//! Precedence, lowest first: built-in defaults, the JSON config file,
//! environment variables, command-line flags.

use std::env;
use std::path::{Path, PathBuf};

use circuit_breaker::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};

use crate::errors::{RemediateError, RemediateResult};

/// Default directory for session files.
pub const DEFAULT_SESSION_DIR: &str = "./tmp/sessions/remediate";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemediateConfig {
    pub ai: AiConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub session_dir: PathBuf,
    pub kubectl: KubectlConfig,
}

impl Default for RemediateConfig {
    fn default() -> Self {
        Self {
            ai: AiConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            session_dir: PathBuf::from(DEFAULT_SESSION_DIR),
            kubectl: KubectlConfig::default(),
        }
    }
}

/// AI backend settings. The API key is read from the environment only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiConfig {
    /// Provider name (only "anthropic" is supported)
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    /// Override for the provider endpoint
    pub base_url: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: crate::ai::DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            temperature: Some(0.0),
            base_url: None,
        }
    }
}

/// How read-only cluster queries are run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubectlConfig {
    pub binary: String,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    /// Namespace used when a data request names none
    pub default_namespace: Option<String>,
    /// `--tail` applied to log requests that set none
    pub log_tail_lines: u32,
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            binary: "kubectl".to_string(),
            kubeconfig: None,
            context: None,
            default_namespace: None,
            log_tail_lines: 200,
        }
    }
}

impl RemediateConfig {
    /// Read a JSON config file.
    pub fn from_file(path: &Path) -> RemediateResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RemediateError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            RemediateError::Config(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// Defaults or `path`, then environment overrides.
    pub fn load(path: Option<&Path>) -> RemediateResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `REMEDIATE_SESSION_DIR`, `REMEDIATE_MODEL` and `KUBECONFIG`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = lookup("REMEDIATE_SESSION_DIR") {
            self.session_dir = PathBuf::from(dir);
        }
        if let Some(model) = lookup("REMEDIATE_MODEL") {
            self.ai.model = model;
        }
        if let Some(kubeconfig) = lookup("KUBECONFIG") {
            self.kubectl.kubeconfig = Some(PathBuf::from(kubeconfig));
        }
    }

    pub fn validate(&self) -> RemediateResult<()> {
        if self.ai.provider != "anthropic" {
            return Err(RemediateError::Config(format!(
                "unsupported AI provider '{}'",
                self.ai.provider
            )));
        }
        if self.ai.model.trim().is_empty() {
            return Err(RemediateError::Config("ai.model must not be empty".to_string()));
        }
        if self.session_dir.as_os_str().is_empty() {
            return Err(RemediateError::Config("sessionDir must not be empty".to_string()));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(RemediateError::Config(
                "circuitBreaker.failureThreshold must be greater than 0".to_string(),
            ));
        }
        if self.circuit_breaker.half_open_max_attempts == 0 {
            return Err(RemediateError::Config(
                "circuitBreaker.halfOpenMaxAttempts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
