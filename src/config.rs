//! TOML configuration for the `mrg` binary.
//!
//! ```toml
//! [backend]
//! base_url = "https://annotations.example.edu/api"
//! token_env = "MARGINALIA_TOKEN"
//! timeout_secs = 30
//!
//! [feedback]            # optional; defaults to the backend URL
//! timeout_secs = 120
//!
//! [authors]
//! llm_label = "LLM"
//! user_label = "student"
//!
//! [display]
//! collapse_threshold = 1
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{Context, Result};
use log::LevelFilter;
use marginalia_core::graph::{CollapsePolicy, COLLAPSE_THRESHOLD};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub authors: AuthorsConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

fn default_token_env() -> String {
    "MARGINALIA_TOKEN".to_string()
}
fn default_backend_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedbackConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_feedback_timeout")]
    pub timeout_secs: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_feedback_timeout(),
        }
    }
}

fn default_feedback_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthorsConfig {
    /// Author label the backend uses for generated comments.
    #[serde(default = "default_llm_label")]
    pub llm_label: String,
    #[serde(default = "default_user_label")]
    pub user_label: String,
}

impl Default for AuthorsConfig {
    fn default() -> Self {
        Self {
            llm_label: default_llm_label(),
            user_label: default_user_label(),
        }
    }
}

fn default_llm_label() -> String {
    "LLM".to_string()
}
fn default_user_label() -> String {
    "user".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    #[serde(default = "default_collapse_threshold")]
    pub collapse_threshold: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            collapse_threshold: default_collapse_threshold(),
        }
    }
}

fn default_collapse_threshold() -> usize {
    COLLAPSE_THRESHOLD
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    /// Feedback service root, falling back to the backend.
    pub fn feedback_url(&self) -> &str {
        self.feedback
            .base_url
            .as_deref()
            .unwrap_or(&self.backend.base_url)
    }

    pub fn collapse_policy(&self) -> CollapsePolicy {
        CollapsePolicy {
            threshold: self.display.collapse_threshold,
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        LevelFilter::from_str(&self.logging.level).unwrap_or(LevelFilter::Info)
    }

    /// Read the bearer token from the configured environment variable.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.backend.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate URLs
    for (key, url) in [
        ("backend.base_url", Some(config.backend.base_url.as_str())),
        ("feedback.base_url", config.feedback.base_url.as_deref()),
    ] {
        if let Some(url) = url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                anyhow::bail!("{} must start with http:// or https://, got '{}'", key, url);
            }
        }
    }

    if config.backend.timeout_secs == 0 || config.feedback.timeout_secs == 0 {
        anyhow::bail!("timeout_secs must be > 0");
    }

    // Validate authors
    let llm = config.authors.llm_label.trim();
    if llm.is_empty() {
        anyhow::bail!("authors.llm_label must not be empty");
    }
    if llm.eq_ignore_ascii_case(config.authors.user_label.trim()) {
        anyhow::bail!("authors.user_label must differ from authors.llm_label");
    }

    if LevelFilter::from_str(&config.logging.level).is_err() {
        anyhow::bail!(
            "Unknown logging.level: '{}'. Must be off, error, warn, info, debug, or trace.",
            config.logging.level
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_optional_sections() {
        let cfg = parse_config("[backend]\nbase_url = \"http://localhost:8080\"\n").unwrap();
        assert_eq!(cfg.backend.token_env, "MARGINALIA_TOKEN");
        assert_eq!(cfg.feedback_url(), "http://localhost:8080");
        assert_eq!(cfg.authors.llm_label, "LLM");
        assert_eq!(cfg.collapse_policy().threshold, 1);
        assert_eq!(cfg.log_level(), LevelFilter::Info);
    }

    #[test]
    fn test_feedback_url_override() {
        let cfg = parse_config(
            "[backend]\nbase_url = \"http://a\"\n[feedback]\nbase_url = \"http://b\"\n",
        )
        .unwrap();
        assert_eq!(cfg.feedback_url(), "http://b");
        assert_eq!(cfg.feedback.timeout_secs, 120);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(parse_config("[backend]\nbase_url = \"ftp://x\"\n").is_err());
        assert!(parse_config(
            "[backend]\nbase_url = \"http://x\"\n[authors]\nllm_label = \"llm\"\nuser_label = \"LLM\"\n"
        )
        .is_err());
        assert!(parse_config(
            "[backend]\nbase_url = \"http://x\"\n[logging]\nlevel = \"loud\"\n"
        )
        .is_err());
        assert!(parse_config("[authors]\nllm_label = \"x\"\n").is_err());
    }
}
