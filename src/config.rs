use anyhow::{Context, Result};
use issue_dedupe_core::query::{
    QueryParams, DEFAULT_DESCRIPTION_BOOST, DEFAULT_K, DEFAULT_MIN_SCORE, DEFAULT_TITLE_BOOST,
};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub opensearch: OpenSearchConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenSearchConfig {
    pub url: String,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Resolved by name through the ML plugin when absent.
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_index() -> String {
    "issues".to_string()
}
fn default_model_name() -> String {
    "huggingface/sentence-transformers/all-MiniLM-L6-v2".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(default = "default_title_boost")]
    pub title_boost: f64,
    #[serde(default = "default_description_boost")]
    pub description_boost: f64,
    #[serde(default = "default_k")]
    pub k: u32,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_audit_min_score")]
    pub audit_min_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            title_boost: DEFAULT_TITLE_BOOST,
            description_boost: DEFAULT_DESCRIPTION_BOOST,
            k: DEFAULT_K,
            min_score: DEFAULT_MIN_SCORE,
            audit_min_score: default_audit_min_score(),
        }
    }
}

fn default_title_boost() -> f64 {
    DEFAULT_TITLE_BOOST
}
fn default_description_boost() -> f64 {
    DEFAULT_DESCRIPTION_BOOST
}
fn default_k() -> u32 {
    DEFAULT_K
}
fn default_min_score() -> f64 {
    DEFAULT_MIN_SCORE
}
fn default_audit_min_score() -> f64 {
    2.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_search_concurrency")]
    pub search_concurrency: usize,
    #[serde(default = "default_index_concurrency")]
    pub index_concurrency: usize,
    #[serde(default = "default_audit_page_size")]
    pub audit_page_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            search_concurrency: default_search_concurrency(),
            index_concurrency: default_index_concurrency(),
            audit_page_size: default_audit_page_size(),
        }
    }
}

fn default_search_concurrency() -> usize {
    10
}
fn default_index_concurrency() -> usize {
    14
}
fn default_audit_page_size() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    2
}
fn default_max_attempts() -> u32 {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Forces the `debug` level.
    #[serde(default)]
    pub debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            debug: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    pub fn effective_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.level
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

impl Config {
    /// Ranking parameters bound to a resolved model id.
    pub fn query_params(&self, model_id: impl Into<String>) -> QueryParams {
        QueryParams {
            model_id: model_id.into(),
            title_boost: self.scoring.title_boost,
            description_boost: self.scoring.description_boost,
            k: self.scoring.k,
            min_score: self.scoring.min_score,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.opensearch.timeout_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    validate(&config)?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Resolves a `--concurrency` override against its `[batch]` default. The
/// override is held to the same bound as the config value.
pub fn concurrency_override(value: Option<usize>, default: usize) -> Result<usize> {
    match value {
        Some(0) => anyhow::bail!("--concurrency must be >= 1"),
        Some(n) => Ok(n),
        None => Ok(default),
    }
}

fn validate(config: &Config) -> Result<()> {
    // Validate opensearch
    if config.opensearch.url.trim().is_empty() {
        anyhow::bail!("opensearch.url must not be empty");
    }
    if config.opensearch.index.trim().is_empty() {
        anyhow::bail!("opensearch.index must not be empty");
    }

    // Validate scoring
    let scoring = &config.scoring;
    let scores = [
        scoring.title_boost,
        scoring.description_boost,
        scoring.min_score,
        scoring.audit_min_score,
    ];
    if scores.iter().any(|s| !s.is_finite()) {
        anyhow::bail!("scoring values must be finite numbers");
    }
    if scoring.title_boost <= 0.0 || scoring.description_boost <= 0.0 {
        anyhow::bail!("scoring boosts must be > 0");
    }
    if scoring.k == 0 {
        anyhow::bail!("scoring.k must be >= 1");
    }
    if scoring.audit_min_score < scoring.min_score {
        anyhow::bail!(
            "scoring.audit_min_score ({}) must be >= scoring.min_score ({})",
            scoring.audit_min_score,
            scoring.min_score
        );
    }

    // Validate batch
    if config.batch.search_concurrency == 0 || config.batch.index_concurrency == 0 {
        anyhow::bail!("batch concurrency must be >= 1");
    }
    if config.batch.audit_page_size == 0 {
        anyhow::bail!("batch.audit_page_size must be >= 1");
    }

    // Validate admin
    if config.admin.max_attempts == 0 {
        anyhow::bail!("admin.max_attempts must be >= 1");
    }

    Ok(())
}
