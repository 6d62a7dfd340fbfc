//! Application configuration for marketpulse.
//!
//! User config lives at `~/.marketpulse/marketpulse.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PipelineError, Result};
use crate::types::StageName;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "marketpulse.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".marketpulse";

// ---------------------------------------------------------------------------
// Config structs (matching marketpulse.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run-level settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Collaborator name per stage.
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,

    /// Where ingestion collaborators read from.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Knobs for the built-in collaborators.
    #[serde(default)]
    pub tuning: TuningConfig,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Query used by the standalone program when none is given.
    #[serde(default = "default_sample_query")]
    pub sample_query: String,

    /// Upper bound on a single collaborator call. Unset means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_timeout_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_query: default_sample_query(),
            stage_timeout_secs: None,
        }
    }
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}

fn default_sample_query() -> String {
    "What happened to Tesla today?".into()
}

/// `[collaborators]` section: which registered collaborator serves each stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorsConfig {
    #[serde(default = "default_ingestion")]
    pub ingestion: String,
    #[serde(default = "default_preprocessing")]
    pub preprocessing: String,
    #[serde(default = "default_deduplication")]
    pub deduplication: String,
    #[serde(default = "default_ner")]
    pub ner: String,
    #[serde(default = "default_index")]
    pub embedding: String,
    #[serde(default = "default_impact")]
    pub impact_scoring: String,
    #[serde(default = "default_index")]
    pub query: String,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            ingestion: default_ingestion(),
            preprocessing: default_preprocessing(),
            deduplication: default_deduplication(),
            ner: default_ner(),
            embedding: default_index(),
            impact_scoring: default_impact(),
            query: default_index(),
        }
    }
}

impl CollaboratorsConfig {
    /// Configured collaborator name for `stage`.
    pub fn name_for(&self, stage: StageName) -> &str {
        match stage {
            StageName::Ingestion => &self.ingestion,
            StageName::Preprocessing => &self.preprocessing,
            StageName::Deduplication => &self.deduplication,
            StageName::Ner => &self.ner,
            StageName::Embedding => &self.embedding,
            StageName::ImpactScoring => &self.impact_scoring,
            StageName::Query => &self.query,
        }
    }
}

fn default_ingestion() -> String {
    "feed_file".into()
}
fn default_preprocessing() -> String {
    "html_clean".into()
}
fn default_deduplication() -> String {
    "content_hash".into()
}
fn default_ner() -> String {
    "keyword_entities".into()
}
fn default_index() -> String {
    "memory_index".into()
}
fn default_impact() -> String {
    "keyword_impact".into()
}

/// `[sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// JSON feed file read by the `feed_file` collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_path: Option<PathBuf>,

    /// News API endpoints polled by the `http_api` collaborator.
    #[serde(default)]
    pub api_urls: Vec<Url>,

    /// RSS or Atom feeds read by the `rss` collaborator.
    #[serde(default)]
    pub rss_feeds: Vec<Url>,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            feed_path: None,
            api_urls: Vec::new(),
            rss_feeds: Vec::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    10
}

/// `[tuning]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Records whose cleaned text is not longer than this are dropped.
    #[serde(default = "default_min_clean_len")]
    pub min_clean_text_len: usize,

    /// Similarity above which two records count as near-duplicates.
    #[serde(default = "default_near_duplicate_threshold")]
    pub near_duplicate_threshold: f64,

    /// Number of results returned by the query collaborator.
    #[serde(default = "default_top_k")]
    pub query_top_k: usize,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            min_clean_text_len: default_min_clean_len(),
            near_duplicate_threshold: default_near_duplicate_threshold(),
            query_top_k: default_top_k(),
        }
    }
}

fn default_min_clean_len() -> usize {
    50
}
fn default_near_duplicate_threshold() -> f64 {
    0.82
}
fn default_top_k() -> usize {
    5
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.marketpulse/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PipelineError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.marketpulse/marketpulse.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PipelineError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PipelineError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PipelineError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject settings the built-in collaborators cannot work with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let threshold = config.tuning.near_duplicate_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(PipelineError::config(format!(
            "tuning.near_duplicate_threshold must be within 0.0..=1.0, got {threshold}"
        )));
    }
    if config.tuning.query_top_k == 0 {
        return Err(PipelineError::config("tuning.query_top_k must be at least 1"));
    }
    if config.pipeline.stage_timeout_secs == Some(0) {
        return Err(PipelineError::config(
            "pipeline.stage_timeout_secs must be at least 1 (omit it for no timeout)",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("sample_query"));
        assert!(toml_str.contains("memory_index"));
        assert!(!toml_str.contains("stage_timeout_secs"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.tuning.min_clean_text_len, 50);
        assert_eq!(parsed.collaborators.ingestion, "feed_file");
        assert_eq!(parsed.pipeline.stage_timeout(), None);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[pipeline]
stage_timeout_secs = 30

[collaborators]
ingestion = "http_api"

[sources]
api_urls = ["https://gnews.example.com/api/v4/top-headlines"]
rss_feeds = [
    "https://www.moneycontrol.com/rss/latestnews.xml",
    "https://www.business-standard.com/rss/latest.rss",
]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.pipeline.stage_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.collaborators.name_for(StageName::Ingestion), "http_api");
        assert_eq!(config.collaborators.name_for(StageName::Query), "memory_index");
        assert_eq!(config.sources.api_urls.len(), 1);
        assert_eq!(config.sources.rss_feeds.len(), 2);
        assert_eq!(config.sources.request_timeout_secs, 10);
    }

    #[test]
    fn validation_rejects_bad_tuning() {
        assert!(validate_config(&AppConfig::default()).is_ok());

        let mut config = AppConfig::default();
        config.tuning.near_duplicate_threshold = 1.5;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.tuning.query_top_k = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("query_top_k"));

        let mut config = AppConfig::default();
        config.pipeline.stage_timeout_secs = Some(0);
        assert!(validate_config(&config).is_err());
    }
}
