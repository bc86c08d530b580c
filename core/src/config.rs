//! Engine configuration
//!
//! Defaults cover every knob; a TOML file and `MIMIR_`-prefixed environment
//! variables layer on top. The engine reads the config once at construction.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// LLM endpoint settings for the optional completion client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions base URL
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    /// When false the synthesizer never calls out to the LLM
    pub enabled: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "llama3".to_string(),
            api_key: None,
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 512,
            timeout_seconds: 30,
            retry_attempts: 2,
            enabled: false,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the content-hash -> vector cache
    pub embedding_cache_size: u64,
    /// Whether per-step retrieval results are cached
    pub retrieval_cache_enabled: bool,
    pub retrieval_cache_size: u64,
    pub synthesis_cache_size: u64,
    /// How many refine-then-revalidate passes the orchestrator may run
    pub max_refinement_attempts: u32,
    /// Overall request deadline in seconds
    pub request_timeout_secs: f64,
    /// Overrides for validator dimension weights, keyed by dimension name
    pub dimension_weights: HashMap<String, f64>,
    /// Overrides for validity/refinement thresholds
    /// (`accuracy`, `relevance`, `completeness`, `overall`)
    pub quality_thresholds: HashMap<String, f64>,
    pub llm: LlmConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            embedding_cache_size: 1000,
            retrieval_cache_enabled: true,
            retrieval_cache_size: 500,
            synthesis_cache_size: 200,
            max_refinement_attempts: 1,
            request_timeout_secs: 30.0,
            dimension_weights: HashMap::new(),
            quality_thresholds: HashMap::new(),
            llm: LlmConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration: defaults, then the optional TOML file, then
    /// `MIMIR_`-prefixed environment variables (`MIMIR_LLM__MODEL=...`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "loading engine config file");
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("MIMIR")
                .separator("__")
                .try_parsing(true),
        );
        let loaded: EngineConfig = builder
            .build()
            .context("failed to assemble configuration sources")?
            .try_deserialize()
            .context("failed to deserialize engine configuration")?;
        loaded.validate()?;
        info!(
            embedding_cache_size = loaded.embedding_cache_size,
            retrieval_cache_enabled = loaded.retrieval_cache_enabled,
            max_refinement_attempts = loaded.max_refinement_attempts,
            "engine configuration loaded"
        );
        Ok(loaded)
    }

    /// Reject values the engine cannot operate with
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.request_timeout_secs > 0.0,
            "request_timeout_secs must be positive"
        );
        anyhow::ensure!(
            self.embedding_cache_size > 0,
            "embedding_cache_size must be positive"
        );
        for (name, weight) in &self.dimension_weights {
            anyhow::ensure!(
                (0.0..=1.0).contains(weight),
                "dimension weight {name} out of [0, 1]"
            );
        }
        for (name, threshold) in &self.quality_thresholds {
            anyhow::ensure!(
                (0.0..=1.0).contains(threshold),
                "quality threshold {name} out of [0, 1]"
            );
        }
        Ok(())
    }
}
