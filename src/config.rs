//! Configuration module for the resolver service.

use std::path::PathBuf;

use crate::error::{ResolveError, Result};

/// Main service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub timeout_seconds: u64,
    // OpenAI
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub completion_model: String,
    pub completion_temperature: f32,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    // Terminology services
    pub rxnav_base_url: String,
    pub icd10_base_url: String,
    // Pipeline
    pub exact_match_threshold: f64,
    pub persist_threshold: f64,
    pub example_top_k: usize,
    pub max_candidates: usize,
    pub max_concurrency: usize,
    pub max_examples_per_type: usize,
    pub example_snapshot_path: Option<PathBuf>,
    // Completion cache
    pub completion_cache_enabled: bool,
    pub completion_cache_path: Option<PathBuf>,
    pub cache_schema_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3031,
            host: "0.0.0.0".to_string(),
            timeout_seconds: 30,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            completion_model: "gpt-4o-mini".to_string(),
            completion_temperature: 0.1,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 1536,
            rxnav_base_url: "https://rxnav.nlm.nih.gov/REST".to_string(),
            icd10_base_url: "https://clinicaltables.nlm.nih.gov/api/icd10cm/v3/search".to_string(),
            exact_match_threshold: 0.9,
            persist_threshold: 0.8,
            example_top_k: 3,
            max_candidates: 5,
            max_concurrency: 8,
            max_examples_per_type: 10_000,
            example_snapshot_path: None,
            completion_cache_enabled: true,
            completion_cache_path: None,
            cache_schema_version: "1.0.0".to_string(),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_or("PORT", defaults.port),
            host: std::env::var("HOST").unwrap_or(defaults.host),
            timeout_seconds: env_or("REQUEST_TIMEOUT_SECONDS", defaults.timeout_seconds),
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            openai_base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            completion_model: std::env::var("COMPLETION_MODEL")
                .unwrap_or(defaults.completion_model),
            completion_temperature: env_or(
                "COMPLETION_TEMPERATURE",
                defaults.completion_temperature,
            ),
            embedding_model: std::env::var("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            embedding_dimension: env_or("EMBEDDING_DIMENSION", defaults.embedding_dimension),
            rxnav_base_url: std::env::var("RXNAV_BASE_URL").unwrap_or(defaults.rxnav_base_url),
            icd10_base_url: std::env::var("ICD10_BASE_URL").unwrap_or(defaults.icd10_base_url),
            exact_match_threshold: env_or("EXACT_MATCH_THRESHOLD", defaults.exact_match_threshold),
            persist_threshold: env_or("PERSIST_THRESHOLD", defaults.persist_threshold),
            example_top_k: env_or("EXAMPLE_TOP_K", defaults.example_top_k),
            max_candidates: env_or("MAX_CANDIDATES", defaults.max_candidates),
            max_concurrency: env_or("MAX_CONCURRENCY", defaults.max_concurrency),
            max_examples_per_type: env_or("MAX_EXAMPLES_PER_TYPE", defaults.max_examples_per_type),
            example_snapshot_path: std::env::var("EXAMPLE_SNAPSHOT_PATH").ok().map(PathBuf::from),
            completion_cache_enabled: env_or(
                "COMPLETION_CACHE_ENABLED",
                defaults.completion_cache_enabled,
            ),
            completion_cache_path: std::env::var("COMPLETION_CACHE_PATH").ok().map(PathBuf::from),
            cache_schema_version: std::env::var("CACHE_SCHEMA_VERSION")
                .unwrap_or(defaults.cache_schema_version),
        }
    }

    /// Check that credentials and thresholds are usable.
    pub fn validate(&self) -> Result<()> {
        if self.openai_api_key.is_none() {
            return Err(ResolveError::Configuration(
                "OpenAI API key not configured. Please set OPENAI_API_KEY environment variable."
                    .to_string(),
            ));
        }
        for (name, value) in [
            ("EXACT_MATCH_THRESHOLD", self.exact_match_threshold),
            ("PERSIST_THRESHOLD", self.persist_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ResolveError::Configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.embedding_dimension == 0 {
            return Err(ResolveError::Configuration(
                "EMBEDDING_DIMENSION must be positive".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(ResolveError::Configuration(
                "MAX_CONCURRENCY must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Project the pipeline tuning knobs.
    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            model: self.completion_model.clone(),
            temperature: self.completion_temperature,
            exact_match_threshold: self.exact_match_threshold,
            persist_threshold: self.persist_threshold,
            example_top_k: self.example_top_k,
            max_candidates: self.max_candidates,
            max_concurrency: self.max_concurrency,
        }
    }
}

/// Thresholds and model choices consumed by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverSettings {
    pub model: String,
    pub temperature: f32,
    /// An example must exceed this to short-circuit the pipeline.
    pub exact_match_threshold: f64,
    /// A resolution must exceed this to be learned.
    pub persist_threshold: f64,
    pub example_top_k: usize,
    pub max_candidates: usize,
    /// Upper bound on phrases resolved at once by a batch.
    pub max_concurrency: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Config::default().resolver_settings()
    }
}
