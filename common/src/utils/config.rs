use std::collections::HashMap;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// One generative endpoint: the two primary extractors and the arbitrator
/// each get their own block so they can live on different providers.
#[derive(Clone, Deserialize, Debug)]
pub struct ExtractorSettings {
    pub provider: String,
    pub model: String,
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Clone, Deserialize, Debug)]
pub struct EmbeddingSettings {
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: u32,
}

/// Per-provider dollar rates per million tokens. Changing a price is an edit
/// to this table only.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq)]
pub struct ModelPricing {
    pub input_rate: f64,
    pub output_rate: f64,
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,

    pub extractor_a: ExtractorSettings,
    pub extractor_b: ExtractorSettings,
    pub arbitrator: ExtractorSettings,
    pub embedding: EmbeddingSettings,

    #[serde(default = "default_pricing")]
    pub pricing: HashMap<String, ModelPricing>,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_parallel_processing")]
    pub parallel_processing: bool,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_min_frequency_for_pmi")]
    pub min_frequency_for_pmi: u64,
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,
    #[serde(default = "default_daily_cap")]
    pub daily_cap: f64,
    #[serde(default = "default_monthly_cap")]
    pub monthly_cap: f64,
    #[serde(default = "default_kb_enabled")]
    pub kb_enabled: bool,
    #[serde(default = "default_kb_ttl_days")]
    pub kb_ttl_days: i64,
    #[serde(default = "default_kb_rate_per_min")]
    pub kb_rate_per_min: u32,
    #[serde(default = "default_kb_timeout_seconds")]
    pub kb_timeout_seconds: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl AppConfig {
    /// Missing providers price at zero rather than failing the call; the
    /// gap shows up in the logs, not as lost articles.
    pub fn pricing_for(&self, provider: &str) -> ModelPricing {
        self.pricing.get(provider).copied().unwrap_or_else(|| {
            tracing::warn!(provider, "no pricing entry for provider; costing at zero");
            ModelPricing {
                input_rate: 0.0,
                output_rate: 0.0,
            }
        })
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimensions() -> u32 {
    1536
}

fn default_pricing() -> HashMap<String, ModelPricing> {
    HashMap::from([
        (
            "openai".to_string(),
            ModelPricing {
                input_rate: 2.50,
                output_rate: 10.00,
            },
        ),
        (
            "anthropic".to_string(),
            ModelPricing {
                input_rate: 3.00,
                output_rate: 15.00,
            },
        ),
        (
            "google".to_string(),
            ModelPricing {
                input_rate: 1.25,
                output_rate: 10.00,
            },
        ),
    ])
}

fn default_chunk_size() -> usize {
    200
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_confidence_threshold() -> f64 {
    0.4
}

fn default_similarity_threshold() -> f64 {
    0.75
}

fn default_max_retries() -> usize {
    3
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_parallel_processing() -> bool {
    true
}

fn default_window_size() -> usize {
    2
}

fn default_min_frequency_for_pmi() -> u64 {
    2
}

fn default_smoothing() -> f64 {
    1e-6
}

fn default_daily_cap() -> f64 {
    10.0
}

fn default_monthly_cap() -> f64 {
    50.0
}

fn default_kb_enabled() -> bool {
    true
}

fn default_kb_ttl_days() -> i64 {
    30
}

fn default_kb_rate_per_min() -> u32 {
    50
}

fn default_kb_timeout_seconds() -> u64 {
    10
}

fn default_batch_size() -> usize {
    25
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> AppConfig {
        let raw = r#"
            surrealdb_address = "ws://localhost:8000"
            surrealdb_username = "root"
            surrealdb_password = "root"
            surrealdb_namespace = "news"
            surrealdb_database = "pipeline"

            [extractor_a]
            provider = "openai"
            model = "gpt-4o"
            api_key = "key-a"

            [extractor_b]
            provider = "anthropic"
            model = "claude-sonnet"
            api_key = "key-b"
            base_url = "https://api.anthropic.example/v1"

            [arbitrator]
            provider = "google"
            model = "gemini-flash"
            api_key = "key-c"

            [embedding]
            api_key = "key-a"
        "#;

        Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .expect("build config")
            .try_deserialize()
            .expect("deserialize config")
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = minimal_config();

        assert_eq!(config.chunk_size, 200);
        assert_eq!(config.chunk_overlap, 50);
        assert!((config.confidence_threshold - 0.4).abs() < f64::EPSILON);
        assert!((config.similarity_threshold - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timeout_seconds, 30);
        assert!(config.parallel_processing);
        assert_eq!(config.window_size, 2);
        assert_eq!(config.min_frequency_for_pmi, 2);
        assert!((config.smoothing - 1e-6).abs() < f64::EPSILON);
        assert!((config.daily_cap - 10.0).abs() < f64::EPSILON);
        assert!((config.monthly_cap - 50.0).abs() < f64::EPSILON);
        assert!(config.kb_enabled);
        assert_eq!(config.kb_ttl_days, 30);
        assert_eq!(config.kb_rate_per_min, 50);
        assert_eq!(config.kb_timeout_seconds, 10);
    }

    #[test]
    fn test_pricing_lookup_falls_back_to_zero() {
        let config = minimal_config();

        let known = config.pricing_for("openai");
        assert!(known.input_rate > 0.0);

        let unknown = config.pricing_for("nonexistent-provider");
        assert!(unknown.input_rate.abs() < f64::EPSILON);
        assert!(unknown.output_rate.abs() < f64::EPSILON);
    }
}
