use common::utils::config::AppConfig;

/// Per-article pipeline tuning. Defaults mirror the documented
/// configuration keys; `from_app_config` copies the operator's values in.
#[derive(Debug, Clone)]
pub struct PipelineTuning {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub confidence_threshold: f64,
    pub similarity_threshold: f64,
    pub timeout_seconds: u64,
    pub parallel_processing: bool,
    pub max_extraction_tokens: usize,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            chunk_overlap: 50,
            confidence_threshold: 0.4,
            similarity_threshold: 0.75,
            timeout_seconds: 30,
            parallel_processing: true,
            max_extraction_tokens: 6_000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub tuning: PipelineTuning,
}

impl PipelineConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            tuning: PipelineTuning {
                chunk_size: config.chunk_size,
                chunk_overlap: config.chunk_overlap,
                confidence_threshold: config.confidence_threshold,
                similarity_threshold: config.similarity_threshold,
                timeout_seconds: config.timeout_seconds,
                parallel_processing: config.parallel_processing,
                max_extraction_tokens: PipelineTuning::default().max_extraction_tokens,
            },
        }
    }
}
