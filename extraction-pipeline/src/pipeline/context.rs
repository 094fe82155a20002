use std::time::Instant;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{article::Article, extraction_result::NerMetrics},
    },
};
use tracing::error;

use crate::{
    extractor::{EntityMention, Extraction},
    ingestion::CleanedArticle,
    validator::ConsensusExtraction,
};

use super::{config::PipelineConfig, services::PipelineServices};

/// Mutable state threaded through the per-article stages.
pub struct PipelineContext<'a> {
    pub article: &'a Article,
    pub article_id: String,
    pub db: &'a SurrealDbClient,
    pub pipeline_config: &'a PipelineConfig,
    pub services: &'a dyn PipelineServices,
    pub started: Instant,
    pub cleaned: Option<CleanedArticle>,
    pub extraction_a: Option<Extraction>,
    pub extraction_b: Option<Extraction>,
    pub consensus: Option<ConsensusExtraction>,
    pub ner_metrics: Option<NerMetrics>,
    pub entities: Vec<EntityMention>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        article: &'a Article,
        db: &'a SurrealDbClient,
        pipeline_config: &'a PipelineConfig,
        services: &'a dyn PipelineServices,
    ) -> Self {
        let article_id = article.id.clone();
        Self {
            article,
            article_id,
            db,
            pipeline_config,
            services,
            started: Instant::now(),
            cleaned: None,
            extraction_a: None,
            extraction_b: None,
            consensus: None,
            ner_metrics: None,
            entities: Vec::new(),
        }
    }

    pub fn cleaned(&self) -> Result<&CleanedArticle, AppError> {
        self.cleaned
            .as_ref()
            .ok_or_else(|| AppError::InternalError("cleaned article expected to be available".into()))
    }

    pub fn consensus(&self) -> Result<&ConsensusExtraction, AppError> {
        self.consensus
            .as_ref()
            .ok_or_else(|| AppError::InternalError("consensus expected to be available".into()))
    }

    pub fn take_consensus(&mut self) -> Result<ConsensusExtraction, AppError> {
        self.consensus.take().ok_or_else(|| {
            AppError::InternalError("consensus expected to be available for persistence".into())
        })
    }

    pub fn abort(&mut self, err: AppError) -> AppError {
        error!(
            article_id = %self.article_id,
            error = %err,
            "article pipeline aborted"
        );
        err
    }
}
