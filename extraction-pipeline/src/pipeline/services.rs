use std::{sync::Arc, time::Duration};

use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use common::{
    error::AppError,
    storage::types::{article::Article, extraction_result::NerMetrics},
    utils::{
        config::{AppConfig, EmbeddingSettings},
        embedding::generate_embedding,
    },
};

use crate::{
    arbitrator::Arbitrator,
    auditor::NerAuditor,
    cost::CostTracker,
    ensemble::run_ensemble,
    extractor::{openai::OpenAiExtractor, EntityMention, Extraction, Extractor},
    ingestion::{clean_and_chunk, extraction_input, ChunkingOptions, CleanedArticle},
    kb::{client::WikidataClient, KbEnricher, KnowledgeBase},
    nlp::segmenter::{RegexSegmenter, SentenceSegmenter},
    position::locate,
    validator::{ConsensusExtraction, SummaryEmbedder, Validator},
};

use super::config::PipelineConfig;

/// The pipeline's injectable collaborators, one method per stage concern.
#[async_trait]
pub trait PipelineServices: Send + Sync {
    async fn ingest(&self, article: &Article) -> Result<CleanedArticle, AppError>;

    async fn run_ensemble(
        &self,
        article_id: &str,
        cleaned: &CleanedArticle,
    ) -> Result<(Option<Extraction>, Option<Extraction>), AppError>;

    async fn validate(
        &self,
        article_id: &str,
        extraction_a: Option<Extraction>,
        extraction_b: Option<Extraction>,
    ) -> Result<ConsensusExtraction, AppError>;

    fn audit(&self, text: &str, entities: &[EntityMention]) -> NerMetrics;

    fn locate(&self, text: &str, entities: Vec<EntityMention>) -> Vec<EntityMention>;

    async fn enrich(&self, entities: &mut [EntityMention]);
}

/// Summary embeddings over the configured OpenAI-compatible endpoint.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: u32,
}

impl OpenAiEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(&settings.api_key)
            .with_api_base(&settings.base_url);

        Self {
            client: Client::with_config(config),
            model: settings.model.clone(),
            dimensions: settings.dimensions,
        }
    }
}

#[async_trait]
impl SummaryEmbedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        generate_embedding(&self.client, text, &self.model, self.dimensions).await
    }
}

pub struct DefaultPipelineServices {
    extractor_a: Arc<dyn Extractor>,
    extractor_b: Arc<dyn Extractor>,
    arbitrator: Option<Arbitrator>,
    validator: Validator,
    embedder: Arc<dyn SummaryEmbedder>,
    auditor: NerAuditor,
    segmenter: Arc<dyn SentenceSegmenter>,
    enricher: KbEnricher,
    config: PipelineConfig,
}

impl DefaultPipelineServices {
    /// Wires the full production stack from the operator configuration: two
    /// primary extractors, the cost-optimized arbitrator, the Wikidata
    /// enricher, and the regex segmenter shared by auditor and tracker.
    pub fn from_app_config(
        app_config: &AppConfig,
        cost: Arc<CostTracker>,
    ) -> Result<Self, AppError> {
        let extractor_a: Arc<dyn Extractor> = Arc::new(OpenAiExtractor::new(
            &app_config.extractor_a,
            app_config.pricing_for(&app_config.extractor_a.provider),
            app_config.max_retries,
            Arc::clone(&cost),
        ));
        let extractor_b: Arc<dyn Extractor> = Arc::new(OpenAiExtractor::new(
            &app_config.extractor_b,
            app_config.pricing_for(&app_config.extractor_b.provider),
            app_config.max_retries,
            Arc::clone(&cost),
        ));
        let arbitrator_extractor: Arc<dyn Extractor> = Arc::new(OpenAiExtractor::new(
            &app_config.arbitrator,
            app_config.pricing_for(&app_config.arbitrator.provider),
            app_config.max_retries,
            cost,
        ));

        let kb: Option<Arc<dyn KnowledgeBase>> = if app_config.kb_enabled {
            Some(Arc::new(WikidataClient::new(
                app_config.kb_rate_per_min,
                app_config.max_retries,
                Duration::from_secs(app_config.kb_timeout_seconds),
            )?))
        } else {
            None
        };
        let enricher = KbEnricher::new(
            kb,
            app_config.kb_ttl_days,
            Duration::from_secs(app_config.kb_timeout_seconds),
        );

        let config = PipelineConfig::from_app_config(app_config);

        Ok(Self {
            extractor_a,
            extractor_b,
            arbitrator: Some(Arbitrator::new(arbitrator_extractor)),
            validator: Validator::new(
                app_config.similarity_threshold,
                app_config.confidence_threshold,
            ),
            embedder: Arc::new(OpenAiEmbedder::new(&app_config.embedding)),
            auditor: NerAuditor::new(),
            segmenter: Arc::new(RegexSegmenter),
            enricher,
            config,
        })
    }

    /// Assembles services from pre-built parts; the seam tests use.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        extractor_a: Arc<dyn Extractor>,
        extractor_b: Arc<dyn Extractor>,
        arbitrator: Option<Arbitrator>,
        embedder: Arc<dyn SummaryEmbedder>,
        enricher: KbEnricher,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractor_a,
            extractor_b,
            arbitrator,
            validator: Validator::new(
                config.tuning.similarity_threshold,
                config.tuning.confidence_threshold,
            ),
            embedder,
            auditor: NerAuditor::new(),
            segmenter: Arc::new(RegexSegmenter),
            enricher,
            config,
        }
    }
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    async fn ingest(&self, article: &Article) -> Result<CleanedArticle, AppError> {
        let options = ChunkingOptions {
            chunk_size: self.config.tuning.chunk_size,
            chunk_overlap: self.config.tuning.chunk_overlap,
        };
        clean_and_chunk(&article.text, &options, self.segmenter.as_ref())
    }

    async fn run_ensemble(
        &self,
        article_id: &str,
        cleaned: &CleanedArticle,
    ) -> Result<(Option<Extraction>, Option<Extraction>), AppError> {
        let input = extraction_input(cleaned, self.config.tuning.max_extraction_tokens);

        run_ensemble(
            self.extractor_a.as_ref(),
            self.extractor_b.as_ref(),
            input,
            article_id,
            Duration::from_secs(self.config.tuning.timeout_seconds),
            self.config.tuning.parallel_processing,
        )
        .await
    }

    async fn validate(
        &self,
        article_id: &str,
        extraction_a: Option<Extraction>,
        extraction_b: Option<Extraction>,
    ) -> Result<ConsensusExtraction, AppError> {
        self.validator
            .validate(
                extraction_a,
                extraction_b,
                self.embedder.as_ref(),
                self.arbitrator.as_ref(),
                article_id,
            )
            .await
    }

    fn audit(&self, text: &str, entities: &[EntityMention]) -> NerMetrics {
        let (_, metrics) = self.auditor.audit(text, entities, self.segmenter.as_ref());
        metrics
    }

    fn locate(&self, text: &str, entities: Vec<EntityMention>) -> Vec<EntityMention> {
        locate(text, entities, self.segmenter.as_ref())
    }

    async fn enrich(&self, entities: &mut [EntityMention]) {
        self.enricher.enrich_all(entities).await;
    }
}
