mod config;
mod context;
mod services;
mod stages;
mod state;

pub use config::{PipelineConfig, PipelineTuning};
#[allow(clippy::module_name_repetitions)]
pub use services::{DefaultPipelineServices, OpenAiEmbedder, PipelineServices};

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::article::Article},
};
use tracing::{info, warn};

use self::{
    context::PipelineContext,
    stages::{audit, enrich, extract, ingest, locate, persist, validate},
    state::ready,
};

/// Drives one article from raw text to persisted extraction result. Errors
/// are absorbed at this boundary: the article ends either completed or
/// failed with a readable reason, never half-written.
pub struct ArticlePipeline {
    db: Arc<SurrealDbClient>,
    pipeline_config: PipelineConfig,
    services: Arc<dyn PipelineServices>,
}

impl ArticlePipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        pipeline_config: PipelineConfig,
        services: Arc<dyn PipelineServices>,
    ) -> Self {
        Self {
            db,
            pipeline_config,
            services,
        }
    }

    #[tracing::instrument(skip_all, fields(article_id = %article.id, source = %article.source))]
    pub async fn process_article(&self, article: Article) -> Result<(), AppError> {
        match self.drive_pipeline(&article).await {
            Ok(()) => {
                info!(article_id = %article.id, "article processing succeeded");
                Ok(())
            }
            Err(err) if err.is_storage() => {
                // The transaction rolled back; leave the article pending so a
                // later batch retries it.
                warn!(
                    article_id = %article.id,
                    error = %err,
                    "persistence failed; article stays pending for retry"
                );
                Article::mark_pending(&article.id, &self.db).await?;
                Err(err)
            }
            Err(err) => {
                let reason = err.to_string();
                warn!(
                    article_id = %article.id,
                    error = %reason,
                    "article processing failed"
                );
                Article::mark_failed(&article.id, &reason, &self.db).await?;
                Err(err)
            }
        }
    }

    async fn drive_pipeline(&self, article: &Article) -> Result<(), AppError> {
        let mut ctx = PipelineContext::new(
            article,
            self.db.as_ref(),
            &self.pipeline_config,
            self.services.as_ref(),
        );

        let machine = ready();
        let pipeline_started = Instant::now();

        let stage_start = Instant::now();
        let machine = ingest(machine, &mut ctx).await.map_err(|e| ctx.abort(e))?;
        let ingest_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = extract(machine, &mut ctx).await.map_err(|e| ctx.abort(e))?;
        let extract_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = validate(machine, &mut ctx).await.map_err(|e| ctx.abort(e))?;
        let validate_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = audit(machine, &mut ctx).await.map_err(|e| ctx.abort(e))?;
        let audit_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = locate(machine, &mut ctx).await.map_err(|e| ctx.abort(e))?;
        let locate_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = enrich(machine, &mut ctx).await.map_err(|e| ctx.abort(e))?;
        let enrich_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let _machine = persist(machine, &mut ctx).await.map_err(|e| ctx.abort(e))?;
        let persist_duration = stage_start.elapsed();

        info!(
            article_id = %ctx.article_id,
            total_ms = duration_millis(pipeline_started.elapsed()),
            ingest_ms = duration_millis(ingest_duration),
            extract_ms = duration_millis(extract_duration),
            validate_ms = duration_millis(validate_duration),
            audit_ms = duration_millis(audit_duration),
            locate_ms = duration_millis(locate_duration),
            enrich_ms = duration_millis(enrich_duration),
            persist_ms = duration_millis(persist_duration),
            "article pipeline finished"
        );

        Ok(())
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
