#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod arbitrator;
pub mod auditor;
pub mod cost;
pub mod ensemble;
pub mod extractor;
pub mod ingestion;
pub mod kb;
pub mod nlp;
pub mod pipeline;
pub mod position;
pub mod validator;

use std::sync::Arc;

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::article::Article},
};
pub use pipeline::{ArticlePipeline, DefaultPipelineServices, PipelineConfig, PipelineTuning};
use tracing::{info, warn};

use crate::cost::{BudgetStatus, CostTracker};

/// Result of one batch pass over the pending queue.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub processed: usize,
    pub failed: usize,
    /// Reason the batch stopped early, when the budget cap fired.
    pub halted: Option<String>,
}

/// Processes up to `batch_size` pending articles sequentially, oldest
/// published first. The budget is checked between articles; a cap breach
/// abandons the remaining queue without touching it.
pub async fn run_batch(
    db: &Arc<SurrealDbClient>,
    pipeline: &ArticlePipeline,
    cost: &CostTracker,
    batch_size: usize,
) -> Result<BatchOutcome, AppError> {
    let pending = Article::list_pending(batch_size, db).await?;
    let mut outcome = BatchOutcome::default();

    if pending.is_empty() {
        return Ok(outcome);
    }

    info!(queued = pending.len(), "starting extraction batch");

    for article in pending {
        match cost.check_budget().await? {
            BudgetStatus::Ok => {}
            BudgetStatus::Halted(reason) => {
                warn!(%reason, "stopping batch; remaining articles stay pending");
                outcome.halted = Some(reason);
                break;
            }
        }

        let article_id = article.id.clone();
        match pipeline.process_article(article).await {
            Ok(()) => outcome.processed += 1,
            Err(err) => {
                warn!(%article_id, error = %err, "article failed; continuing batch");
                outcome.failed += 1;
            }
        }
    }

    info!(
        processed = outcome.processed,
        failed = outcome.failed,
        halted = outcome.halted.is_some(),
        "extraction batch finished"
    );

    Ok(outcome)
}
