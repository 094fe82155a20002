use std::sync::Arc;

use common::{
    storage::{db::SurrealDbClient, types::article::Article},
    utils::config::get_config,
};
use extraction_pipeline::{
    cost::CostTracker, run_batch, ArticlePipeline, DefaultPipelineServices, PipelineConfig,
};
use relationship_pipeline::{RelationshipGenerator, RelationshipOptions};
use tokio::time::{sleep, Duration};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized().await?;

    let cost = Arc::new(
        CostTracker::new(Arc::clone(&db), config.daily_cap, config.monthly_cap).await?,
    );
    let services = Arc::new(DefaultPipelineServices::from_app_config(
        &config,
        Arc::clone(&cost),
    )?);
    let pipeline = ArticlePipeline::new(
        Arc::clone(&db),
        PipelineConfig::from_app_config(&config),
        services,
    );
    let relationships = RelationshipGenerator::new(
        Arc::clone(&db),
        RelationshipOptions::from_app_config(&config),
    );

    let batch_size = config.batch_size;
    let idle_backoff = Duration::from_secs(30);

    info!(batch_size, "extraction worker started");

    loop {
        let outcome = match run_batch(&db, &pipeline, &cost, batch_size).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "batch run failed; backing off");
                sleep(idle_backoff).await;
                continue;
            }
        };

        if outcome.processed > 0 {
            // New extraction results shift the corpus statistics, so the
            // relationship graph is rebuilt after each productive batch.
            if let Err(err) = relationships.regenerate_all().await {
                error!(error = %err, "relationship regeneration failed");
            }
        }

        match Article::status_counts(&db).await {
            Ok(counts) => info!(
                pending = counts.pending,
                completed = counts.completed,
                failed = counts.failed,
                "queue state"
            ),
            Err(err) => error!(error = %err, "failed to read queue state"),
        }

        if let Some(reason) = outcome.halted {
            info!(%reason, "budget cap reached; worker sleeping until the next window");
            sleep(Duration::from_secs(3600)).await;
            continue;
        }

        if outcome.processed == 0 && outcome.failed == 0 {
            sleep(idle_backoff).await;
        }
    }
}
