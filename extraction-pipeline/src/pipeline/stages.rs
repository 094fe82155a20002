use common::{
    error::AppError,
    storage::types::{extraction_result::ExtractionResult, fact::Fact},
};
use state_machines::core::GuardError;
use tracing::{debug, instrument};

use super::{
    context::PipelineContext,
    state::{
        ArticleMachine, Audited, Enriched, Extracted, Ingested, Located, Persisted, Ready,
        Validated,
    },
};

#[instrument(level = "trace", skip_all, fields(article_id = %ctx.article_id))]
pub async fn ingest(
    machine: ArticleMachine<(), Ready>,
    ctx: &mut PipelineContext<'_>,
) -> Result<ArticleMachine<(), Ingested>, AppError> {
    let cleaned = ctx.services.ingest(ctx.article).await?;

    debug!(
        article_id = %ctx.article_id,
        text_chars = cleaned.text.chars().count(),
        sentences = cleaned.sentences.len(),
        chunks = cleaned.chunks.len(),
        "article cleaned and chunked"
    );

    ctx.cleaned = Some(cleaned);

    machine
        .ingest()
        .map_err(|(_, guard)| map_guard_error("ingest", &guard))
}

#[instrument(level = "trace", skip_all, fields(article_id = %ctx.article_id))]
pub async fn extract(
    machine: ArticleMachine<(), Ingested>,
    ctx: &mut PipelineContext<'_>,
) -> Result<ArticleMachine<(), Extracted>, AppError> {
    let cleaned = ctx.cleaned()?;
    let (extraction_a, extraction_b) = ctx
        .services
        .run_ensemble(&ctx.article_id, cleaned)
        .await?;

    debug!(
        article_id = %ctx.article_id,
        a_survived = extraction_a.is_some(),
        b_survived = extraction_b.is_some(),
        "ensemble extraction finished"
    );

    ctx.extraction_a = extraction_a;
    ctx.extraction_b = extraction_b;

    machine
        .extract()
        .map_err(|(_, guard)| map_guard_error("extract", &guard))
}

#[instrument(level = "trace", skip_all, fields(article_id = %ctx.article_id))]
pub async fn validate(
    machine: ArticleMachine<(), Extracted>,
    ctx: &mut PipelineContext<'_>,
) -> Result<ArticleMachine<(), Validated>, AppError> {
    let extraction_a = ctx.extraction_a.take();
    let extraction_b = ctx.extraction_b.take();

    let consensus = ctx
        .services
        .validate(&ctx.article_id, extraction_a, extraction_b)
        .await?;

    debug!(
        article_id = %ctx.article_id,
        summary_similarity = consensus.report.summary_similarity,
        had_conflicts = consensus.report.had_conflicts,
        used_arbitration = consensus.report.used_arbitration,
        merged_entities = consensus.entities.len(),
        "ensemble output validated"
    );

    ctx.consensus = Some(consensus);

    machine
        .validate()
        .map_err(|(_, guard)| map_guard_error("validate", &guard))
}

#[instrument(level = "trace", skip_all, fields(article_id = %ctx.article_id))]
pub async fn audit(
    machine: ArticleMachine<(), Validated>,
    ctx: &mut PipelineContext<'_>,
) -> Result<ArticleMachine<(), Audited>, AppError> {
    let text = ctx.cleaned()?.text.clone();
    let metrics = ctx.services.audit(&text, &ctx.consensus()?.entities);

    debug!(
        article_id = %ctx.article_id,
        ner_entity_count = metrics.entity_count,
        precision = metrics.precision,
        recall = metrics.recall,
        f1 = metrics.f1,
        "ner audit recorded"
    );

    ctx.ner_metrics = Some(metrics);

    machine
        .audit()
        .map_err(|(_, guard)| map_guard_error("audit", &guard))
}

#[instrument(level = "trace", skip_all, fields(article_id = %ctx.article_id))]
pub async fn locate(
    machine: ArticleMachine<(), Audited>,
    ctx: &mut PipelineContext<'_>,
) -> Result<ArticleMachine<(), Located>, AppError> {
    let text = ctx.cleaned()?.text.clone();
    let entities = ctx.consensus()?.entities.clone();
    let located = ctx.services.locate(&text, entities);

    let positioned = located.iter().filter(|m| m.position.is_some()).count();
    debug!(
        article_id = %ctx.article_id,
        mentions = located.len(),
        positioned,
        "entity mentions positioned"
    );

    ctx.entities = located;

    machine
        .locate()
        .map_err(|(_, guard)| map_guard_error("locate", &guard))
}

#[instrument(level = "trace", skip_all, fields(article_id = %ctx.article_id))]
pub async fn enrich(
    machine: ArticleMachine<(), Located>,
    ctx: &mut PipelineContext<'_>,
) -> Result<ArticleMachine<(), Enriched>, AppError> {
    ctx.services.enrich(&mut ctx.entities).await;

    let linked = ctx.entities.iter().filter(|m| m.kb.is_some()).count();
    debug!(
        article_id = %ctx.article_id,
        mentions = ctx.entities.len(),
        linked,
        "knowledge base enrichment finished"
    );

    machine
        .enrich()
        .map_err(|(_, guard)| map_guard_error("enrich", &guard))
}

#[instrument(level = "trace", skip_all, fields(article_id = %ctx.article_id))]
pub async fn persist(
    machine: ArticleMachine<(), Enriched>,
    ctx: &mut PipelineContext<'_>,
) -> Result<ArticleMachine<(), Persisted>, AppError> {
    let consensus = ctx.take_consensus()?;
    let processing_seconds = ctx.started.elapsed().as_secs_f64();

    let result = ExtractionResult::new(
        ctx.article_id.clone(),
        consensus.summary,
        consensus.summary_a,
        consensus.summary_b,
        consensus.summary_arbitrator,
        consensus.report.summary_similarity,
        consensus.report.had_conflicts,
        consensus.report.used_arbitration,
        ctx.ner_metrics,
        processing_seconds,
    );

    let facts: Vec<Fact> = std::mem::take(&mut ctx.entities)
        .into_iter()
        .map(|mention| {
            Fact::new(
                ctx.article_id.clone(),
                result.id.clone(),
                mention.surface,
                mention.entity_type,
                mention.confidence,
                mention.event_description,
                mention.sources,
                mention.position,
                mention.kb,
            )
        })
        .collect();

    let fact_count = facts.len();
    ExtractionResult::store_with_facts(result, facts, ctx.db).await?;

    debug!(
        article_id = %ctx.article_id,
        fact_count,
        processing_seconds,
        "extraction result persisted"
    );

    machine
        .persist()
        .map_err(|(_, guard)| map_guard_error("persist", &guard))
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid article pipeline transition during {event}: {guard:?}"
    ))
}
