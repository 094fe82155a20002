use uuid::Uuid;

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, types::fact::Fact},
    stored_object,
};

use super::article::ProcessingStatus;

/// Advisory metrics from the independent NER audit. All-or-nothing: either
/// the audit ran and every field is set, or the whole block is absent.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct NerMetrics {
    pub entity_count: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

stored_object!(ExtractionResult, "extraction_result", {
    article_id: String,
    consensus_summary: String,
    summary_a: Option<String>,
    summary_b: Option<String>,
    summary_arbitrator: Option<String>,
    summary_similarity: f64,
    had_conflicts: bool,
    used_arbitration: bool,
    ner_metrics: Option<NerMetrics>,
    processing_seconds: f64
});

impl ExtractionResult {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        article_id: String,
        consensus_summary: String,
        summary_a: Option<String>,
        summary_b: Option<String>,
        summary_arbitrator: Option<String>,
        summary_similarity: f64,
        had_conflicts: bool,
        used_arbitration: bool,
        ner_metrics: Option<NerMetrics>,
        processing_seconds: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            article_id,
            consensus_summary,
            summary_a,
            summary_b,
            summary_arbitrator,
            summary_similarity,
            had_conflicts,
            used_arbitration,
            ner_metrics,
            processing_seconds,
        }
    }

    /// Commits the result, all of its facts, and the article status flip in
    /// one transaction: either everything lands or nothing does.
    pub async fn store_with_facts(
        result: ExtractionResult,
        facts: Vec<Fact>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "BEGIN TRANSACTION;
                 CREATE type::thing('extraction_result', $result_id) CONTENT $result;
                 FOR $fact IN $facts {
                     CREATE type::thing('fact', $fact.id) CONTENT $fact;
                 };
                 UPDATE type::thing('article', $article_id) SET
                     status = $status,
                     processing_error = NONE,
                     updated_at = time::now();
                 COMMIT TRANSACTION;",
            )
            .bind(("result_id", result.id.clone()))
            .bind(("article_id", result.article_id.clone()))
            .bind(("result", result))
            .bind(("facts", facts))
            .bind(("status", ProcessingStatus::Completed))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn get_by_article(
        article_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<ExtractionResult>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM extraction_result WHERE article_id = $article_id LIMIT 1")
            .bind(("article_id", article_id.to_owned()))
            .await?;
        let rows: Vec<ExtractionResult> = response.take(0)?;
        Ok(rows.into_iter().next())
    }
}
