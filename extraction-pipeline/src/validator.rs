use std::collections::HashMap;

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::types::fact::EntityType,
    utils::similarity::cosine_similarity,
};
use tracing::{debug, warn};

use crate::{
    arbitrator::{Arbitrator, ARBITRATOR_SOURCE},
    extractor::{EntityMention, Extraction},
    nlp::normalize::{canonical_surface, display_surface},
};

/// Multiplier applied when more than one extractor produced a mention.
const AGREEMENT_BOOST: f64 = 1.15;

/// Capability seam for summary embeddings so tests stay deterministic.
#[async_trait]
pub trait SummaryEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConflictReport {
    pub had_conflicts: bool,
    pub used_arbitration: bool,
    pub summary_similarity: f64,
    pub conflict_entity_count: usize,
}

/// The reconciled output of the ensemble for one article.
#[derive(Debug, Clone)]
pub struct ConsensusExtraction {
    pub summary: String,
    pub summary_a: Option<String>,
    pub summary_b: Option<String>,
    pub summary_arbitrator: Option<String>,
    pub entities: Vec<EntityMention>,
    pub report: ConflictReport,
}

pub struct Validator {
    pub similarity_threshold: f64,
    pub confidence_threshold: f64,
}

impl Validator {
    pub fn new(similarity_threshold: f64, confidence_threshold: f64) -> Self {
        Self {
            similarity_threshold,
            confidence_threshold,
        }
    }

    /// Merges the surviving extractions into a consensus. Summary
    /// disagreement below the similarity threshold flags a conflict and
    /// pulls in the arbitrator when one is available.
    pub async fn validate(
        &self,
        extraction_a: Option<Extraction>,
        extraction_b: Option<Extraction>,
        embedder: &dyn SummaryEmbedder,
        arbitrator: Option<&Arbitrator>,
        article_id: &str,
    ) -> Result<ConsensusExtraction, AppError> {
        match (extraction_a, extraction_b) {
            (Some(a), Some(b)) => {
                self.validate_pair(a, b, embedder, arbitrator, article_id)
                    .await
            }
            (Some(single), None) | (None, Some(single)) => Ok(self.validate_single(single)),
            (None, None) => Err(AppError::Extraction(
                "validator received no extractions".to_string(),
            )),
        }
    }

    fn validate_single(&self, extraction: Extraction) -> ConsensusExtraction {
        let mut entities = merge_mentions(extraction.entities.iter().cloned());
        apply_agreement_boost(&mut entities);
        entities.retain(|m| m.confidence >= self.confidence_threshold);

        ConsensusExtraction {
            summary: extraction.summary.clone(),
            summary_a: Some(extraction.summary),
            summary_b: None,
            summary_arbitrator: None,
            entities,
            report: ConflictReport {
                had_conflicts: false,
                used_arbitration: false,
                summary_similarity: 1.0,
                conflict_entity_count: 0,
            },
        }
    }

    async fn validate_pair(
        &self,
        a: Extraction,
        b: Extraction,
        embedder: &dyn SummaryEmbedder,
        arbitrator: Option<&Arbitrator>,
        article_id: &str,
    ) -> Result<ConsensusExtraction, AppError> {
        let (embedding_a, embedding_b) =
            tokio::try_join!(embedder.embed(&a.summary), embedder.embed(&b.summary))?;
        let summary_similarity = cosine_similarity(&embedding_a, &embedding_b);
        let had_conflicts = summary_similarity < self.similarity_threshold;

        if had_conflicts && a.entities.is_empty() && b.entities.is_empty() {
            return Err(AppError::Validation(
                "extractors produced no entities and unrelated summaries".to_string(),
            ));
        }

        let mut entities =
            merge_mentions(a.entities.iter().cloned().chain(b.entities.iter().cloned()));
        let conflict_entity_count = entities.iter().filter(|m| m.sources.len() == 1).count();

        debug!(
            article_id,
            summary_similarity,
            had_conflicts,
            merged_entities = entities.len(),
            conflict_entity_count,
            "validated ensemble output"
        );

        let mut used_arbitration = false;
        let mut summary_arbitrator = None;
        let consensus_summary = if had_conflicts {
            match resolve_with_arbitrator(arbitrator, &a, &b, &mut entities, article_id).await {
                Some(fused) => {
                    used_arbitration = true;
                    summary_arbitrator = Some(fused.clone());
                    fused
                }
                None => longer_of(&a.summary, &b.summary).to_string(),
            }
        } else {
            longer_of(&a.summary, &b.summary).to_string()
        };

        apply_agreement_boost(&mut entities);
        entities.retain(|m| m.confidence >= self.confidence_threshold);

        Ok(ConsensusExtraction {
            summary: consensus_summary,
            summary_a: Some(a.summary),
            summary_b: Some(b.summary),
            summary_arbitrator,
            entities,
            report: ConflictReport {
                had_conflicts,
                used_arbitration,
                summary_similarity,
                conflict_entity_count,
            },
        })
    }
}

async fn resolve_with_arbitrator(
    arbitrator: Option<&Arbitrator>,
    a: &Extraction,
    b: &Extraction,
    entities: &mut [EntityMention],
    article_id: &str,
) -> Option<String> {
    let arbitrator = arbitrator?;

    match arbitrator
        .arbitrate(&a.summary, &b.summary, &a.entities, &b.entities, article_id)
        .await
    {
        Ok(outcome) => {
            // The arbitrator endorses existing mentions; it never adds new ones.
            for endorsed in &outcome.entities {
                let key = (
                    canonical_surface(&endorsed.surface, &endorsed.entity_type),
                    endorsed.entity_type,
                );
                if let Some(mention) = entities.iter_mut().find(|m| {
                    (canonical_surface(&m.surface, &m.entity_type), m.entity_type) == key
                }) {
                    if !mention.sources.iter().any(|s| s == ARBITRATOR_SOURCE) {
                        mention.sources.push(ARBITRATOR_SOURCE.to_string());
                    }
                }
            }
            Some(outcome.summary)
        }
        Err(err) => {
            warn!(
                article_id,
                error = %err,
                "arbitration failed; falling back to the longer summary"
            );
            None
        }
    }
}

/// Groups mentions by (canonical surface, type). The merged mention keeps
/// the highest-confidence contributor's stripped surface, the union of
/// sources, and the longest event description.
pub fn merge_mentions(mentions: impl Iterator<Item = EntityMention>) -> Vec<EntityMention> {
    let mut merged: Vec<EntityMention> = Vec::new();
    let mut index: HashMap<(String, EntityType), usize> = HashMap::new();

    for mention in mentions {
        let key = (
            canonical_surface(&mention.surface, &mention.entity_type),
            mention.entity_type,
        );

        match index.get(&key) {
            Some(&i) => {
                let existing = &mut merged[i];
                if mention.confidence > existing.confidence {
                    existing.confidence = mention.confidence;
                    existing.surface = display_surface(&mention.surface, &mention.entity_type);
                }
                for source in mention.sources {
                    if !existing.sources.contains(&source) {
                        existing.sources.push(source);
                    }
                }
                let incoming_len = mention
                    .event_description
                    .as_deref()
                    .map_or(0, str::len);
                let existing_len = existing
                    .event_description
                    .as_deref()
                    .map_or(0, str::len);
                if incoming_len > existing_len {
                    existing.event_description = mention.event_description;
                }
            }
            None => {
                index.insert(key, merged.len());
                merged.push(EntityMention {
                    surface: display_surface(&mention.surface, &mention.entity_type),
                    ..mention
                });
            }
        }
    }

    merged
}

fn apply_agreement_boost(entities: &mut [EntityMention]) {
    for mention in entities.iter_mut() {
        if mention.sources.len() >= 2 {
            mention.confidence = (mention.confidence * AGREEMENT_BOOST).clamp(0.0, 1.0);
        }
    }
}

fn longer_of<'a>(a: &'a str, b: &'a str) -> &'a str {
    if b.len() > a.len() {
        b
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::Extraction;

    struct KeywordEmbedder;

    // Maps a summary onto a tiny keyword axis so similarity is controllable
    // from the test text.
    #[async_trait]
    impl SummaryEmbedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
            let axes = ["budget", "school", "storm"];
            Ok(axes
                .iter()
                .map(|k| if text.contains(k) { 1.0 } else { 0.0 })
                .collect())
        }
    }

    fn mention(surface: &str, ty: EntityType, confidence: f64, source: &str) -> EntityMention {
        EntityMention {
            surface: surface.to_string(),
            entity_type: ty,
            confidence,
            sources: vec![source.to_string()],
            event_description: None,
            position: None,
            kb: None,
        }
    }

    fn extraction(provider: &str, summary: &str, entities: Vec<EntityMention>) -> Extraction {
        Extraction {
            provider_id: provider.to_string(),
            summary: summary.to_string(),
            entities,
        }
    }

    #[tokio::test]
    async fn test_agreeing_summaries_pick_the_longer_one() {
        let validator = Validator::new(0.75, 0.4);
        let a = extraction(
            "extractor-a",
            "The town budget passed.",
            vec![mention("Phil Scott", EntityType::Person, 0.9, "extractor-a")],
        );
        let b = extraction(
            "extractor-b",
            "The town budget passed after a long budget debate.",
            vec![mention("Phil Scott", EntityType::Person, 0.8, "extractor-b")],
        );

        let consensus = validator
            .validate(Some(a), Some(b), &KeywordEmbedder, None, "article-1")
            .await
            .expect("validation succeeds");

        assert!(!consensus.report.had_conflicts);
        assert!(!consensus.report.used_arbitration);
        assert_eq!(
            consensus.summary,
            "The town budget passed after a long budget debate."
        );
        assert!(consensus.report.summary_similarity >= 0.75);
    }

    #[tokio::test]
    async fn test_agreement_boost_and_source_union() {
        let validator = Validator::new(0.75, 0.4);
        let a = extraction(
            "extractor-a",
            "A budget story.",
            vec![mention("Gov. Phil Scott", EntityType::Person, 0.8, "extractor-a")],
        );
        let b = extraction(
            "extractor-b",
            "A budget story too.",
            vec![mention("Phil Scott", EntityType::Person, 0.7, "extractor-b")],
        );

        let consensus = validator
            .validate(Some(a), Some(b), &KeywordEmbedder, None, "article-1")
            .await
            .expect("validation succeeds");

        assert_eq!(consensus.entities.len(), 1);
        let merged = &consensus.entities[0];
        assert_eq!(merged.surface, "Phil Scott");
        assert_eq!(merged.sources.len(), 2);
        // max(0.8, 0.7) * 1.15
        assert!((merged.confidence - 0.92).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_low_confidence_mentions_are_filtered() {
        let validator = Validator::new(0.75, 0.4);
        let a = extraction(
            "extractor-a",
            "A budget story.",
            vec![
                mention("Phil Scott", EntityType::Person, 0.9, "extractor-a"),
                mention("Someone Vague", EntityType::Person, 0.2, "extractor-a"),
            ],
        );
        let b = extraction("extractor-b", "A budget story too.", Vec::new());

        let consensus = validator
            .validate(Some(a), Some(b), &KeywordEmbedder, None, "article-1")
            .await
            .expect("validation succeeds");

        assert_eq!(consensus.entities.len(), 1);
        assert_eq!(consensus.entities[0].surface, "Phil Scott");
    }

    #[tokio::test]
    async fn test_single_source_reports_no_conflict() {
        let validator = Validator::new(0.75, 0.4);
        let a = extraction(
            "extractor-a",
            "Only extractor A survived.",
            vec![mention("Phil Scott", EntityType::Person, 0.9, "extractor-a")],
        );

        let consensus = validator
            .validate(Some(a), None, &KeywordEmbedder, None, "article-1")
            .await
            .expect("validation succeeds");

        assert!(!consensus.report.had_conflicts);
        assert!(!consensus.report.used_arbitration);
        assert_eq!(consensus.summary, "Only extractor A survived.");
        assert!(consensus.summary_b.is_none());
        // Single-source confidence is not boosted.
        assert!((consensus.entities[0].confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_conflict_without_arbitrator_falls_back_to_longer_summary() {
        let validator = Validator::new(0.75, 0.4);
        let a = extraction(
            "extractor-a",
            "A budget story.",
            vec![mention("Phil Scott", EntityType::Person, 0.9, "extractor-a")],
        );
        let b = extraction(
            "extractor-b",
            "A storm story that is much longer in every way.",
            vec![mention("Burlington", EntityType::Location, 0.8, "extractor-b")],
        );

        let consensus = validator
            .validate(Some(a), Some(b), &KeywordEmbedder, None, "article-1")
            .await
            .expect("validation succeeds");

        assert!(consensus.report.had_conflicts);
        assert!(!consensus.report.used_arbitration);
        assert_eq!(consensus.report.conflict_entity_count, 2);
        assert_eq!(
            consensus.summary,
            "A storm story that is much longer in every way."
        );
    }

    #[tokio::test]
    async fn test_conflict_with_arbitrator_fuses_summary_and_tags_sources() {
        use crate::extractor::{ExtractionRequest, Extractor};
        use std::sync::Arc;

        struct StubArbitratorExtractor;

        #[async_trait]
        impl Extractor for StubArbitratorExtractor {
            fn provider_id(&self) -> &str {
                "arbitrator-model"
            }

            async fn extract(
                &self,
                _request: ExtractionRequest<'_>,
            ) -> Result<Extraction, AppError> {
                Ok(Extraction {
                    provider_id: "arbitrator-model".to_string(),
                    summary: "Fused: the budget passed amid storm coverage.".to_string(),
                    entities: vec![mention(
                        "Burlington",
                        EntityType::Location,
                        0.9,
                        "arbitrator-model",
                    )],
                })
            }
        }

        let validator = Validator::new(0.75, 0.4);
        let a = extraction(
            "extractor-a",
            "A budget story.",
            vec![mention("Burlington", EntityType::Location, 0.8, "extractor-a")],
        );
        let b = extraction(
            "extractor-b",
            "A storm story.",
            vec![mention("Burlington", EntityType::Location, 0.7, "extractor-b")],
        );

        let arbitrator = crate::arbitrator::Arbitrator::new(Arc::new(StubArbitratorExtractor));
        let consensus = validator
            .validate(
                Some(a),
                Some(b),
                &KeywordEmbedder,
                Some(&arbitrator),
                "article-1",
            )
            .await
            .expect("validation succeeds");

        assert!(consensus.report.had_conflicts);
        assert!(consensus.report.used_arbitration);
        assert_eq!(
            consensus.summary,
            "Fused: the budget passed amid storm coverage."
        );
        assert_eq!(
            consensus.summary_arbitrator.as_deref(),
            Some("Fused: the budget passed amid storm coverage.")
        );

        assert_eq!(consensus.entities.len(), 1);
        let burlington = &consensus.entities[0];
        assert_eq!(
            burlington.sources,
            vec![
                "extractor-a".to_string(),
                "extractor-b".to_string(),
                "arbitrator".to_string()
            ]
        );
        // max(0.8, 0.7) boosted by agreement.
        assert!((burlington.confidence - 0.92).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_conflicting_empty_extractions_are_a_validation_error() {
        let validator = Validator::new(0.75, 0.4);
        let a = extraction("extractor-a", "A budget story.", Vec::new());
        let b = extraction("extractor-b", "A storm story.", Vec::new());

        let result = validator
            .validate(Some(a), Some(b), &KeywordEmbedder, None, "article-1")
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_merge_is_case_and_honorific_insensitive() {
        let merged = merge_mentions(
            vec![
                mention("GOV. PHIL SCOTT", EntityType::Person, 0.6, "extractor-a"),
                mention("Phil Scott", EntityType::Person, 0.9, "extractor-b"),
            ]
            .into_iter(),
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].surface, "Phil Scott");
        assert!((merged[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_merge_keeps_types_distinct() {
        let merged = merge_mentions(
            vec![
                mention("Burlington", EntityType::Location, 0.8, "extractor-a"),
                mention("Burlington", EntityType::Organization, 0.7, "extractor-b"),
            ]
            .into_iter(),
        );

        assert_eq!(merged.len(), 2, "same surface, different types stay apart");
    }

    #[test]
    fn test_merge_prefers_longest_description() {
        let mut with_short = mention("H.100", EntityType::Event, 0.8, "extractor-a");
        with_short.event_description = Some("signed".to_string());
        let mut with_long = mention("H.100", EntityType::Event, 0.7, "extractor-b");
        with_long.event_description = Some("signed into law on Tuesday".to_string());

        let merged = merge_mentions(vec![with_short, with_long].into_iter());

        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged[0].event_description.as_deref(),
            Some("signed into law on Tuesday")
        );
    }
}
