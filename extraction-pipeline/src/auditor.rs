use std::collections::HashSet;

use common::storage::types::{extraction_result::NerMetrics, fact::EntityType};
use tracing::debug;

use crate::{
    extractor::EntityMention,
    nlp::{
        ner::{NerEntity, RuleBasedNer},
        normalize::canonical_surface,
        segmenter::SentenceSegmenter,
    },
};

/// Independent audit of the ensemble's entity output against the
/// deterministic recognizer. Advisory: the metrics land on the extraction
/// result but never change the merged entity set.
pub struct NerAuditor {
    ner: RuleBasedNer,
}

impl NerAuditor {
    pub fn new() -> Self {
        Self {
            ner: RuleBasedNer,
        }
    }

    /// Precision is measured against the ensemble set, recall against the
    /// auditor set; intersection matches on canonical surface AND type.
    pub fn audit(
        &self,
        text: &str,
        ensemble_entities: &[EntityMention],
        segmenter: &dyn SentenceSegmenter,
    ) -> (Vec<NerEntity>, NerMetrics) {
        let auditor_entities = self.ner.recognize(text, segmenter);

        let ensemble_keys: HashSet<(String, EntityType)> = ensemble_entities
            .iter()
            .map(|m| (canonical_surface(&m.surface, &m.entity_type), m.entity_type))
            .collect();
        let auditor_keys: HashSet<(String, EntityType)> = auditor_entities
            .iter()
            .map(|e| (canonical_surface(&e.surface, &e.entity_type), e.entity_type))
            .collect();

        let agreed = ensemble_keys.intersection(&auditor_keys).count();

        let precision = ratio(agreed, ensemble_keys.len());
        let recall = ratio(agreed, auditor_keys.len());
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        let metrics = NerMetrics {
            entity_count: auditor_entities.len(),
            precision,
            recall,
            f1,
        };

        debug!(
            auditor_entities = auditor_entities.len(),
            ensemble_entities = ensemble_entities.len(),
            agreed,
            precision,
            recall,
            f1,
            "ner audit complete"
        );

        (auditor_entities, metrics)
    }
}

impl Default for NerAuditor {
    fn default() -> Self {
        Self::new()
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::segmenter::RegexSegmenter;

    fn mention(surface: &str, ty: EntityType) -> EntityMention {
        EntityMention {
            surface: surface.to_string(),
            entity_type: ty,
            confidence: 0.9,
            sources: vec!["extractor-a".to_string()],
            event_description: None,
            position: None,
            kb: None,
        }
    }

    #[test]
    fn test_full_agreement_scores_cleanly() {
        let text = "Governor Phil Scott signed H.100 on Tuesday.";
        let auditor = NerAuditor::new();

        // Audit against exactly what the rule-based recognizer sees.
        let (recognized, _) = auditor.audit(text, &[], &RegexSegmenter);
        let ensemble: Vec<EntityMention> = recognized
            .iter()
            .map(|e| mention(&e.surface, e.entity_type))
            .collect();

        let (_, metrics) = auditor.audit(text, &ensemble, &RegexSegmenter);
        assert!((metrics.precision - 1.0).abs() < 1e-9);
        assert!((metrics.recall - 1.0).abs() < 1e-9);
        assert!((metrics.f1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_agreement() {
        let text = "Governor Phil Scott signed the bill. The Vermont Legislature passed it.";
        let auditor = NerAuditor::new();

        // Ensemble found one of the auditor's entities plus one of its own.
        let ensemble = vec![
            mention("Phil Scott", EntityType::Person),
            mention("Montpelier Rotary Club", EntityType::Organization),
        ];

        let (recognized, metrics) = auditor.audit(text, &ensemble, &RegexSegmenter);
        assert!(recognized
            .iter()
            .any(|e| e.surface == "Vermont Legislature"));

        assert!((metrics.precision - 0.5).abs() < 1e-9, "{metrics:?}");
        assert!(metrics.recall > 0.0 && metrics.recall < 1.0);
        assert!(metrics.f1 > 0.0 && metrics.f1 < 1.0);
        assert!(metrics.entity_count >= 2);
    }

    #[test]
    fn test_empty_sets_score_zero_not_nan() {
        let auditor = NerAuditor::new();
        let (_, metrics) = auditor.audit("nothing notable here.", &[], &RegexSegmenter);

        assert!(metrics.precision.abs() < f64::EPSILON);
        assert!(metrics.recall.abs() < f64::EPSILON);
        assert!(metrics.f1.abs() < f64::EPSILON);
    }

    #[test]
    fn test_normalization_bridges_honorifics() {
        let text = "Gov. Phil Scott visited Montpelier.";
        let auditor = NerAuditor::new();

        let ensemble = vec![mention("Phil Scott", EntityType::Person)];
        let (_, metrics) = auditor.audit(text, &ensemble, &RegexSegmenter);

        assert!(
            (metrics.precision - 1.0).abs() < 1e-9,
            "auditor's 'Gov. Phil Scott' should match ensemble's 'Phil Scott': {metrics:?}"
        );
    }
}
