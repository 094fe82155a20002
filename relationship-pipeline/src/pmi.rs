use std::collections::{HashMap, HashSet};

use common::storage::types::entity_relationship::ScoringMethod;

use crate::proximity::CooccurrenceData;

/// Proximity weight that maps to a proximity-only score of 1.0; a single
/// same-sentence co-occurrence (weight 3.0) scores exactly 0.3.
pub const PROXIMITY_SCORE_CAP: f64 = 10.0;

/// Corpus-level document frequencies: how many articles mention each entity,
/// plus the corpus size. Marginals for NPMI come from here; joint counts
/// stay per-article.
#[derive(Debug, Clone, Default)]
pub struct CorpusFrequencies {
    pub total_documents: u64,
    doc_frequency: HashMap<String, u64>,
}

impl CorpusFrequencies {
    /// Builds document frequencies from (article_id, entity) fact pairs.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut documents: HashSet<&str> = HashSet::new();
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        let mut doc_frequency: HashMap<String, u64> = HashMap::new();

        for (article_id, entity) in pairs {
            documents.insert(article_id);
            if seen.insert((article_id, entity)) {
                *doc_frequency.entry(entity.clone()).or_insert(0) += 1;
            }
        }

        Self {
            total_documents: documents.len() as u64,
            doc_frequency,
        }
    }

    pub fn frequency(&self, entity: &str) -> u64 {
        self.doc_frequency.get(entity).copied().unwrap_or(0)
    }
}

/// The association score for one pair, plus how it was produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PmiScore {
    pub pmi: Option<f64>,
    pub npmi: Option<f64>,
    /// Ranking score: clamped NPMI for the PMI path, normalized proximity
    /// weight for the rare-entity path.
    pub score: f64,
    pub method: ScoringMethod,
}

#[derive(Debug, Clone, Copy)]
pub struct PmiOptions {
    pub smoothing: f64,
    pub min_frequency: u64,
}

impl Default for PmiOptions {
    fn default() -> Self {
        Self {
            smoothing: 1e-6,
            min_frequency: 2,
        }
    }
}

/// Scores one co-occurring pair. Entities too rare for meaningful corpus
/// statistics bypass PMI entirely and score on proximity weight alone.
pub fn score_pair(
    cooccurrence: &CooccurrenceData,
    frequency_a: u64,
    frequency_b: u64,
    frequencies: &CorpusFrequencies,
    options: &PmiOptions,
) -> PmiScore {
    if frequency_a.min(frequency_b) < options.min_frequency {
        return PmiScore {
            pmi: None,
            npmi: None,
            score: proximity_score(cooccurrence.total_weight),
            method: ScoringMethod::Proximity,
        };
    }

    let epsilon = options.smoothing;
    let n = frequencies.total_documents.max(1) as f64;
    let joint = f64::from(cooccurrence.contribution_count());

    let p_xy = (joint + epsilon) / (n + epsilon);
    let p_x = (frequency_a as f64 + epsilon) / (n + epsilon);
    let p_y = (frequency_b as f64 + epsilon) / (n + epsilon);

    let pmi = (p_xy / (p_x * p_y + epsilon) + epsilon).ln();
    let npmi = pmi / (-(p_xy + epsilon).ln() + epsilon);
    let npmi_clamped = npmi.clamp(-1.0, 1.0);

    PmiScore {
        pmi: Some(pmi),
        npmi: Some(npmi_clamped),
        score: npmi_clamped,
        method: ScoringMethod::Pmi,
    }
}

/// Capped linear mapping of the pair's total proximity weight into [0, 1].
pub fn proximity_score(total_weight: f64) -> f64 {
    (total_weight / PROXIMITY_SCORE_CAP).clamp(0.0, 1.0)
}

/// Score weighted by how confidently the endpoints were extracted; the
/// thresholder ranks on this.
pub fn confidence_adjusted(score: f64, avg_confidence: f64) -> f64 {
    score * avg_confidence
}
