use std::collections::HashMap;

use common::storage::types::{entity_relationship::RelationshipType, fact::Fact};

/// Sentence-distance weights: same sentence, adjacent sentences, and the
/// remainder of the proximity window.
pub const SAME_SENTENCE_WEIGHT: f64 = 3.0;
pub const ADJACENT_SENTENCE_WEIGHT: f64 = 2.0;
pub const NEAR_PROXIMITY_WEIGHT: f64 = 1.0;

/// Aggregated co-occurrence evidence for one entity pair within an article.
#[derive(Debug, Clone, PartialEq)]
pub struct CooccurrenceData {
    pub total_weight: f64,
    pub same_sentence_count: u32,
    pub adjacent_sentence_count: u32,
    pub near_proximity_count: u32,
    pub min_distance: u32,
    pub max_distance: u32,
    distance_sum: u64,
    /// Mean endpoint confidence per contribution, kept for later averaging.
    pub confidences: Vec<f64>,
}

impl CooccurrenceData {
    fn new() -> Self {
        Self {
            total_weight: 0.0,
            same_sentence_count: 0,
            adjacent_sentence_count: 0,
            near_proximity_count: 0,
            min_distance: u32::MAX,
            max_distance: 0,
            distance_sum: 0,
            confidences: Vec::new(),
        }
    }

    fn add_contribution(&mut self, distance: u32, confidence: f64) {
        let weight = match distance {
            0 => {
                self.same_sentence_count += 1;
                SAME_SENTENCE_WEIGHT
            }
            1 => {
                self.adjacent_sentence_count += 1;
                ADJACENT_SENTENCE_WEIGHT
            }
            _ => {
                self.near_proximity_count += 1;
                NEAR_PROXIMITY_WEIGHT
            }
        };

        self.total_weight += weight;
        self.min_distance = self.min_distance.min(distance);
        self.max_distance = self.max_distance.max(distance);
        self.distance_sum += u64::from(distance);
        self.confidences.push(confidence);
    }

    /// Number of occurrence pairs that contributed.
    pub fn contribution_count(&self) -> u32 {
        u32::try_from(self.confidences.len()).unwrap_or(u32::MAX)
    }

    pub fn avg_distance(&self) -> f64 {
        if self.confidences.is_empty() {
            0.0
        } else {
            self.distance_sum as f64 / self.confidences.len() as f64
        }
    }

    pub fn avg_confidence(&self) -> f64 {
        if self.confidences.is_empty() {
            0.0
        } else {
            self.confidences.iter().sum::<f64>() / self.confidences.len() as f64
        }
    }

    /// The lowest-distance class the pair co-occurred in.
    pub fn relationship_type(&self) -> RelationshipType {
        if self.same_sentence_count > 0 {
            RelationshipType::SameSentence
        } else if self.adjacent_sentence_count > 0 {
            RelationshipType::AdjacentSentence
        } else {
            RelationshipType::NearProximity
        }
    }
}

/// Builds the per-article weighted co-occurrence matrix from positioned
/// facts. Pair keys are the stored surfaces, lexically ordered; every
/// occurrence pair within the window contributes once.
pub fn build_matrix(
    facts: &[Fact],
    window_size: usize,
) -> HashMap<(String, String), CooccurrenceData> {
    let mut matrix: HashMap<(String, String), CooccurrenceData> = HashMap::new();
    let window = i64::try_from(window_size).unwrap_or(i64::MAX);

    for (i, left) in facts.iter().enumerate() {
        let Some(left_position) = &left.position else {
            continue;
        };

        for right in facts.iter().skip(i + 1) {
            let Some(right_position) = &right.position else {
                continue;
            };
            if left.entity == right.entity {
                continue;
            }

            let distance = (left_position.sentence_index as i64
                - right_position.sentence_index as i64)
                .abs();
            if distance > window {
                continue;
            }

            let key = pair_key(&left.entity, &right.entity);
            let confidence = (left.confidence + right.confidence) / 2.0;

            matrix
                .entry(key)
                .or_insert_with(CooccurrenceData::new)
                .add_contribution(u32::try_from(distance).unwrap_or(u32::MAX), confidence);
        }
    }

    matrix
}

pub fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}
