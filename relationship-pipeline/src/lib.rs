#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod pmi;
pub mod proximity;
pub mod threshold;

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            entity_relationship::{EntityRelationship, RelationshipType},
            fact::Fact,
        },
    },
    utils::config::AppConfig,
};
use tracing::{debug, info};

use crate::{
    pmi::{score_pair, CorpusFrequencies, PmiOptions, PmiScore},
    proximity::{build_matrix, CooccurrenceData},
    threshold::{filter_edges, ScoredEdge},
};

#[derive(Debug, Clone)]
pub struct RelationshipOptions {
    pub window_size: usize,
    pub pmi: PmiOptions,
}

impl Default for RelationshipOptions {
    fn default() -> Self {
        Self {
            window_size: 2,
            pmi: PmiOptions::default(),
        }
    }
}

impl RelationshipOptions {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            window_size: config.window_size,
            pmi: PmiOptions {
                smoothing: config.smoothing,
                min_frequency: config.min_frequency_for_pmi,
            },
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegenerationSummary {
    pub articles: usize,
    pub relationships: usize,
}

/// Corpus-batch relationship builder: proximity matrix per article, NPMI
/// against corpus document frequencies, size-adaptive thresholding, then a
/// transactional rebuild of each article's relationship rows.
pub struct RelationshipGenerator {
    db: Arc<SurrealDbClient>,
    options: RelationshipOptions,
}

impl RelationshipGenerator {
    pub fn new(db: Arc<SurrealDbClient>, options: RelationshipOptions) -> Self {
        Self { db, options }
    }

    /// Rebuilds relationships for every article that has facts. Safe to run
    /// repeatedly: unchanged facts produce the same rows.
    pub async fn regenerate_all(&self) -> Result<RegenerationSummary, AppError> {
        let pairs = Fact::entity_article_pairs(&self.db).await?;
        let frequencies = CorpusFrequencies::from_pairs(&pairs);

        let article_ids: BTreeSet<String> =
            pairs.into_iter().map(|(article_id, _)| article_id).collect();

        let mut summary = RegenerationSummary {
            articles: article_ids.len(),
            relationships: 0,
        };

        for article_id in &article_ids {
            summary.relationships += self.regenerate_article(article_id, &frequencies).await?;
        }

        info!(
            articles = summary.articles,
            relationships = summary.relationships,
            "relationship regeneration finished"
        );

        Ok(summary)
    }

    /// Rebuilds one article's relationship set against the given corpus
    /// frequencies. Returns how many rows were written.
    pub async fn regenerate_article(
        &self,
        article_id: &str,
        frequencies: &CorpusFrequencies,
    ) -> Result<usize, AppError> {
        let facts = Fact::positioned_for_article(article_id, &self.db).await?;

        let entity_count = facts
            .iter()
            .map(|f| f.entity.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        if entity_count < 2 {
            // Pairs are impossible; clear any stale rows and move on.
            EntityRelationship::replace_for_article(article_id, Vec::new(), &self.db).await?;
            debug!(article_id, entity_count, "too few positioned entities for relationships");
            return Ok(0);
        }

        let matrix = build_matrix(&facts, self.options.window_size);

        let mut scored: HashMap<(String, String), (CooccurrenceData, PmiScore)> = HashMap::new();
        let mut edges = Vec::with_capacity(matrix.len());

        for (key, data) in matrix {
            let score = score_pair(
                &data,
                frequencies.frequency(&key.0),
                frequencies.frequency(&key.1),
                frequencies,
                &self.options.pmi,
            );

            edges.push(ScoredEdge {
                entity_a: key.0.clone(),
                entity_b: key.1.clone(),
                score: score.score,
                confidence: data.avg_confidence(),
            });
            scored.insert(key, (data, score));
        }

        let kept = filter_edges(edges, entity_count);

        let relationships: Vec<EntityRelationship> = kept
            .into_iter()
            .filter_map(|edge| {
                let key = (edge.entity_a, edge.entity_b);
                let (data, score) = scored.remove(&key)?;
                Some(build_relationship(article_id, key, &data, score))
            })
            .collect();

        let count = relationships.len();
        EntityRelationship::replace_for_article(article_id, relationships, &self.db).await?;

        debug!(article_id, entity_count, relationships = count, "article relationships rebuilt");

        Ok(count)
    }
}

fn build_relationship(
    article_id: &str,
    (entity_a, entity_b): (String, String),
    data: &CooccurrenceData,
    score: PmiScore,
) -> EntityRelationship {
    let relationship_type = data.relationship_type();
    let description = describe(&entity_a, &entity_b, relationship_type, data);

    EntityRelationship::new(
        article_id.to_string(),
        entity_a,
        entity_b,
        relationship_type,
        description,
        data.avg_confidence(),
        score.pmi,
        score.npmi,
        score.method,
        data.contribution_count(),
        data.total_weight,
        data.min_distance,
        data.avg_distance(),
    )
}

fn describe(
    entity_a: &str,
    entity_b: &str,
    relationship_type: RelationshipType,
    data: &CooccurrenceData,
) -> String {
    let times = data.contribution_count();
    match relationship_type {
        RelationshipType::SameSentence => format!(
            "{entity_a} and {entity_b} appear in the same sentence ({times} co-occurrence{})",
            plural(times)
        ),
        RelationshipType::AdjacentSentence => format!(
            "{entity_a} and {entity_b} appear in adjacent sentences ({times} co-occurrence{})",
            plural(times)
        ),
        RelationshipType::NearProximity => format!(
            "{entity_a} and {entity_b} appear within {} sentences of each other ({times} co-occurrence{})",
            data.max_distance,
            plural(times)
        ),
    }
}

fn plural(count: u32) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
