use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Proximity class of a pair, the lowest sentence distance observed.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelationshipType {
    #[serde(rename = "same-sentence")]
    SameSentence,
    #[serde(rename = "adjacent-sentence")]
    AdjacentSentence,
    #[serde(rename = "near-proximity")]
    NearProximity,
}

impl RelationshipType {
    pub fn variants() -> &'static [&'static str] {
        &["same-sentence", "adjacent-sentence", "near-proximity"]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::SameSentence => "same-sentence",
            RelationshipType::AdjacentSentence => "adjacent-sentence",
            RelationshipType::NearProximity => "near-proximity",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMethod {
    Pmi,
    Proximity,
}

stored_object!(EntityRelationship, "entity_relationship", {
    article_id: String,
    entity_a: String,
    entity_b: String,
    relationship_type: RelationshipType,
    relationship_description: String,
    confidence: f64,
    pmi_score: Option<f64>,
    npmi_score: Option<f64>,
    scoring_method: ScoringMethod,
    raw_cooccurrence_count: u32,
    proximity_weight: f64,
    min_sentence_distance: u32,
    avg_sentence_distance: f64
});

impl EntityRelationship {
    /// Endpoints are stored lexically ordered so a pair has one canonical row
    /// per relationship type.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        article_id: String,
        entity_a: String,
        entity_b: String,
        relationship_type: RelationshipType,
        relationship_description: String,
        confidence: f64,
        pmi_score: Option<f64>,
        npmi_score: Option<f64>,
        scoring_method: ScoringMethod,
        raw_cooccurrence_count: u32,
        proximity_weight: f64,
        min_sentence_distance: u32,
        avg_sentence_distance: f64,
    ) -> Self {
        let (entity_a, entity_b) = if entity_a <= entity_b {
            (entity_a, entity_b)
        } else {
            (entity_b, entity_a)
        };

        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            article_id,
            entity_a,
            entity_b,
            relationship_type,
            relationship_description,
            confidence: confidence.clamp(0.0, 1.0),
            pmi_score,
            npmi_score,
            scoring_method,
            raw_cooccurrence_count,
            proximity_weight,
            min_sentence_distance,
            avg_sentence_distance,
        }
    }

    /// Relationship regeneration is a rebuild: the article's proximity rows
    /// are deleted and the new set inserted in one transaction.
    pub async fn replace_for_article(
        article_id: &str,
        relationships: Vec<EntityRelationship>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "BEGIN TRANSACTION;
                 DELETE entity_relationship WHERE article_id = $article_id;
                 FOR $relationship IN $relationships {
                     CREATE type::thing('entity_relationship', $relationship.id)
                         CONTENT $relationship;
                 };
                 COMMIT TRANSACTION;",
            )
            .bind(("article_id", article_id.to_owned()))
            .bind(("relationships", relationships))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn for_article(
        article_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<EntityRelationship>, AppError> {
        let rows: Vec<EntityRelationship> = db
            .client
            .query("SELECT * FROM entity_relationship WHERE article_id = $article_id")
            .bind(("article_id", article_id.to_owned()))
            .await?
            .take(0)?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn setup_db() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized().await.expect("init schema");
        db
    }

    fn sample_relationship(article_id: &str, a: &str, b: &str) -> EntityRelationship {
        EntityRelationship::new(
            article_id.to_string(),
            a.to_string(),
            b.to_string(),
            RelationshipType::SameSentence,
            format!("{a} and {b} appear in the same sentence"),
            0.85,
            Some(1.2),
            Some(0.4),
            ScoringMethod::Pmi,
            2,
            6.0,
            0,
            0.0,
        )
    }

    #[tokio::test]
    async fn test_endpoints_are_lexically_ordered() {
        let reversed = sample_relationship("article-1", "Vermont Legislature", "Phil Scott");
        assert_eq!(reversed.entity_a, "Phil Scott");
        assert_eq!(reversed.entity_b, "Vermont Legislature");

        let ordered = sample_relationship("article-1", "Phil Scott", "Vermont Legislature");
        assert_eq!(ordered.entity_a, "Phil Scott");
        assert_eq!(ordered.entity_b, "Vermont Legislature");
    }

    #[tokio::test]
    async fn test_replace_for_article_rebuilds_rows() {
        let db = setup_db().await;

        EntityRelationship::replace_for_article(
            "article-1",
            vec![
                sample_relationship("article-1", "Phil Scott", "Vermont Legislature"),
                sample_relationship("article-1", "Burlington", "Phil Scott"),
            ],
            &db,
        )
        .await
        .expect("first build");

        // Rebuild with a smaller set; the old rows must be gone.
        EntityRelationship::replace_for_article(
            "article-1",
            vec![sample_relationship(
                "article-1",
                "Phil Scott",
                "Vermont Legislature",
            )],
            &db,
        )
        .await
        .expect("rebuild");

        let rows = EntityRelationship::for_article("article-1", &db)
            .await
            .expect("fetch rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity_a, "Phil Scott");
        assert_eq!(rows[0].entity_b, "Vermont Legislature");
    }

    #[tokio::test]
    async fn test_replace_leaves_other_articles_alone() {
        let db = setup_db().await;

        EntityRelationship::replace_for_article(
            "article-1",
            vec![sample_relationship(
                "article-1",
                "Phil Scott",
                "Vermont Legislature",
            )],
            &db,
        )
        .await
        .expect("build article-1");

        EntityRelationship::replace_for_article(
            "article-2",
            vec![sample_relationship("article-2", "Burlington", "Montpelier")],
            &db,
        )
        .await
        .expect("build article-2");

        let first = EntityRelationship::for_article("article-1", &db)
            .await
            .expect("fetch article-1");
        assert_eq!(first.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_pair_and_type_is_rejected() {
        let db = setup_db().await;

        let first = sample_relationship("article-1", "Phil Scott", "Vermont Legislature");
        db.store_item(first).await.expect("first insert");

        let second = sample_relationship("article-1", "Phil Scott", "Vermont Legislature");
        let result = db.store_item(second).await;
        assert!(
            result.is_err(),
            "unique (article, pair, type) index should reject duplicates"
        );
    }
}
