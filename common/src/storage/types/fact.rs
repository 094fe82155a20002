use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Location,
    Organization,
    Event,
    Other,
}

impl EntityType {
    pub fn variants() -> &'static [&'static str] {
        &["PERSON", "LOCATION", "ORGANIZATION", "EVENT", "OTHER"]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "PERSON",
            EntityType::Location => "LOCATION",
            EntityType::Organization => "ORGANIZATION",
            EntityType::Event => "EVENT",
            EntityType::Other => "OTHER",
        }
    }
}

impl From<String> for EntityType {
    fn from(s: String) -> Self {
        match s.to_uppercase().as_str() {
            "PERSON" | "PER" => EntityType::Person,
            "LOCATION" | "LOC" | "GPE" | "PLACE" => EntityType::Location,
            "ORGANIZATION" | "ORG" => EntityType::Organization,
            "EVENT" => EntityType::Event,
            _ => EntityType::Other,
        }
    }
}

/// Where a mention sits in the cleaned article text. Offsets index the
/// cleaned text, not the raw feed payload.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct MentionPosition {
    pub sentence_index: usize,
    pub paragraph_index: usize,
    pub char_start: usize,
    pub char_end: usize,
}

/// Resolved knowledge-base record for an entity surface.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct KbLink {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub properties: serde_json::Value,
}

stored_object!(Fact, "fact", {
    article_id: String,
    extraction_result_id: String,
    entity: String,
    entity_type: EntityType,
    confidence: f64,
    event_description: Option<String>,
    sources: Vec<String>,
    position: Option<MentionPosition>,
    kb: Option<KbLink>
});

impl Fact {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        article_id: String,
        extraction_result_id: String,
        entity: String,
        entity_type: EntityType,
        confidence: f64,
        event_description: Option<String>,
        sources: Vec<String>,
        position: Option<MentionPosition>,
        kb: Option<KbLink>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            article_id,
            extraction_result_id,
            entity,
            entity_type,
            confidence: confidence.clamp(0.0, 1.0),
            event_description,
            sources,
            position,
            kb,
        }
    }

    pub async fn for_article(article_id: &str, db: &SurrealDbClient) -> Result<Vec<Fact>, AppError> {
        let rows: Vec<Fact> = db
            .client
            .query("SELECT * FROM fact WHERE article_id = $article_id")
            .bind(("article_id", article_id.to_owned()))
            .await?
            .take(0)?;

        Ok(rows)
    }

    /// Facts that carry a sentence position; only these feed relationship
    /// generation.
    pub async fn positioned_for_article(
        article_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Fact>, AppError> {
        let rows: Vec<Fact> = db
            .client
            .query("SELECT * FROM fact WHERE article_id = $article_id AND position != NONE")
            .bind(("article_id", article_id.to_owned()))
            .await?
            .take(0)?;

        Ok(rows)
    }

    /// (article_id, entity) pairs across the whole corpus, for document
    /// frequency counting.
    pub async fn entity_article_pairs(
        db: &SurrealDbClient,
    ) -> Result<Vec<(String, String)>, AppError> {
        #[derive(Deserialize)]
        struct Row {
            article_id: String,
            entity: String,
        }

        let rows: Vec<Row> = db
            .client
            .query("SELECT article_id, entity FROM fact")
            .await?
            .take(0)?;

        Ok(rows.into_iter().map(|r| (r.article_id, r.entity)).collect())
    }
}
