use sha2::{Digest, Sha256};
use surrealdb::opt::PatchOp;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Pending,
    Completed,
    Failed,
}

/// Aggregate health counters surfaced to operators.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
}

// `created_at` doubles as the collection timestamp: the collector inserts the
// row at the moment it fetched the article.
stored_object!(Article, "article", {
    url: String,
    content_hash: String,
    title: String,
    source: String,
    text: String,
    #[serde(
        serialize_with = "serialize_datetime",
        deserialize_with = "deserialize_datetime",
        default
    )]
    published_at: DateTime<Utc>,
    status: ProcessingStatus,
    processing_error: Option<String>
});

impl Article {
    pub fn new(
        url: String,
        title: String,
        source: String,
        text: String,
        published_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            content_hash: Self::content_hash_for(&text),
            url,
            title,
            source,
            text,
            published_at,
            status: ProcessingStatus::Pending,
            processing_error: None,
        }
    }

    pub fn content_hash_for(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Idempotent insert: an article whose content hash or URL is already
    /// present is a no-op returning the stored row.
    pub async fn insert(article: Article, db: &SurrealDbClient) -> Result<Article, AppError> {
        if let Some(existing) =
            Self::find_duplicate(&article.content_hash, &article.url, db).await?
        {
            return Ok(existing);
        }

        match db.store_item(article.clone()).await {
            Ok(Some(stored)) => Ok(stored),
            Ok(None) => Err(AppError::InternalError(
                "article insert returned no row".into(),
            )),
            // Lost a race against the unique index; the winner is our row.
            Err(err) => Self::find_duplicate(&article.content_hash, &article.url, db)
                .await?
                .ok_or(AppError::Database(err)),
        }
    }

    async fn find_duplicate(
        content_hash: &str,
        url: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Article>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM article WHERE content_hash = $hash OR url = $url LIMIT 1")
            .bind(("hash", content_hash.to_owned()))
            .bind(("url", url.to_owned()))
            .await?;
        let rows: Vec<Article> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Pending articles in publication order, oldest first.
    pub async fn list_pending(limit: usize, db: &SurrealDbClient) -> Result<Vec<Article>, AppError> {
        let rows: Vec<Article> = db
            .client
            .query(
                "SELECT * FROM article WHERE status = $status ORDER BY published_at ASC LIMIT $limit",
            )
            .bind(("status", ProcessingStatus::Pending))
            .bind(("limit", limit))
            .await?
            .take(0)?;

        Ok(rows)
    }

    /// Idempotent: repeated calls leave the same failed state.
    pub async fn mark_failed(
        id: &str,
        error_text: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let _article: Option<Article> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/status", ProcessingStatus::Failed))
            .patch(PatchOp::replace(
                "/processing_error",
                Some(error_text.to_owned()),
            ))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::sql::Datetime::default(),
            ))
            .await?;

        Ok(())
    }

    /// Reverts an article to pending after a rolled-back persistence attempt.
    pub async fn mark_pending(id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        let _article: Option<Article> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/status", ProcessingStatus::Pending))
            .patch(PatchOp::replace("/processing_error", None::<String>))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::sql::Datetime::default(),
            ))
            .await?;

        Ok(())
    }

    pub async fn status_counts(db: &SurrealDbClient) -> Result<StatusCounts, AppError> {
        #[derive(Deserialize)]
        struct Row {
            status: ProcessingStatus,
            total: usize,
        }

        let rows: Vec<Row> = db
            .client
            .query("SELECT status, count() AS total FROM article GROUP BY status")
            .await?
            .take(0)?;

        let mut counts = StatusCounts::default();
        for row in rows {
            match row.status {
                ProcessingStatus::Pending => counts.pending = row.total,
                ProcessingStatus::Completed => counts.completed = row.total,
                ProcessingStatus::Failed => counts.failed = row.total,
            }
        }

        Ok(counts)
    }

    /// Removes the article together with everything derived from it.
    pub async fn delete_cascade(id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        db.client
            .query(
                "BEGIN TRANSACTION;
                 DELETE fact WHERE article_id = $id;
                 DELETE entity_relationship WHERE article_id = $id;
                 DELETE extraction_result WHERE article_id = $id;
                 DELETE type::thing('article', $id);
                 COMMIT TRANSACTION;",
            )
            .bind(("id", id.to_owned()))
            .await?
            .check()?;

        Ok(())
    }
}
