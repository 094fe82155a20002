use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

// `created_at` is the record timestamp used by the budget windows.
stored_object!(CostRecord, "cost_record", {
    article_id: Option<String>,
    provider: String,
    model: String,
    operation: String,
    input_tokens: u64,
    output_tokens: u64,
    cost: f64
});

impl CostRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        article_id: Option<String>,
        provider: String,
        model: String,
        operation: String,
        input_tokens: u64,
        output_tokens: u64,
        cost: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            article_id,
            provider,
            model,
            operation,
            input_tokens,
            output_tokens,
            cost,
        }
    }

    /// Total monetary cost of records at or after the cutoff.
    pub async fn sum_since(
        cutoff: DateTime<Utc>,
        db: &SurrealDbClient,
    ) -> Result<f64, AppError> {
        #[derive(Deserialize)]
        struct Row {
            total: f64,
        }

        let rows: Vec<Row> = db
            .client
            .query(
                "SELECT math::sum(cost) AS total FROM cost_record
                 WHERE created_at >= $cutoff GROUP ALL",
            )
            .bind(("cutoff", surrealdb::sql::Datetime::from(cutoff)))
            .await?
            .take(0)?;

        Ok(rows.first().map_or(0.0, |r| r.total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
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

    fn record_with_age(cost: f64, age: Duration) -> CostRecord {
        let mut record = CostRecord::new(
            Some("article-1".to_string()),
            "openai".to_string(),
            "gpt-4o-mini".to_string(),
            "extraction".to_string(),
            1200,
            350,
            cost,
        );
        record.created_at = Utc::now() - age;
        record
    }

    #[tokio::test]
    async fn test_sum_since_ignores_older_records() {
        let db = setup_db().await;

        db.store_item(record_with_age(0.05, Duration::hours(1)))
            .await
            .expect("store recent");
        db.store_item(record_with_age(0.07, Duration::hours(2)))
            .await
            .expect("store recent");
        db.store_item(record_with_age(5.0, Duration::days(40)))
            .await
            .expect("store old");

        let sum = CostRecord::sum_since(Utc::now() - Duration::days(1), &db)
            .await
            .expect("sum");
        assert!((sum - 0.12).abs() < 1e-9, "expected 0.12, got {sum}");
    }

    #[tokio::test]
    async fn test_sum_since_empty_table_is_zero() {
        let db = setup_db().await;

        let sum = CostRecord::sum_since(Utc::now() - Duration::days(30), &db)
            .await
            .expect("sum");
        assert!(sum.abs() < f64::EPSILON);
    }
}
