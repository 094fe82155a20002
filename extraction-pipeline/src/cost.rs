use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::cost_record::CostRecord},
    utils::config::ModelPricing,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Budget verdict between articles. Halt is cooperative: the in-flight
/// article finishes, the rest of the batch stays pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetStatus {
    Ok,
    Halted(String),
}

// A processed article typically costs two extractor calls plus occasional
// arbitration; the budget check reserves headroom for that many calls.
const ESTIMATED_CALLS_PER_ARTICLE: f64 = 3.0;

#[derive(Debug, Clone, Copy)]
struct CostWindows {
    daily: f64,
    monthly: f64,
    day: i64,
    month: (i32, u32),
    /// Exponential moving average of per-call cost, for predictive halting.
    ema_call_cost: f64,
}

/// Tallies token spend per extractor call. The `cost_record` table is the
/// authoritative state; the in-memory sums are a cache seeded at
/// construction and refreshed when a window rolls over.
pub struct CostTracker {
    db: Arc<SurrealDbClient>,
    daily_cap: f64,
    monthly_cap: f64,
    windows: Mutex<CostWindows>,
}

impl CostTracker {
    pub async fn new(
        db: Arc<SurrealDbClient>,
        daily_cap: f64,
        monthly_cap: f64,
    ) -> Result<Self, AppError> {
        let now = Utc::now();
        let windows = CostWindows {
            daily: CostRecord::sum_since(day_start(now), &db).await?,
            monthly: CostRecord::sum_since(month_start(now), &db).await?,
            day: i64::from(now.ordinal()) + i64::from(now.year()) * 1000,
            month: (now.year(), now.month()),
            ema_call_cost: 0.0,
        };

        debug!(
            daily = windows.daily,
            monthly = windows.monthly,
            "cost tracker seeded from persisted records"
        );

        Ok(Self {
            db,
            daily_cap,
            monthly_cap,
            windows: Mutex::new(windows),
        })
    }

    /// Computes the dollar cost from the pricing table, persists the record,
    /// then updates the cached sums. Persist-first keeps the table
    /// authoritative even if the process dies immediately after.
    pub async fn record(
        &self,
        article_id: Option<&str>,
        provider: &str,
        model: &str,
        operation: &str,
        input_tokens: u64,
        output_tokens: u64,
        pricing: ModelPricing,
    ) -> Result<CostRecord, AppError> {
        let cost = cost_of(input_tokens, output_tokens, pricing);
        let record = CostRecord::new(
            article_id.map(ToOwned::to_owned),
            provider.to_owned(),
            model.to_owned(),
            operation.to_owned(),
            input_tokens,
            output_tokens,
            cost,
        );

        self.db.store_item(record.clone()).await?;

        let mut windows = self.windows.lock().await;
        self.roll_windows(&mut windows).await?;
        windows.daily += cost;
        windows.monthly += cost;
        windows.ema_call_cost = if windows.ema_call_cost <= f64::EPSILON {
            cost
        } else {
            0.2 * cost + 0.8 * windows.ema_call_cost
        };

        debug!(
            provider,
            model,
            operation,
            input_tokens,
            output_tokens,
            cost,
            daily_total = windows.daily,
            monthly_total = windows.monthly,
            "recorded extractor cost"
        );

        Ok(record)
    }

    /// Halts when a cap is reached, or when the next article's estimated
    /// spend would push past one. The reservation keeps the recorded sums at
    /// or under the caps at every batch exit point.
    pub async fn check_budget(&self) -> Result<BudgetStatus, AppError> {
        let mut windows = self.windows.lock().await;
        self.roll_windows(&mut windows).await?;

        let next_article = ESTIMATED_CALLS_PER_ARTICLE * windows.ema_call_cost;

        if windows.daily >= self.daily_cap || windows.daily + next_article > self.daily_cap {
            let reason = format!(
                "daily cost ${:.2} (+${next_article:.2} projected) reached the ${:.2} cap",
                windows.daily, self.daily_cap
            );
            warn!(%reason, "budget halt");
            return Ok(BudgetStatus::Halted(reason));
        }

        if windows.monthly >= self.monthly_cap || windows.monthly + next_article > self.monthly_cap
        {
            let reason = format!(
                "monthly cost ${:.2} (+${next_article:.2} projected) reached the ${:.2} cap",
                windows.monthly, self.monthly_cap
            );
            warn!(%reason, "budget halt");
            return Ok(BudgetStatus::Halted(reason));
        }

        Ok(BudgetStatus::Ok)
    }

    /// Re-seeds a window from the database when the day or month ticks over.
    async fn roll_windows(&self, windows: &mut CostWindows) -> Result<(), AppError> {
        let now = Utc::now();
        let day_key = i64::from(now.ordinal()) + i64::from(now.year()) * 1000;

        if windows.day != day_key {
            windows.daily = CostRecord::sum_since(day_start(now), &self.db).await?;
            windows.day = day_key;
            info!(daily = windows.daily, "daily budget window rolled over");
        }

        if windows.month != (now.year(), now.month()) {
            windows.monthly = CostRecord::sum_since(month_start(now), &self.db).await?;
            windows.month = (now.year(), now.month());
            info!(monthly = windows.monthly, "monthly budget window rolled over");
        }

        Ok(())
    }
}

pub fn cost_of(input_tokens: u64, output_tokens: u64, pricing: ModelPricing) -> f64 {
    let input = input_tokens as f64 * pricing.input_rate / 1_000_000.0;
    let output = output_tokens as f64 * pricing.output_rate / 1_000_000.0;
    input + output
}

fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
}

fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .with_day(1)
        .unwrap_or(now.date_naive())
        .and_time(NaiveTime::MIN)
        .and_utc()
}
