use std::time::Duration;

use common::{error::AppError, storage::types::fact::{EntityType, KbLink}};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::rate_limit::RateLimiter;

const USER_AGENT: &str = concat!(
    "newsgraph-pipeline/",
    env!("CARGO_PKG_VERSION"),
    " (entity linking; contact: ops@newsgraph.invalid)"
);

const SEARCH_ENDPOINT: &str = "https://www.wikidata.org/w/api.php";

// Claims worth carrying: instance-of, country, located-in.
const SELECT_PROPERTIES: &[&str] = &["P31", "P17", "P131"];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Wikidata client: rate-limited, identified by a stable User-Agent, with
/// bounded retry on server-side failures.
pub struct WikidataClient {
    http: reqwest::Client,
    rate: RateLimiter,
    max_retries: usize,
    endpoint: String,
}

impl WikidataClient {
    pub fn new(rate_per_min: u32, max_retries: usize, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            rate: RateLimiter::per_minute(rate_per_min),
            max_retries,
            endpoint: SEARCH_ENDPOINT.to_string(),
        })
    }

    /// Search with a type hint, take the first hit, then fetch its select
    /// claims. Not-found and client-side denials resolve to `None`.
    pub async fn lookup(
        &self,
        surface: &str,
        entity_type: &EntityType,
    ) -> Result<Option<KbLink>, AppError> {
        let query = search_query(surface, entity_type);

        let Some(hit) = self.search(&query).await? else {
            debug!(surface, "knowledge base returned no match");
            return Ok(None);
        };

        let properties = self.fetch_properties(&hit.id).await.unwrap_or_else(|err| {
            debug!(id = %hit.id, error = %err, "claim fetch failed; linking without properties");
            json!({})
        });

        Ok(Some(KbLink {
            label: hit.label.unwrap_or_else(|| surface.to_string()),
            description: hit.description,
            id: hit.id,
            properties,
        }))
    }

    async fn search(&self, query: &str) -> Result<Option<SearchHit>, AppError> {
        let params = [
            ("action", "wbsearchentities"),
            ("search", query),
            ("language", "en"),
            ("format", "json"),
            ("type", "item"),
            ("limit", "5"),
        ];

        let Some(body) = self.get_with_retry(&params).await? else {
            return Ok(None);
        };

        let parsed: SearchResponse = serde_json::from_value(body)
            .map_err(|e| AppError::Kb(format!("malformed search response: {e}")))?;

        Ok(parsed.search.into_iter().next())
    }

    async fn fetch_properties(&self, entity_id: &str) -> Result<Value, AppError> {
        let params = [
            ("action", "wbgetentities"),
            ("ids", entity_id),
            ("props", "claims"),
            ("format", "json"),
        ];

        let Some(body) = self.get_with_retry(&params).await? else {
            return Ok(json!({}));
        };

        Ok(extract_select_claims(&body, entity_id))
    }

    /// GET with exponential backoff on 5xx/429. 403/404 yield `None`; other
    /// client errors surface as `Kb` errors.
    async fn get_with_retry(&self, params: &[(&str, &str)]) -> Result<Option<Value>, AppError> {
        let mut backoff = Duration::from_millis(500);

        for attempt in 0..self.max_retries {
            self.rate.acquire().await;

            let response = match self.http.get(&self.endpoint).query(params).send().await {
                Ok(response) => response,
                Err(err) if err.is_timeout() => {
                    debug!(error = %err, "knowledge base request timed out");
                    return Ok(None);
                }
                Err(err) => return Err(AppError::Reqwest(err)),
            };

            let status = response.status();

            if status.is_success() {
                let body: Value = response.json().await?;
                return Ok(Some(body));
            }

            if status == reqwest::StatusCode::FORBIDDEN
                || status == reqwest::StatusCode::NOT_FOUND
            {
                debug!(%status, "knowledge base denied the request");
                return Ok(None);
            }

            let retryable =
                status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
            if retryable && attempt + 1 < self.max_retries {
                warn!(%status, attempt = attempt + 1, "knowledge base error; backing off");
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
                continue;
            }

            return Err(AppError::Kb(format!(
                "knowledge base request failed with status {status}"
            )));
        }

        Err(AppError::Kb("knowledge base retries exhausted".to_string()))
    }
}

fn search_query(surface: &str, entity_type: &EntityType) -> String {
    // The type hint narrows ambiguous surfaces ("Burlington") toward the
    // intended sense.
    match entity_type {
        EntityType::Person | EntityType::Organization | EntityType::Event | EntityType::Other => {
            surface.to_string()
        }
        EntityType::Location => format!("{surface} (place)"),
    }
}

/// Pulls the mainsnak item ids of the select properties into a flat map:
/// `{"P31": ["Q515"], ...}`.
fn extract_select_claims(body: &Value, entity_id: &str) -> Value {
    let claims = &body["entities"][entity_id]["claims"];
    let mut out = serde_json::Map::new();

    for property in SELECT_PROPERTIES {
        let Some(statements) = claims[*property].as_array() else {
            continue;
        };

        let ids: Vec<Value> = statements
            .iter()
            .filter_map(|statement| {
                statement["mainsnak"]["datavalue"]["value"]["id"]
                    .as_str()
                    .map(|id| Value::String(id.to_string()))
            })
            .collect();

        if !ids.is_empty() {
            out.insert((*property).to_string(), Value::Array(ids));
        }
    }

    Value::Object(out)
}
