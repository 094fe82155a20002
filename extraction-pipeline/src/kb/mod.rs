pub mod client;
pub mod rate_limit;

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::types::fact::{EntityType, KbLink},
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{extractor::EntityMention, nlp::normalize::canonical_surface};

/// Lookup seam over the knowledge base so tests can stub the network away.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn lookup(
        &self,
        surface: &str,
        entity_type: &EntityType,
    ) -> Result<Option<KbLink>, AppError>;
}

#[async_trait]
impl KnowledgeBase for client::WikidataClient {
    async fn lookup(
        &self,
        surface: &str,
        entity_type: &EntityType,
    ) -> Result<Option<KbLink>, AppError> {
        // Explicit path to the inherent method; plain `self.lookup` would
        // shadow it with this trait method.
        client::WikidataClient::lookup(self, surface, entity_type).await
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    link: Option<KbLink>,
    fetched_at: DateTime<Utc>,
}

/// Knowledge-base enrichment with a process-local TTL cache. Failures are
/// swallowed per entity: a missing link never fails an article. Negative
/// results are cached too, so repeat misses stay cheap.
pub struct KbEnricher {
    kb: Option<Arc<dyn KnowledgeBase>>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    ttl: chrono::Duration,
    per_entity_timeout: Duration,
}

impl KbEnricher {
    pub fn new(
        kb: Option<Arc<dyn KnowledgeBase>>,
        ttl_days: i64,
        per_entity_timeout: Duration,
    ) -> Self {
        Self {
            kb,
            cache: Mutex::new(HashMap::new()),
            ttl: chrono::Duration::days(ttl_days),
            per_entity_timeout,
        }
    }

    /// A disabled enricher: every mention keeps an empty KB link.
    pub fn disabled() -> Self {
        Self::new(None, 0, Duration::from_secs(0))
    }

    pub async fn enrich_all(&self, mentions: &mut [EntityMention]) {
        if self.kb.is_none() {
            return;
        }

        for mention in mentions.iter_mut() {
            mention.kb = self.enrich(&mention.surface, &mention.entity_type).await;
        }
    }

    pub async fn enrich(&self, surface: &str, entity_type: &EntityType) -> Option<KbLink> {
        let kb = self.kb.as_ref()?;
        let key = cache_key(surface, entity_type);

        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&key) {
                if Utc::now() - entry.fetched_at < self.ttl {
                    return entry.link.clone();
                }
                // Expired entry falls through to a refresh.
            }
        }

        let link = match tokio::time::timeout(
            self.per_entity_timeout,
            kb.lookup(surface, entity_type),
        )
        .await
        {
            Ok(Ok(link)) => link,
            Ok(Err(err)) => {
                debug!(surface, error = %err, "knowledge base lookup failed; skipping link");
                None
            }
            Err(_) => {
                debug!(surface, "knowledge base lookup timed out; skipping link");
                None
            }
        };

        // Last writer wins; concurrent lookups of the same key are harmless.
        let mut cache = self.cache.lock().await;
        cache.insert(
            key,
            CacheEntry {
                link: link.clone(),
                fetched_at: Utc::now(),
            },
        );

        link
    }
}

fn cache_key(surface: &str, entity_type: &EntityType) -> String {
    format!("{}|{}", canonical_surface(surface, entity_type), entity_type.as_str())
}
