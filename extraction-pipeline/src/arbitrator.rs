use std::sync::Arc;

use common::error::AppError;
use serde_json::json;

use crate::extractor::{
    prompts::{arbitration_user_prompt, ARBITRATION_SYSTEM_MESSAGE},
    EntityMention, ExtractionRequest, Extractor,
};

/// Source tag attached to mentions the arbitrator endorsed.
pub const ARBITRATOR_SOURCE: &str = "arbitrator";

#[derive(Debug, Clone)]
pub struct ArbitrationOutcome {
    pub summary: String,
    pub entities: Vec<EntityMention>,
}

/// The third, cost-optimized extractor. Only consulted when the two primary
/// summaries disagree; only its fused summary flows downstream, its entity
/// verdicts merely add a source tag.
pub struct Arbitrator {
    extractor: Arc<dyn Extractor>,
}

impl Arbitrator {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self { extractor }
    }

    pub async fn arbitrate(
        &self,
        summary_a: &str,
        summary_b: &str,
        entities_a: &[EntityMention],
        entities_b: &[EntityMention],
        article_id: &str,
    ) -> Result<ArbitrationOutcome, AppError> {
        let request = ExtractionRequest {
            system_prompt: ARBITRATION_SYSTEM_MESSAGE,
            user_text: arbitration_user_prompt(
                summary_a,
                summary_b,
                &entities_digest(entities_a),
                &entities_digest(entities_b),
            ),
            article_id: Some(article_id),
            operation: "arbitration",
        };

        let extraction = self.extractor.extract(request).await?;

        Ok(ArbitrationOutcome {
            summary: extraction.summary,
            entities: extraction.entities,
        })
    }
}

fn entities_digest(entities: &[EntityMention]) -> String {
    let digest: Vec<_> = entities
        .iter()
        .map(|m| {
            json!({
                "entity": m.surface,
                "type": m.entity_type.as_str(),
                "confidence": m.confidence,
            })
        })
        .collect();

    serde_json::to_string(&digest).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::fact::EntityType;

    #[test]
    fn test_entities_digest_is_compact_json() {
        let mentions = vec![EntityMention {
            surface: "Burlington".to_string(),
            entity_type: EntityType::Location,
            confidence: 0.9,
            sources: vec!["extractor-a".to_string()],
            event_description: None,
            position: None,
            kb: None,
        }];

        let digest = entities_digest(&mentions);
        assert!(digest.contains("\"Burlington\""));
        assert!(digest.contains("\"LOCATION\""));
    }
}
