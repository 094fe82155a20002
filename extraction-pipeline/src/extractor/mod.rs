pub mod openai;
pub mod prompts;

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::types::fact::{EntityType, KbLink, MentionPosition},
};
use serde::{Deserialize, Serialize};

/// Entity as reported by a generative extractor, before clamping and typing.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RawEntity {
    pub entity: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub confidence: f64,
    #[serde(default)]
    pub event_description: Option<String>,
}

/// The JSON contract every extractor is prompted to return.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmExtraction {
    pub summary: String,
    #[serde(default)]
    pub entities: Vec<RawEntity>,
}

/// A typed entity mention flowing through the pipeline. Position and KB link
/// are filled in by later stages.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMention {
    pub surface: String,
    pub entity_type: EntityType,
    pub confidence: f64,
    pub sources: Vec<String>,
    pub event_description: Option<String>,
    pub position: Option<MentionPosition>,
    pub kb: Option<KbLink>,
}

impl EntityMention {
    pub fn from_raw(raw: RawEntity, provider_id: &str) -> Self {
        Self {
            surface: raw.entity,
            entity_type: EntityType::from(raw.entity_type),
            confidence: raw.confidence.clamp(0.0, 1.0),
            sources: vec![provider_id.to_string()],
            event_description: raw
                .event_description
                .filter(|d| !d.trim().is_empty()),
            position: None,
            kb: None,
        }
    }
}

/// One extractor's structured output for an article.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub provider_id: String,
    pub summary: String,
    pub entities: Vec<EntityMention>,
}

/// A single generative call: the system prompt carries the role, the user
/// text carries the article plus the JSON contract.
#[derive(Debug, Clone)]
pub struct ExtractionRequest<'a> {
    pub system_prompt: &'a str,
    pub user_text: String,
    pub article_id: Option<&'a str>,
    pub operation: &'a str,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    fn provider_id(&self) -> &str;

    async fn extract(&self, request: ExtractionRequest<'_>) -> Result<Extraction, AppError>;
}

/// Pulls the first JSON object out of a possibly chatty model reply: strips
/// markdown fences, then takes the first balanced `{...}` block.
pub fn recover_json(body: &str) -> Option<&str> {
    let trimmed = strip_fences(body);

    let start = trimmed.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in trimmed[start..].char_indices() {
        if in_string {
            match ch {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&trimmed[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

fn strip_fences(body: &str) -> &str {
    let trimmed = body.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string ("json") up to the first newline.
    let rest = rest
        .split_once('\n')
        .map_or(rest, |(_, after)| after);

    rest.rsplit_once("```").map_or(rest, |(inner, _)| inner).trim()
}

pub fn parse_extraction(body: &str) -> Result<LlmExtraction, AppError> {
    let json = recover_json(body).ok_or_else(|| {
        AppError::LLMParsing("no JSON object found in extractor response".to_string())
    })?;

    serde_json::from_str::<LlmExtraction>(json)
        .map_err(|e| AppError::LLMParsing(format!("malformed extraction payload: {e}")))
}
