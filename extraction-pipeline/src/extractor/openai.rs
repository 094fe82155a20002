use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use common::{
    error::AppError,
    utils::config::{ExtractorSettings, ModelPricing},
};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::{debug, warn};

use super::{
    parse_extraction, prompts::STRICT_JSON_REMINDER, EntityMention, Extraction, ExtractionRequest,
    Extractor, LlmExtraction,
};
use crate::cost::CostTracker;

/// Adapter over one OpenAI-compatible generative endpoint. Each instance
/// owns its client, model, pricing, and a handle to the shared cost tracker.
pub struct OpenAiExtractor {
    client: Client<OpenAIConfig>,
    provider: String,
    model: String,
    max_retries: usize,
    pricing: ModelPricing,
    cost: Arc<CostTracker>,
}

impl OpenAiExtractor {
    pub fn new(
        settings: &ExtractorSettings,
        pricing: ModelPricing,
        max_retries: usize,
        cost: Arc<CostTracker>,
    ) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(&settings.api_key)
            .with_api_base(&settings.base_url);

        Self {
            client: Client::with_config(config),
            provider: settings.provider.clone(),
            model: settings.model.clone(),
            max_retries,
            pricing,
            cost,
        }
    }

    fn build_request(
        &self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<CreateChatCompletionRequest, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessage::from(system_prompt).into(),
                ChatCompletionRequestUserMessage::from(user_text).into(),
            ])
            .build()?;

        Ok(request)
    }

    /// One round trip with transient-failure retry. The cost record is
    /// written as soon as usage metadata arrives, before any parsing.
    async fn complete(
        &self,
        system_prompt: &str,
        request: &ExtractionRequest<'_>,
    ) -> Result<String, AppError> {
        let chat_request = self.build_request(system_prompt, &request.user_text)?;

        let retry_strategy = ExponentialBackoff::from_millis(250)
            .map(jitter)
            .take(self.max_retries);

        let response = RetryIf::spawn(
            retry_strategy,
            || {
                let chat_request = chat_request.clone();
                async move { self.client.chat().create(chat_request).await }
            },
            |err: &OpenAIError| {
                let transient = is_transient(err);
                if transient {
                    warn!(
                        provider = %self.provider,
                        error = %err,
                        "transient extractor failure; retrying"
                    );
                }
                transient
            },
        )
        .await?;

        let (input_tokens, output_tokens) = response
            .usage
            .as_ref()
            .map_or((0, 0), |usage| {
                (
                    u64::from(usage.prompt_tokens),
                    u64::from(usage.completion_tokens),
                )
            });

        self.cost
            .record(
                request.article_id,
                &self.provider,
                &self.model,
                request.operation,
                input_tokens,
                output_tokens,
                self.pricing,
            )
            .await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                AppError::LLMParsing("no content in extractor response".to_string())
            })
    }

    async fn extract_once(
        &self,
        system_prompt: &str,
        request: &ExtractionRequest<'_>,
    ) -> Result<LlmExtraction, AppError> {
        let body = self.complete(system_prompt, request).await?;
        parse_extraction(&body)
    }
}

#[async_trait]
impl Extractor for OpenAiExtractor {
    fn provider_id(&self) -> &str {
        &self.provider
    }

    async fn extract(&self, request: ExtractionRequest<'_>) -> Result<Extraction, AppError> {
        let parsed = match self.extract_once(request.system_prompt, &request).await {
            Ok(parsed) => parsed,
            // One more attempt with a stricter JSON reminder before giving up.
            Err(AppError::LLMParsing(reason)) => {
                debug!(
                    provider = %self.provider,
                    %reason,
                    "extractor reply failed to parse; reissuing with strict reminder"
                );
                let strict_prompt = format!("{}{STRICT_JSON_REMINDER}", request.system_prompt);
                self.extract_once(&strict_prompt, &request)
                    .await
                    .map_err(|err| {
                        AppError::Extraction(format!(
                            "{} returned unparseable output after strict retry: {err}",
                            self.provider
                        ))
                    })?
            }
            Err(err) => return Err(err),
        };

        let entities = parsed
            .entities
            .into_iter()
            .map(|raw| EntityMention::from_raw(raw, &self.provider))
            .collect();

        Ok(Extraction {
            provider_id: self.provider.clone(),
            summary: parsed.summary,
            entities,
        })
    }
}

/// 5xx, rate limits, and transport failures are worth retrying; structural
/// errors (bad request, auth) fail immediately.
fn is_transient(err: &OpenAIError) -> bool {
    match err {
        OpenAIError::Reqwest(_) => true,
        OpenAIError::ApiError(api) => {
            let haystack = format!(
                "{} {}",
                api.message,
                api.r#type.as_deref().unwrap_or_default()
            )
            .to_lowercase();

            ["rate limit", "rate_limit", "429", "500", "502", "503", "504", "overloaded", "timeout", "server_error"]
                .iter()
                .any(|needle| haystack.contains(needle))
        }
        _ => false,
    }
}
