use async_openai::types::CreateEmbeddingRequestArgs;

use crate::error::AppError;

/// Generates an embedding vector for the given input text.
///
/// Model and dimensions come from configuration; the caller owns the client
/// so the embedding endpoint can differ from the extractor endpoints.
pub async fn generate_embedding(
    client: &async_openai::Client<async_openai::config::OpenAIConfig>,
    input: &str,
    model: &str,
    dimensions: u32,
) -> Result<Vec<f32>, AppError> {
    let request = CreateEmbeddingRequestArgs::default()
        .model(model)
        .dimensions(dimensions)
        .input([input])
        .build()?;

    let response = client.embeddings().create(request).await?;

    let embedding: Vec<f32> = response
        .data
        .first()
        .ok_or_else(|| AppError::LLMParsing("No embedding data received".into()))?
        .embedding
        .clone();

    Ok(embedding)
}
