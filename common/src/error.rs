use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Input error: {0}")]
    Input(String),
    #[error("Extraction error: {0}")]
    Extraction(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Knowledge base error: {0}")]
    Kb(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Budget cap reached: {0}")]
    BudgetHalt(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Storage failures revert the article to pending; everything else marks
    /// it failed with the error text.
    pub fn is_storage(&self) -> bool {
        matches!(self, AppError::Database(_))
    }
}
