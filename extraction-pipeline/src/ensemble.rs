use std::time::Duration;

use common::error::AppError;
use tracing::warn;

use crate::extractor::{
    prompts::{extraction_user_prompt, EXTRACTION_SYSTEM_MESSAGE},
    Extraction, ExtractionRequest, Extractor,
};

/// Runs the two primary extractors over one article, each bounded by the
/// wall-clock timeout. One failure degrades to single-source mode; two
/// failures fail the article's extraction stage.
pub async fn run_ensemble(
    extractor_a: &dyn Extractor,
    extractor_b: &dyn Extractor,
    text: &str,
    article_id: &str,
    timeout: Duration,
    parallel: bool,
) -> Result<(Option<Extraction>, Option<Extraction>), AppError> {
    let (result_a, result_b) = if parallel {
        tokio::join!(
            bounded_extract(extractor_a, text, article_id, timeout),
            bounded_extract(extractor_b, text, article_id, timeout),
        )
    } else {
        (
            bounded_extract(extractor_a, text, article_id, timeout).await,
            bounded_extract(extractor_b, text, article_id, timeout).await,
        )
    };

    if result_a.is_none() && result_b.is_none() {
        return Err(AppError::Extraction(
            "both primary extractors failed".to_string(),
        ));
    }

    Ok((result_a, result_b))
}

async fn bounded_extract(
    extractor: &dyn Extractor,
    text: &str,
    article_id: &str,
    timeout: Duration,
) -> Option<Extraction> {
    let request = ExtractionRequest {
        system_prompt: EXTRACTION_SYSTEM_MESSAGE,
        user_text: extraction_user_prompt(text),
        article_id: Some(article_id),
        operation: "extraction",
    };

    match tokio::time::timeout(timeout, extractor.extract(request)).await {
        Ok(Ok(extraction)) => Some(extraction),
        Ok(Err(err)) => {
            warn!(
                provider = extractor.provider_id(),
                article_id,
                error = %err,
                "extractor failed; continuing with its sibling"
            );
            None
        }
        Err(_) => {
            warn!(
                provider = extractor.provider_id(),
                article_id,
                timeout_secs = timeout.as_secs(),
                "extractor timed out; continuing with its sibling"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubExtractor {
        provider: &'static str,
        outcome: StubOutcome,
        calls: AtomicUsize,
    }

    enum StubOutcome {
        Succeed,
        Fail,
        Hang,
    }

    impl StubExtractor {
        fn new(provider: &'static str, outcome: StubOutcome) -> Self {
            Self {
                provider,
                outcome,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Extractor for StubExtractor {
        fn provider_id(&self) -> &str {
            self.provider
        }

        async fn extract(&self, _request: ExtractionRequest<'_>) -> Result<Extraction, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                StubOutcome::Succeed => Ok(Extraction {
                    provider_id: self.provider.to_string(),
                    summary: format!("summary from {}", self.provider),
                    entities: Vec::new(),
                }),
                StubOutcome::Fail => Err(AppError::Extraction("stub failure".to_string())),
                StubOutcome::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!("hanging stub should be timed out")
                }
            }
        }
    }

    #[tokio::test]
    async fn test_both_extractors_succeed() {
        let a = StubExtractor::new("extractor-a", StubOutcome::Succeed);
        let b = StubExtractor::new("extractor-b", StubOutcome::Succeed);

        let (ra, rb) = run_ensemble(&a, &b, "text", "article-1", Duration::from_secs(5), true)
            .await
            .expect("ensemble succeeds");

        assert_eq!(ra.expect("a present").provider_id, "extractor-a");
        assert_eq!(rb.expect("b present").provider_id, "extractor-b");
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_failure_degrades_to_one_source() {
        let a = StubExtractor::new("extractor-a", StubOutcome::Succeed);
        let b = StubExtractor::new("extractor-b", StubOutcome::Fail);

        let (ra, rb) = run_ensemble(&a, &b, "text", "article-1", Duration::from_secs(5), true)
            .await
            .expect("ensemble degrades gracefully");

        assert!(ra.is_some());
        assert!(rb.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let a = StubExtractor::new("extractor-a", StubOutcome::Hang);
        let b = StubExtractor::new("extractor-b", StubOutcome::Succeed);

        let (ra, rb) = run_ensemble(&a, &b, "text", "article-1", Duration::from_secs(30), true)
            .await
            .expect("ensemble survives a timeout");

        assert!(ra.is_none());
        assert!(rb.is_some());
    }

    #[tokio::test]
    async fn test_both_failing_is_an_extraction_error() {
        let a = StubExtractor::new("extractor-a", StubOutcome::Fail);
        let b = StubExtractor::new("extractor-b", StubOutcome::Fail);

        let result =
            run_ensemble(&a, &b, "text", "article-1", Duration::from_secs(5), true).await;

        assert!(matches!(result, Err(AppError::Extraction(_))));
    }

    #[tokio::test]
    async fn test_sequential_mode_still_runs_both() {
        let a = StubExtractor::new("extractor-a", StubOutcome::Succeed);
        let b = StubExtractor::new("extractor-b", StubOutcome::Succeed);

        let (ra, rb) = run_ensemble(&a, &b, "text", "article-1", Duration::from_secs(5), false)
            .await
            .expect("sequential ensemble succeeds");

        assert!(ra.is_some() && rb.is_some());
    }
}
