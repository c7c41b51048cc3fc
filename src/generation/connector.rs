//! Typed, retrying client over a [`GenerationBackend`].
//!
//! A [`GenerationConnector<T>`] asks the model for JSON shaped like a
//! canonical example, pulls the first fenced block out of the answer, parses
//! it into `T` and runs a caller-supplied validator. Any failure along the way
//! (transport, timeout, missing fence, bad JSON, rejected value) consumes one
//! attempt; the next attempt uses a stricter prompt. At most
//! `retry_limit + 1` backend calls are made per invocation.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::backend::GenerationBackend;
use super::prompt::{build_prompt, extract_fenced_block};
use crate::error::{Result, VoucherError};
use crate::utils::sanitize::excerpt;

/// Bytes of a failure reason echoed back to the model on retry.
const RETRY_REASON_EXCERPT_BYTES: usize = 300;

/// Structural check applied after a successful parse.
pub type Validator<T> = Arc<dyn Fn(&T) -> std::result::Result<(), String> + Send + Sync>;

fn accept_all<T>(_: &T) -> std::result::Result<(), String> {
    Ok(())
}

pub struct GenerationConnector<T> {
    backend: Arc<dyn GenerationBackend>,
    model: String,
    instruction: String,
    shape: String,
    validator: Validator<T>,
    retry_limit: u32,
    attempt_timeout: Duration,
}

impl<T> std::fmt::Debug for GenerationConnector<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConnector")
            .field("model", &self.model)
            .field("retry_limit", &self.retry_limit)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

impl<T: DeserializeOwned + Send + 'static> GenerationConnector<T> {
    /// Retries after the first attempt, unless overridden.
    pub const DEFAULT_RETRY_LIMIT: u32 = 3;
    /// Per-attempt time budget, unless overridden.
    pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Build a connector that accepts any value that parses as `T`.
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        model: impl Into<String>,
        instruction: impl Into<String>,
        shape: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            instruction: instruction.into(),
            shape: shape.into(),
            validator: Arc::new(accept_all::<T>),
            retry_limit: Self::DEFAULT_RETRY_LIMIT,
            attempt_timeout: Self::DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Arc::new(validator);
        self
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Obtain a validated `T`, or `None` once the retry budget is spent.
    ///
    /// Never errors: transport failures count as failed attempts.
    pub async fn generate(&self, input: &str) -> Option<T> {
        self.try_generate(input).await.ok()
    }

    /// Like [`generate`](Self::generate) but reports the last failure.
    ///
    /// The only error returned is [`VoucherError::RetriesExhausted`]. A
    /// failure that is not [retryable](VoucherError::is_retryable) ends the
    /// loop at once; `attempts` then counts the calls actually made.
    pub async fn try_generate(&self, input: &str) -> Result<T> {
        let attempts = self.retry_limit.saturating_add(1);
        let mut last_failure: Option<String> = None;
        let mut made = 0;

        for attempt in 0..attempts {
            let prompt = build_prompt(
                &self.instruction,
                input,
                &self.shape,
                attempt,
                last_failure.as_deref(),
            );
            made = attempt + 1;
            match self.attempt(&prompt).await {
                Ok(value) => {
                    debug!(model = %self.model, attempt = attempt + 1, "Generation succeeded");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(
                        model = %self.model,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %e,
                        "Generation attempt failed"
                    );
                    last_failure = Some(excerpt(&e.to_string(), RETRY_REASON_EXCERPT_BYTES));
                    if !e.is_retryable() {
                        break;
                    }
                }
            }
        }

        Err(VoucherError::RetriesExhausted {
            attempts: made,
            last: last_failure.unwrap_or_default(),
        })
    }

    /// Fence extraction, typed parse and validation of one model answer.
    pub fn parse_response(&self, text: &str) -> Result<T> {
        let block = extract_fenced_block(text).ok_or_else(|| {
            VoucherError::MalformedOutput(format!(
                "no fenced JSON block in response: {}",
                excerpt(text, 120)
            ))
        })?;
        let value: T = serde_json::from_str(block)
            .map_err(|e| VoucherError::MalformedOutput(format!("invalid JSON in block: {e}")))?;
        (self.validator)(&value).map_err(VoucherError::Validation)?;
        Ok(value)
    }

    async fn attempt(&self, prompt: &str) -> Result<T> {
        let text = tokio::time::timeout(
            self.attempt_timeout,
            self.backend.complete(&self.model, prompt),
        )
        .await
        .map_err(|_| VoucherError::Timeout(self.attempt_timeout))??;
        self.parse_response(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::backend::MockGenerationBackend;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Point {
        x: i64,
        y: i64,
    }

    const SHAPE: &str = r#"{"x": 1, "y": 2}"#;

    fn fenced(json: &str) -> String {
        format!("Here you go:\n```json\n{json}\n```")
    }

    fn connector(mock: MockGenerationBackend) -> GenerationConnector<Point> {
        GenerationConnector::new(Arc::new(mock), "test-model", "Give a point.", SHAPE)
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let mut mock = MockGenerationBackend::new();
        mock.expect_complete()
            .times(1)
            .returning(|_, _| Ok(fenced(r#"{"x": 3, "y": 4}"#)));

        let result = connector(mock).generate("input").await;
        assert_eq!(result, Some(Point { x: 3, y: 4 }));
    }

    #[tokio::test]
    async fn test_retry_then_succeed_uses_two_calls() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut mock = MockGenerationBackend::new();
        mock.expect_complete().times(2).returning(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok("I think the point is (3, 4).".to_string())
            } else {
                Ok(fenced(r#"{"x": 3, "y": 4}"#))
            }
        });

        let result = connector(mock).generate("input").await;
        assert_eq!(result, Some(Point { x: 3, y: 4 }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_makes_retry_limit_plus_one_calls() {
        let mut mock = MockGenerationBackend::new();
        mock.expect_complete()
            .times(4)
            .returning(|_, _| Ok("no json here".to_string()));

        let conn = connector(mock).with_retry_limit(3);
        assert!(conn.generate("input").await.is_none());
    }

    #[tokio::test]
    async fn test_validator_never_passing_exhausts_budget() {
        let mut mock = MockGenerationBackend::new();
        mock.expect_complete()
            .times(3)
            .returning(|_, _| Ok(fenced(r#"{"x": 1, "y": 1}"#)));

        let conn = connector(mock)
            .with_retry_limit(2)
            .with_validator(|_: &Point| Err("never good enough".to_string()));
        let err = conn.try_generate("input").await.unwrap_err();
        match err {
            VoucherError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.contains("never good enough"), "{last}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_transport_errors_count_as_attempts() {
        let mut mock = MockGenerationBackend::new();
        mock.expect_complete()
            .times(2)
            .returning(|_, _| Err(VoucherError::Transport("connection refused".into())));

        let conn = connector(mock).with_retry_limit(1);
        assert!(conn.generate("input").await.is_none());
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_the_loop() {
        let mut mock = MockGenerationBackend::new();
        mock.expect_complete()
            .times(1)
            .returning(|_, _| Err(VoucherError::Config("no client".into())));

        let conn = connector(mock).with_retry_limit(3);
        match conn.try_generate("input").await.unwrap_err() {
            VoucherError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 1);
                assert!(last.contains("no client"), "{last}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_zero_retry_limit_makes_one_call() {
        let mut mock = MockGenerationBackend::new();
        mock.expect_complete()
            .times(1)
            .returning(|_, _| Ok(fenced("not json")));

        let conn = connector(mock).with_retry_limit(0);
        assert!(conn.generate("input").await.is_none());
    }

    #[tokio::test]
    async fn test_retry_prompt_mentions_malformed_response() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut mock = MockGenerationBackend::new();
        mock.expect_complete()
            .times(2)
            .returning(move |model: &str, prompt: &str| {
                assert_eq!(model, "test-model");
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    assert!(!prompt.contains("malformed"));
                    Ok("garbage".to_string())
                } else {
                    assert!(prompt.starts_with("Your previous response was malformed"));
                    assert!(prompt.contains("Give a point."));
                    Ok(fenced(r#"{"x": 0, "y": 0}"#))
                }
            });

        assert!(connector(mock).generate("input").await.is_some());
    }

    struct StallingBackend;

    #[async_trait::async_trait]
    impl GenerationBackend for StallingBackend {
        async fn complete(&self, _model: &str, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_backend_times_out_each_attempt() {
        let conn: GenerationConnector<Point> =
            GenerationConnector::new(Arc::new(StallingBackend), "m", "i", SHAPE)
                .with_retry_limit(1)
                .with_attempt_timeout(Duration::from_secs(30));
        let err = conn.try_generate("input").await.unwrap_err();
        match err {
            VoucherError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(last.contains("timed out"), "{last}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_response_classifies_failures() {
        let conn = connector(MockGenerationBackend::new());
        assert!(matches!(
            conn.parse_response("nothing fenced"),
            Err(VoucherError::MalformedOutput(_))
        ));
        assert!(matches!(
            conn.parse_response(&fenced(r#"{"x": "one"}"#)),
            Err(VoucherError::MalformedOutput(_))
        ));
        assert_eq!(
            conn.parse_response(&fenced(r#"{"x": 5, "y": 6}"#)).unwrap(),
            Point { x: 5, y: 6 }
        );
    }

    #[test]
    fn test_defaults() {
        let conn = connector(MockGenerationBackend::new());
        assert_eq!(conn.retry_limit(), 3);
        assert_eq!(conn.model(), "test-model");
        assert_eq!(
            GenerationConnector::<Point>::DEFAULT_ATTEMPT_TIMEOUT,
            Duration::from_secs(30)
        );
    }
}
