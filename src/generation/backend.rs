//! Transport seam for the external text-generation service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VoucherError};
use crate::utils::sanitize::excerpt;

/// Bytes of an error body kept in a `Transport` error message.
const ERROR_BODY_EXCERPT_BYTES: usize = 512;

/// A service that turns a prompt into free text.
///
/// The connector owns retries, parsing and validation; a backend only
/// performs one call and reports transport-level failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Send one prompt and return the raw model text.
    async fn complete(&self, model: &str, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Backend speaking the Ollama-style `POST /api/generate` contract.
///
/// Request body `{model, prompt, stream: false}`; response `{response}`.
pub struct OllamaBackend {
    base_url: String,
    client: Client,
}

impl std::fmt::Debug for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaBackend")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OllamaBackend {
    /// Build a backend for `base_url` with a client-level request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoucherError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            model,
            prompt,
            stream: false,
        };

        debug!(model, prompt_bytes = prompt.len(), "Generation request");

        let response = self
            .client
            .post(self.api_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| VoucherError::Transport(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(VoucherError::Transport(format!(
                "HTTP {} from generation service: {}",
                status.as_u16(),
                excerpt(&text, ERROR_BODY_EXCERPT_BYTES)
            )));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            VoucherError::MalformedOutput(format!("failed to decode service response: {e}"))
        })?;
        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let backend = OllamaBackend::new("http://localhost:11434/", Duration::from_secs(5)).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:11434");
        assert_eq!(backend.api_url(), "http://localhost:11434/api/generate");
    }

    #[test]
    fn test_request_body_shape() {
        let body = GenerateRequest {
            model: "llama3.1",
            prompt: "hi",
            stream: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"model": "llama3.1", "prompt": "hi", "stream": false})
        );
    }

    #[test]
    fn test_response_ignores_extra_fields() {
        let json = r#"{"model":"llama3.1","created_at":"now","response":"```json\n{}\n```","done":true}"#;
        let parsed: GenerateResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.response.contains("```json"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let backend = OllamaBackend::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = backend.complete("m", "p").await.unwrap_err();
        assert!(matches!(err, VoucherError::Transport(_)), "{err}");
    }

    #[test]
    fn test_debug_hides_client() {
        let backend = OllamaBackend::new("http://svc", Duration::from_secs(1)).unwrap();
        assert_eq!(format!("{backend:?}"), "OllamaBackend { base_url: \"http://svc\" }");
    }
}
