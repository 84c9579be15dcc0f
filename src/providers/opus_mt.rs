/*!
 * HTTP client for an Opus-MT style translation inference server.
 *
 * The server exposes a single `/translate` endpoint taking a model id and
 * an ordered batch of texts, answering with one translation per input in
 * the same order.
 */

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{BackendSpec, TranslationBackend};
use crate::errors::BackendError;

/// Backend client for one translation model served over HTTP
#[derive(Debug)]
pub struct OpusMtBackend {
    /// Registration record for this backend
    spec: BackendSpec,
    /// Base URL of the inference server
    base_url: String,
    /// HTTP client for making requests
    client: Client,
    /// Maximum generated length requested per item
    max_length: usize,
}

/// Translation request for the inference server
#[derive(Debug, Serialize, Deserialize)]
pub struct TranslationRequest {
    /// Model identifier to serve the request with
    model: String,
    /// Ordered batch of texts to translate
    texts: Vec<String>,
    /// Maximum generated length per item
    max_length: usize,
    /// Whether oversized inputs may be truncated by the server
    truncation: bool,
}

/// Translation response from the inference server
#[derive(Debug, Serialize, Deserialize)]
pub struct TranslationResponse {
    /// One result per submitted text, in submission order
    pub translations: Vec<TranslatedText>,
}

/// A single translated item
#[derive(Debug, Serialize, Deserialize)]
pub struct TranslatedText {
    /// The translated text
    pub translation_text: String,
}

impl OpusMtBackend {
    /// Create a backend client for the given model spec
    pub fn new(endpoint: impl Into<String>, spec: BackendSpec, timeout_secs: u64, max_length: usize) -> Self {
        let base_url = endpoint.into().trim_end_matches('/').to_string();

        Self {
            spec,
            base_url,
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            max_length,
        }
    }
}

#[async_trait]
impl TranslationBackend for OpusMtBackend {
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn needs_target_hint(&self) -> bool {
        self.spec.needs_target_hint
    }

    async fn translate_batch(&self, texts: &[String]) -> Result<Vec<String>, BackendError> {
        let url = format!("{}/translate", self.base_url);
        let request = TranslationRequest {
            model: self.spec.id.clone(),
            texts: texts.to_vec(),
            max_length: self.max_length,
            truncation: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    BackendError::ConnectionError(e.to_string())
                } else {
                    BackendError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::ApiError {
                status_code: status.as_u16(),
                message,
            });
        }

        let parsed: TranslationResponse = response
            .json()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))?;

        if parsed.translations.len() != texts.len() {
            return Err(BackendError::BatchMismatch {
                expected: texts.len(),
                got: parsed.translations.len(),
            });
        }

        Ok(parsed
            .translations
            .into_iter()
            .map(|t| t.translation_text)
            .collect())
    }
}
