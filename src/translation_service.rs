/*!
 * Translation service: backend selection and the batching contract.
 *
 * Selection walks a quality-ordered candidate list (an optional caller
 * preference first, then the built-in table), instantiates each candidate
 * and validates it with a canary translation of a known phrase; the first
 * candidate that passes both steps is memoized for the rest of the run.
 *
 * Every translation call enforces the per-item length truncation and the
 * maximum batch width, and appends the target-language marker for backends
 * registered as multilingual. Failures propagate to the caller; nothing is
 * ever substituted silently.
 */

use std::sync::Arc;

use log::{debug, info, warn};

use crate::app_config::TranslationConfig;
use crate::errors::BackendError;
use crate::providers::opus_mt::OpusMtBackend;
use crate::providers::{BackendSpec, TranslationBackend, candidate_specs};

/// Known phrase used to validate a freshly instantiated backend
pub const CANARY_PHRASE: &str = "The book is excellent";

/// Instantiates backend clients for candidate specs
///
/// The factory is the seam between selection policy and transport; tests
/// substitute it to exercise the fallback protocol without a live server.
pub trait BackendFactory: Send + Sync {
    /// Build a backend client for the given spec
    fn create(&self, spec: &BackendSpec) -> Result<Arc<dyn TranslationBackend>, BackendError>;
}

/// Default factory producing HTTP clients against the configured endpoint
struct HttpBackendFactory {
    endpoint: String,
    timeout_secs: u64,
    max_length: usize,
}

impl BackendFactory for HttpBackendFactory {
    fn create(&self, spec: &BackendSpec) -> Result<Arc<dyn TranslationBackend>, BackendError> {
        Ok(Arc::new(OpusMtBackend::new(
            self.endpoint.clone(),
            spec.clone(),
            self.timeout_secs,
            self.max_length,
        )))
    }
}

/// Translation service with memoized backend selection
pub struct TranslationService {
    /// Service options
    options: TranslationConfig,
    /// Factory for candidate backends
    factory: Box<dyn BackendFactory>,
    /// Backend selected for this run, once validation succeeded
    backend: Option<Arc<dyn TranslationBackend>>,
}

impl TranslationService {
    /// Create a service that instantiates HTTP backends from the options
    pub fn new(options: TranslationConfig) -> Self {
        let factory = HttpBackendFactory {
            endpoint: options.endpoint.clone(),
            timeout_secs: options.timeout_secs,
            max_length: options.max_input_length,
        };

        Self {
            options,
            factory: Box::new(factory),
            backend: None,
        }
    }

    /// Create a service with a custom backend factory - used by tests and external consumers
    #[allow(dead_code)]
    pub fn with_factory(options: TranslationConfig, factory: Box<dyn BackendFactory>) -> Self {
        Self {
            options,
            factory,
            backend: None,
        }
    }

    /// Create a service with a pre-selected backend, skipping selection -
    /// used by tests and external consumers
    #[allow(dead_code)]
    pub fn with_backend(options: TranslationConfig, backend: Arc<dyn TranslationBackend>) -> Self {
        Self {
            options,
            factory: Box::new(NoFactory),
            backend: Some(backend),
        }
    }

    /// Id of the backend selected for this run, if any - used by tests and
    /// external consumers
    #[allow(dead_code)]
    pub fn selected_backend_id(&self) -> Option<&str> {
        self.backend.as_deref().map(|b| b.id())
    }

    /// Select a backend, trying candidates in quality order
    ///
    /// The result is memoized: selection runs at most once per service
    /// unless no backend was yet accepted.
    pub async fn select_backend(&mut self) -> Result<Arc<dyn TranslationBackend>, BackendError> {
        if let Some(backend) = &self.backend {
            return Ok(backend.clone());
        }

        let candidates = candidate_specs(self.options.preferred_backend.as_deref());
        let canary = vec![CANARY_PHRASE.to_string()];

        for spec in candidates {
            debug!("Trying backend {}", spec.id);

            let backend = match self.factory.create(&spec) {
                Ok(backend) => backend,
                Err(e) => {
                    warn!("Backend {} could not be instantiated: {}", spec.id, e);
                    continue;
                }
            };

            match backend.translate_batch(&canary).await {
                Ok(result) if result.len() == 1 && !result[0].trim().is_empty() => {
                    info!(
                        "Backend {} validated: '{}' -> '{}'",
                        spec.id, CANARY_PHRASE, result[0]
                    );
                    self.backend = Some(backend.clone());
                    return Ok(backend);
                }
                Ok(_) => {
                    warn!("Backend {} returned an unusable canary result", spec.id);
                }
                Err(e) => {
                    warn!("Backend {} failed canary validation: {}", spec.id, e);
                }
            }
        }

        Err(BackendError::NoBackendAvailable)
    }

    /// Translate an ordered batch of texts
    ///
    /// Items are truncated to the configured maximum length and submitted
    /// in calls of at most the configured batch width; multilingual
    /// backends get the target marker appended to every item.
    pub async fn translate_batch(&mut self, texts: &[String]) -> Result<Vec<String>, BackendError> {
        let backend = self.select_backend().await?;
        let width = self.options.batch_size.max(1);
        let mut translated = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(width) {
            let prepared: Vec<String> = chunk
                .iter()
                .map(|text| {
                    let truncated = truncate_chars(text, self.options.max_input_length);
                    if backend.needs_target_hint() {
                        format!("{} {}", truncated, self.options.target_hint)
                    } else {
                        truncated
                    }
                })
                .collect();

            let result = backend.translate_batch(&prepared).await?;
            if result.len() != prepared.len() {
                return Err(BackendError::BatchMismatch {
                    expected: prepared.len(),
                    got: result.len(),
                });
            }

            translated.extend(result);
        }

        Ok(translated)
    }
}

/// Factory used when a backend was injected directly
struct NoFactory;

impl BackendFactory for NoFactory {
    fn create(&self, _spec: &BackendSpec) -> Result<Arc<dyn TranslationBackend>, BackendError> {
        Err(BackendError::NoBackendAvailable)
    }
}

/// Truncate to a maximum number of characters on a character boundary
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((boundary, _)) => text[..boundary].to_string(),
        None => text.to_string(),
    }
}
