/*!
 * Translation backend implementations.
 *
 * This module defines the interface every translation backend must follow
 * and the built-in candidate table the service falls back through, in
 * quality order. Each candidate carries an explicit capability flag telling
 * the service whether the backend needs a target-language hint appended to
 * its inputs.
 */

use std::fmt::Debug;

use async_trait::async_trait;

use crate::errors::BackendError;

/// Common trait for all translation backends
///
/// Backends take a small ordered batch of strings and return the
/// translations in the same order, or fail as a unit.
#[async_trait]
pub trait TranslationBackend: Send + Sync + Debug {
    /// Identifier of the backend model
    fn id(&self) -> &str;

    /// Whether inputs must carry a target-language marker
    fn needs_target_hint(&self) -> bool;

    /// Translate an ordered batch of strings
    ///
    /// # Arguments
    /// * `texts` - The batch to translate
    ///
    /// # Returns
    /// * `Result<Vec<String>, BackendError>` - Translations in input order, or an error
    async fn translate_batch(&self, texts: &[String]) -> Result<Vec<String>, BackendError>;
}

/// Registration record for one backend candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSpec {
    /// Model identifier
    pub id: String,

    /// Capability flag: the backend is multilingual and needs a
    /// target-language marker appended to every input
    pub needs_target_hint: bool,
}

impl BackendSpec {
    /// Create a spec for a direct-pair backend
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            needs_target_hint: false,
        }
    }

    /// Create a spec for a multilingual backend that needs a target hint
    pub fn with_target_hint(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            needs_target_hint: true,
        }
    }
}

/// Built-in backend candidates in quality order
pub fn default_backend_specs() -> Vec<BackendSpec> {
    vec![
        BackendSpec::new("Helsinki-NLP/opus-mt-tc-big-en-pt"),
        BackendSpec::new("Helsinki-NLP/opus-mt-en-pt"),
        BackendSpec::with_target_hint("Helsinki-NLP/opus-mt-en-ROMANCE"),
    ]
}

/// Candidate list for one run: an optional caller preference prepended to
/// the built-in table, deduplicated by id
///
/// A preferred id that is not in the built-in table is registered as a
/// direct-pair backend.
pub fn candidate_specs(preferred: Option<&str>) -> Vec<BackendSpec> {
    let defaults = default_backend_specs();
    let mut candidates = Vec::with_capacity(defaults.len() + 1);

    if let Some(preferred) = preferred {
        let spec = defaults
            .iter()
            .find(|s| s.id == preferred)
            .cloned()
            .unwrap_or_else(|| BackendSpec::new(preferred));
        candidates.push(spec);
    }

    for spec in defaults {
        if !candidates.iter().any(|c| c.id == spec.id) {
            candidates.push(spec);
        }
    }

    candidates
}

pub mod opus_mt;
