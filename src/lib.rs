/*!
 * # epubtrans - structure-preserving EPUB translation
 *
 * A Rust library for translating the readable text of EPUB files while
 * leaving every non-text artifact untouched.
 *
 * ## Features
 *
 * - Extract translatable text fragments from XHTML sub-documents
 * - Translate fragments in small batches through pluggable backends with
 *   quality-ordered fallback and canary validation
 * - Preserve surrounding whitespace and skip non-prose regions (code,
 *   scripts, styles, vector and math markup)
 * - Resume interrupted runs from a durable checkpoint without
 *   re-translating completed fragments
 * - Reassemble the container with manifest, spine and all non-document
 *   entries byte-identical
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `container`: EPUB container model and reassembly
 * - `extractor`: Text fragment extraction and substitution
 * - `checkpoint`: Durable progress record for resumable runs
 * - `translation_service`: Backend selection and the batching contract
 * - `providers`: Translation backend implementations
 * - `pipeline`: The orchestrating state machine
 * - `app_controller`: Caller-side runner with progress reporting
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod checkpoint;
pub mod container;
pub mod errors;
pub mod extractor;
pub mod pipeline;
pub mod providers;
pub mod translation_service;

// Re-export main types for easier usage
pub use app_config::{Config, TranslationConfig};
pub use app_controller::Controller;
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use container::{EpubContainer, SubDocument};
pub use errors::{BackendError, ContainerError};
pub use extractor::Fragment;
pub use pipeline::{CancellationFlag, PipelineEvent, PipelineHandle, TranslationPipeline};
pub use providers::{BackendSpec, TranslationBackend};
pub use translation_service::{BackendFactory, CANARY_PHRASE, TranslationService};
