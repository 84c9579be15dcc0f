/*!
 * Translation pipeline orchestrator.
 *
 * Drives one container through opening, fragment counting, checkpoint
 * resolution, batched translation, per-document commits and final
 * reassembly. The pipeline runs on its own spawned task and owns all of
 * its state for the duration of the run; the caller observes it through a
 * one-directional event channel and may request cooperative cancellation
 * through a shared flag, polled before every batch and every document
 * transition.
 *
 * A checkpoint is persisted after every batch, so an interrupted run
 * resumes with at most one batch of rework. Batch-level backend failures
 * are non-fatal: the affected fragments keep their original text and the
 * run continues.
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::app_config::Config;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::container::{EpubContainer, SubDocument};
use crate::errors::BackendError;
use crate::extractor;
use crate::translation_service::TranslationService;

/// Event stream from the pipeline worker to its caller
///
/// Progress events are advisory; the run never depends on the caller
/// consuming them. Exactly one terminal event ends the stream.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Monotonic progress signal
    Progress {
        /// Fragments consumed so far (degraded batches included)
        done: usize,
        /// Total fragments across all sub-documents
        total: usize,
        /// Human-readable status line
        message: String,
    },
    /// The run finished and the output container was written
    Completed {
        /// Path of the written container
        output_path: PathBuf,
    },
    /// The run stopped at a cancellation poll point; the checkpoint is kept
    Cancelled,
    /// The run aborted on an unrecoverable error
    Failed {
        /// Error description
        message: String,
    },
}

/// Cooperative cancellation token shared between caller and worker
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Create a new, unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; takes effect at the worker's next poll point
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Caller-side handle to a running pipeline
pub struct PipelineHandle {
    /// Event stream, ending in exactly one terminal event
    pub events: mpsc::UnboundedReceiver<PipelineEvent>,
    /// Cancellation token for this run
    pub cancellation: CancellationFlag,
    /// Join handle of the worker task
    pub join: JoinHandle<()>,
}

/// Terminal outcome of a run that did not fail
enum Outcome {
    Completed,
    Cancelled,
}

/// The pipeline state machine
pub struct TranslationPipeline {
    config: Config,
    service: TranslationService,
    store: CheckpointStore,
    events: mpsc::UnboundedSender<PipelineEvent>,
    cancellation: CancellationFlag,
}

impl TranslationPipeline {
    /// Spawn a pipeline run on its own worker task
    ///
    /// The cancellation flag is provided by the caller so it can be wired
    /// to signals or UI controls before the worker starts.
    pub fn spawn(
        config: Config,
        service: TranslationService,
        input_path: PathBuf,
        output_path: PathBuf,
        cancellation: CancellationFlag,
    ) -> PipelineHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let store = CheckpointStore::new(config.checkpoint_file.clone());

        let pipeline = Self {
            config,
            service,
            store,
            events: events_tx,
            cancellation: cancellation.clone(),
        };
        let join = tokio::spawn(pipeline.run(input_path, output_path));

        PipelineHandle {
            events: events_rx,
            cancellation,
            join,
        }
    }

    async fn run(mut self, input_path: PathBuf, output_path: PathBuf) {
        match self.run_inner(&input_path, &output_path).await {
            Ok(Outcome::Completed) => {
                let _ = self.events.send(PipelineEvent::Completed { output_path });
            }
            Ok(Outcome::Cancelled) => {
                info!("Run cancelled; progress checkpoint kept for resume");
                let _ = self.events.send(PipelineEvent::Cancelled);
            }
            Err(e) => {
                error!("Translation run failed: {:#}", e);
                let _ = self.events.send(PipelineEvent::Failed {
                    message: format!("{:#}", e),
                });
            }
        }
    }

    async fn run_inner(&mut self, input_path: &Path, output_path: &Path) -> Result<Outcome> {
        // Opening
        self.progress(0, 0, "Opening container".to_string());
        let mut container = EpubContainer::open(input_path)
            .with_context(|| format!("Failed to open container {}", input_path.display()))?;

        let documents: Vec<SubDocument> = container.sub_documents().to_vec();
        let order: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
        info!(
            "Container holds {} sub-document(s): {}",
            documents.len(),
            input_path.display()
        );

        // Counting
        let mut counts = Vec::with_capacity(documents.len());
        let mut total = 0usize;
        for document in &documents {
            let text = container.document_text(document)?;
            let count = count_fragments(&text);
            counts.push(count);
            total += count;
        }
        debug!("{} fragment(s) across {} sub-document(s)", total, documents.len());

        if total == 0 {
            info!("No translatable text found; copying container through unchanged");
            container.write(output_path).with_context(|| {
                format!("Failed to write destination container {}", output_path.display())
            })?;
            if let Err(e) = self.store.invalidate() {
                warn!("Could not remove checkpoint after completion: {}", e);
            }
            self.progress(0, 0, "No translatable text found".to_string());
            return Ok(Outcome::Completed);
        }

        // Resolving-Checkpoint
        let mut checkpoint = self.store.load();
        if checkpoint.is_empty() {
            checkpoint = Checkpoint::new(order.clone());
        } else if !checkpoint.matches(&order) {
            warn!("Checkpoint does not match this container's document order; starting over");
            checkpoint = Checkpoint::new(order.clone());
        } else {
            info!(
                "Resuming at document {} fragment {}",
                checkpoint.document_index, checkpoint.fragment_index
            );
            for (id, content) in checkpoint.committed_documents.clone() {
                container.replace_document_text(&id, content)?;
            }
        }

        let start_document = checkpoint.document_index.min(documents.len());
        let batch_size = self.config.translation.batch_size.max(1);
        let mut done: usize = counts[..start_document].iter().sum();
        self.progress(done, total, "Starting translation".to_string());

        // Translating
        for document_index in start_document..documents.len() {
            if self.cancellation.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }

            let document = documents[document_index].clone();
            let source_text = container.document_text(&document)?;
            let fragments = {
                let tree = extractor::parse_document(&source_text);
                extractor::extract_fragments(&tree)
            };

            let resume_fragment = if document_index == start_document {
                checkpoint.fragment_index.min(fragments.len())
            } else {
                0
            };
            let mut replacements: Vec<String> = if resume_fragment > 0 {
                checkpoint.current_texts.clone()
            } else {
                Vec::new()
            };
            replacements.truncate(resume_fragment);
            done += resume_fragment;

            // Replayed translations count as mutation; replayed originals do not
            let mut mutated = replacements
                .iter()
                .zip(&fragments)
                .any(|(replacement, fragment)| *replacement != fragment.core);
            let mut fragment_index = resume_fragment;

            debug!(
                "Translating {} ({} fragment(s), starting at {})",
                document.name,
                fragments.len(),
                fragment_index
            );

            while fragment_index < fragments.len() {
                if self.cancellation.is_cancelled() {
                    return Ok(Outcome::Cancelled);
                }

                let end = (fragment_index + batch_size).min(fragments.len());
                let batch: Vec<String> = fragments[fragment_index..end]
                    .iter()
                    .map(|f| f.core.clone())
                    .collect();

                match self.service.translate_batch(&batch).await {
                    Ok(result) => {
                        replacements.extend(result);
                        mutated = true;
                    }
                    Err(e @ BackendError::NoBackendAvailable) => {
                        return Err(e).context("No translation backend could be selected");
                    }
                    Err(e) => {
                        warn!(
                            "Batch failed, keeping original text for {} fragment(s): {}",
                            batch.len(),
                            e
                        );
                        replacements.extend(batch);
                    }
                }

                done += end - fragment_index;
                fragment_index = end;

                if fragment_index < fragments.len() {
                    checkpoint.set_position(document_index, fragment_index, replacements.clone());
                    self.store
                        .save(&checkpoint)
                        .context("Failed to save checkpoint")?;
                }

                self.progress(done, total, format!("Translated {}/{} fragments", done, total));
            }

            // Committing-Document
            let committed = if mutated {
                let serialized = {
                    let mut tree = extractor::parse_document(&source_text);
                    let applied = extractor::apply_replacements(&mut tree, 0, &replacements);
                    if applied != replacements.len() {
                        warn!(
                            "Applied {} of {} replacement(s) in {}",
                            applied,
                            replacements.len(),
                            document.name
                        );
                    }
                    extractor::serialize_document(&tree)
                };
                container.replace_document_text(&document.id, serialized.clone())?;
                Some((document.id.clone(), serialized))
            } else {
                None
            };

            checkpoint.advance_document(committed);
            self.store
                .save(&checkpoint)
                .context("Failed to save checkpoint")?;
        }

        // Finalizing
        info!("Writing translated container to {}", output_path.display());
        container.write(output_path).with_context(|| {
            format!("Failed to write destination container {}", output_path.display())
        })?;
        if let Err(e) = self.store.invalidate() {
            warn!("Could not remove checkpoint after completion: {}", e);
        }
        self.progress(done, total, "Translation complete".to_string());

        Ok(Outcome::Completed)
    }

    fn progress(&self, done: usize, total: usize, message: String) {
        let _ = self.events.send(PipelineEvent::Progress { done, total, message });
    }
}

/// Count the translatable fragments in one sub-document's current content
fn count_fragments(content: &str) -> usize {
    let tree = extractor::parse_document(content);
    extractor::extract_fragments(&tree).len()
}
