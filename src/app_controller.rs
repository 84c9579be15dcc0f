use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

use crate::app_config::Config;
use crate::pipeline::{CancellationFlag, PipelineEvent, TranslationPipeline};
use crate::translation_service::TranslationService;

/// Main application controller for ebook translation
pub struct Controller {
    /// App configuration
    config: Config,
}

impl Controller {
    /// Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self { config })
    }

    /// Run the main workflow for one container file
    ///
    /// Spawns the pipeline on its own worker, renders its progress events,
    /// wires Ctrl-C to cooperative cancellation, and returns once the run
    /// reaches a terminal state. Cancellation is not an error: the
    /// checkpoint stays on disk and a later invocation resumes from it.
    pub async fn run(
        &self,
        input_path: PathBuf,
        output_path: Option<PathBuf>,
        force_overwrite: bool,
    ) -> Result<()> {
        let start_time = std::time::Instant::now();

        if !input_path.exists() {
            return Err(anyhow!("Input file does not exist: {:?}", input_path));
        }
        if input_path.extension().and_then(|ext| ext.to_str()) != Some("epub") {
            return Err(anyhow!("The input file must be an EPUB: {:?}", input_path));
        }

        let output_path = output_path.unwrap_or_else(|| default_output_path(&input_path));
        if output_path.exists() && !force_overwrite {
            warn!(
                "Skipping, output already exists (use -f to force overwrite): {}",
                output_path.display()
            );
            return Ok(());
        }

        let service = TranslationService::new(self.config.translation.clone());
        let mut handle = TranslationPipeline::spawn(
            self.config.clone(),
            service,
            input_path,
            output_path,
            CancellationFlag::new(),
        );

        // Ctrl-C requests cooperative cancellation; the pipeline stops at
        // its next poll point and keeps the checkpoint
        let cancellation = handle.cancellation.clone();
        let signal_task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing the current batch before stopping");
                cancellation.cancel();
            }
        });

        let mut progress_bar: Option<ProgressBar> = None;
        let mut outcome: Result<()> = Ok(());

        while let Some(event) = handle.events.recv().await {
            match event {
                PipelineEvent::Progress { done, total, message } => {
                    if total > 0 {
                        let bar = progress_bar
                            .get_or_insert_with(|| build_progress_bar(total as u64));
                        bar.set_position(done as u64);
                        bar.set_message(message);
                    } else {
                        info!("{}", message);
                    }
                }
                PipelineEvent::Completed { output_path } => {
                    if let Some(bar) = progress_bar.take() {
                        bar.finish_and_clear();
                    }
                    info!("Success: {}", output_path.display());
                    info!("Completed in {}", format_duration(start_time.elapsed()));
                    break;
                }
                PipelineEvent::Cancelled => {
                    if let Some(bar) = progress_bar.take() {
                        bar.finish_and_clear();
                    }
                    warn!("Translation interrupted; run again to resume from the checkpoint");
                    break;
                }
                PipelineEvent::Failed { message } => {
                    if let Some(bar) = progress_bar.take() {
                        bar.finish_and_clear();
                    }
                    outcome = Err(anyhow!(message));
                    break;
                }
            }
        }

        signal_task.abort();
        let _ = handle.join.await;

        outcome
    }
}

/// Derive an output path next to the input file
fn default_output_path(input_path: &Path) -> PathBuf {
    let stem = input_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    input_path.with_file_name(format!("{}_translated.epub", stem))
}

fn build_progress_bar(total: u64) -> ProgressBar {
    let progress_bar = ProgressBar::new(total);
    let template_result = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} fragments ({percent}%) {msg} {eta}")
        .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress_bar.set_style(template_result.progress_chars("█▓▒░"));
    progress_bar
}

// Format duration in a human-readable format
fn format_duration(duration: std::time::Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, duration.subsec_millis())
    }
}
