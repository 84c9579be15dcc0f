/*!
 * End-to-end pipeline tests against fixture EPUBs and a scripted backend.
 *
 * These cover the externally observable guarantees: translated prose with
 * untouched structure, skip-region enforcement, whitespace preservation,
 * batch failure containment, checkpoint lifecycle and cancel/resume
 * equivalence.
 */

use std::path::Path;
use std::sync::Arc;

use epubtrans::app_config::Config;
use epubtrans::checkpoint::{Checkpoint, CheckpointStore};
use epubtrans::pipeline::{CancellationFlag, PipelineEvent, TranslationPipeline};
use epubtrans::translation_service::TranslationService;

use crate::common::{MockBackend, build_test_epub, read_epub_entries, read_epub_entry_text};

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.checkpoint_file = dir.join("progress.json");
    config
}

async fn run_pipeline(
    config: &Config,
    backend: Arc<MockBackend>,
    input: &Path,
    output: &Path,
    cancellation: CancellationFlag,
) -> Vec<PipelineEvent> {
    let service = TranslationService::with_backend(config.translation.clone(), backend);
    let mut handle = TranslationPipeline::spawn(
        config.clone(),
        service,
        input.to_path_buf(),
        output.to_path_buf(),
        cancellation,
    );

    let mut events = Vec::new();
    while let Some(event) = handle.events.recv().await {
        events.push(event);
    }
    let _ = handle.join.await;
    events
}

fn assert_monotonic_progress(events: &[PipelineEvent]) {
    let mut last_done = 0;
    for event in events {
        if let PipelineEvent::Progress { done, .. } = event {
            assert!(*done >= last_done, "progress must never go backwards");
            last_done = *done;
        }
    }
}

#[tokio::test]
async fn test_run_endToEnd_shouldTranslateProseAndSkipCode() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("book.epub");
    let output = dir.path().join("out.epub");
    build_test_epub(
        &input,
        &[
            ("ch1", "chapter1.xhtml", "<p>The book is excellent.</p><p>Chapter One</p>"),
            ("ch2", "chapter2.xhtml", "<pre><code>let x = 1;</code></pre>"),
        ],
    );

    let config = test_config(dir.path());
    let backend = MockBackend::new("mock");
    let events = run_pipeline(&config, backend, &input, &output, CancellationFlag::new()).await;

    assert!(matches!(events.last(), Some(PipelineEvent::Completed { .. })));
    assert_monotonic_progress(&events);

    // Prose fragments were transformed into non-empty, different text
    let chapter1 = read_epub_entry_text(&output, "OEBPS/chapter1.xhtml");
    assert!(chapter1.contains("pt:The book is excellent."));
    assert!(chapter1.contains("pt:Chapter One"));

    // The code-region document was never mutated, byte for byte
    let original_ch2 = read_epub_entries(&input)
        .into_iter()
        .find(|(name, _)| name == "OEBPS/chapter2.xhtml")
        .unwrap()
        .1;
    let written_ch2 = read_epub_entries(&output)
        .into_iter()
        .find(|(name, _)| name == "OEBPS/chapter2.xhtml")
        .unwrap()
        .1;
    assert_eq!(written_ch2, original_ch2);

    // The checkpoint is gone after a successful run
    assert!(!config.checkpoint_file.exists());

    // The final progress report covers every fragment
    let last_progress = events
        .iter()
        .rev()
        .find_map(|e| match e {
            PipelineEvent::Progress { done, total, .. } => Some((*done, *total)),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_progress, (2, 2));
}

#[tokio::test]
async fn test_run_shouldPreserveWhitespaceAroundFragments() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("book.epub");
    let output = dir.path().join("out.epub");
    build_test_epub(&input, &[("ch1", "chapter1.xhtml", "<p>  Hello world\n</p>")]);

    let config = test_config(dir.path());
    let backend = MockBackend::with_transform("mock", |text| {
        if text == "Hello world" {
            "Olá mundo".to_string()
        } else {
            format!("pt:{}", text)
        }
    });
    let events = run_pipeline(&config, backend, &input, &output, CancellationFlag::new()).await;

    assert!(matches!(events.last(), Some(PipelineEvent::Completed { .. })));
    let chapter1 = read_epub_entry_text(&output, "OEBPS/chapter1.xhtml");
    assert!(
        chapter1.contains("  Olá mundo\n"),
        "affixes must survive substitution, got: {}",
        chapter1
    );
    assert!(!chapter1.contains("Hello world"));
}

#[tokio::test]
async fn test_run_withNoTranslatableText_shouldCopyContainerThrough() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("book.epub");
    let output = dir.path().join("out.epub");
    build_test_epub(&input, &[("ch1", "chapter1.xhtml", "<pre><code>let x = 1;</code></pre>")]);

    let config = test_config(dir.path());
    let backend = MockBackend::new("mock");
    let events =
        run_pipeline(&config, backend.clone(), &input, &output, CancellationFlag::new()).await;

    assert!(matches!(events.last(), Some(PipelineEvent::Completed { .. })));
    assert_eq!(backend.tracker().lock().unwrap().call_count, 0);

    let original = read_epub_entries(&input);
    let written = read_epub_entries(&output);
    assert_eq!(written.len(), original.len());
    for ((original_name, original_bytes), (written_name, written_bytes)) in
        original.iter().zip(&written)
    {
        assert_eq!(written_name, original_name);
        assert_eq!(written_bytes, original_bytes, "entry {} changed", original_name);
    }
}

#[tokio::test]
async fn test_run_withOneFailingBatch_shouldKeepOtherTranslations() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("book.epub");
    let output = dir.path().join("out.epub");
    build_test_epub(
        &input,
        &[(
            "ch1",
            "chapter1.xhtml",
            "<p>Alpha paragraph.</p><p>Bravo paragraph.</p>\
             <p>Charlie paragraph.</p><p>Delta paragraph.</p>\
             <p>Echo paragraph.</p><p>Foxtrot paragraph.</p>",
        )],
    );

    let config = test_config(dir.path());
    let backend = MockBackend::new("mock");
    // Batch width is two, so the second call covers Charlie and Delta
    backend.fail_on_call(2);

    let events =
        run_pipeline(&config, backend, &input, &output, CancellationFlag::new()).await;
    assert!(
        matches!(events.last(), Some(PipelineEvent::Completed { .. })),
        "a batch-local failure must not fail the run"
    );

    let chapter1 = read_epub_entry_text(&output, "OEBPS/chapter1.xhtml");
    assert!(chapter1.contains("pt:Alpha paragraph."));
    assert!(chapter1.contains("pt:Bravo paragraph."));
    assert!(chapter1.contains("Charlie paragraph.") && !chapter1.contains("pt:Charlie"));
    assert!(chapter1.contains("Delta paragraph.") && !chapter1.contains("pt:Delta"));
    assert!(chapter1.contains("pt:Echo paragraph."));
    assert!(chapter1.contains("pt:Foxtrot paragraph."));

    assert!(!config.checkpoint_file.exists());
}

#[tokio::test]
async fn test_run_withStaleCheckpoint_shouldRestartFromZero() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("book.epub");
    let output = dir.path().join("out.epub");
    build_test_epub(
        &input,
        &[
            ("ch1", "chapter1.xhtml", "<p>First text.</p>"),
            ("ch2", "chapter2.xhtml", "<p>Second text.</p>"),
        ],
    );

    let config = test_config(dir.path());

    // A checkpoint taken against a different container claims everything is done
    let mut stale = Checkpoint::new(vec!["other-doc".to_string()]);
    stale.set_position(1, 0, Vec::new());
    CheckpointStore::new(config.checkpoint_file.clone())
        .save(&stale)
        .unwrap();

    let backend = MockBackend::new("mock");
    let events =
        run_pipeline(&config, backend, &input, &output, CancellationFlag::new()).await;
    assert!(matches!(events.last(), Some(PipelineEvent::Completed { .. })));

    // The stale indices were discarded and both documents got translated
    assert!(read_epub_entry_text(&output, "OEBPS/chapter1.xhtml").contains("pt:First text."));
    assert!(read_epub_entry_text(&output, "OEBPS/chapter2.xhtml").contains("pt:Second text."));
}

#[tokio::test]
async fn test_run_cancelledThenResumed_shouldMatchUninterruptedRun() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("book.epub");
    let resumed_output = dir.path().join("resumed.epub");
    build_test_epub(
        &input,
        &[
            (
                "ch1",
                "chapter1.xhtml",
                "<p>First paragraph.</p><p>Second paragraph.</p>\
                 <p>Third paragraph.</p><p>Fourth paragraph.</p>",
            ),
            ("ch2", "chapter2.xhtml", "<p>Closing words.</p>"),
        ],
    );

    let config = test_config(dir.path());

    // First run: cancel right after the first completed batch
    let cancellation = CancellationFlag::new();
    let backend = MockBackend::new("mock");
    let hook_flag = cancellation.clone();
    backend.set_on_call(move |call_number| {
        if call_number == 1 {
            hook_flag.cancel();
        }
    });

    let events = run_pipeline(&config, backend, &input, &resumed_output, cancellation).await;
    assert!(matches!(events.last(), Some(PipelineEvent::Cancelled)));
    assert!(!resumed_output.exists(), "a cancelled run writes no output");
    assert!(config.checkpoint_file.exists(), "the checkpoint survives cancellation");

    // Second run resumes and completes
    let resume_backend = MockBackend::new("mock");
    let events = run_pipeline(
        &config,
        resume_backend.clone(),
        &input,
        &resumed_output,
        CancellationFlag::new(),
    )
    .await;
    assert!(matches!(events.last(), Some(PipelineEvent::Completed { .. })));
    assert!(!config.checkpoint_file.exists());

    // Completed fragments were not re-translated on resume
    let tracker = resume_backend.tracker();
    let tracker = tracker.lock().unwrap();
    assert!(
        tracker
            .batches
            .iter()
            .all(|batch| !batch.contains(&"First paragraph.".to_string())),
        "the first batch must not be submitted again"
    );
    drop(tracker);

    // Reference: an uninterrupted run over the same input
    let reference_dir = tempfile::tempdir().unwrap();
    let reference_output = reference_dir.path().join("reference.epub");
    let reference_config = test_config(reference_dir.path());
    let events = run_pipeline(
        &reference_config,
        MockBackend::new("mock"),
        &input,
        &reference_output,
        CancellationFlag::new(),
    )
    .await;
    assert!(matches!(events.last(), Some(PipelineEvent::Completed { .. })));

    let resumed = read_epub_entries(&resumed_output);
    let reference = read_epub_entries(&reference_output);
    assert_eq!(resumed.len(), reference.len());
    for ((resumed_name, resumed_bytes), (reference_name, reference_bytes)) in
        resumed.iter().zip(&reference)
    {
        assert_eq!(resumed_name, reference_name);
        assert_eq!(
            resumed_bytes, reference_bytes,
            "entry {} differs between resumed and uninterrupted runs",
            resumed_name
        );
    }
}

#[tokio::test]
async fn test_run_withMissingInput_shouldFail() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let events = run_pipeline(
        &config,
        MockBackend::new("mock"),
        &dir.path().join("does-not-exist.epub"),
        &dir.path().join("out.epub"),
        CancellationFlag::new(),
    )
    .await;

    assert!(matches!(events.last(), Some(PipelineEvent::Failed { .. })));
}
