/*!
 * Unit tests for backend selection and the batching contract.
 */

use epubtrans::app_config::TranslationConfig;
use epubtrans::errors::BackendError;
use epubtrans::providers::default_backend_specs;
use epubtrans::translation_service::{CANARY_PHRASE, TranslationService};

use crate::common::{MockBackend, MockBackendFactory};

fn default_options() -> TranslationConfig {
    TranslationConfig::default()
}

#[tokio::test]
async fn test_selectBackend_withFailingCandidates_shouldFallBackInQualityOrder() {
    let specs = default_backend_specs();
    let first = MockBackend::new(&specs[0].id);
    let second = MockBackend::new(&specs[1].id);
    let third = MockBackend::new(&specs[2].id);
    first.always_fail();
    second.always_fail();

    let factory = MockBackendFactory::new(vec![first.clone(), second.clone(), third.clone()]);
    let mut service = TranslationService::with_factory(default_options(), Box::new(factory));

    let selected = service.select_backend().await.unwrap();
    assert_eq!(selected.id(), specs[2].id);
    assert_eq!(service.selected_backend_id(), Some(specs[2].id.as_str()));

    // The failed candidates saw exactly one canary call each and no more
    assert_eq!(first.tracker().lock().unwrap().call_count, 1);
    assert_eq!(second.tracker().lock().unwrap().call_count, 1);

    let texts = vec!["The stars were bright.".to_string()];
    service.translate_batch(&texts).await.unwrap();

    // Translation traffic goes only to the accepted backend
    assert_eq!(first.tracker().lock().unwrap().call_count, 1);
    assert_eq!(second.tracker().lock().unwrap().call_count, 1);
    let third_tracker = third.tracker();
    let third_calls = third_tracker.lock().unwrap();
    assert!(third_calls.call_count >= 2, "canary plus the translation call");
    assert!(third_calls.batches.iter().any(|b| b.contains(&texts[0])));
}

#[tokio::test]
async fn test_selectBackend_shouldValidateWithCanaryPhrase() {
    let specs = default_backend_specs();
    let backend = MockBackend::new(&specs[0].id);

    let factory = MockBackendFactory::new(vec![backend.clone()]);
    let mut service = TranslationService::with_factory(default_options(), Box::new(factory));
    service.select_backend().await.unwrap();

    let tracker = backend.tracker();
    let tracker = tracker.lock().unwrap();
    assert_eq!(tracker.batches[0], vec![CANARY_PHRASE.to_string()]);
}

#[tokio::test]
async fn test_selectBackend_withAllCandidatesFailing_shouldReportNoBackend() {
    let specs = default_backend_specs();
    let backends: Vec<_> = specs.iter().map(|s| MockBackend::new(&s.id)).collect();
    for backend in &backends {
        backend.always_fail();
    }

    let factory = MockBackendFactory::new(backends);
    let mut service = TranslationService::with_factory(default_options(), Box::new(factory));

    let result = service.select_backend().await;
    assert!(matches!(result, Err(BackendError::NoBackendAvailable)));
}

#[tokio::test]
async fn test_selectBackend_withPreferredId_shouldTryItFirst() {
    let specs = default_backend_specs();
    let preferred = MockBackend::new("my-org/custom-en-pt");
    let builtin = MockBackend::new(&specs[0].id);

    let factory = MockBackendFactory::new(vec![preferred.clone(), builtin.clone()]);
    let mut options = default_options();
    options.preferred_backend = Some("my-org/custom-en-pt".to_string());
    let mut service = TranslationService::with_factory(options, Box::new(factory));

    let selected = service.select_backend().await.unwrap();
    assert_eq!(selected.id(), "my-org/custom-en-pt");
    assert_eq!(builtin.tracker().lock().unwrap().call_count, 0);
}

#[tokio::test]
async fn test_selectBackend_shouldMemoizeAcrossCalls() {
    let specs = default_backend_specs();
    let backend = MockBackend::new(&specs[0].id);

    let factory = MockBackendFactory::new(vec![backend.clone()]);
    let mut service = TranslationService::with_factory(default_options(), Box::new(factory));

    service.select_backend().await.unwrap();
    service.select_backend().await.unwrap();

    // A single canary call despite two selection requests
    assert_eq!(backend.tracker().lock().unwrap().call_count, 1);
}

#[tokio::test]
async fn test_translateBatch_withFailingBackendCall_shouldPropagateError() {
    let backend = MockBackend::new("direct");
    backend.fail_on_call(1);

    let mut service = TranslationService::with_backend(default_options(), backend);
    let result = service.translate_batch(&["Hello".to_string()]).await;
    assert!(matches!(result, Err(BackendError::RequestFailed(_))));
}
