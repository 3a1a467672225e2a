// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Classifier orchestration tests
//!
//! Covers the provisioning barrier, the NotReady gate, the [color, type]
//! result contract and the failure paths of a classification request.

use super::common::*;
use garment_vision::classifier::{Classifier, ClassifierError, ClassifierEvent, ClassifierState};
use garment_vision::vision::VisionModelConfig;
use garment_vision::ImageRef;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn start(
    distributor: FakeDistributor,
    runtime: FakeRuntime,
) -> (
    Classifier,
    garment_vision::classifier::EventReceiver,
    Arc<FakeRuntime>,
) {
    let runtime = Arc::new(runtime);
    let (classifier, events) = Classifier::start(
        VisionModelConfig::default(),
        Arc::new(distributor),
        runtime.clone(),
    );
    (classifier, events, runtime)
}

fn start_default() -> (
    Classifier,
    garment_vision::classifier::EventReceiver,
    Arc<FakeRuntime>,
) {
    start(FakeDistributor::default(), FakeRuntime::standard())
}

async fn next_event(
    events: &mut garment_vision::classifier::EventReceiver,
) -> ClassifierEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_ready_after_both_models_provisioned() {
    let (classifier, mut events, _runtime) = start_default();

    assert_eq!(next_event(&mut events).await, ClassifierEvent::ModelReady);
    assert_eq!(classifier.state(), ClassifierState::Ready);
    assert!(classifier.is_ready());

    let models = classifier.models().unwrap();
    assert_eq!(
        (
            models.color.input_height(),
            models.color.input_width(),
            models.color.input_channels()
        ),
        (24, 24, 3)
    );
    assert_eq!(
        (
            models.garment.input_height(),
            models.garment.input_width(),
            models.garment.input_channels()
        ),
        (28, 28, 1)
    );
}

#[tokio::test]
async fn test_provisioning_requests_wifi_only_with_default_threads() {
    let distributor = Arc::new(FakeDistributor::default());
    let runtime = Arc::new(FakeRuntime::standard());
    let (classifier, _events) = Classifier::start(
        VisionModelConfig::default(),
        distributor.clone(),
        runtime.clone(),
    );
    classifier.wait_until_ready().await.unwrap();

    let requests = distributor.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|(_, _, c)| c.require_wifi));

    let opened = runtime.opened.lock().unwrap();
    assert_eq!(opened.len(), 2);
    assert!(opened.iter().all(|(_, o)| o.num_threads == 4));
}

#[tokio::test]
async fn test_ready_regardless_of_completion_order() {
    for slow in [COLOR_MODEL, TYPE_MODEL] {
        let mut distributor = FakeDistributor::default();
        distributor
            .delays
            .insert(slow.to_string(), Duration::from_millis(50));

        let (classifier, mut events, _runtime) = start(distributor, FakeRuntime::standard());
        assert_eq!(next_event(&mut events).await, ClassifierEvent::ModelReady);
        assert!(classifier.is_ready());
    }
}

#[tokio::test]
async fn test_classify_before_ready_fails_without_inference() {
    let distributor = FakeDistributor {
        hang: true,
        ..Default::default()
    };
    let (classifier, mut events, runtime) = start(distributor, FakeRuntime::standard());

    assert_eq!(classifier.state(), ClassifierState::Provisioning);

    let result = classifier.classify(png_image(8, 8, [0, 255, 0])).await;
    assert_eq!(result.unwrap_err(), ClassifierError::NotReady);
    assert_eq!(runtime.run_count(), 0);
    assert_eq!(classifier.state(), ClassifierState::Provisioning);

    match next_event(&mut events).await {
        ClassifierEvent::Failed(message) => assert!(message.contains("not ready")),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_provisioning_failure_never_becomes_ready() {
    let distributor = FakeDistributor {
        missing: vec![TYPE_MODEL.to_string()],
        ..Default::default()
    };
    let (classifier, mut events, runtime) = start(distributor, FakeRuntime::standard());

    match next_event(&mut events).await {
        ClassifierEvent::Failed(message) => assert!(message.contains(TYPE_MODEL)),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(matches!(
        classifier.state(),
        ClassifierState::ProvisioningFailed(_)
    ));
    assert!(matches!(
        classifier.wait_until_ready().await,
        Err(ClassifierError::ProvisioningFailure(_))
    ));

    let result = classifier.classify(png_image(8, 8, [0, 255, 0])).await;
    assert_eq!(result.unwrap_err(), ClassifierError::NotReady);
    assert_eq!(runtime.run_count(), 0);
}

#[tokio::test]
async fn test_malformed_model_is_provisioning_failure() {
    let mut runtime = FakeRuntime::standard();
    runtime.models.get_mut(COLOR_MODEL).unwrap().input_shape = vec![1, 24, 24];

    let (classifier, mut events, _runtime) = start(FakeDistributor::default(), runtime);

    assert!(matches!(
        next_event(&mut events).await,
        ClassifierEvent::Failed(_)
    ));
    assert!(!classifier.is_ready());
}

#[tokio::test]
async fn test_classify_returns_color_then_type() {
    let (classifier, mut events, runtime) = start_default();
    assert_eq!(next_event(&mut events).await, ClassifierEvent::ModelReady);

    let results = classifier
        .classify(png_image(64, 48, [0, 200, 0]))
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].label, "Green");
    assert!((results[0].score - 0.6).abs() < 1e-6);
    assert_eq!(results[1].label, "T-shirt/Top");
    assert_eq!(classifier.state(), ClassifierState::Succeeded);
    assert_eq!(
        next_event(&mut events).await,
        ClassifierEvent::Succeeded(results.clone())
    );

    // Tensors matched each session's declared shape
    let mut runs = runtime.runs.lock().unwrap().clone();
    runs.sort();
    assert_eq!(
        runs,
        vec![
            (COLOR_MODEL.to_string(), 24 * 24 * 3),
            (TYPE_MODEL.to_string(), 28 * 28),
        ]
    );
}

#[tokio::test]
async fn test_inference_error_is_aggregation_failure() {
    let mut runtime = FakeRuntime::standard();
    runtime.models.get_mut(TYPE_MODEL).unwrap().scores = Err("delegate crashed".to_string());

    let (classifier, mut events, _runtime) = start(FakeDistributor::default(), runtime);
    assert_eq!(next_event(&mut events).await, ClassifierEvent::ModelReady);

    let result = classifier.classify(png_image(8, 8, [255, 0, 0])).await;
    match result.unwrap_err() {
        ClassifierError::AggregationFailure(message) => {
            assert!(message.contains("type"));
            assert!(!message.contains("color"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(classifier.state(), ClassifierState::Failed);
    assert!(matches!(
        next_event(&mut events).await,
        ClassifierEvent::Failed(_)
    ));
}

#[tokio::test]
async fn test_unknown_class_index_is_aggregation_failure() {
    let mut runtime = FakeRuntime::standard();
    let color = runtime.models.get_mut(COLOR_MODEL).unwrap();
    color.output_shape = vec![1, 12];
    let mut scores = vec![0.0; 12];
    scores[11] = 1.0;
    color.scores = Ok(scores);

    let (classifier, _events, _runtime) = start(FakeDistributor::default(), runtime);
    classifier.wait_until_ready().await.unwrap();

    let result = classifier.classify(png_image(8, 8, [255, 255, 0])).await;
    assert!(matches!(
        result.unwrap_err(),
        ClassifierError::AggregationFailure(_)
    ));
}

#[tokio::test]
async fn test_undecodable_image_is_decode_failure() {
    let (classifier, _events, runtime) = start_default();
    classifier.wait_until_ready().await.unwrap();

    let result = classifier
        .classify(ImageRef::Bytes(vec![0x00, 0x01, 0x02, 0x03, 0x04]))
        .await;
    assert!(matches!(
        result.unwrap_err(),
        ClassifierError::DecodeFailure(_)
    ));
    assert_eq!(runtime.run_count(), 0);
    assert_eq!(classifier.state(), ClassifierState::Failed);
}

#[tokio::test]
async fn test_classifier_accepts_requests_after_failure() {
    let (classifier, _events, _runtime) = start_default();
    classifier.wait_until_ready().await.unwrap();

    assert!(classifier
        .classify(ImageRef::Bytes(vec![1, 2, 3, 4]))
        .await
        .is_err());
    let results = classifier
        .classify(png_image(8, 8, [0, 0, 0]))
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn test_submit_delivers_result_as_event() {
    let (classifier, mut events, _runtime) = start_default();
    assert_eq!(next_event(&mut events).await, ClassifierEvent::ModelReady);

    classifier.submit(png_image(16, 16, [10, 20, 30]));

    match next_event(&mut events).await {
        ClassifierEvent::Succeeded(results) => {
            assert_eq!(results.len(), 2);
            assert_eq!(results[0].label, "Green");
            assert_eq!(results[1].label, "T-shirt/Top");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_model_ready_precedes_results_under_racing_requests() {
    for _ in 0..20 {
        let (classifier, mut events, _runtime) = start_default();

        let racer = classifier.clone();
        let results = tokio::spawn(async move {
            loop {
                match racer.classify(png_image(8, 8, [0, 200, 0])).await {
                    Ok(results) => return results,
                    Err(ClassifierError::NotReady) => tokio::task::yield_now().await,
                    Err(other) => panic!("unexpected error {:?}", other),
                }
            }
        });
        let results = timeout(Duration::from_secs(5), results)
            .await
            .expect("timed out waiting for classification")
            .unwrap();

        // Ready is never written over the state of a request that already ran
        assert_eq!(classifier.state(), ClassifierState::Succeeded);

        let mut seen_ready = false;
        loop {
            match next_event(&mut events).await {
                ClassifierEvent::ModelReady => seen_ready = true,
                ClassifierEvent::Failed(message) => assert!(message.contains("not ready")),
                ClassifierEvent::Succeeded(delivered) => {
                    assert!(seen_ready, "result delivered before ModelReady");
                    assert_eq!(delivered, results);
                    break;
                }
            }
        }
    }
}

#[tokio::test]
async fn test_classify_without_event_listener() {
    let (classifier, events, _runtime) = start_default();
    drop(events);
    classifier.wait_until_ready().await.unwrap();

    let results = classifier
        .classify(png_image(8, 8, [0, 200, 0]))
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(classifier.state(), ClassifierState::Succeeded);
}
