// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! HttpModelDistributor tests against an in-process HTTP server

use axum::{extract::Path, http::StatusCode, routing::get, Router};
use garment_vision::models::{
    ConnectionKind, DistributionError, DownloadConditions, HttpDistributorConfig,
    HttpModelDistributor, ModelDistributor, UpdatePolicy,
};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const MODEL_BYTES: &[u8] = b"fake onnx model payload";
const STALE_BYTES: &[u8] = b"previous model payload";

async fn serve(hits: Arc<AtomicUsize>) -> SocketAddr {
    let app = Router::new().route(
        "/models/:file",
        get(move |Path(file): Path<String>| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                if file == "color-detector.onnx" {
                    Ok(MODEL_BYTES.to_vec())
                } else {
                    Err(StatusCode::NOT_FOUND)
                }
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn distributor(
    addr: SocketAddr,
    cache_dir: &std::path::Path,
    connection: ConnectionKind,
) -> HttpModelDistributor {
    HttpModelDistributor::new(HttpDistributorConfig {
        base_url: format!("http://{}/models", addr),
        cache_dir: cache_dir.to_path_buf(),
        connection,
        timeout_secs: 10,
    })
    .unwrap()
}

#[tokio::test]
async fn test_downloads_and_caches_model() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = serve(hits.clone()).await;
    let cache = tempfile::tempdir().unwrap();
    let distributor = distributor(addr, cache.path(), ConnectionKind::Unmetered);

    let file = distributor
        .get_model("color-detector", UpdatePolicy::LocalModel, &DownloadConditions::default())
        .await
        .unwrap();

    assert_eq!(file.path, cache.path().join("color-detector.onnx"));
    assert_eq!(std::fs::read(&file.path).unwrap(), MODEL_BYTES);
    assert_eq!(
        file.sha256.as_deref(),
        Some(hex::encode(Sha256::digest(MODEL_BYTES)).as_str())
    );
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Second request reuses the cached copy
    let again = distributor
        .get_model("color-detector", UpdatePolicy::LocalModel, &DownloadConditions::default())
        .await
        .unwrap();
    assert_eq!(again.path, file.path);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_latest_model_always_downloads() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = serve(hits.clone()).await;
    let cache = tempfile::tempdir().unwrap();
    let distributor = distributor(addr, cache.path(), ConnectionKind::Unmetered);

    for _ in 0..2 {
        distributor
            .get_model("color-detector", UpdatePolicy::LatestModel, &DownloadConditions::default())
            .await
            .unwrap();
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_metered_connection_refuses_wifi_only_download() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = serve(hits.clone()).await;
    let cache = tempfile::tempdir().unwrap();
    let distributor = distributor(addr, cache.path(), ConnectionKind::Metered);

    let result = distributor
        .get_model("color-detector", UpdatePolicy::LocalModel, &DownloadConditions::default())
        .await;

    assert!(matches!(result, Err(DistributionError::ConditionsNotMet { .. })));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // Without the Wi-Fi requirement the metered link may be used
    let file = distributor
        .get_model(
            "color-detector",
            UpdatePolicy::LocalModel,
            &DownloadConditions { require_wifi: false },
        )
        .await
        .unwrap();
    assert!(file.path.exists());
}

#[tokio::test]
async fn test_metered_connection_still_serves_cached_model() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = serve(hits.clone()).await;
    let cache = tempfile::tempdir().unwrap();
    std::fs::write(cache.path().join("color-detector.onnx"), MODEL_BYTES).unwrap();
    let distributor = distributor(addr, cache.path(), ConnectionKind::Metered);

    let file = distributor
        .get_model("color-detector", UpdatePolicy::LocalModel, &DownloadConditions::default())
        .await
        .unwrap();

    assert_eq!(file.path, cache.path().join("color-detector.onnx"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_background_update_serves_cache_then_refreshes() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = serve(hits.clone()).await;
    let cache = tempfile::tempdir().unwrap();
    let cached = cache.path().join("color-detector.onnx");
    std::fs::write(&cached, STALE_BYTES).unwrap();
    let distributor = distributor(addr, cache.path(), ConnectionKind::Unmetered);

    let file = distributor
        .get_model(
            "color-detector",
            UpdatePolicy::LocalModelUpdateInBackground,
            &DownloadConditions::default(),
        )
        .await
        .unwrap();

    // Served from cache without waiting for the download
    assert_eq!(file.path, cached);
    assert!(file.sha256.is_none());

    let refreshed = timeout(Duration::from_secs(5), async {
        loop {
            let done = hits.load(Ordering::SeqCst) == 1
                && std::fs::read(&cached).unwrap() == MODEL_BYTES;
            if done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(refreshed.is_ok(), "cached model was not refreshed");
    assert!(!cache.path().join("color-detector.onnx.part").exists());
}

#[tokio::test]
async fn test_background_update_skipped_on_metered_wifi_only() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = serve(hits.clone()).await;
    let cache = tempfile::tempdir().unwrap();
    let cached = cache.path().join("color-detector.onnx");
    std::fs::write(&cached, STALE_BYTES).unwrap();
    let distributor = distributor(addr, cache.path(), ConnectionKind::Metered);

    let file = distributor
        .get_model(
            "color-detector",
            UpdatePolicy::LocalModelUpdateInBackground,
            &DownloadConditions::default(),
        )
        .await
        .unwrap();
    assert_eq!(file.path, cached);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read(&cached).unwrap(), STALE_BYTES);
}

#[tokio::test]
async fn test_unknown_model_is_not_found() {
    let addr = serve(Arc::new(AtomicUsize::new(0))).await;
    let cache = tempfile::tempdir().unwrap();
    let distributor = distributor(addr, cache.path(), ConnectionKind::Unmetered);

    let result = distributor
        .get_model("type-detector", UpdatePolicy::LocalModel, &DownloadConditions::default())
        .await;

    assert!(matches!(result, Err(DistributionError::NotFound(_))));
    assert!(!cache.path().join("type-detector.onnx").exists());
}
