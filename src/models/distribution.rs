// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Model distribution: resolve a model name to a local model file
//!
//! The distribution service is an external collaborator. `LocalModelStore`
//! serves pre-provisioned files from a directory; `HttpModelDistributor`
//! downloads into a cache directory on demand.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// File extension of model artifacts
pub const MODEL_EXTENSION: &str = "onnx";

/// When a cached model may be served instead of downloading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    /// Use the cached copy when present, download otherwise
    #[default]
    LocalModel,
    /// Use the cached copy now and refresh it in the background
    LocalModelUpdateInBackground,
    /// Always download the latest copy
    LatestModel,
}

/// Network conditions a download must satisfy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadConditions {
    pub require_wifi: bool,
}

impl Default for DownloadConditions {
    fn default() -> Self {
        Self { require_wifi: true }
    }
}

/// Kind of network link the host is currently on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Unmetered link (Wi-Fi, ethernet)
    #[default]
    Unmetered,
    /// Metered link (cellular, tethered)
    Metered,
}

impl ConnectionKind {
    pub fn satisfies(&self, conditions: &DownloadConditions) -> bool {
        !conditions.require_wifi || *self == ConnectionKind::Unmetered
    }
}

impl std::str::FromStr for ConnectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unmetered" | "wifi" | "ethernet" => Ok(Self::Unmetered),
            "metered" | "cellular" => Ok(Self::Metered),
            other => Err(format!("unknown connection kind: {}", other)),
        }
    }
}

/// Handle to a model file available on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFile {
    pub name: String,
    pub path: PathBuf,
    /// Hex SHA-256 of the file, when it was computed on download
    pub sha256: Option<String>,
}

#[derive(Error, Debug)]
pub enum DistributionError {
    #[error("Model not found: {0}")]
    NotFound(String),
    #[error("Download conditions not met for {name}: Wi-Fi required, connection is metered")]
    ConditionsNotMet { name: String },
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid model name: {0}")]
    InvalidName(String),
}

/// Resolves model names to local model files
#[async_trait]
pub trait ModelDistributor: Send + Sync {
    async fn get_model(
        &self,
        name: &str,
        policy: UpdatePolicy,
        conditions: &DownloadConditions,
    ) -> Result<ModelFile, DistributionError>;
}

/// Serves models already present in a directory as `<dir>/<name>.onnx`
#[derive(Debug, Clone)]
pub struct LocalModelStore {
    model_dir: PathBuf,
}

impl LocalModelStore {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }
}

#[async_trait]
impl ModelDistributor for LocalModelStore {
    async fn get_model(
        &self,
        name: &str,
        _policy: UpdatePolicy,
        _conditions: &DownloadConditions,
    ) -> Result<ModelFile, DistributionError> {
        let path = model_path(&self.model_dir, name)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(DistributionError::NotFound(format!(
                "{} (looked in {})",
                name,
                path.display()
            )));
        }

        debug!("Resolved model {} to {}", name, path.display());
        Ok(ModelFile {
            name: name.to_string(),
            path,
            sha256: None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct HttpDistributorConfig {
    /// Base URL; models are fetched from `<base_url>/<name>.onnx`
    pub base_url: String,
    /// Directory downloaded models are cached in
    pub cache_dir: PathBuf,
    pub connection: ConnectionKind,
    pub timeout_secs: u64,
}

/// Downloads models over HTTP into a cache directory
#[derive(Debug, Clone)]
pub struct HttpModelDistributor {
    config: HttpDistributorConfig,
    client: reqwest::Client,
}

impl HttpModelDistributor {
    pub fn new(config: HttpDistributorConfig) -> Result<Self, DistributionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DistributionError::NetworkError(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn model_url(&self, name: &str) -> String {
        format!(
            "{}/{}.{}",
            self.config.base_url.trim_end_matches('/'),
            name,
            MODEL_EXTENSION
        )
    }

    async fn download(
        client: &reqwest::Client,
        url: &str,
        name: &str,
        dest: &Path,
    ) -> Result<ModelFile, DistributionError> {
        info!("Downloading model {} from {}", name, url);

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| DistributionError::NetworkError(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DistributionError::NotFound(name.to_string()));
        }

        let response = response
            .error_for_status()
            .map_err(|e| DistributionError::NetworkError(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DistributionError::NetworkError(e.to_string()))?;

        let sha256 = hex::encode(Sha256::digest(&bytes));

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = dest.with_extension(format!("{}.part", MODEL_EXTENSION));
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, dest).await?;

        info!(
            "Downloaded model {} ({} bytes, sha256 {})",
            name,
            bytes.len(),
            sha256
        );

        Ok(ModelFile {
            name: name.to_string(),
            path: dest.to_path_buf(),
            sha256: Some(sha256),
        })
    }
}

#[async_trait]
impl ModelDistributor for HttpModelDistributor {
    async fn get_model(
        &self,
        name: &str,
        policy: UpdatePolicy,
        conditions: &DownloadConditions,
    ) -> Result<ModelFile, DistributionError> {
        let dest = model_path(&self.config.cache_dir, name)?;
        let cached = tokio::fs::try_exists(&dest).await?;
        let may_download = self.config.connection.satisfies(conditions);

        if cached && policy != UpdatePolicy::LatestModel {
            debug!("Using cached model {} at {}", name, dest.display());

            if policy == UpdatePolicy::LocalModelUpdateInBackground && may_download {
                let client = self.client.clone();
                let url = self.model_url(name);
                let name = name.to_string();
                let dest = dest.clone();
                tokio::spawn(async move {
                    if let Err(e) = Self::download(&client, &url, &name, &dest).await {
                        warn!("Background refresh of model {} failed: {}", name, e);
                    }
                });
            }

            return Ok(ModelFile {
                name: name.to_string(),
                path: dest,
                sha256: None,
            });
        }

        if !may_download {
            return Err(DistributionError::ConditionsNotMet {
                name: name.to_string(),
            });
        }

        Self::download(&self.client, &self.model_url(name), name, &dest).await
    }
}

fn model_path(dir: &Path, name: &str) -> Result<PathBuf, DistributionError> {
    if name.is_empty()
        || name.contains(['/', '\\'])
        || name == "."
        || name == ".."
    {
        return Err(DistributionError::InvalidName(name.to_string()));
    }
    Ok(dir.join(format!("{}.{}", name, MODEL_EXTENSION)))
}
