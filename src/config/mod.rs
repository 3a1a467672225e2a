// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Classifier configuration from TOML and environment variables

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::{
    ConnectionKind, DownloadConditions, HttpDistributorConfig, HttpModelDistributor,
    LocalModelStore, ModelDistributor, SessionOptions, UpdatePolicy, DEFAULT_NUM_THREADS,
};
use crate::vision::VisionModelConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub color: String,
    #[serde(rename = "type")]
    pub garment: String,
    /// Model directory, or download cache when `base_url` is set
    pub dir: PathBuf,
    /// Distribution endpoint; models are served from `dir` when unset
    pub base_url: Option<String>,
    pub update_policy: UpdatePolicy,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        let defaults = VisionModelConfig::default();
        Self {
            color: defaults.color_model,
            garment: defaults.type_model,
            dir: PathBuf::from("./models"),
            base_url: None,
            update_policy: UpdatePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub require_wifi: bool,
    pub connection: ConnectionKind,
    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            require_wifi: true,
            connection: ConnectionKind::default(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub num_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            num_threads: DEFAULT_NUM_THREADS,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub models: ModelsConfig,
    pub network: NetworkConfig,
    pub runtime: RuntimeConfig,
}

impl ClassifierConfig {
    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&content).context(format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from variables returned by `lookup`
    ///
    /// Recognized: `GARMENT_COLOR_MODEL`, `GARMENT_TYPE_MODEL`,
    /// `GARMENT_MODEL_DIR`, `GARMENT_MODEL_BASE_URL`, `GARMENT_THREADS`,
    /// `GARMENT_CONNECTION`, `GARMENT_REQUIRE_WIFI`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(val) = lookup("GARMENT_COLOR_MODEL") {
            self.models.color = val;
        }
        if let Some(val) = lookup("GARMENT_TYPE_MODEL") {
            self.models.garment = val;
        }
        if let Some(val) = lookup("GARMENT_MODEL_DIR") {
            self.models.dir = PathBuf::from(val);
        }
        if let Some(val) = lookup("GARMENT_MODEL_BASE_URL") {
            self.models.base_url = Some(val);
        }
        if let Some(val) = lookup("GARMENT_THREADS") {
            self.runtime.num_threads = val
                .parse()
                .context(format!("GARMENT_THREADS is not a number: {}", val))?;
        }
        if let Some(val) = lookup("GARMENT_CONNECTION") {
            self.network.connection = val.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(val) = lookup("GARMENT_REQUIRE_WIFI") {
            self.network.require_wifi = val
                .parse()
                .context(format!("GARMENT_REQUIRE_WIFI is not a boolean: {}", val))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.models.color.is_empty() || self.models.garment.is_empty() {
            anyhow::bail!("Model names must not be empty");
        }
        if self.runtime.num_threads == 0 {
            anyhow::bail!("runtime.num_threads must be at least 1");
        }
        Ok(())
    }

    pub fn vision_config(&self) -> VisionModelConfig {
        VisionModelConfig {
            color_model: self.models.color.clone(),
            type_model: self.models.garment.clone(),
            policy: self.models.update_policy,
            conditions: DownloadConditions {
                require_wifi: self.network.require_wifi,
            },
            options: SessionOptions {
                num_threads: self.runtime.num_threads,
            },
        }
    }

    /// Distributor for the configured source
    pub fn distributor(&self) -> Result<Arc<dyn ModelDistributor>> {
        match &self.models.base_url {
            Some(base_url) => Ok(Arc::new(HttpModelDistributor::new(HttpDistributorConfig {
                base_url: base_url.clone(),
                cache_dir: self.models.dir.clone(),
                connection: self.network.connection,
                timeout_secs: self.network.timeout_secs,
            })?)),
            None => Ok(Arc::new(LocalModelStore::new(self.models.dir.clone()))),
        }
    }
}
