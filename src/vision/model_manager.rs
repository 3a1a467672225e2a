// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Provisioning of the color and garment-type models as a pair

use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{
    provision, DownloadConditions, InferenceRuntime, ModelDistributor, ModelRole, ModelSession,
    ProvisionError, ProvisionRequest, SessionOptions, UpdatePolicy,
};

/// Configuration for provisioning both vision models
#[derive(Debug, Clone)]
pub struct VisionModelConfig {
    /// Name of the color model at the distribution service
    pub color_model: String,
    /// Name of the garment-type model at the distribution service
    pub type_model: String,
    pub policy: UpdatePolicy,
    pub conditions: DownloadConditions,
    pub options: SessionOptions,
}

impl Default for VisionModelConfig {
    fn default() -> Self {
        Self {
            color_model: "color-detector".to_string(),
            type_model: "type-detector".to_string(),
            policy: UpdatePolicy::default(),
            conditions: DownloadConditions::default(),
            options: SessionOptions::default(),
        }
    }
}

impl VisionModelConfig {
    fn request(&self, role: ModelRole) -> ProvisionRequest {
        let name = match role {
            ModelRole::Color => self.color_model.clone(),
            ModelRole::Type => self.type_model.clone(),
        };
        ProvisionRequest {
            name,
            role,
            policy: self.policy,
            conditions: self.conditions.clone(),
            options: self.options.clone(),
        }
    }
}

/// Both sessions, present only once each provisioned successfully
#[derive(Debug)]
pub struct ModelPair {
    pub color: ModelSession,
    pub garment: ModelSession,
}

/// Provision both models concurrently
///
/// The two requests are independent and may complete in either order. The
/// pair is returned only if both succeed; otherwise the first failure (color
/// before type) is returned and both are logged.
pub async fn provision_models(
    config: &VisionModelConfig,
    distributor: Arc<dyn ModelDistributor>,
    runtime: Arc<dyn InferenceRuntime>,
) -> Result<ModelPair, ProvisionError> {
    info!(
        "Provisioning models: color={}, type={}",
        config.color_model, config.type_model
    );

    let (color, garment) = tokio::join!(
        provision(
            distributor.as_ref(),
            runtime.clone(),
            config.request(ModelRole::Color)
        ),
        provision(
            distributor.as_ref(),
            runtime.clone(),
            config.request(ModelRole::Type)
        ),
    );

    match (color, garment) {
        (Ok(color), Ok(garment)) => Ok(ModelPair { color, garment }),
        (Err(e), garment) => {
            warn!("⚠️ {}", e);
            if let Err(other) = garment {
                warn!("⚠️ {}", other);
            }
            Err(e)
        }
        (Ok(_), Err(e)) => {
            warn!("⚠️ {}", e);
            Err(e)
        }
    }
}
