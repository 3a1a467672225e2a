// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Turn a model name into a ready-to-use [`ModelSession`]

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use super::distribution::{DownloadConditions, ModelDistributor, UpdatePolicy};
use super::session::{InferenceRuntime, InferenceSession, SessionOptions};

/// Which preprocessing pipeline a model is fed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelRole {
    Color,
    Type,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Color => "color",
            ModelRole::Type => "type",
        }
    }

    /// Whether the role's preprocessor can produce `channels` values per pixel
    pub fn accepts_channels(&self, channels: usize) -> bool {
        match self {
            ModelRole::Color => channels == 1 || channels == 3,
            ModelRole::Type => channels == 1,
        }
    }
}

impl std::fmt::Display for ModelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Failed to obtain model {name}: {source}")]
    Distribution {
        name: String,
        #[source]
        source: super::distribution::DistributionError,
    },
    #[error("Failed to open session for {name}: {reason}")]
    Session { name: String, reason: String },
    #[error("Model {name} has unsupported {which} shape {shape:?}: {reason}")]
    Shape {
        name: String,
        which: &'static str,
        shape: Vec<i64>,
        reason: String,
    },
}

/// A bound inference session plus the input shape it declares
///
/// Created once provisioning succeeds and never mutated afterwards.
pub struct ModelSession {
    name: String,
    role: ModelRole,
    input_height: usize,
    input_width: usize,
    input_channels: usize,
    num_classes: usize,
    session: Arc<dyn InferenceSession>,
}

impl std::fmt::Debug for ModelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSession")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("input_height", &self.input_height)
            .field("input_width", &self.input_width)
            .field("input_channels", &self.input_channels)
            .field("num_classes", &self.num_classes)
            .finish_non_exhaustive()
    }
}

impl ModelSession {
    /// Bind a session, validating its declared input and output shapes
    ///
    /// Input must be `[batch, H, W, C]` with positive H, W, C accepted by the
    /// role. Output must be `[1, N]` or `[N]` with N >= 1.
    pub fn bind(
        name: impl Into<String>,
        role: ModelRole,
        session: Arc<dyn InferenceSession>,
    ) -> Result<Self, ProvisionError> {
        let name = name.into();
        let shape_error = |which: &'static str, shape: &[i64], reason: &str| ProvisionError::Shape {
            name: name.clone(),
            which,
            shape: shape.to_vec(),
            reason: reason.to_string(),
        };

        let input = session.input_shape();
        if input.len() != 4 {
            return Err(shape_error("input", &input, "expected 4 dimensions"));
        }
        let dims: Vec<usize> = input[1..]
            .iter()
            .map(|&d| if d > 0 { d as usize } else { 0 })
            .collect();
        if dims.contains(&0) {
            return Err(shape_error(
                "input",
                &input,
                "height, width and channels must be fixed and positive",
            ));
        }
        let (input_height, input_width, input_channels) = (dims[0], dims[1], dims[2]);
        if !role.accepts_channels(input_channels) {
            return Err(shape_error(
                "input",
                &input,
                &format!("{} model cannot take {} channels", role, input_channels),
            ));
        }

        let output = session.output_shape();
        let num_classes = match output.as_slice() {
            [n] | [1, n] | [-1, n] if *n > 0 => *n as usize,
            _ => return Err(shape_error("output", &output, "expected [1, N]")),
        };

        Ok(Self {
            name,
            role,
            input_height,
            input_width,
            input_channels,
            num_classes,
            session,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> ModelRole {
        self.role
    }

    pub fn input_height(&self) -> usize {
        self.input_height
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Number of values every input tensor for this session must hold
    pub fn input_len(&self) -> usize {
        self.input_height * self.input_width * self.input_channels
    }

    pub(crate) fn session(&self) -> &dyn InferenceSession {
        self.session.as_ref()
    }
}

/// Everything needed to provision one model
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub name: String,
    pub role: ModelRole,
    pub policy: UpdatePolicy,
    pub conditions: DownloadConditions,
    pub options: SessionOptions,
}

/// Obtain the model file and bind a session to it
///
/// Failures are not retried.
pub async fn provision(
    distributor: &dyn ModelDistributor,
    runtime: Arc<dyn InferenceRuntime>,
    request: ProvisionRequest,
) -> Result<ModelSession, ProvisionError> {
    let ProvisionRequest {
        name,
        role,
        policy,
        conditions,
        options,
    } = request;

    let file = distributor
        .get_model(&name, policy, &conditions)
        .await
        .map_err(|source| ProvisionError::Distribution {
            name: name.clone(),
            source,
        })?;

    // Session construction parses the model graph, keep it off the executor
    let session = tokio::task::spawn_blocking(move || runtime.open_session(&file, &options))
        .await
        .map_err(|e| ProvisionError::Session {
            name: name.clone(),
            reason: e.to_string(),
        })?
        .map_err(|e| ProvisionError::Session {
            name: name.clone(),
            reason: format!("{:#}", e),
        })?;

    let model = ModelSession::bind(name, role, Arc::from(session)).map_err(|e| {
        error!("{}", e);
        e
    })?;

    info!(
        "✅ {} model {} ready: input {}x{}x{}, {} classes",
        model.role(),
        model.name(),
        model.input_height(),
        model.input_width(),
        model.input_channels(),
        model.num_classes()
    );

    Ok(model)
}
