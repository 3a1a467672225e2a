// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use thiserror::Error;

/// Failure of a provisioning run or a classification request
///
/// Every variant is terminal for the request that produced it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("Model provisioning failed: {0}")]
    ProvisioningFailure(String),

    #[error("Classifier is not ready: models are not provisioned")]
    NotReady,

    #[error("Failed to decode image: {0}")]
    DecodeFailure(String),

    #[error("Inference failed: {0}")]
    InferenceFailure(String),

    #[error("Classification incomplete: {0}")]
    AggregationFailure(String),
}
