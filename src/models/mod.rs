// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Model provisioning: distribution, runtime sessions and shape binding

pub mod distribution;
pub mod provisioning;
pub mod session;

pub use distribution::{
    ConnectionKind, DistributionError, DownloadConditions, HttpDistributorConfig,
    HttpModelDistributor, LocalModelStore, ModelDistributor, ModelFile, UpdatePolicy,
};
pub use provisioning::{provision, ModelRole, ModelSession, ProvisionError, ProvisionRequest};
pub use session::{
    InferenceRuntime, InferenceSession, OrtRuntime, OrtSession, SessionOptions,
    DEFAULT_NUM_THREADS,
};
