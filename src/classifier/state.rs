// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::inference::ClassificationResult;

/// Lifecycle of a [`super::Classifier`]
///
/// `Unprovisioned -> Provisioning -> Ready -> Classifying -> Succeeded | Failed`.
/// A failed provisioning run ends in `ProvisioningFailed` and never reaches
/// `Ready`. After a request settles the classifier accepts further requests,
/// so `Succeeded` and `Failed` lead back to `Classifying`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierState {
    Unprovisioned,
    Provisioning,
    Ready,
    Classifying,
    Succeeded,
    Failed,
    ProvisioningFailed(String),
}

impl ClassifierState {
    /// Both sessions exist and requests are accepted
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            ClassifierState::Ready
                | ClassifierState::Classifying
                | ClassifierState::Succeeded
                | ClassifierState::Failed
        )
    }

    /// Provisioning has finished, successfully or not
    pub fn is_settled(&self) -> bool {
        self.is_ready() || matches!(self, ClassifierState::ProvisioningFailed(_))
    }
}

/// Notification delivered to the classifier's listener
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierEvent {
    /// Both models finished provisioning; fired once
    ModelReady,
    /// Exactly two results, `[color, type]`
    Succeeded(Vec<ClassificationResult>),
    /// Provisioning or a classification request failed
    Failed(String),
}
