// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod classifier;
pub mod cli;
pub mod config;
pub mod inference;
pub mod models;
pub mod vision;

pub use classifier::{Classifier, ClassifierError, ClassifierEvent, ClassifierState};
pub use config::ClassifierConfig;
pub use inference::{ClassificationResult, ConfidenceVector};
pub use models::{ModelDistributor, ModelSession, OrtRuntime};
pub use vision::{ImageRef, InputTensor, PixelGrid};
