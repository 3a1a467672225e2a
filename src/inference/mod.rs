// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Inference runner and confidence reduction

pub mod labels;
pub mod runner;

pub use labels::{reduce, ClassificationResult, LabelTable, COLOR_LABELS, TYPE_LABELS};
pub use runner::{infer, ConfidenceVector};
