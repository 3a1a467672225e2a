// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fixed label tables and argmax reduction

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::runner::ConfidenceVector;

/// Ordered class labels for one model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelTable {
    pub name: &'static str,
    pub labels: &'static [&'static str],
}

impl LabelTable {
    pub fn label(&self, index: usize) -> Option<&'static str> {
        self.labels.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

pub const COLOR_LABELS: LabelTable = LabelTable {
    name: "color",
    labels: &[
        "Black", "Blue", "Brown", "Green", "Grey", "Pink", "Red", "White", "Yellow",
    ],
};

pub const TYPE_LABELS: LabelTable = LabelTable {
    name: "type",
    labels: &["T-shirt/Top", "Trouser", "Pullover", "Dress", "Shirt"],
};

/// Final labeled prediction for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: String,
    /// Score of the winning class
    pub score: f32,
}

/// Reduce a confidence vector to its top label
///
/// Ties go to the lowest index. Returns `None` for an empty vector or when
/// the winning index has no entry in `table`.
pub fn reduce(scores: &ConfidenceVector, table: &LabelTable) -> Option<ClassificationResult> {
    let index = scores.argmax()?;

    let Some(label) = table.label(index) else {
        warn!(
            "{} model predicted class {} but only {} labels are known",
            table.name,
            index,
            table.len()
        );
        return None;
    };

    Some(ClassificationResult {
        label: label.to_string(),
        score: scores.scores()[index],
    })
}
