// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Run a preprocessed tensor through a provisioned session

use std::time::Instant;
use tracing::{debug, error};

use crate::models::ModelSession;
use crate::vision::InputTensor;

/// Raw per-class scores from one inference call
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceVector(Vec<f32>);

impl ConfidenceVector {
    pub fn new(scores: Vec<f32>) -> Self {
        Self(scores)
    }

    pub fn scores(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of the highest score, lowest index on ties
    ///
    /// NaN scores never win. Returns `None` for an empty or all-NaN vector.
    pub fn argmax(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &score) in self.0.iter().enumerate() {
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((i, score)),
            }
        }
        best.map(|(i, _)| i)
    }
}

impl From<Vec<f32>> for ConfidenceVector {
    fn from(scores: Vec<f32>) -> Self {
        Self(scores)
    }
}

/// Run one inference call
///
/// Returns `None` when the tensor does not match the session's declared
/// input, when the runtime fails, or when the output row is not the
/// declared class count. Details are logged, never propagated.
pub fn infer(model: &ModelSession, input: &InputTensor) -> Option<ConfidenceVector> {
    if input.len() != model.input_len() {
        error!(
            "Input tensor for {} has {} values, session expects {}",
            model.name(),
            input.len(),
            model.input_len()
        );
        return None;
    }

    let start = Instant::now();
    let scores = match model.session().run(input) {
        Ok(scores) => scores,
        Err(e) => {
            error!("Inference on {} failed: {:#}", model.name(), e);
            return None;
        }
    };

    if scores.len() != model.num_classes() {
        error!(
            "Model {} returned {} scores, expected {}",
            model.name(),
            scores.len(),
            model.num_classes()
        );
        return None;
    }

    debug!(
        "Inference on {} took {}ms",
        model.name(),
        start.elapsed().as_millis()
    );

    Some(ConfidenceVector(scores))
}
