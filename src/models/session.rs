// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Inference runtime seam and the ONNX Runtime implementation
//!
//! Sessions run on CPU only. `ort::Session::run` needs exclusive access, so
//! every session sits behind a mutex and can be shared across blocking tasks.

use anyhow::{Context, Result};
use ndarray::Array4;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Value, ValueType};
use std::sync::Mutex;
use tracing::{debug, info};

use super::distribution::ModelFile;
use crate::vision::InputTensor;

/// Default intra-op thread count for each session
pub const DEFAULT_NUM_THREADS: usize = 4;

/// Options applied when a session is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub num_threads: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            num_threads: DEFAULT_NUM_THREADS,
        }
    }
}

/// A loaded model that can run repeated inference calls
pub trait InferenceSession: Send + Sync {
    /// Declared shape of input 0; dynamic dimensions are reported as -1
    fn input_shape(&self) -> Vec<i64>;

    /// Declared shape of output 0; dynamic dimensions are reported as -1
    fn output_shape(&self) -> Vec<i64>;

    /// Run one inference and return the flattened output 0
    fn run(&self, input: &InputTensor) -> Result<Vec<f32>>;
}

/// Builds sessions from model files
pub trait InferenceRuntime: Send + Sync {
    fn open_session(
        &self,
        model: &ModelFile,
        options: &SessionOptions,
    ) -> Result<Box<dyn InferenceSession>>;
}

/// ONNX Runtime backed [`InferenceRuntime`]
#[derive(Debug, Clone, Copy, Default)]
pub struct OrtRuntime;

impl InferenceRuntime for OrtRuntime {
    fn open_session(
        &self,
        model: &ModelFile,
        options: &SessionOptions,
    ) -> Result<Box<dyn InferenceSession>> {
        Ok(Box::new(OrtSession::load(model, options)?))
    }
}

/// ONNX Runtime session bound to one model file
pub struct OrtSession {
    session: Mutex<Session>,
    input_name: String,
    input_shape: Vec<i64>,
    output_shape: Vec<i64>,
}

impl std::fmt::Debug for OrtSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtSession")
            .field("input_name", &self.input_name)
            .field("input_shape", &self.input_shape)
            .field("output_shape", &self.output_shape)
            .finish_non_exhaustive()
    }
}

impl OrtSession {
    /// Load a model file into a CPU-only session
    ///
    /// # Errors
    /// Returns error if:
    /// - Model file not found
    /// - ONNX Runtime initialization fails
    /// - Model declares no input or no output
    pub fn load(model: &ModelFile, options: &SessionOptions) -> Result<Self> {
        let model_path = model.path.as_path();

        if !model_path.exists() {
            anyhow::bail!("Model file not found: {}", model_path.display());
        }

        info!(
            "Loading model {} from {} ({} threads)",
            model.name,
            model_path.display(),
            options.num_threads
        );

        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(options.num_threads)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .context(format!("Failed to load model from {}", model_path.display()))?;

        let input = session
            .inputs
            .first()
            .context("Model declares no inputs")?;
        let input_name = input.name.clone();
        let input_shape = tensor_shape(&input.input_type)
            .context(format!("Input {} is not a tensor", input_name))?;

        let output = session
            .outputs
            .first()
            .context("Model declares no outputs")?;
        let output_shape = tensor_shape(&output.output_type)
            .context(format!("Output {} is not a tensor", output.name))?;

        debug!(
            "Model {} - input: {} {:?}, output: {:?}",
            model.name, input_name, input_shape, output_shape
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            input_shape,
            output_shape,
        })
    }
}

impl InferenceSession for OrtSession {
    fn input_shape(&self) -> Vec<i64> {
        self.input_shape.clone()
    }

    fn output_shape(&self) -> Vec<i64> {
        self.output_shape.clone()
    }

    fn run(&self, input: &InputTensor) -> Result<Vec<f32>> {
        let [n, h, w, c] = input.shape();
        let array = Array4::from_shape_vec((n, h, w, c), input.data().to_vec())
            .context("Failed to shape input tensor")?;
        let input_value = Value::from_array(array).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .context("Inference failed")?;

        let output_tensor = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract output tensor")?;

        Ok(output_tensor.iter().copied().collect())
    }
}

fn tensor_shape(value_type: &ValueType) -> Option<Vec<i64>> {
    match value_type {
        ValueType::Tensor { shape, .. } => Some(shape.iter().copied().collect()),
        _ => None,
    }
}
