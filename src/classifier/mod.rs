// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Dual-model classification orchestrator
//!
//! `Classifier::start` provisions the color and type models concurrently.
//! Once both are bound they are published through a write-once cell and the
//! state moves to `Ready`; classification requests before that point fail
//! with `NotReady` without touching either model.

pub mod errors;
pub mod state;

pub use errors::ClassifierError;
pub use state::{ClassifierEvent, ClassifierState};

use std::sync::Arc;
use tokio::sync::{mpsc, watch, OnceCell};
use tracing::{debug, error, info};

use crate::inference::{infer, reduce, ClassificationResult, COLOR_LABELS, TYPE_LABELS};
use crate::models::{InferenceRuntime, ModelDistributor, ModelRole, ModelSession};
use crate::vision::{
    load, preprocess_color, preprocess_type, provision_models, ImageRef, ModelPair, PixelGrid,
    VisionModelConfig,
};

pub type EventReceiver = mpsc::UnboundedReceiver<ClassifierEvent>;

struct Inner {
    models: OnceCell<ModelPair>,
    state: watch::Sender<ClassifierState>,
    events: mpsc::UnboundedSender<ClassifierEvent>,
}

impl Inner {
    fn emit(&self, event: ClassifierEvent) {
        // Listener may have gone away; classification still completes
        let _ = self.events.send(event);
    }

    fn transition(&self, next: ClassifierState) {
        let previous = self.state.send_replace(next.clone());
        debug!("Classifier state {:?} -> {:?}", previous, next);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.models.initialized() {
            info!("Releasing classification model sessions");
        }
    }
}

/// Handle to the classification pipeline
///
/// Cheap to clone; all clones share the same sessions and event channel.
/// Sessions are released when the last clone is dropped.
#[derive(Clone)]
pub struct Classifier {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("state", &*self.inner.state.borrow())
            .field("models", &self.inner.models.get())
            .finish()
    }
}

impl Classifier {
    /// Start provisioning both models and return the classifier handle
    ///
    /// Must be called from within a tokio runtime. `ModelReady` is sent on
    /// the returned receiver once both models are bound; a provisioning
    /// failure is reported as `Failed`.
    pub fn start(
        config: VisionModelConfig,
        distributor: Arc<dyn ModelDistributor>,
        runtime: Arc<dyn InferenceRuntime>,
    ) -> (Self, EventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ClassifierState::Unprovisioned);

        let classifier = Self {
            inner: Arc::new(Inner {
                models: OnceCell::new(),
                state,
                events,
            }),
        };

        classifier.inner.transition(ClassifierState::Provisioning);

        let inner = classifier.inner.clone();
        tokio::spawn(async move {
            match provision_models(&config, distributor, runtime).await {
                Ok(pair) => {
                    if inner.models.set(pair).is_err() {
                        error!("Model sessions were already published");
                        return;
                    }
                    // ModelReady is queued before any request can pass the Ready gate
                    inner.emit(ClassifierEvent::ModelReady);
                    inner.transition(ClassifierState::Ready);
                    info!("✅ Classifier ready");
                }
                Err(e) => {
                    let err = ClassifierError::ProvisioningFailure(e.to_string());
                    error!("{}", err);
                    inner.transition(ClassifierState::ProvisioningFailed(e.to_string()));
                    inner.emit(ClassifierEvent::Failed(err.to_string()));
                }
            }
        });

        (classifier, receiver)
    }

    pub fn state(&self) -> ClassifierState {
        self.inner.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state.borrow().is_ready()
    }

    /// Provisioned sessions, once both exist
    pub fn models(&self) -> Option<&ModelPair> {
        self.inner.models.get()
    }

    /// Wait until provisioning has finished
    pub async fn wait_until_ready(&self) -> Result<(), ClassifierError> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(ClassifierState::is_settled)
            .await
            .map_err(|_| ClassifierError::NotReady)?
            .clone();

        match state {
            ClassifierState::ProvisioningFailed(reason) => {
                Err(ClassifierError::ProvisioningFailure(reason))
            }
            _ => Ok(()),
        }
    }

    /// Classify one image, returning `[color, type]`
    ///
    /// The outcome is also sent to the event listener as `Succeeded` or
    /// `Failed`.
    pub async fn classify(
        &self,
        image: ImageRef,
    ) -> Result<Vec<ClassificationResult>, ClassifierError> {
        let result = self.run(image).await;

        match &result {
            Ok(results) => self.inner.emit(ClassifierEvent::Succeeded(results.clone())),
            Err(e) => {
                error!("Classification failed: {}", e);
                self.inner.emit(ClassifierEvent::Failed(e.to_string()));
            }
        }

        result
    }

    /// Fire-and-forget form of [`Classifier::classify`]
    ///
    /// The outcome is only delivered through the event receiver.
    pub fn submit(&self, image: ImageRef) {
        let classifier = self.clone();
        tokio::spawn(async move {
            let _ = classifier.classify(image).await;
        });
    }

    async fn run(&self, image: ImageRef) -> Result<Vec<ClassificationResult>, ClassifierError> {
        if !self.is_ready() {
            return Err(ClassifierError::NotReady);
        }

        self.inner.transition(ClassifierState::Classifying);
        let outcome = self.classify_ready(image).await;
        self.inner.transition(match outcome {
            Ok(_) => ClassifierState::Succeeded,
            Err(_) => ClassifierState::Failed,
        });
        outcome
    }

    async fn classify_ready(
        &self,
        image: ImageRef,
    ) -> Result<Vec<ClassificationResult>, ClassifierError> {
        let grid = Arc::new(
            load(&image)
                .await
                .map_err(|e| ClassifierError::DecodeFailure(e.to_string()))?,
        );

        let color = self.spawn_model(ModelRole::Color, grid.clone());
        let garment = self.spawn_model(ModelRole::Type, grid);
        let (color, garment) = futures::future::join(color, garment).await;

        let join_error = |role: ModelRole, e: tokio::task::JoinError| {
            ClassifierError::InferenceFailure(format!("{} inference task failed: {}", role, e))
        };
        let color = color.map_err(|e| join_error(ModelRole::Color, e))?;
        let garment = garment.map_err(|e| join_error(ModelRole::Type, e))?;

        match (color, garment) {
            (Some(color), Some(garment)) => {
                info!(
                    "Classified {}: color={} ({:.3}), type={} ({:.3})",
                    image, color.label, color.score, garment.label, garment.score
                );
                Ok(vec![color, garment])
            }
            (color, garment) => {
                let missing: Vec<&str> = [(color.is_none(), "color"), (garment.is_none(), "type")]
                    .into_iter()
                    .filter_map(|(absent, name)| absent.then_some(name))
                    .collect();
                Err(ClassifierError::AggregationFailure(format!(
                    "no {} prediction",
                    missing.join(" or ")
                )))
            }
        }
    }

    /// Preprocess and infer for one model on the blocking pool
    fn spawn_model(
        &self,
        role: ModelRole,
        grid: Arc<PixelGrid>,
    ) -> tokio::task::JoinHandle<Option<ClassificationResult>> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let pair = inner.models.get()?;
            let model = match role {
                ModelRole::Color => &pair.color,
                ModelRole::Type => &pair.garment,
            };
            classify_with(model, &grid)
        })
    }
}

/// Run the full preprocess, infer and reduce chain for one model
fn classify_with(model: &ModelSession, grid: &PixelGrid) -> Option<ClassificationResult> {
    let (width, height) = (model.input_width(), model.input_height());
    let (tensor, table) = match model.role() {
        ModelRole::Color => (
            preprocess_color(grid, width, height, model.input_channels()),
            &COLOR_LABELS,
        ),
        ModelRole::Type => (preprocess_type(grid, width, height), &TYPE_LABELS),
    };

    let tensor = match tensor {
        Ok(tensor) => tensor,
        Err(e) => {
            error!("Preprocessing for {} failed: {}", model.name(), e);
            return None;
        }
    };

    let scores = infer(model, &tensor)?;
    reduce(&scores, table)
}
