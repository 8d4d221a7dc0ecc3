use std::sync::Arc;

use log::debug;
use ndarray::Array2;
use parking_lot::RwLock;
use tokio::{sync::Barrier, task::JoinSet};

use super::LayerUpdater;
use crate::{MlErr, Model, Result, arch::activations::ActFn};

/// The canonical model of a chunked training run.
///
/// Each layer is written only by its own `LayerUpdater` task, so folding an accumulator
/// updates every layer in parallel. Must be created within a tokio runtime.
pub struct LiveModel {
    layers: Vec<Arc<RwLock<Array2<f64>>>>,
    updaters: Vec<LayerUpdater>,
    barrier: Arc<Barrier>,
    futs: JoinSet<()>,
    internal: Arc<ActFn>,
    output: Arc<ActFn>,
}

impl LiveModel {
    /// Creates a new `LiveModel` and starts one updater per layer.
    ///
    /// # Arguments
    /// * `model` - The initial state of the model.
    ///
    /// # Returns
    /// A new `LiveModel` instance.
    pub fn new(model: Model) -> Self {
        let (weights, internal, output) = model.into_parts();
        let barrier = Arc::new(Barrier::new(weights.len() + 1));
        let mut futs = JoinSet::new();

        let layers: Vec<_> = weights
            .into_iter()
            .map(|w| Arc::new(RwLock::new(w)))
            .collect();

        let updaters = layers
            .iter()
            .map(|layer| LayerUpdater::spawn(&mut futs, Arc::clone(layer), Arc::clone(&barrier)))
            .collect();

        debug!(layers = layers.len(); "live model started");

        Self {
            layers,
            updaters,
            barrier,
            futs,
            internal,
            output,
        }
    }

    /// Adds a worker's accumulator to the live weights.
    ///
    /// Returns once every layer of the accumulator was applied.
    ///
    /// # Arguments
    /// * `accumulator` - One increment per layer, shaped like the weights.
    ///
    /// # Returns
    /// A `SizeMismatch` if the amount of layers differs, or a `ShapeMismatch` if any
    /// increment isn't shaped like its layer. Nothing is applied on error.
    pub async fn fold(&mut self, accumulator: Vec<Array2<f64>>) -> Result<()> {
        if accumulator.len() != self.layers.len() {
            return Err(MlErr::SizeMismatch {
                what: "accumulator layers",
                got: accumulator.len(),
                expected: self.layers.len(),
            });
        }

        // Updaters are idle between folds.
        for (layer, (weights, increment)) in self.layers.iter().zip(&accumulator).enumerate() {
            let expected = weights.read().dim();
            if increment.dim() != expected {
                return Err(MlErr::ShapeMismatch {
                    layer,
                    got: increment.dim(),
                    expected,
                });
            }
        }

        for (updater, increment) in self.updaters.iter().zip(accumulator) {
            updater.send(increment)?;
        }

        self.barrier.wait().await;
        Ok(())
    }

    /// Deep copies the live weights into an independent `Model`.
    pub fn snapshot(&self) -> Model {
        let weights = self.layers.iter().map(|layer| layer.read().clone()).collect();
        Model::from_parts(weights, Arc::clone(&self.internal), Arc::clone(&self.output))
    }

    /// Stops the updaters and hands back the final model.
    pub async fn into_model(self) -> Model {
        let Self {
            layers,
            updaters,
            mut futs,
            internal,
            output,
            ..
        } = self;

        drop(updaters);
        while futs.join_next().await.is_some() {}

        let weights = layers
            .into_iter()
            .map(|layer| match Arc::try_unwrap(layer) {
                Ok(layer) => layer.into_inner(),
                Err(layer) => layer.read().clone(),
            })
            .collect();

        Model::from_parts(weights, internal, output)
    }
}
