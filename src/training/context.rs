use std::ops::Deref;

use log::{Level, debug, info, log_enabled, warn};
use ndarray::ArrayView1;

use super::{
    Schedule, Scratch, TrainingConfig, TrainingExample, example::check_all, scratch::half_mse,
};
use crate::{Model, Result};

/// A model together with the scratch buffers needed to train it.
#[derive(Clone, Debug)]
pub struct TrainingContext {
    pub(super) model: Model,
    scratch: Scratch,
}

impl TrainingContext {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            scratch: Scratch::new(),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn into_model(self) -> Model {
        self.model
    }

    /// Runs a forward pass on the trained model.
    ///
    /// # Arguments
    /// * `input` - The input vector, without the bias term.
    ///
    /// # Returns
    /// A view of the output layer's activations.
    pub fn feed_forward(&mut self, input: ArrayView1<f64>) -> Result<ArrayView1<'_, f64>> {
        self.scratch.feed_forward(&self.model, input)?;
        Ok(self.scratch.output())
    }

    /// Back propagates the last forward pass and updates the model in place.
    ///
    /// # Arguments
    /// * `target` - The expected output for the last input.
    /// * `learning_rate` - The step size.
    ///
    /// # Returns
    /// The loss of the last forward pass.
    pub fn back_propagate(&mut self, target: ArrayView1<f64>, learning_rate: f64) -> Result<f64> {
        let loss = self.scratch.back_propagate(&self.model, target)?;
        self.scratch.apply(learning_rate, self.model.weights_mut());
        Ok(loss)
    }

    /// Online gradient descent, the model is updated after every single example.
    ///
    /// # Arguments
    /// * `examples` - The training set, visited in order every epoch.
    /// * `epochs` - The amount of passes over the training set.
    /// * `learning_rate` - The step size.
    /// * `on_epoch` - Called with the epoch index and the summed loss of that epoch.
    ///
    /// # Returns
    /// A `SizeMismatch` if any example doesn't fit the model, in which case nothing is trained.
    pub fn train(
        &mut self,
        examples: &[TrainingExample],
        epochs: usize,
        learning_rate: f64,
        on_epoch: Option<&mut dyn FnMut(usize, f64)>,
    ) -> Result<()> {
        check_all(&self.model, examples)?;

        let mut noop = |_: usize, _: f64| {};
        let on_epoch = on_epoch.unwrap_or(&mut noop);
        let mut nan_reported = false;

        for epoch in 0..epochs {
            let mut total = 0.;

            for example in examples {
                self.feed_forward(example.input())?;
                total += self.back_propagate(example.target(), learning_rate)?;
            }

            debug!(epoch = epoch, loss = total; "epoch finished");
            report_nan(&self.model, epoch, &mut nan_reported);
            on_epoch(epoch, total);
        }

        Ok(())
    }

    /// Trains following a configuration, logging the progress every `log_every` epochs.
    ///
    /// # Arguments
    /// * `examples` - The training set.
    /// * `config` - The hyperparameters and schedule to use.
    pub fn run(&mut self, examples: &[TrainingExample], config: &TrainingConfig) -> Result<()> {
        let every = config.log_every.get();

        info!(
            epochs = config.epochs,
            examples = examples.len(),
            learning_rate = config.learning_rate;
            "training started"
        );

        match config.schedule {
            Schedule::Sequential => {
                let mut progress = |epoch: usize, loss: f64| {
                    if (epoch + 1) % every == 0 {
                        info!("epoch {}: loss = {loss}", epoch + 1);
                    }
                };

                self.train(
                    examples,
                    config.epochs,
                    config.learning_rate,
                    Some(&mut progress),
                )?;
            }
            Schedule::Chunked {
                workers,
                chunk_size,
            } => {
                let mut progress = |epoch: usize, snapshot: &Model| {
                    if (epoch + 1) % every == 0 {
                        match evaluate(snapshot, examples) {
                            Ok(loss) => info!("epoch {}: loss = {loss}", epoch + 1),
                            Err(e) => {
                                warn!("epoch {}: couldn't evaluate the snapshot: {e}", epoch + 1)
                            }
                        }
                    }
                };

                self.train_chunked(
                    examples,
                    config.epochs,
                    workers,
                    chunk_size,
                    config.learning_rate,
                    Some(&mut progress),
                )?;
            }
        }

        let loss = evaluate(&self.model, examples)?;
        info!(loss = loss; "training finished");
        Ok(())
    }
}

impl Deref for TrainingContext {
    type Target = Model;

    fn deref(&self) -> &Self::Target {
        &self.model
    }
}

/// Sums the loss of every example through `predict`, leaving the model untouched.
///
/// # Arguments
/// * `model` - The model to evaluate.
/// * `examples` - The examples to evaluate it on.
///
/// # Returns
/// The summed loss, the same quantity `train` reports per epoch.
pub fn evaluate(model: &Model, examples: &[TrainingExample]) -> Result<f64> {
    examples
        .iter()
        .map(|example| -> Result<f64> {
            let output = model.predict(example.input())?;
            Ok(half_mse(output.view(), example.target()))
        })
        .sum()
}

/// Warns once per training call about a diverged model.
pub(super) fn report_nan(model: &Model, epoch: usize, reported: &mut bool) {
    if *reported || !log_enabled!(Level::Warn) {
        return;
    }

    if model.has_nan() {
        warn!(epoch = epoch; "the model weights diverged to NaN\n{model}");
        *reported = true;
    }
}
