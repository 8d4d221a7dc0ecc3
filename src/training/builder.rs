use log::debug;
use rand::{SeedableRng, rngs::StdRng};

use super::{TrainingConfig, TrainingContext};
use crate::{Model, Result};

/// Builds `TrainingContext`s given a configuration.
#[derive(Default)]
pub struct TrainerBuilder;

impl TrainerBuilder {
    /// Creates a new `TrainerBuilder`.
    pub fn new() -> Self {
        Self
    }

    /// Builds a freshly initialized model ready to be trained.
    ///
    /// # Arguments
    /// * `config` - The configuration of the run.
    ///
    /// # Returns
    /// A new `TrainingContext` or `TooFewLayers` if the layer list is too short.
    pub fn build(&self, config: &TrainingConfig) -> Result<TrainingContext> {
        let mut rng = self.generate_rng(config.seed);
        let model = Model::new(
            &mut rng,
            config.internal.clone(),
            config.output.clone(),
            &config.layers,
        )?;

        debug!(
            "model initialized with layers {:?}, {} hidden and {} output activations",
            config.layers, config.internal, config.output
        );

        Ok(TrainingContext::new(model))
    }

    fn generate_rng(&self, seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}
