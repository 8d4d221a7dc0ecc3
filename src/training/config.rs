use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use super::TrainingExample;
use crate::{MlErr, Result, arch::activations::ActFn};

/// How the epochs of a training run are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    Sequential,
    Chunked {
        workers: NonZeroUsize,
        chunk_size: NonZeroUsize,
    },
}

/// The training examples of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetConfig {
    /// Rows of `x_size` inputs followed by `y_size` targets.
    Inline {
        data: Vec<f64>,
        x_size: usize,
        y_size: usize,
    },
}

impl DatasetConfig {
    /// Splits the configured data into training examples.
    ///
    /// # Returns
    /// The examples in the order they were given or a `SizeMismatch` if the data doesn't hold
    /// a whole amount of rows.
    pub fn examples(&self) -> Result<Vec<TrainingExample>> {
        match self {
            DatasetConfig::Inline {
                data,
                x_size,
                y_size,
            } => {
                let row = x_size + y_size;
                if row == 0 || data.len() % row != 0 {
                    return Err(MlErr::SizeMismatch {
                        what: "inline dataset",
                        got: data.len(),
                        expected: row * data.len().div_ceil(row.max(1)),
                    });
                }

                let examples = data
                    .chunks_exact(row)
                    .map(|values| {
                        let (x, y) = values.split_at(*x_size);
                        TrainingExample::new(x.to_vec(), y.to_vec())
                    })
                    .collect();

                Ok(examples)
            }
        }
    }
}

fn default_log_every() -> NonZeroUsize {
    NonZeroUsize::new(1000).unwrap_or(NonZeroUsize::MIN)
}

/// Everything needed to build and train a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub layers: Vec<usize>,
    pub internal: ActFn,
    pub output: ActFn,
    pub epochs: usize,
    pub learning_rate: f64,
    pub schedule: Schedule,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_log_every")]
    pub log_every: NonZeroUsize,
    pub dataset: DatasetConfig,
}
