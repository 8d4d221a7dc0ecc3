mod builder;
mod chunked;
mod config;
mod context;
mod example;
mod scratch;

pub use builder::TrainerBuilder;
pub use chunked::UpdateStep;
pub use config::{DatasetConfig, Schedule, TrainingConfig};
pub use context::{TrainingContext, evaluate};
pub use example::TrainingExample;
pub use scratch::Scratch;
