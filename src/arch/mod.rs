pub mod activations;
mod model;

pub use model::Model;
