use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used in the entire crate.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The crate's error type.
#[derive(Debug)]
pub enum MlErr {
    TooFewLayers {
        got: usize,
    },
    EmptyModel,
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    BrokenChain {
        layer: usize,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        layer: usize,
        got: (usize, usize),
        expected: (usize, usize),
    },
    UnknownActivation(String),
    Runtime(io::Error),
    BlockingInRuntime,
    SchedulerClosed,
    PoolClosed,
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::TooFewLayers { got } => write!(
                f,
                "There should be at least 2 layers (input and output), got {got}"
            ),
            MlErr::EmptyModel => write!(f, "A model needs at least one weight matrix"),
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in the {what}, got {got} and expected {expected}"
            ),
            MlErr::BrokenChain {
                layer,
                got,
                expected,
            } => write!(
                f,
                "Layer {layer} doesn't chain with the previous one, it has {got} columns and expected {expected}"
            ),
            MlErr::ShapeMismatch {
                layer,
                got,
                expected,
            } => write!(
                f,
                "The increment of layer {layer} has shape {got:?} and expected {expected:?}"
            ),
            MlErr::UnknownActivation(name) => write!(f, "Unknown activation function: {name:?}"),
            MlErr::Runtime(e) => write!(f, "Failed to build the training runtime: {e}"),
            MlErr::BlockingInRuntime => write!(
                f,
                "Can't block a current-thread runtime, use the async training entry point"
            ),
            MlErr::SchedulerClosed => {
                write!(f, "The aggregator stopped publishing model snapshots")
            }
            MlErr::PoolClosed => write!(f, "Every worker of the pool has stopped"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Runtime(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Runtime(value)
    }
}
