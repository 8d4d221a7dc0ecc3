pub mod arch;
pub mod error;
pub mod pool;
pub mod storage;
pub mod training;

pub use arch::Model;
pub use error::{MlErr, Result};
