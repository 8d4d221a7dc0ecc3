mod shard;
mod store;

pub use shard::LayerUpdater;
pub use store::LiveModel;
