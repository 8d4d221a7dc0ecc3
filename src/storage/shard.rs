use std::sync::Arc;

use ndarray::Array2;
use parking_lot::RwLock;
use tokio::{
    sync::{Barrier, mpsc},
    task::JoinSet,
};

use crate::{MlErr, Result};

/// The sending end of a task that owns the writes to one layer of the live model.
///
/// Every increment is added to the layer and then the task waits on the shared barrier, so
/// whoever dispatched a whole accumulator knows when it landed.
#[derive(Debug)]
pub struct LayerUpdater {
    tx: mpsc::UnboundedSender<Array2<f64>>,
}

impl LayerUpdater {
    /// Spawns the updater task of `layer`.
    ///
    /// # Arguments
    /// * `futs` - Where the task is spawned.
    /// * `layer` - The weights this task will be the only writer of.
    /// * `barrier` - Shared with every other updater and the dispatcher.
    ///
    /// # Returns
    /// The handle to send increments to the task.
    pub fn spawn(
        futs: &mut JoinSet<()>,
        layer: Arc<RwLock<Array2<f64>>>,
        barrier: Arc<Barrier>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Array2<f64>>();

        futs.spawn(async move {
            while let Some(increment) = rx.recv().await {
                *layer.write() += &increment;
                barrier.wait().await;
            }
        });

        Self { tx }
    }

    /// Hands an increment to the task.
    ///
    /// # Returns
    /// `SchedulerClosed` if the task already stopped.
    pub fn send(&self, increment: Array2<f64>) -> Result<()> {
        self.tx.send(increment).map_err(|_| MlErr::SchedulerClosed)
    }
}
