use std::{num::NonZeroUsize, ops::Range, panic, sync::Arc};

use log::{debug, error, trace, warn};
use ndarray::Array2;
use tokio::{
    runtime::{self, Handle, RuntimeFlavor},
    sync::mpsc,
    task,
};

use super::{
    Scratch, TrainingContext, TrainingExample, context::report_nan, example::check_all,
};
use crate::{MlErr, Model, Result, pool::WorkerPool, storage::LiveModel};

type Accumulator = Vec<Array2<f64>>;

/// The unit of work of a chunked training run: a contiguous range of the training set and
/// the snapshot to compute its gradients against.
#[derive(Clone, Debug)]
pub struct UpdateStep {
    model: Arc<Model>,
    examples: Arc<[TrainingExample]>,
    range: Range<usize>,
}

impl UpdateStep {
    /// Sums the weight updates of every example in the chunk without applying them.
    ///
    /// # Arguments
    /// * `scratch` - The worker's own buffers.
    /// * `learning_rate` - The step size.
    ///
    /// # Returns
    /// One increment per layer, to be added to the live weights.
    pub fn accumulate(&self, scratch: &mut Scratch, learning_rate: f64) -> Accumulator {
        let model = &*self.model;
        let mut accumulator: Accumulator = model
            .weights()
            .iter()
            .map(|w| Array2::zeros(w.dim()))
            .collect();

        for example in &self.examples[self.range.clone()] {
            let res = scratch
                .feed_forward(model, example.input())
                .and_then(|_| scratch.back_propagate(model, example.target()));

            // The training set is checked against the model before any step is built.
            if let Err(e) = res {
                error!("skipping an example of chunk {:?}: {e}", self.range);
                continue;
            }

            scratch.apply(learning_rate, &mut accumulator);
        }

        accumulator
    }
}

impl TrainingContext {
    /// Trains with a pool of workers computing gradients against periodically refreshed
    /// snapshots of the model, while a single aggregator folds them into the live weights.
    ///
    /// A new snapshot is published after every `workers` folded chunks, which bounds its
    /// staleness. With one worker and chunks of one example the result is exactly the one of
    /// `train`.
    ///
    /// Outside of a tokio runtime a new one is built for the call. Inside a multi-thread
    /// runtime the current worker thread blocks in place. A current-thread runtime can't be
    /// blocked, use `train_chunked_async` there.
    ///
    /// # Arguments
    /// * `examples` - The training set, split in contiguous chunks.
    /// * `epochs` - The amount of passes over the training set.
    /// * `workers` - The amount of workers, also the snapshot refresh period.
    /// * `chunk_size` - The maximum amount of examples per chunk.
    /// * `learning_rate` - The step size.
    /// * `on_epoch` - Called with the epoch index and the driver's current snapshot.
    ///
    /// # Returns
    /// A `SizeMismatch` if any example doesn't fit the model, `Runtime` if the runtime
    /// couldn't start, `BlockingInRuntime` if called within a current-thread runtime, or a
    /// scheduler error if a task stopped unexpectedly.
    pub fn train_chunked(
        &mut self,
        examples: &[TrainingExample],
        epochs: usize,
        workers: NonZeroUsize,
        chunk_size: NonZeroUsize,
        learning_rate: f64,
        on_epoch: Option<&mut dyn FnMut(usize, &Model)>,
    ) -> Result<()> {
        let fut = self.train_chunked_async(
            examples,
            epochs,
            workers,
            chunk_size,
            learning_rate,
            on_epoch,
        );

        match Handle::try_current() {
            Ok(handle) => match handle.runtime_flavor() {
                RuntimeFlavor::MultiThread => task::block_in_place(|| handle.block_on(fut)),
                _ => Err(MlErr::BlockingInRuntime),
            },
            Err(_) => runtime::Builder::new_multi_thread().build()?.block_on(fut),
        }
    }

    /// Same as `train_chunked`, running on the caller's tokio runtime.
    ///
    /// # Returns
    /// A `SizeMismatch` if any example doesn't fit the model, or a scheduler error if a task
    /// stopped unexpectedly.
    pub async fn train_chunked_async(
        &mut self,
        examples: &[TrainingExample],
        epochs: usize,
        workers: NonZeroUsize,
        chunk_size: NonZeroUsize,
        learning_rate: f64,
        on_epoch: Option<&mut dyn FnMut(usize, &Model)>,
    ) -> Result<()> {
        check_all(&self.model, examples)?;

        let mut noop = |_: usize, _: &Model| {};
        let on_epoch = on_epoch.unwrap_or(&mut noop);

        let driver = Driver {
            examples: Arc::from(examples),
            epochs,
            workers,
            chunk_size,
            learning_rate,
        };

        self.model = driver.run(self.model.clone(), on_epoch).await?;
        Ok(())
    }
}

struct Driver {
    examples: Arc<[TrainingExample]>,
    epochs: usize,
    workers: NonZeroUsize,
    chunk_size: NonZeroUsize,
    learning_rate: f64,
}

impl Driver {
    async fn run(self, model: Model, on_epoch: &mut dyn FnMut(usize, &Model)) -> Result<Model> {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (snapshots_tx, mut snapshots_rx) = mpsc::unbounded_channel();

        let aggregator = tokio::spawn(aggregate(
            model.clone(),
            results_rx,
            snapshots_tx,
            self.workers,
        ));

        let learning_rate = self.learning_rate;
        let pool = WorkerPool::spawn(self.workers, |worker_id| {
            let results = results_tx.clone();
            let mut scratch = Scratch::new();

            move |step: UpdateStep| {
                let accumulator = step.accumulate(&mut scratch, learning_rate);
                if results.send(accumulator).is_err() {
                    warn!(worker_id = worker_id; "the aggregator is gone, dropping an accumulator");
                }
            }
        });
        drop(results_tx);

        let len = self.examples.len();
        let mut current = Arc::new(model);
        let mut issued = 0;
        let mut nan_reported = false;

        for epoch in 0..self.epochs {
            for start in (0..len).step_by(self.chunk_size.get()) {
                let range = start..len.min(start + self.chunk_size.get());
                trace!("dispatching chunk {range:?} of epoch {epoch}");

                let step = UpdateStep {
                    model: Arc::clone(&current),
                    examples: Arc::clone(&self.examples),
                    range,
                };
                pool.submit(step).await?;
                issued += 1;

                if issued >= self.workers.get() {
                    issued = 0;
                    let snapshot = snapshots_rx.recv().await.ok_or(MlErr::SchedulerClosed)?;
                    current = Arc::new(snapshot);
                }
            }

            debug!(epoch = epoch; "epoch dispatched");
            report_nan(&current, epoch, &mut nan_reported);
            on_epoch(epoch, current.as_ref());
        }

        pool.shutdown().await;

        // Only the last snapshot is fully merged, the rest are stale.
        let mut last = None;
        while let Some(snapshot) = snapshots_rx.recv().await {
            last = Some(snapshot);
        }

        match aggregator.await {
            Ok(res) => res?,
            Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
            Err(_) => return Err(MlErr::SchedulerClosed),
        }

        last.ok_or(MlErr::SchedulerClosed)
    }
}

/// Folds every accumulator into the live model, publishing a snapshot every `refresh_every`
/// folds and the final model once the results channel closes.
async fn aggregate(
    model: Model,
    mut results: mpsc::UnboundedReceiver<Accumulator>,
    snapshots: mpsc::UnboundedSender<Model>,
    refresh_every: NonZeroUsize,
) -> Result<()> {
    let mut live = LiveModel::new(model);
    let mut folded = 0;

    while let Some(accumulator) = results.recv().await {
        live.fold(accumulator).await?;
        folded += 1;

        if folded >= refresh_every.get() {
            folded = 0;
            trace!("publishing a snapshot");
            snapshots
                .send(live.snapshot())
                .map_err(|_| MlErr::SchedulerClosed)?;
        }
    }

    let model = live.into_model().await;
    debug!("publishing the final model");
    snapshots.send(model).map_err(|_| MlErr::SchedulerClosed)
}
