use std::{num::NonZeroUsize, panic, sync::Arc};

use log::debug;
use tokio::{
    sync::{Mutex, mpsc},
    task::{self, JoinSet},
};

use crate::{MlErr, Result};

/// A fixed amount of tasks draining a shared and bounded job queue.
///
/// Every task owns a handler built once by the factory given to `spawn` and runs it on the
/// blocking pool, since the jobs are CPU bound. Must be created within a tokio runtime.
pub struct WorkerPool<J> {
    tx: mpsc::Sender<J>,
    futs: JoinSet<()>,
}

impl<J: Send + 'static> WorkerPool<J> {
    /// Creates a new `WorkerPool` and starts its workers.
    ///
    /// # Arguments
    /// * `size` - The amount of workers, also the capacity of the job queue.
    /// * `factory` - Builds the handler of each worker given its id.
    ///
    /// # Returns
    /// A new `WorkerPool` instance.
    pub fn spawn<F, H>(size: NonZeroUsize, mut factory: F) -> Self
    where
        F: FnMut(usize) -> H,
        H: FnMut(J) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(size.get());
        let rx = Arc::new(Mutex::new(rx));
        let mut futs = JoinSet::new();

        for worker_id in 0..size.get() {
            futs.spawn(work(worker_id, Arc::clone(&rx), factory(worker_id)));
        }

        Self { tx, futs }
    }

    /// Queues a job, waiting while the queue is full.
    ///
    /// # Returns
    /// `PoolClosed` if every worker is gone.
    pub async fn submit(&self, job: J) -> Result<()> {
        self.tx.send(job).await.map_err(|_| MlErr::PoolClosed)
    }

    /// Closes the queue and waits for the workers to finish the jobs already queued.
    ///
    /// A panic in any handler is resumed here.
    pub async fn shutdown(self) {
        let Self { tx, mut futs } = self;
        drop(tx);

        while let Some(res) = futs.join_next().await {
            if let Err(e) = res
                && e.is_panic()
            {
                panic::resume_unwind(e.into_panic());
            }
        }
    }
}

async fn work<J, H>(worker_id: usize, rx: Arc<Mutex<mpsc::Receiver<J>>>, mut handler: H)
where
    J: Send + 'static,
    H: FnMut(J) + Send + 'static,
{
    debug!(worker_id = worker_id; "worker started");

    loop {
        let job = rx.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        handler = match task::spawn_blocking(move || {
            handler(job);
            handler
        })
        .await
        {
            Ok(handler) => handler,
            Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
            Err(_) => break,
        };
    }

    debug!(worker_id = worker_id; "worker stopped");
}
