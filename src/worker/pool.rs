//! In-process pool of worker threads.

use std::sync::{Arc, Barrier};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use tracing::{info, warn};

use super::inversion_worker::{Collaborators, InversionWorker};
use super::task::{Task, TaskResult};
use super::{WorkerConfig, WorkerError};

/// Tasks queued per worker before `submit` blocks.
pub const TASK_QUEUE_DEPTH: usize = 4;

/// Threads each running one [`InversionWorker`].
///
/// Every worker builds its own collaborators with the factory on its own
/// thread, so they need not be `Send`. Workers rendezvous on a barrier
/// before their configuration is handed out.
pub struct WorkerPool {
    tasks: Vec<Sender<Task>>,
    results: Receiver<TaskResult>,
    handles: Vec<JoinHandle<Result<(), WorkerError>>>,
}

impl WorkerPool {
    pub fn spawn<F>(n: usize, config: WorkerConfig, factory: F) -> Result<Self, WorkerError>
    where
        F: Fn(usize, &WorkerConfig) -> Collaborators + Send + Sync + 'static,
    {
        config.validate()?;
        let factory = Arc::new(factory);
        let barrier = Arc::new(Barrier::new(n + 1));
        let (result_tx, results) = unbounded::<TaskResult>();

        let mut tasks = Vec::with_capacity(n);
        let mut configs = Vec::with_capacity(n);
        let mut handles = Vec::with_capacity(n);
        for worker_id in 0..n {
            let (task_tx, task_rx) = bounded::<Task>(TASK_QUEUE_DEPTH);
            let (config_tx, config_rx) = bounded::<WorkerConfig>(1);
            let factory = Arc::clone(&factory);
            let barrier = Arc::clone(&barrier);
            let result_tx = result_tx.clone();

            let handle = std::thread::spawn(move || {
                barrier.wait();
                let config = config_rx.recv().map_err(|_| WorkerError::Disconnected)?;
                let parts = factory(worker_id, &config);
                InversionWorker::new(worker_id, config, parts)?.run(&task_rx, &result_tx)
            });

            tasks.push(task_tx);
            configs.push(config_tx);
            handles.push(handle);
        }

        barrier.wait();
        for sender in &configs {
            sender
                .send(config.clone())
                .map_err(|_| WorkerError::Disconnected)?;
        }
        info!(workers = n, "worker pool started");

        Ok(Self {
            tasks,
            results,
            handles,
        })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Queue `task` on worker `worker`, blocking while its queue is full.
    pub fn submit(&self, worker: usize, task: Task) -> Result<(), WorkerError> {
        let sender = self
            .tasks
            .get(worker)
            .ok_or(WorkerError::NoSuchWorker(worker))?;
        sender.send(task).map_err(|_| WorkerError::Disconnected)
    }

    /// Next result from any worker.
    pub fn recv(&self) -> Result<TaskResult, WorkerError> {
        self.results.recv().map_err(|_| WorkerError::Disconnected)
    }

    pub fn results(&self) -> &Receiver<TaskResult> {
        &self.results
    }

    /// Hand `batches` out round-robin and collect their results, ordered by
    /// first pixel.
    pub fn process(&self, batches: Vec<Task>) -> Result<Vec<TaskResult>, WorkerError> {
        if self.is_empty() {
            return Err(WorkerError::NoSuchWorker(0));
        }
        let n = batches.len();
        for (i, task) in batches.into_iter().enumerate() {
            self.submit(i % self.len(), task)?;
        }
        let mut out = (0..n).map(|_| self.recv()).collect::<Result<Vec<_>, _>>()?;
        out.sort_by_key(|r| r.first_pixel);
        Ok(out)
    }

    /// Terminate every worker and wait for it.
    ///
    /// Returns the first error reported by a worker.
    pub fn shutdown(self) -> Result<(), WorkerError> {
        for (worker_id, sender) in self.tasks.iter().enumerate() {
            if sender.send(Task::terminate()).is_err() {
                warn!(worker = worker_id, "worker already gone");
            }
        }
        drop(self.tasks);

        let mut first_error = None;
        for (worker_id, handle) in self.handles.into_iter().enumerate() {
            let outcome = match handle.join() {
                Ok(outcome) => outcome,
                Err(_) => Err(WorkerError::WorkerPanicked(worker_id)),
            };
            if let Err(e) = outcome {
                warn!(worker = worker_id, error = %e, "worker failed");
                first_error.get_or_insert(e);
            }
        }
        info!("worker pool shut down");
        first_error.map_or(Ok(()), Err)
    }
}
