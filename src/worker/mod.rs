//! Per-pixel inversion, synthesis and response workers.
//!
//! A worker receives [`Task`]s, each a batch of consecutive pixels and a
//! processing [`Mode`](crate::types::Mode):
//!
//! | mode | input | output |
//! |------|-------|--------|
//! | 1 | parameters, columns, observations | fitted parameters, fit quality |
//! | 2 | columns | degraded spectra |
//! | 3 | parameters, columns | spectra, optional parameter responses |
//! | 4 | columns | spectra, depth-resolved responses |
//!
//! A task with action `0` terminates the worker. [`WorkerPool`] runs workers
//! on threads connected by `crossbeam-channel` queues.

mod config;
mod inversion_worker;
mod pool;
mod response_buffer;
mod task;

pub use config::{ConfigError, WorkerConfig};
pub use inversion_worker::{Collaborators, InversionWorker, WorkerState};
pub use pool::{TASK_QUEUE_DEPTH, WorkerPool};
pub use response_buffer::ResponseBuffer;
pub use task::{ACTION_PROCESS, ACTION_TERMINATE, PixelStatus, Task, TaskResult};

use thiserror::Error;

use crate::nodes::NodeError;
use crate::synthesis::SynthesisError;

/// Errors that stop a worker or reject a task.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("task channel disconnected")]
    Disconnected,

    #[error("batch has {got} {what}, expected {expected}")]
    BatchShape {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    #[error("no worker {0} in pool")]
    NoSuchWorker(usize),

    #[error("worker already terminated")]
    Terminated,

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Node(#[from] NodeError),
}
