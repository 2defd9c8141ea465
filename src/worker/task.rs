//! Task and result messages exchanged with a worker.

use super::ResponseBuffer;
use crate::model::DepthModel;
use crate::types::{Mode, PixelIndex};

/// Action code asking a worker to stop.
pub const ACTION_TERMINATE: i32 = 0;

/// Action code asking a worker to process the carried batch.
pub const ACTION_PROCESS: i32 = 1;

/// One batch of consecutive pixels.
///
/// `models` holds one column per pixel and fixes the batch size. For
/// inversion and expansion modes `params` holds one parameter vector per
/// pixel; for inversion `observations` holds one spectrum per pixel.
#[derive(Clone, Debug, Default)]
pub struct Task {
    pub action: i32,
    /// Raw mode selector, 1 to 4.
    pub mode: i32,
    pub first_pixel: PixelIndex,
    pub params: Vec<f64>,
    pub models: Vec<DepthModel>,
    pub observations: Vec<f64>,
    pub compute_derivatives: bool,
}

impl Task {
    pub fn new(mode: Mode, first_pixel: PixelIndex) -> Self {
        Self {
            action: ACTION_PROCESS,
            mode: mode as i32,
            first_pixel,
            ..Self::default()
        }
    }

    /// Stop the receiving worker.
    pub fn terminate() -> Self {
        Self {
            action: ACTION_TERMINATE,
            ..Self::default()
        }
    }

    pub fn with_params(mut self, params: Vec<f64>) -> Self {
        self.params = params;
        self
    }

    pub fn with_models(mut self, models: Vec<DepthModel>) -> Self {
        self.models = models;
        self
    }

    pub fn with_observations(mut self, observations: Vec<f64>) -> Self {
        self.observations = observations;
        self
    }

    pub fn with_derivatives(mut self, compute: bool) -> Self {
        self.compute_derivatives = compute;
        self
    }

    pub fn is_terminate(&self) -> bool {
        self.action == ACTION_TERMINATE
    }

    pub fn npix(&self) -> usize {
        self.models.len()
    }
}

/// Outcome of one pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PixelStatus {
    #[default]
    Ok,
    /// Synthesis did not converge; the spectrum is the engine's last iterate.
    NotConverged,
    /// Depth scales could not be resolved; nothing was synthesized.
    ScaleError,
    /// The whole task was rejected; see [`TaskResult::error`].
    Rejected,
}

/// Processed batch, returned in the order of the task's pixels.
#[derive(Clone, Debug)]
pub struct TaskResult {
    pub worker_id: usize,
    /// `None` only when the task carried an unknown mode selector.
    pub mode: Option<Mode>,
    pub first_pixel: PixelIndex,
    /// One spectrum per pixel.
    pub spectra: Vec<f64>,
    pub params: Vec<f64>,
    pub models: Vec<DepthModel>,
    pub response: Option<ResponseBuffer>,
    /// Fit quality per pixel; empty unless inverting.
    pub fit_quality: Vec<f64>,
    pub status: Vec<PixelStatus>,
    /// Why the task was rejected, if it was.
    pub error: Option<String>,
}

impl TaskResult {
    /// Result standing in for a task the worker could not process.
    ///
    /// Carries no data; every pixel is marked [`PixelStatus::Rejected`].
    pub fn rejected(
        worker_id: usize,
        mode: i32,
        first_pixel: PixelIndex,
        npix: usize,
        error: String,
    ) -> Self {
        Self {
            worker_id,
            mode: Mode::try_from(mode).ok(),
            first_pixel,
            spectra: Vec::new(),
            params: Vec::new(),
            models: Vec::new(),
            response: None,
            fit_quality: Vec::new(),
            status: vec![PixelStatus::Rejected; npix],
            error: Some(error),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.error.is_some()
    }

    pub fn npix(&self) -> usize {
        self.status.len()
    }

    /// Spectrum of batch pixel `p`.
    pub fn spectrum(&self, p: usize) -> &[f64] {
        let n = self.spectra.len() / self.npix().max(1);
        &self.spectra[p * n..(p + 1) * n]
    }

    pub fn all_converged(&self) -> bool {
        self.status.iter().all(|&s| s == PixelStatus::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminate_task() {
        let task = Task::terminate();
        assert!(task.is_terminate());
        assert_eq!(task.npix(), 0);
        assert!(!Task::new(Mode::Synthesize, PixelIndex::new(0)).is_terminate());
    }

    #[test]
    fn test_builder() {
        let task = Task::new(Mode::ExpandSynthesize, PixelIndex::new(4))
            .with_models(vec![DepthModel::new(3); 2])
            .with_params(vec![1.0; 6])
            .with_derivatives(true);
        assert_eq!(task.mode, 3);
        assert_eq!(task.npix(), 2);
        assert!(task.compute_derivatives);
    }

    #[test]
    fn test_rejected_result() {
        let result = TaskResult::rejected(2, 9, PixelIndex::new(5), 3, "bad mode".to_string());
        assert!(result.is_rejected());
        assert_eq!(result.mode, None);
        assert_eq!(result.npix(), 3);
        assert!(result.status.iter().all(|&s| s == PixelStatus::Rejected));
        assert!(result.spectrum(1).is_empty());
        assert!(!result.all_converged());
    }
}
