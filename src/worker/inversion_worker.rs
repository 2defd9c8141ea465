//! Per-pixel processing of task batches.

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, trace, warn};

use super::task::{PixelStatus, Task, TaskResult};
use super::{ConfigError, ResponseBuffer, WorkerConfig, WorkerError};
use crate::equations::EquationOfState;
use crate::model::DepthModel;
use crate::scales::{DepthOptimizer, TemperatureCut};
use crate::synthesis::{
    Atmosphere, BoxedFitter, BoxedInstrument, BoxedSynthesizer, ResponseChannel, SynthesisError,
};
use crate::types::{Mode, PixelIndex};

/// Collaborators owned by one worker.
pub struct Collaborators {
    pub synthesizer: BoxedSynthesizer,
    pub eos: Box<dyn EquationOfState>,
    pub instruments: Vec<(BoxedInstrument, Vec<f64>)>,
    pub fitter: Option<BoxedFitter>,
    pub optimizer: Box<dyn DepthOptimizer>,
}

impl Collaborators {
    pub fn new(synthesizer: BoxedSynthesizer, eos: Box<dyn EquationOfState>) -> Self {
        Self {
            synthesizer,
            eos,
            instruments: Vec::new(),
            fitter: None,
            optimizer: Box::new(TemperatureCut),
        }
    }

    pub fn with_instrument(mut self, instrument: BoxedInstrument, psf: Vec<f64>) -> Self {
        self.instruments.push((instrument, psf));
        self
    }

    pub fn with_fitter(mut self, fitter: BoxedFitter) -> Self {
        self.fitter = Some(fitter);
        self
    }

    pub fn with_optimizer(mut self, optimizer: Box<dyn DepthOptimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }
}

/// Where the worker is in its task loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    AwaitTask,
    Unpack,
    Dispatch(Mode),
    Pack,
    Terminated,
}

/// Processes batches of pixels with its own atmosphere and collaborators.
///
/// Pixels of a batch are handled strictly one after the other: the equation
/// of state and the instruments are reused and mutated in place.
pub struct InversionWorker {
    id: usize,
    config: WorkerConfig,
    atmos: Atmosphere,
    fitter: Option<BoxedFitter>,
    optimizer: Box<dyn DepthOptimizer>,
    weights: Vec<f64>,
    state: WorkerState,
}

impl InversionWorker {
    pub fn new(id: usize, config: WorkerConfig, parts: Collaborators) -> Result<Self, WorkerError> {
        config.validate()?;

        let nodes = config.nodes.clone();
        let mut atmos = Atmosphere::new(config.atmos_kind, parts.synthesizer, parts.eos, nodes)
            .with_ranges(config.ranges.clone())
            .with_solver(config.scales)
            .with_interpolation(config.interpolation)
            .with_depth_type(config.depth_type)
            .with_boundary(config.boundary)
            .with_centered_derivatives(config.centered_derivatives)
            .with_dpar(config.dpar);
        for (instrument, psf) in parts.instruments {
            atmos = atmos.with_instrument(instrument, psf);
        }

        let ndata = atmos.ndata();
        let weights = match config.weights.len() {
            0 => vec![1.0; ndata],
            n if n == ndata => config.weights.clone(),
            n => {
                return Err(ConfigError::WeightsLength {
                    expected: ndata,
                    got: n,
                }
                .into());
            }
        };

        debug!(
            worker = id,
            kind = %config.atmos_kind,
            ndata,
            npar = config.nodes.npar(),
            "worker configured"
        );
        Ok(Self {
            id,
            config,
            atmos,
            fitter: parts.fitter,
            optimizer: parts.optimizer,
            weights,
            state: WorkerState::AwaitTask,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn atmosphere(&self) -> &Atmosphere {
        &self.atmos
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    fn transition(&mut self, next: WorkerState) {
        trace!(worker = self.id, from = ?self.state, to = ?next, "state");
        self.state = next;
    }

    /// Receive and process tasks until terminated.
    ///
    /// A task that cannot be processed is answered with a
    /// [`TaskResult::rejected`] and the loop goes on; only a terminate task
    /// or a closed channel ends it. Consumes the worker, so its collaborators
    /// are released on return.
    pub fn run(
        mut self,
        tasks: &Receiver<Task>,
        results: &Sender<TaskResult>,
    ) -> Result<(), WorkerError> {
        info!(worker = self.id, "worker started");
        loop {
            let task = tasks.recv().map_err(|_| WorkerError::Disconnected)?;
            let (mode, first_pixel, npix) = (task.mode, task.first_pixel, task.npix());
            let result = match self.handle(task) {
                Ok(Some(result)) => result,
                Ok(None) => break,
                Err(e @ (WorkerError::Disconnected | WorkerError::Terminated)) => return Err(e),
                Err(e) => {
                    warn!(worker = self.id, %first_pixel, npix, error = %e, "task rejected");
                    TaskResult::rejected(self.id, mode, first_pixel, npix, e.to_string())
                }
            };
            results.send(result).map_err(|_| WorkerError::Disconnected)?;
        }
        info!(worker = self.id, "worker terminated");
        Ok(())
    }

    /// Process one task.
    ///
    /// Returns `None` for a terminate task; its batch is discarded and the
    /// worker accepts no further tasks.
    pub fn handle(&mut self, task: Task) -> Result<Option<TaskResult>, WorkerError> {
        if self.state == WorkerState::Terminated {
            return Err(WorkerError::Terminated);
        }
        if task.is_terminate() {
            self.transition(WorkerState::Terminated);
            return Ok(None);
        }

        self.transition(WorkerState::Unpack);
        let mode = match Mode::try_from(task.mode) {
            Ok(mode) => mode,
            Err(_) => {
                self.transition(WorkerState::AwaitTask);
                return Err(ConfigError::InvalidMode(task.mode).into());
            }
        };
        if let Err(e) = self.check_batch(mode, &task) {
            self.transition(WorkerState::AwaitTask);
            return Err(e);
        }

        self.transition(WorkerState::Dispatch(mode));
        let result = match mode {
            Mode::Invert => self.invert(task),
            Mode::Synthesize => self.synthesize(task),
            Mode::ExpandSynthesize => self.expand_synthesize(task),
            Mode::FullResponse => self.full_response(task),
        };

        self.transition(WorkerState::Pack);
        let result = result.map(|mut r| {
            r.worker_id = self.id;
            r
        });
        self.transition(WorkerState::AwaitTask);
        result.map(Some)
    }

    fn check_batch(&self, mode: Mode, task: &Task) -> Result<(), WorkerError> {
        let npix = task.npix();
        let ndep = self.config.ndep;
        if let Some(bad) = task.models.iter().find(|m| m.ndep() != ndep) {
            return Err(WorkerError::BatchShape {
                what: "depth points",
                expected: ndep,
                got: bad.ndep(),
            });
        }
        if matches!(mode, Mode::Invert | Mode::ExpandSynthesize) {
            let expected = npix * self.atmos.nodes().npar();
            if task.params.len() != expected {
                return Err(WorkerError::BatchShape {
                    what: "parameters",
                    expected,
                    got: task.params.len(),
                });
            }
        }
        if mode == Mode::Invert {
            let expected = npix * self.atmos.ndata();
            if task.observations.len() != expected {
                return Err(WorkerError::BatchShape {
                    what: "observations",
                    expected,
                    got: task.observations.len(),
                });
            }
            if self.fitter.is_none() {
                return Err(ConfigError::MissingFitter.into());
            }
        }
        Ok(())
    }

    fn pixel_yx(&self, first: PixelIndex, p: usize) -> (usize, usize) {
        first.offset(p).to_yx(self.config.nx)
    }

    fn not_converged(&self, first: PixelIndex, p: usize) -> PixelStatus {
        let (y, x) = self.pixel_yx(first, p);
        warn!(worker = self.id, y, x, "synthesis did not converge");
        PixelStatus::NotConverged
    }

    fn scale_failure(
        &self,
        first: PixelIndex,
        p: usize,
        err: &dyn std::error::Error,
    ) -> PixelStatus {
        let (y, x) = self.pixel_yx(first, p);
        error!(worker = self.id, y, x, %err, "cannot resolve depth scales");
        PixelStatus::ScaleError
    }

    fn empty_result(&self, mode: Mode, task: &Task) -> TaskResult {
        let npix = task.npix();
        TaskResult {
            worker_id: self.id,
            mode: Some(mode),
            first_pixel: task.first_pixel,
            spectra: vec![0.0; npix * self.atmos.ndata()],
            params: Vec::new(),
            models: Vec::new(),
            response: None,
            fit_quality: Vec::new(),
            status: vec![PixelStatus::Ok; npix],
            error: None,
        }
    }

    // ========================================================================
    // Modes
    // ========================================================================

    fn invert(&mut self, task: Task) -> Result<TaskResult, WorkerError> {
        let mut result = self.empty_result(Mode::Invert, &task);
        let Task {
            mut params,
            mut models,
            observations,
            ..
        } = task;
        let Some(fitter) = self.fitter.as_mut() else {
            return Err(ConfigError::MissingFitter.into());
        };
        let npar = self.atmos.nodes().npar();
        let ndata = self.atmos.ndata();
        result.spectra = observations;
        result.fit_quality = vec![0.0; models.len()];

        let pixels = models
            .iter_mut()
            .zip(params.chunks_exact_mut(npar.max(1)))
            .zip(result.spectra.chunks_exact_mut(ndata.max(1)))
            .zip(&mut result.fit_quality);
        for (((model, p), obs), chi2) in pixels {
            self.atmos.update_instruments();
            *chi2 = fitter.fit(&mut self.atmos, model, p, obs, &self.weights);
        }

        result.params = params;
        result.models = models;
        Ok(result)
    }

    /// Resolve densities and scales of a given column.
    fn resolve_column(
        &mut self,
        model: &mut DepthModel,
        auto_scale: bool,
    ) -> Result<(), SynthesisError> {
        model.ltau_to_tau();
        if !self.config.use_eos {
            return Ok(());
        }
        let solver = self.atmos.solver();
        let (depth_type, boundary) = (self.config.depth_type, self.config.boundary);
        let eos = self.atmos.eos_mut();
        if self.config.hydrostatic {
            solver.get_pressure_scale(model, &mut *eos, depth_type, boundary)?;
        } else if auto_scale {
            solver.resolve_scales(model, &mut *eos, self.config.keep_nne)?;
        } else {
            solver.fill_densities(model, &mut *eos, self.config.keep_nne)?;
            solver.get_scales(model, &*eos, depth_type.scale())?;
        }
        Ok(())
    }

    fn optimize_depth(&mut self, model: &mut DepthModel) {
        if let Some(tcut) = self.config.tcut {
            self.optimizer.optimize(model, self.atmos.eos_mut(), tcut);
        }
    }

    fn synthesize(&mut self, task: Task) -> Result<TaskResult, WorkerError> {
        let mut result = self.empty_result(Mode::Synthesize, &task);
        let first = task.first_pixel;
        let mut models = task.models;
        let ndata = self.atmos.ndata();

        for (p, model) in models.iter_mut().enumerate() {
            let spectrum = &mut result.spectra[p * ndata..(p + 1) * ndata];
            if let Err(e) = self.resolve_column(model, false) {
                result.status[p] = self.scale_failure(first, p, &e);
                continue;
            }
            self.optimize_depth(model);

            let converged = self.atmos.synth(model, spectrum, false);
            self.atmos.cleanup();
            if !converged {
                result.status[p] = self.not_converged(first, p);
            }
            self.atmos.update_instruments();
            self.atmos.spectral_degrade(spectrum);
        }

        result.models = models;
        Ok(result)
    }

    /// Expand, synthesize and optionally compute node response functions.
    ///
    /// Unlike a bare synthesis pass, the spectrum and every response slab
    /// leave here degraded by the instruments, so all four modes return
    /// spectra on the same instrumental footing.
    fn expand_synthesize(&mut self, task: Task) -> Result<TaskResult, WorkerError> {
        let mut result = self.empty_result(Mode::ExpandSynthesize, &task);
        let first = task.first_pixel;
        let derivatives = task.compute_derivatives;
        let Task {
            mut params,
            mut models,
            ..
        } = task;
        let npar = self.atmos.nodes().npar();
        let ndata = self.atmos.ndata();
        let (nw, ns) = (self.atmos.n_wavelengths(), self.atmos.n_stokes());
        let mut response = derivatives.then(|| ResponseBuffer::new([models.len(), npar, nw, ns]));

        for (p, model) in models.iter_mut().enumerate() {
            let pars = &mut params[p * npar..(p + 1) * npar];
            let spectrum = &mut result.spectra[p * ndata..(p + 1) * ndata];
            if let Err(e) = self.atmos.prepare(model, pars) {
                result.status[p] = match e {
                    SynthesisError::Scale(ref err) => self.scale_failure(first, p, err),
                    other => return Err(other.into()),
                };
                continue;
            }
            let pgas_saved = model.pgas().to_vec();
            let mut converged = self.atmos.synth(model, spectrum, false);

            if let Some(rf) = response.as_mut() {
                for index in (0..npar).rev() {
                    let out = rf.slab_mut(p, index);
                    match self
                        .atmos
                        .response_function(model, pars, index, spectrum, &pgas_saved, out)
                    {
                        Ok(ok) => converged &= ok,
                        Err(SynthesisError::Scale(err)) => {
                            result.status[p] = self.scale_failure(first, p, &err);
                            break;
                        }
                        Err(other) => return Err(other.into()),
                    }
                }
            }
            model.pgas_mut().copy_from_slice(&pgas_saved);

            if !converged && result.status[p] == PixelStatus::Ok {
                result.status[p] = self.not_converged(first, p);
            }
            self.atmos.update_instruments();
            self.atmos.spectral_degrade(spectrum);
            if let Some(rf) = response.as_mut() {
                for index in 0..npar {
                    self.atmos.spectral_degrade(rf.slab_mut(p, index));
                }
            }
        }

        result.params = params;
        result.models = models;
        result.response = response;
        Ok(result)
    }

    fn full_response(&mut self, task: Task) -> Result<TaskResult, WorkerError> {
        let mut result = self.empty_result(Mode::FullResponse, &task);
        let first = task.first_pixel;
        let mut models = task.models;
        let ndata = self.atmos.ndata();
        let ndep = self.config.ndep;
        let channels: Vec<ResponseChannel> = self.config.active_channels().collect();
        let mut response = ResponseBuffer::new([models.len(), channels.len(), ndep, ndata]);

        for (p, model) in models.iter_mut().enumerate() {
            let spectrum = &mut result.spectra[p * ndata..(p + 1) * ndata];
            if let Err(e) = self.resolve_column(model, true) {
                result.status[p] = self.scale_failure(first, p, &e);
                continue;
            }
            self.optimize_depth(model);

            self.atmos.update_instruments();
            let mut converged = self.atmos.synth(model, spectrum, true);
            if !converged {
                result.status[p] = self.not_converged(first, p);
            }

            for (c, &channel) in channels.iter().enumerate() {
                let out = response.slab_mut(p, c);
                match self.atmos.response_function_full(model, channel, spectrum, out) {
                    Ok(ok) => converged &= ok,
                    Err(SynthesisError::Scale(err)) => {
                        result.status[p] = self.scale_failure(first, p, &err);
                        break;
                    }
                    Err(other) => return Err(other.into()),
                }
                for row in out.chunks_exact_mut(ndata.max(1)) {
                    self.atmos.spectral_degrade(row);
                }
            }
            if !converged && result.status[p] == PixelStatus::Ok {
                result.status[p] = self.not_converged(first, p);
            }

            self.atmos.cleanup();
            self.atmos.spectral_degrade(spectrum);
        }

        result.models = models;
        result.response = Some(response);
        Ok(result)
    }
}
