//! Worker protocol: termination, the four modes and the thread pool.
//!
//! The radiative-transfer engine is replaced by a deterministic mock whose
//! spectrum is a direct read-out of the column, so every response function
//! has a known value.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use atmos_rs::equations::{EquationOfState, IdealGasEos};
use atmos_rs::nodes::{NodeSet, Quantity};
use atmos_rs::scales::ScaleSolver;
use atmos_rs::synthesis::{
    Atmosphere, KernelInstrument, ModelFitter, ResponseChannel, SpectralSynthesizer,
};
use atmos_rs::worker::{
    Collaborators, ConfigError, InversionWorker, PixelStatus, Task, WorkerConfig, WorkerError,
    WorkerPool, WorkerState,
};
use atmos_rs::{DepthModel, DepthScale, DepthType, Mode, PixelIndex};

const NDEP: usize = 8;
const NW: usize = 4;
const NS: usize = 2;

/// Stokes I at wavelength `w` is the temperature at depth `w`, Stokes V the
/// scaled velocity there.
#[derive(Clone, Default)]
struct MockSynth {
    calls: Arc<AtomicUsize>,
    pgas_seen: Arc<Mutex<Vec<Vec<f64>>>>,
    max_temp: Option<f64>,
}

impl SpectralSynthesizer for MockSynth {
    fn n_wavelengths(&self) -> usize {
        NW
    }

    fn n_stokes(&self) -> usize {
        NS
    }

    fn synth(
        &mut self,
        model: &DepthModel,
        _eos: &mut dyn EquationOfState,
        out: &mut [f64],
        _save_populations: bool,
    ) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pgas_seen.lock().unwrap().push(model.pgas().to_vec());
        for w in 0..NW {
            out[w * NS] = model.temp()[w];
            out[w * NS + 1] = 1.0e-5 * model.vlos()[w];
        }
        self.max_temp.is_none_or(|max| model.temp()[0] <= max)
    }
}

struct MockFitter;

impl ModelFitter for MockFitter {
    fn fit(
        &mut self,
        atmos: &mut Atmosphere,
        model: &mut DepthModel,
        params: &mut [f64],
        obs: &mut [f64],
        weights: &[f64],
    ) -> f64 {
        for p in params.iter_mut() {
            *p *= 1.01;
        }
        if atmos.prepare(model, params).is_err() {
            return f64::INFINITY;
        }
        atmos.synth(model, obs, false);
        weights.iter().sum::<f64>() / 4.0
    }
}

fn nodes() -> NodeSet {
    NodeSet::new()
        .with_nodes(Quantity::Temp, vec![-3.0, 0.0])
        .unwrap()
        .with_nodes(Quantity::Vlos, vec![-1.0])
        .unwrap()
        .with_nodes(Quantity::B, vec![-1.0])
        .unwrap()
}

fn config() -> WorkerConfig {
    WorkerConfig::new(2, 3, NDEP).with_nodes(nodes())
}

fn column(t_offset: f64) -> DepthModel {
    let mut model = DepthModel::new(NDEP);
    let cols = model.columns_mut();
    for k in 0..NDEP {
        let x = k as f64 / (NDEP - 1) as f64;
        cols.ltau[k] = -5.0 + 6.0 * x;
        cols.temp[k] = 4500.0 + t_offset + 2500.0 * x * x;
        cols.vlos[k] = 1.0e5 * x;
        cols.pgas[k] = 10f64.powf(1.0 + 4.0 * x);
    }
    model
}

fn worker_with(config: WorkerConfig, synth: MockSynth) -> InversionWorker {
    let parts = Collaborators::new(Box::new(synth), Box::new(IdealGasEos::new()))
        .with_fitter(Box::new(MockFitter));
    InversionWorker::new(0, config, parts).unwrap()
}

// ============================================================================
// Termination
// ============================================================================

#[test]
fn test_terminate_discards_batch() {
    let synth = MockSynth::default();
    let calls = Arc::clone(&synth.calls);
    let mut worker = worker_with(config(), synth);

    let mut task = Task::terminate().with_models(vec![column(0.0); 2]);
    task.mode = Mode::Synthesize as i32;
    assert!(worker.handle(task).unwrap().is_none());
    assert_eq!(worker.state(), WorkerState::Terminated);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let next = Task::new(Mode::Synthesize, PixelIndex::new(0)).with_models(vec![column(0.0)]);
    assert!(matches!(worker.handle(next), Err(WorkerError::Terminated)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_run_stops_at_terminate() {
    let synth = MockSynth::default();
    let calls = Arc::clone(&synth.calls);
    let worker = worker_with(config(), synth);

    let (task_tx, task_rx) = crossbeam_channel::unbounded();
    let (result_tx, result_rx) = crossbeam_channel::unbounded();
    task_tx
        .send(Task::new(Mode::Synthesize, PixelIndex::new(0)).with_models(vec![column(0.0)]))
        .unwrap();
    task_tx.send(Task::terminate()).unwrap();
    task_tx
        .send(Task::new(Mode::Synthesize, PixelIndex::new(1)).with_models(vec![column(0.0)]))
        .unwrap();

    worker.run(&task_rx, &result_tx).unwrap();
    assert_eq!(result_rx.try_iter().count(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(task_rx.len(), 1);
}

#[test]
fn test_run_answers_rejected_task_and_continues() {
    let synth = MockSynth::default();
    let calls = Arc::clone(&synth.calls);
    let worker = worker_with(config(), synth);

    let (task_tx, task_rx) = crossbeam_channel::unbounded();
    let (result_tx, result_rx) = crossbeam_channel::unbounded();
    let mut bad = Task::new(Mode::Synthesize, PixelIndex::new(0)).with_models(vec![column(0.0)]);
    bad.mode = 7;
    task_tx.send(bad).unwrap();
    task_tx
        .send(Task::new(Mode::Synthesize, PixelIndex::new(1)).with_models(vec![column(0.0)]))
        .unwrap();
    task_tx.send(Task::terminate()).unwrap();

    worker.run(&task_rx, &result_tx).unwrap();
    let results: Vec<_> = result_rx.try_iter().collect();
    assert_eq!(results.len(), 2);

    assert!(results[0].is_rejected());
    assert_eq!(results[0].mode, None);
    assert_eq!(results[0].first_pixel, PixelIndex::new(0));
    assert_eq!(results[0].status, vec![PixelStatus::Rejected]);
    assert!(results[0].error.as_deref().unwrap().contains("invalid processing mode 7"));

    assert!(!results[1].is_rejected());
    assert_eq!(results[1].mode, Some(Mode::Synthesize));
    assert_eq!(results[1].status, vec![PixelStatus::Ok]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_invalid_mode_is_rejected() {
    let mut worker = worker_with(config(), MockSynth::default());
    let mut task = Task::new(Mode::Synthesize, PixelIndex::new(0));
    task.mode = 7;
    assert!(matches!(
        worker.handle(task),
        Err(WorkerError::Config(ConfigError::InvalidMode(7)))
    ));
    assert_eq!(worker.state(), WorkerState::AwaitTask);
}

#[test]
fn test_batch_shape_is_checked() {
    let mut worker = worker_with(config(), MockSynth::default());
    let task = Task::new(Mode::ExpandSynthesize, PixelIndex::new(0))
        .with_models(vec![column(0.0); 2])
        .with_params(vec![5000.0; 5]);
    assert!(matches!(
        worker.handle(task),
        Err(WorkerError::BatchShape {
            what: "parameters",
            expected: 8,
            got: 5
        })
    ));

    let task =
        Task::new(Mode::Synthesize, PixelIndex::new(0)).with_models(vec![DepthModel::new(3)]);
    assert!(matches!(
        worker.handle(task),
        Err(WorkerError::BatchShape { what: "depth points", .. })
    ));
}

// ============================================================================
// Modes
// ============================================================================

#[test]
fn test_invert_records_fit_quality() {
    let mut worker = worker_with(config(), MockSynth::default());
    let params = vec![5000.0, 6000.0, 1.0e5, 100.0, 5100.0, 6100.0, -1.0e5, 200.0];
    let task = Task::new(Mode::Invert, PixelIndex::new(2))
        .with_models(vec![column(0.0); 2])
        .with_params(params.clone())
        .with_observations(vec![0.0; 2 * NW * NS]);
    let result = worker.handle(task).unwrap().unwrap();

    assert_eq!(result.fit_quality, vec![2.0, 2.0]);
    for (fitted, given) in result.params.iter().zip(&params) {
        assert!((fitted - 1.01 * given).abs() < 1e-9);
    }
    assert!((result.spectrum(1)[0] - result.models[1].temp()[0]).abs() < 1e-9);
}

#[test]
fn test_invert_without_fitter_fails() {
    let parts = Collaborators::new(Box::new(MockSynth::default()), Box::new(IdealGasEos::new()));
    let mut worker = InversionWorker::new(0, config(), parts).unwrap();
    let task = Task::new(Mode::Invert, PixelIndex::new(0))
        .with_models(vec![column(0.0)])
        .with_params(vec![5000.0; 4])
        .with_observations(vec![0.0; NW * NS]);
    assert!(matches!(
        worker.handle(task),
        Err(WorkerError::Config(ConfigError::MissingFitter))
    ));
}

#[test]
fn test_synthesize_logs_non_convergence_and_continues() {
    let synth = MockSynth {
        max_temp: Some(5000.0),
        ..MockSynth::default()
    };
    let mut worker = worker_with(config(), synth);
    let task = Task::new(Mode::Synthesize, PixelIndex::new(3))
        .with_models(vec![column(0.0), column(1000.0), column(0.0)]);
    let result = worker.handle(task).unwrap().unwrap();

    assert_eq!(result.worker_id, 0);
    assert_eq!(
        result.status,
        vec![PixelStatus::Ok, PixelStatus::NotConverged, PixelStatus::Ok]
    );
    assert_eq!(result.spectrum(1)[0], 5500.0);
    assert!(!result.all_converged());
    // Hydrostatic equilibrium replaced the given pressures.
    assert!(result.models[0].pgas()[0] < 1.0);
}

#[test]
fn test_synthesize_reports_scale_errors() {
    let synth = MockSynth::default();
    let calls = Arc::clone(&synth.calls);
    let mut worker = worker_with(config().with_hydrostatic(false), synth);

    let mut no_density = column(0.0);
    no_density.pgas_mut().fill(0.0);
    let task = Task::new(Mode::Synthesize, PixelIndex::new(0))
        .with_models(vec![no_density, column(0.0)]);
    let result = worker.handle(task).unwrap().unwrap();

    assert_eq!(result.status, vec![PixelStatus::ScaleError, PixelStatus::Ok]);
    assert!(result.spectrum(0).iter().all(|&v| v == 0.0));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_synthesize_uses_configured_depth_type() {
    let solver = ScaleSolver::new();
    let mut reference = column(0.0);
    let mut eos = IdealGasEos::new();
    solver.fill_densities(&mut reference, &mut eos, false).unwrap();
    solver.get_scales(&mut reference, &eos, DepthScale::OpticalDepth).unwrap();

    for depth_type in [DepthType::Ltau500, DepthType::Cmass, DepthType::Z] {
        // Leave only the scale named by the depth type.
        let mut given = reference.clone();
        given.tau_mut().fill(0.0);
        if depth_type != DepthType::Ltau500 {
            given.ltau_mut().fill(0.0);
        }
        if depth_type != DepthType::Cmass {
            given.cmass_mut().fill(0.0);
        }
        if depth_type != DepthType::Z {
            given.z_mut().fill(0.0);
        }

        let mut expected = given.clone();
        expected.ltau_to_tau();
        let mut eos = IdealGasEos::new();
        solver.fill_densities(&mut expected, &mut eos, false).unwrap();
        solver.get_scales(&mut expected, &eos, depth_type.scale()).unwrap();

        let config = config().with_hydrostatic(false).with_depth_type(depth_type);
        let mut worker = worker_with(config, MockSynth::default());
        let task = Task::new(Mode::Synthesize, PixelIndex::new(0)).with_models(vec![given]);
        let result = worker.handle(task).unwrap().unwrap();

        assert_eq!(result.status, vec![PixelStatus::Ok], "{depth_type:?}");
        let ltau = result.models[0].ltau();
        assert!(ltau.iter().all(|v| v.is_finite()), "{depth_type:?}");
        assert!(ltau.windows(2).all(|w| w[1] > w[0]), "{depth_type:?}");
        for (k, (got, want)) in ltau.iter().zip(expected.ltau()).enumerate() {
            assert!((got - want).abs() <= 1e-12 * want.abs().max(1.0), "{depth_type:?} k={k}");
        }
    }
}

#[test]
fn test_expand_response_keeps_pressure_baseline() {
    let synth = MockSynth::default();
    let seen = Arc::clone(&synth.pgas_seen);
    let mut worker = worker_with(config(), synth);

    let params = vec![4800.0, 6500.0, 2.0e5, 300.0];
    let task = Task::new(Mode::ExpandSynthesize, PixelIndex::new(0))
        .with_models(vec![column(0.0)])
        .with_params(params.clone())
        .with_derivatives(true);
    let result = worker.handle(task).unwrap().unwrap();
    assert!(result.all_converged());
    assert_eq!(result.params, params);

    let seen = seen.lock().unwrap();
    // Baseline, then parameters 3, 2, 1, 0.
    assert_eq!(seen.len(), 5);
    let baseline = &seen[0];
    assert_eq!(&seen[1], baseline);
    assert_eq!(&seen[2], baseline);
    assert_eq!(result.models[0].pgas(), &baseline[..]);

    let rf = result.response.as_ref().unwrap();
    assert_eq!(rf.dims(), [1, 4, NW, NS]);
    // Velocity is one node: every Stokes V sample moves by 1e-5 per cm/s.
    for w in 0..NW {
        assert!((rf.get(0, 2, w, 1) - 1.0e-5).abs() < 1e-9);
        assert!(rf.get(0, 2, w, 0).abs() < 1e-9);
        assert!(rf.get(0, 3, w, 0).abs() < 1e-9);
    }
}

#[test]
fn test_expand_response_restores_pressure_after_boundary_node() {
    let synth = MockSynth::default();
    let seen = Arc::clone(&synth.pgas_seen);
    let config = config().with_nodes(nodes().with_boundary_multiplier());
    let mut worker = worker_with(config, synth);

    let params = vec![4800.0, 6500.0, 2.0e5, 300.0, 1.0];
    let task = Task::new(Mode::ExpandSynthesize, PixelIndex::new(0))
        .with_models(vec![column(0.0)])
        .with_params(params.clone())
        .with_derivatives(true);
    let result = worker.handle(task).unwrap().unwrap();
    assert!(result.all_converged());
    assert_eq!(result.params, params);

    let seen = seen.lock().unwrap();
    // Baseline, then the multiplier (4) and parameters 3, 2, 1, 0.
    assert_eq!(seen.len(), 6);
    let baseline = &seen[0];
    // Magnetic field and velocity follow the re-solved multiplier step.
    assert_eq!(&seen[2], baseline);
    assert_eq!(&seen[3], baseline);
    assert_eq!(result.models[0].pgas(), &baseline[..]);

    let rf = result.response.as_ref().unwrap();
    assert_eq!(rf.dims(), [1, 5, NW, NS]);
    for w in 0..NW {
        assert!((rf.get(0, 2, w, 1) - 1.0e-5).abs() < 1e-9);
    }
}

#[test]
fn test_expand_response_is_degraded_by_instruments() {
    let params = vec![4800.0, 6500.0, 2.0e5, 300.0];
    let run = |parts: Collaborators| {
        let mut worker = InversionWorker::new(0, config(), parts).unwrap();
        let task = Task::new(Mode::ExpandSynthesize, PixelIndex::new(0))
            .with_models(vec![column(0.0)])
            .with_params(params.clone())
            .with_derivatives(true);
        worker.handle(task).unwrap().unwrap()
    };
    let bare = run(Collaborators::new(
        Box::new(MockSynth::default()),
        Box::new(IdealGasEos::new()),
    ));
    let smoothed = run(
        Collaborators::new(Box::new(MockSynth::default()), Box::new(IdealGasEos::new()))
            .with_instrument(Box::new(KernelInstrument::new(0..NW, &[1.0])), vec![1.0, 2.0, 1.0]),
    );

    let blur = |v: &dyn Fn(usize) -> f64| 0.25 * v(0) + 0.5 * v(1) + 0.25 * v(2);
    let (raw, out) = (bare.spectrum(0), smoothed.spectrum(0));
    assert!((out[NS] - blur(&|w| raw[w * NS])).abs() < 1e-9);

    let (raw, out) = (bare.response.as_ref().unwrap(), smoothed.response.as_ref().unwrap());
    for par in 0..4 {
        let expected = blur(&|w| raw.get(0, par, w, 0));
        assert!((out.get(0, par, 1, 0) - expected).abs() < 1e-9, "parameter {par}");
    }
    // A flat response is unchanged by a normalized kernel.
    for w in 0..NW {
        assert!((out.get(0, 2, w, 1) - 1.0e-5).abs() < 1e-9);
    }
}

#[test]
fn test_expand_without_derivatives_has_no_response() {
    let mut worker = worker_with(config(), MockSynth::default());
    let task = Task::new(Mode::ExpandSynthesize, PixelIndex::new(0))
        .with_models(vec![column(0.0)])
        .with_params(vec![4800.0, 6500.0, 2.0e5, 300.0]);
    let result = worker.handle(task).unwrap().unwrap();
    assert!(result.response.is_none());
    assert!((result.spectrum(0)[0] - 4800.0).abs() < 1e-9);
}

#[test]
fn test_full_response_buffer() {
    let config = config()
        .with_response_channel(ResponseChannel::Temp)
        .with_response_channel(ResponseChannel::Vlos);
    let mut worker = worker_with(config, MockSynth::default());
    let task = Task::new(Mode::FullResponse, PixelIndex::new(0)).with_models(vec![column(0.0); 2]);
    let result = worker.handle(task).unwrap().unwrap();

    let rf = result.response.as_ref().unwrap();
    assert_eq!(rf.dims(), [2, 2, NDEP, NW * NS]);
    for k in 0..NDEP {
        for w in 0..NW {
            let expected = if w == k { 1.0 } else { 0.0 };
            assert!((rf.get(1, 0, k, w * NS) - expected).abs() < 1e-6, "k={k} w={w}");
            assert!(rf.get(1, 0, k, w * NS + 1).abs() < 1e-9);
        }
    }
    assert_eq!(result.models[0], result.models[1]);
}

#[test]
fn test_full_response_marks_failing_pixel() {
    let config = config()
        .with_hydrostatic(false)
        .with_response_channel(ResponseChannel::Temp);
    let mut worker = worker_with(config, MockSynth::default());

    // No gas at the deepest point: perturbing its temperature leaves no density.
    let mut empty_bottom = column(0.0);
    empty_bottom.pgas_mut()[NDEP - 1] = 0.0;
    let task = Task::new(Mode::FullResponse, PixelIndex::new(0))
        .with_models(vec![column(0.0), empty_bottom, column(0.0)]);
    let result = worker.handle(task).unwrap().unwrap();

    assert_eq!(
        result.status,
        vec![PixelStatus::Ok, PixelStatus::ScaleError, PixelStatus::Ok]
    );
    assert_eq!(result.models[1].pgas()[NDEP - 1], 0.0);
    let rf = result.response.as_ref().unwrap();
    assert_eq!(rf.dims(), [3, 1, NDEP, NW * NS]);
    for k in 0..NW {
        for w in 0..NW {
            let expected = if w == k { 1.0 } else { 0.0 };
            assert!((rf.get(2, 0, k, w * NS) - expected).abs() < 1e-6, "k={k} w={w}");
        }
    }
    assert_eq!(result.models[0], result.models[2]);
}

// ============================================================================
// Pool
// ============================================================================

#[test]
fn test_pool_round_trip() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let pool = WorkerPool::spawn(3, config(), move |_, _| {
        let synth = MockSynth {
            calls: Arc::clone(&counter),
            ..MockSynth::default()
        };
        Collaborators::new(Box::new(synth), Box::new(IdealGasEos::new()))
    })
    .unwrap();
    assert_eq!(pool.len(), 3);

    let batches: Vec<Task> = (0..6)
        .rev()
        .map(|i| {
            Task::new(Mode::Synthesize, PixelIndex::new(i))
                .with_models(vec![column(10.0 * i as f64)])
        })
        .collect();
    let results = pool.process(batches).unwrap();

    assert_eq!(results.len(), 6);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.first_pixel, PixelIndex::new(i));
        assert_eq!(result.spectrum(0)[0], 4500.0 + 10.0 * i as f64);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    pool.shutdown().unwrap();
}

#[test]
fn test_pool_survives_malformed_batch() {
    let pool = WorkerPool::spawn(2, config(), |_, _| {
        Collaborators::new(Box::new(MockSynth::default()), Box::new(IdealGasEos::new()))
    })
    .unwrap();
    let batch = |i: usize, model: DepthModel| {
        Task::new(Mode::Synthesize, PixelIndex::new(i)).with_models(vec![model])
    };

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    std::thread::spawn(move || {
        let first = pool.process(vec![batch(0, column(0.0)), batch(1, DepthModel::new(NDEP + 1))]);
        let second = pool.process(vec![batch(2, column(0.0)), batch(3, column(0.0))]);
        let _ = done_tx.send((first, second, pool.shutdown()));
    });
    let (first, second, shutdown) = done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("pool stopped answering");

    let first = first.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].status, vec![PixelStatus::Ok]);
    assert!(first[1].is_rejected());
    assert_eq!(first[1].status, vec![PixelStatus::Rejected]);
    assert!(first[1].error.as_deref().unwrap().contains("depth points"));

    let second = second.unwrap();
    assert_eq!(second.len(), 2);
    assert!(second.iter().all(|r| !r.is_rejected() && r.all_converged()));
    assert!(shutdown.is_ok());
}

#[test]
fn test_pool_reports_worker_errors() {
    let config = config().with_weights(vec![1.0; 3]);
    let pool = WorkerPool::spawn(2, config, |_, _| {
        Collaborators::new(Box::new(MockSynth::default()), Box::new(IdealGasEos::new()))
    })
    .unwrap();
    assert!(matches!(
        pool.shutdown(),
        Err(WorkerError::Config(ConfigError::WeightsLength { expected: 8, got: 3 }))
    ));
}

#[test]
fn test_pool_rejects_invalid_config() {
    let result = WorkerPool::spawn(1, WorkerConfig::new(0, 0, NDEP), |_, _| {
        Collaborators::new(Box::new(MockSynth::default()), Box::new(IdealGasEos::new()))
    });
    assert!(matches!(
        result,
        Err(WorkerError::Config(ConfigError::EmptyGrid { .. }))
    ));
}
