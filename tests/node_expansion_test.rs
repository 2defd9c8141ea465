//! Node expansion and compression properties.
//!
//! Checks the behaviour of the node parameterization on whole columns:
//! constant profiles from a single node, means from a single target,
//! exact round trips for profiles linear in log optical depth, and clamping
//! outside the node range.

use approx::assert_relative_eq;
use atmos_rs::nodes::{NodeSet, Quantity, compress, equidistant_nodes, expand_into};
use atmos_rs::{DepthModel, Interpolation};

const MODES: [Interpolation; 3] = [
    Interpolation::Linear,
    Interpolation::Bezier,
    Interpolation::Hermite,
];

fn column(ltau: &[f64]) -> DepthModel {
    let mut model = DepthModel::new(ltau.len());
    model.ltau_mut().copy_from_slice(ltau);
    model
}

#[test]
fn test_three_node_linear_example() {
    let nodes = NodeSet::new()
        .with_nodes(Quantity::Temp, vec![-2.0, 0.0, 2.0])
        .unwrap();
    let mut model = column(&[-3.0, -1.0, 0.0, 1.0, 3.0]);
    model
        .expand(&nodes, &[4000.0, 5500.0, 7000.0], Interpolation::Linear)
        .unwrap();

    let temp = model.temp();
    assert_eq!(temp[0], 4000.0);
    assert_relative_eq!(temp[1], 4750.0, epsilon = 1e-12);
    assert_eq!(temp[2], 5500.0);
    assert_relative_eq!(temp[3], 6250.0, epsilon = 1e-12);
    assert_eq!(temp[4], 7000.0);
}

#[test]
fn test_single_node_gives_constant_profile() {
    let ltau: Vec<f64> = (0..40).map(|k| -7.0 + 0.2 * k as f64).collect();
    for mode in MODES {
        let nodes = NodeSet::new()
            .with_nodes(Quantity::Vlos, vec![-1.3])
            .unwrap();
        let mut model = column(&ltau);
        model.expand(&nodes, &[-2.5e5], mode).unwrap();
        assert!(model.vlos().iter().all(|&v| v == -2.5e5), "{mode:?}");
    }
}

#[test]
fn test_single_target_compresses_to_mean() {
    let x = [-4.0, -3.0, -2.0, -1.0, 0.0, 1.0];
    let y = [7.0, -1.0, 3.0, 10.0, -4.0, 3.0];
    let mean = y.iter().sum::<f64>() / y.len() as f64;
    for target in [-10.0, -2.5, 0.0, 5.0] {
        assert_eq!(compress(&x, &y, &[target]), vec![mean]);
    }
}

#[test]
fn test_linear_profile_round_trip() {
    let ltau: Vec<f64> = (0..61).map(|k| -6.0 + 0.1 * k as f64).collect();
    let profile: Vec<f64> = ltau.iter().map(|&t| 6000.0 + 800.0 * t).collect();
    let node_x = equidistant_nodes(-5.0, 0.5, 5);

    let values = compress(&ltau, &profile, &node_x);
    for (&v, &x) in values.iter().zip(&node_x) {
        assert_relative_eq!(v, 6000.0 + 800.0 * x, epsilon = 1e-9);
    }

    for mode in MODES {
        let mut out = vec![0.0; ltau.len()];
        expand_into(&node_x, &values, &ltau, &mut out, mode);
        for ((&o, &p), &t) in out.iter().zip(&profile).zip(&ltau) {
            if (-5.0..=0.5).contains(&t) {
                assert!((o - p).abs() < 1e-8, "{mode:?} at {t}");
            }
        }
    }
}

#[test]
fn test_expansion_clamps_outside_node_range() {
    let x = [-3.0, -1.0, 0.5, 1.0];
    let y = [4500.0, 5200.0, 6100.0, 9000.0];
    let xx = [-8.0, -3.0, 1.0, 2.5];
    for mode in MODES {
        let mut yy = [0.0; 4];
        expand_into(&x, &y, &xx, &mut yy, mode);
        assert_eq!(yy, [4500.0, 4500.0, 9000.0, 9000.0], "{mode:?}");
    }
}

#[test]
fn test_monotonic_modes_do_not_overshoot() {
    let x = [-4.0, -3.0, -2.0, 0.0];
    let y = [4000.0, 4000.0, 8000.0, 8000.0];
    let xx: Vec<f64> = (0..=80).map(|k| -4.0 + 0.05 * k as f64).collect();
    for mode in [Interpolation::Bezier, Interpolation::Hermite] {
        let mut yy = vec![0.0; xx.len()];
        expand_into(&x, &y, &xx, &mut yy, mode);
        assert!(
            yy.iter().all(|&v| (4000.0 - 1e-9..=8000.0 + 1e-9).contains(&v)),
            "{mode:?}"
        );
    }
}

#[test]
fn test_parameter_layout_follows_quantities() {
    let nodes = NodeSet::new()
        .with_nodes(Quantity::Temp, vec![-3.0, -1.0, 0.0])
        .unwrap()
        .with_nodes(Quantity::B, vec![-1.0])
        .unwrap()
        .with_nodes(Quantity::Vlos, vec![-2.0, 0.0])
        .unwrap()
        .with_boundary_multiplier();
    assert_eq!(nodes.npar(), 7);
    assert_eq!(nodes.offset(Quantity::Temp), Some(0));
    assert_eq!(nodes.offset(Quantity::Vlos), Some(3));
    assert_eq!(nodes.offset(Quantity::B), Some(5));
    assert_eq!(nodes.offset(Quantity::PgasBoundary), Some(6));
    assert_eq!(nodes.kind_of(4), Some(Quantity::Vlos));
    assert_eq!(nodes.kind_of(7), None);

    let mut model = column(&[-4.0, -2.0, 0.0, 1.0]);
    model
        .expand(
            &nodes,
            &[5000.0, 5500.0, 6500.0, 1.0e5, 2.0e5, 800.0, 1.2],
            Interpolation::Linear,
        )
        .unwrap();
    assert_eq!(model.b(), &[800.0; 4]);
    assert_eq!(model.vlos(), &[1.0e5, 1.0e5, 2.0e5, 2.0e5]);
    assert!(model.pgas().iter().all(|&p| p == 0.0));
}
