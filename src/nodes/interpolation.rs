//! Node ↔ depth interpolation kernels.
//!
//! Expansion (node → depth) never extrapolates: depth points outside the node
//! range take the value of the nearest edge node. Compression (depth → node)
//! resamples linearly and does extrapolate, so a coarse node grid that reaches
//! past the sampled column still gets a finite value.
//!
//! Node abscissae must be strictly ascending.

use crate::types::Interpolation;

/// Expand node values `y` at abscissae `x` onto `xx`, writing `yy`.
///
/// The policy depends on the node count: none leaves `yy` untouched, one
/// fills a constant, two interpolate linearly, three or more use `mode`.
///
/// # Panics
///
/// Panics if `x` and `y`, or `xx` and `yy`, differ in length.
pub fn expand_into(x: &[f64], y: &[f64], xx: &[f64], yy: &mut [f64], mode: Interpolation) {
    assert_eq!(x.len(), y.len(), "node abscissae and values differ in length");
    assert_eq!(xx.len(), yy.len(), "depth abscissae and output differ in length");
    match x.len() {
        0 => {}
        1 => yy.fill(y[0]),
        2 => linear(x, y, xx, yy, false),
        _ => match mode {
            Interpolation::Linear => linear(x, y, xx, yy, false),
            Interpolation::Bezier => bezier2(x, y, xx, yy),
            Interpolation::Hermite => hermite(x, y, xx, yy),
        },
    }
}

/// Re-sample a full column onto a coarser set of abscissae.
///
/// A single target gets the arithmetic mean of every sample. An empty target
/// yields an empty result.
///
/// # Panics
///
/// Panics if `x` and `y` differ in length.
///
/// # Example
///
/// ```
/// use atmos_rs::nodes::compress;
///
/// let x = [0.0, 1.0, 2.0, 3.0];
/// let y = [1.0, 5.0, 2.0, 4.0];
/// assert_eq!(compress(&x, &y, &[1.5]), vec![3.0]);
/// assert_eq!(compress(&x, &y, &[0.0, 3.0]), vec![1.0, 4.0]);
/// ```
pub fn compress(x: &[f64], y: &[f64], target_x: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; target_x.len()];
    compress_into(x, y, target_x, &mut out);
    out
}

/// In-place variant of [`compress`].
///
/// # Panics
///
/// Panics if `x` and `y`, or `target_x` and `target_y`, differ in length.
pub fn compress_into(x: &[f64], y: &[f64], target_x: &[f64], target_y: &mut [f64]) {
    assert_eq!(x.len(), y.len(), "column abscissae and values differ in length");
    assert_eq!(target_x.len(), target_y.len(), "targets and output differ in length");
    match target_x.len() {
        0 => {}
        1 => {
            if !y.is_empty() {
                target_y[0] = y.iter().sum::<f64>() / y.len() as f64;
            }
        }
        _ => linear(x, y, target_x, target_y, true),
    }
}

/// Index `i` of the interval `[x[i], x[i+1]]` used for `xv`.
///
/// Values outside the node range map to the first or last interval.
#[inline]
fn interval(x: &[f64], xv: f64) -> usize {
    let n = x.len();
    let upper = x.partition_point(|&node| node <= xv);
    upper.clamp(1, n - 1) - 1
}

/// Clamp `xv` into the node range, returning the edge value if outside.
#[inline]
fn edge_value(x: &[f64], y: &[f64], xv: f64) -> Option<f64> {
    let last = x.len() - 1;
    if xv <= x[0] {
        Some(y[0])
    } else if xv >= x[last] {
        Some(y[last])
    } else {
        None
    }
}

/// Piecewise linear interpolation.
pub(crate) fn linear(x: &[f64], y: &[f64], xx: &[f64], yy: &mut [f64], extrapolate: bool) {
    let n = x.len();
    if n == 0 {
        return;
    }
    if n == 1 {
        yy.fill(y[0]);
        return;
    }
    for (out, &xv) in yy.iter_mut().zip(xx) {
        if !extrapolate {
            if let Some(v) = edge_value(x, y, xv) {
                *out = v;
                continue;
            }
        }
        let i = interval(x, xv);
        let h = x[i + 1] - x[i];
        *out = if h == 0.0 {
            y[i]
        } else {
            y[i] + (y[i + 1] - y[i]) * (xv - x[i]) / h
        };
    }
}

/// Monotonic node derivatives.
///
/// Interior points use the weighted harmonic mean of the adjacent secants and
/// are zero at local extrema; the end points take the adjacent secant.
fn monotonic_slopes(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let secant: Vec<f64> = (0..n - 1)
        .map(|i| {
            let h = x[i + 1] - x[i];
            if h == 0.0 { 0.0 } else { (y[i + 1] - y[i]) / h }
        })
        .collect();

    let mut slopes = vec![0.0; n];
    slopes[0] = secant[0];
    slopes[n - 1] = secant[n - 2];
    for i in 1..n - 1 {
        let (d0, d1) = (secant[i - 1], secant[i]);
        if d0 * d1 > 0.0 {
            let h0 = x[i] - x[i - 1];
            let h1 = x[i + 1] - x[i];
            let alpha = (1.0 + h1 / (h0 + h1)) / 3.0;
            slopes[i] = d0 * d1 / (alpha * d1 + (1.0 - alpha) * d0);
        }
    }
    slopes
}

/// Piecewise quadratic Bezier interpolation, clamped outside the node range.
///
/// The control point of each interval averages the tangent extrapolations
/// from both ends and is limited to the interval's value range, so the
/// curve never overshoots the nodes.
pub(crate) fn bezier2(x: &[f64], y: &[f64], xx: &[f64], yy: &mut [f64]) {
    let slopes = monotonic_slopes(x, y);
    for (out, &xv) in yy.iter_mut().zip(xx) {
        if let Some(v) = edge_value(x, y, xv) {
            *out = v;
            continue;
        }
        let i = interval(x, xv);
        let h = x[i + 1] - x[i];
        if h == 0.0 {
            *out = y[i];
            continue;
        }
        let (y0, y1) = (y[i], y[i + 1]);
        let c0 = y0 + 0.5 * h * slopes[i];
        let c1 = y1 - 0.5 * h * slopes[i + 1];
        let control = (0.5 * (c0 + c1)).clamp(y0.min(y1), y0.max(y1));

        let u = (xv - x[i]) / h;
        let v = 1.0 - u;
        *out = v * v * y0 + 2.0 * u * v * control + u * u * y1;
    }
}

/// Piecewise cubic Hermite interpolation, clamped outside the node range.
pub(crate) fn hermite(x: &[f64], y: &[f64], xx: &[f64], yy: &mut [f64]) {
    let slopes = monotonic_slopes(x, y);
    for (out, &xv) in yy.iter_mut().zip(xx) {
        if let Some(v) = edge_value(x, y, xv) {
            *out = v;
            continue;
        }
        let i = interval(x, xv);
        let h = x[i + 1] - x[i];
        if h == 0.0 {
            *out = y[i];
            continue;
        }
        let t = (xv - x[i]) / h;
        let t2 = t * t;
        let t3 = t2 * t;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;
        *out = h00 * y[i] + h10 * h * slopes[i] + h01 * y[i + 1] + h11 * h * slopes[i + 1];
    }
}
