//! Instrumental degradation of synthetic spectra.
//!
//! Spectra are stored wavelength-major: sample `(w, s)` of a spectrum with
//! `ns` Stokes parameters lives at `w * ns + s`.

use std::ops::Range;

/// Degrades a synthetic spectrum to the resolution of an instrument.
pub trait Instrument {
    /// Replace the instrumental profile.
    fn update(&mut self, psf: &[f64]);

    /// Degrade `spectrum` in place.
    fn degrade(&self, ns: usize, spectrum: &mut [f64]);
}

/// Boxed instrument, as held by an atmosphere.
pub type BoxedInstrument = Box<dyn Instrument>;

/// Ideal instrument: leaves spectra untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoInstrument;

impl Instrument for NoInstrument {
    fn update(&mut self, _psf: &[f64]) {}

    fn degrade(&self, _ns: usize, _spectrum: &mut [f64]) {}
}

/// Convolution with a sampled profile over one spectral region.
///
/// The kernel is normalized to unit sum and centered on its middle sample;
/// samples beyond the region edges are replaced by the edge value.
///
/// # Example
///
/// ```
/// use atmos_rs::synthesis::{Instrument, KernelInstrument};
///
/// let inst = KernelInstrument::new(0..5, &[1.0, 2.0, 1.0]);
/// let mut spectrum = vec![1.0, 1.0, 0.0, 1.0, 1.0];
/// inst.degrade(1, &mut spectrum);
/// assert_eq!(spectrum[2], 0.5);
/// assert_eq!(spectrum[0], 1.0);
/// ```
#[derive(Clone, Debug)]
pub struct KernelInstrument {
    region: Range<usize>,
    kernel: Vec<f64>,
}

impl KernelInstrument {
    /// Instrument acting on wavelength indices `region` with profile `psf`.
    pub fn new(region: Range<usize>, psf: &[f64]) -> Self {
        let mut inst = Self {
            region,
            kernel: Vec::new(),
        };
        inst.update(psf);
        inst
    }

    pub fn kernel(&self) -> &[f64] {
        &self.kernel
    }
}

impl Instrument for KernelInstrument {
    fn update(&mut self, psf: &[f64]) {
        let total: f64 = psf.iter().sum();
        self.kernel = if psf.is_empty() || total == 0.0 {
            vec![1.0]
        } else {
            psf.iter().map(|v| v / total).collect()
        };
    }

    fn degrade(&self, ns: usize, spectrum: &mut [f64]) {
        if self.kernel.len() < 2 || ns == 0 {
            return;
        }
        let nw = spectrum.len() / ns;
        let start = self.region.start.min(nw);
        let end = self.region.end.min(nw);
        if end <= start {
            return;
        }
        let n = end - start;
        let half = (self.kernel.len() / 2) as isize;

        let mut line = vec![0.0; n];
        for s in 0..ns {
            for (i, v) in line.iter_mut().enumerate() {
                *v = spectrum[(start + i) * ns + s];
            }
            for i in 0..n {
                let acc: f64 = self
                    .kernel
                    .iter()
                    .enumerate()
                    .map(|(j, &k)| {
                        let last = n as isize - 1;
                        let src = (i as isize + j as isize - half).clamp(0, last) as usize;
                        k * line[src]
                    })
                    .sum();
                spectrum[(start + i) * ns + s] = acc;
            }
        }
    }
}
