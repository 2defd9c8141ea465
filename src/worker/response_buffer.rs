//! Four-dimensional response-function storage.

/// Dense row-major buffer indexed `[pixel, channel, row, sample]`.
///
/// Inversion responses use one channel per parameter and one row per
/// wavelength; depth-resolved responses use one channel per physical quantity
/// and one row per depth point.
///
/// # Example
///
/// ```
/// use atmos_rs::worker::ResponseBuffer;
///
/// let mut rf = ResponseBuffer::new([2, 3, 4, 5]);
/// rf.slab_mut(1, 2)[7] = 1.0;
/// assert_eq!(rf.get(1, 2, 1, 2), 1.0);
/// assert_eq!(rf.slab(1, 2).len(), 20);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseBuffer {
    dims: [usize; 4],
    data: Vec<f64>,
}

impl ResponseBuffer {
    pub fn new(dims: [usize; 4]) -> Self {
        Self {
            dims,
            data: vec![0.0; dims.iter().product()],
        }
    }

    #[inline]
    pub fn dims(&self) -> [usize; 4] {
        self.dims
    }

    #[inline]
    fn slab_len(&self) -> usize {
        self.dims[2] * self.dims[3]
    }

    #[inline]
    pub fn index(&self, pixel: usize, channel: usize, row: usize, sample: usize) -> usize {
        ((pixel * self.dims[1] + channel) * self.dims[2] + row) * self.dims[3] + sample
    }

    pub fn get(&self, pixel: usize, channel: usize, row: usize, sample: usize) -> f64 {
        self.data[self.index(pixel, channel, row, sample)]
    }

    /// All rows of one pixel and channel.
    pub fn slab(&self, pixel: usize, channel: usize) -> &[f64] {
        let start = self.index(pixel, channel, 0, 0);
        &self.data[start..start + self.slab_len()]
    }

    pub fn slab_mut(&mut self, pixel: usize, channel: usize) -> &mut [f64] {
        let start = self.index(pixel, channel, 0, 0);
        let len = self.slab_len();
        &mut self.data[start..start + len]
    }

    /// Every channel of one pixel.
    pub fn pixel(&self, pixel: usize) -> &[f64] {
        let len = self.dims[1] * self.slab_len();
        &self.data[pixel * len..(pixel + 1) * len]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }
}
