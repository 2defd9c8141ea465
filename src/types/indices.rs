//! Index newtype for pixels.
//!
//! A flat pixel index is a plain `usize` in the worker and grid code;
//! wrapping it keeps it apart from batch offsets and depth points.

use std::fmt;

macro_rules! define_index {
    (
        $(#[$meta:meta])*
        $name:ident, $display_prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            #[inline]
            pub const fn new(index: usize) -> Self {
                Self(index)
            }

            #[inline]
            pub const fn get(self) -> usize {
                self.0
            }

            /// Iterate over `[0, n)`.
            pub fn iter(n: usize) -> impl ExactSizeIterator<Item = $name> {
                (0..n).map($name)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $display_prefix, self.0)
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(index: usize) -> Self {
                Self(index)
            }
        }

        impl From<$name> for usize {
            #[inline]
            fn from(idx: $name) -> usize {
                idx.0
            }
        }

        impl<T> std::ops::Index<$name> for [T] {
            type Output = T;
            #[inline]
            fn index(&self, idx: $name) -> &T {
                &self[idx.0]
            }
        }

        impl<T> std::ops::IndexMut<$name> for [T] {
            #[inline]
            fn index_mut(&mut self, idx: $name) -> &mut T {
                &mut self[idx.0]
            }
        }

        impl<T> std::ops::Index<$name> for Vec<T> {
            type Output = T;
            #[inline]
            fn index(&self, idx: $name) -> &T {
                &self[idx.0]
            }
        }

        impl<T> std::ops::IndexMut<$name> for Vec<T> {
            #[inline]
            fn index_mut(&mut self, idx: $name) -> &mut T {
                &mut self[idx.0]
            }
        }
    };
}

define_index!(
    /// Flat pixel index into an `ny × nx` map, row-major (`y * nx + x`).
    ///
    /// # Example
    ///
    /// ```
    /// use atmos_rs::types::PixelIndex;
    ///
    /// let pixel = PixelIndex::from_yx(2, 3, 5);
    /// assert_eq!(pixel.get(), 13);
    /// assert_eq!(pixel.to_yx(5), (2, 3));
    /// ```
    PixelIndex,
    "P"
);

impl PixelIndex {
    /// Build from map coordinates.
    #[inline]
    pub const fn from_yx(y: usize, x: usize, nx: usize) -> Self {
        Self(y * nx + x)
    }

    /// Map coordinates `(y, x)` of this pixel for a map `nx` pixels wide.
    #[inline]
    pub const fn to_yx(self, nx: usize) -> (usize, usize) {
        if nx == 0 {
            return (0, self.0);
        }
        (self.0 / nx, self.0 % nx)
    }

    /// Advance by `n` pixels.
    #[inline]
    pub const fn offset(self, n: usize) -> Self {
        Self(self.0 + n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_coordinates() {
        let nx = 7;
        for y in 0..4 {
            for x in 0..nx {
                let idx = PixelIndex::from_yx(y, x, nx);
                assert_eq!(idx.to_yx(nx), (y, x));
            }
        }
    }

    #[test]
    fn test_pixel_offset() {
        let first = PixelIndex::new(10);
        assert_eq!(first.offset(3).get(), 13);
        assert_eq!(first.offset(3).to_yx(4), (3, 1));
    }

    #[test]
    fn test_pixel_indexing() {
        let mut quality = vec![1.0, 2.0, 3.0];
        let p = PixelIndex::new(1);
        assert_eq!(quality[p], 2.0);
        quality[p] = 2.5;
        assert_eq!(quality[1], 2.5);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", PixelIndex::new(42)), "P42");
    }

    #[test]
    fn test_iter() {
        let all: Vec<_> = PixelIndex::iter(4).collect();
        assert_eq!(all.len(), 4);
        assert_eq!(all[3].get(), 3);
        let back: usize = all[2].into();
        assert_eq!(back, 2);
    }
}
