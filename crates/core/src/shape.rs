//! Dense grid shapes and transform directions.

use serde::{Deserialize, Serialize};

/// Sign convention of a transform: forward is `exp(-2πi jk/n)`, inverse is
/// `exp(+2πi jk/n)`. Neither direction normalizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Inverse,
}

/// Extents of a dense 3-D grid. `npts[0]` is the fastest-varying axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape {
    pub npts: [usize; 3],
}

impl GridShape {
    pub fn new(n0: usize, n1: usize, n2: usize) -> Self {
        Self { npts: [n0, n1, n2] }
    }

    pub fn cubic(n: usize) -> Self {
        Self::new(n, n, n)
    }

    #[inline]
    pub fn idx(&self, i0: usize, i1: usize, i2: usize) -> usize {
        i0 + self.npts[0] * (i1 + self.npts[1] * i2)
    }

    /// Total number of grid points.
    pub fn len(&self) -> usize {
        self.npts.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signed frequency of index `k` along `axis` (`k` above the midpoint wraps negative).
    pub fn frequency(&self, axis: usize, k: usize) -> i64 {
        let n = self.npts[axis] as i64;
        let k = k as i64;
        if k > n / 2 {
            k - n
        } else {
            k
        }
    }
}

impl From<[usize; 3]> for GridShape {
    fn from(npts: [usize; 3]) -> Self {
        Self { npts }
    }
}
