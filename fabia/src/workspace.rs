//! Scratch memory for one fit, allocated once before the EM loop.

use crate::estep::{FactorPrecision, KernelScratch};
use crate::sufficient_stats::SufficientStats;
use matrix_util::traits::MatOps;
use nalgebra::{DMatrix, DVector};

/// Zero-filled buffer whose allocation failure is returned as an error
pub fn try_zeros_vec(len: usize) -> anyhow::Result<Vec<f32>> {
    let mut buf: Vec<f32> = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| anyhow::anyhow!("out of memory for {} floats: {}", len, e))?;
    buf.resize(len, 0.0);
    Ok(buf)
}

/// Zero-filled `nrow x ncol` matrix, see [`try_zeros_vec`]
pub fn try_zeros(nrow: usize, ncol: usize) -> anyhow::Result<DMatrix<f32>> {
    let len = nrow
        .checked_mul(ncol)
        .ok_or_else(|| anyhow::anyhow!("{} x {} overflows", nrow, ncol))?;
    Ok(DMatrix::from_vec(nrow, ncol, try_zeros_vec(len)?))
}

/// All buffers the EM loop reads and writes besides the model itself.
///
/// One `KernelScratch` and one `SufficientStats` per worker slot; the
/// first `SufficientStats` receives the reduction.
pub struct EmWorkspace {
    /// Per-feature mean square of the data: n
    pub xx: DVector<f32>,
    pub precision: FactorPrecision,
    pub scratch: Vec<KernelScratch>,
    pub stats: Vec<SufficientStats>,
    /// Inverse of the reduced `sum2`: k x k
    pub sum2_inv: DMatrix<f32>,
}

impl EmWorkspace {
    pub fn try_new(n: usize, k: usize, nslots: usize) -> anyhow::Result<Self> {
        let nslots = nslots.max(1);

        let mut scratch = Vec::new();
        scratch.try_reserve_exact(nslots)?;
        let mut stats = Vec::new();
        stats.try_reserve_exact(nslots)?;

        for _ in 0..nslots {
            stats.push(SufficientStats::try_zeros(n, k)?);
            scratch.push(KernelScratch::try_new(n, k)?);
        }

        Ok(EmWorkspace {
            xx: DVector::zeros(n),
            precision: FactorPrecision::try_new(n, k)?,
            scratch,
            stats,
            sum2_inv: try_zeros(k, k)?,
        })
    }

    pub fn num_slots(&self) -> usize {
        self.stats.len()
    }

    /// `XX[i] = (1/l) sum_j X[i,j]^2`, and zeroed kernel scratch
    pub fn prepare(&mut self, x: &DMatrix<f32>) {
        self.xx = x.row_mean_squares();
        for s in self.scratch.iter_mut() {
            s.clear();
        }
    }

    /// Zero every accumulator and seed the `eps` diagonal on the first
    pub fn reset_stats(&mut self, eps: f32) {
        for s in self.stats.iter_mut() {
            s.clear();
        }
        if let Some(first) = self.stats.first_mut() {
            first.seed_diagonal(eps);
        }
    }
}
