//! Variational E-step with a diagonal posterior precision.
//!
//! For sample `x_j` the posterior precision `L' Psi^-1 L + diag(lapla_j)`
//! is replaced by its diagonal, so the posterior mean is
//!
//! ```text
//! z_j = diag(1 / (LPsiL + lapla_j + MACHINE_EPS)) * LPsi * x_j
//! ```
//!
//! with `LPsi = L' Psi^-1` (k x n) and `LPsiL = diag(L' Psi^-1 L)`.

use crate::options::MACHINE_EPS;
use crate::sufficient_stats::SufficientStats;
use crate::workspace::{try_zeros, try_zeros_vec};
use nalgebra::{DMatrix, DVector, DVectorView};
use rayon::prelude::*;

/// Per-iteration factor statistics derived from `L` and `Psi`.
///
/// `lpsi` is kept as k x n (transposed w.r.t. `L`) so that the inner
/// loop over factors walks contiguous memory.
#[derive(Debug, Clone)]
pub struct FactorPrecision {
    /// `LPsi[f, i] = L[i, f] / Psi[i]`: k x n
    pub lpsi: DMatrix<f32>,
    /// `LPsiL[f] = sum_i L[i, f] * LPsi[f, i]`: k
    pub lpsil: DVector<f32>,
}

impl FactorPrecision {
    pub fn try_new(n: usize, k: usize) -> anyhow::Result<Self> {
        Ok(FactorPrecision {
            lpsi: try_zeros(k, n)?,
            lpsil: DVector::zeros(k),
        })
    }

    pub fn num_factors(&self) -> usize {
        self.lpsi.nrows()
    }

    /// Recompute from the current loadings and noise variances
    pub fn refresh(&mut self, loadings: &DMatrix<f32>, psi: &DVector<f32>) {
        let (n, k) = loadings.shape();
        debug_assert_eq!(self.lpsi.shape(), (k, n));

        let lpsi = self.lpsi.as_mut_slice();
        for (f, l_f) in loadings.as_slice().chunks_exact(n).enumerate() {
            let mut acc = 0.0;
            for (i, (&l_if, &psi_i)) in l_f.iter().zip(psi.iter()).enumerate() {
                let v = l_if / psi_i;
                lpsi[f + i * k] = v;
                acc += l_if * v;
            }
            self.lpsil[f] = acc;
        }
    }
}

/// Thread-local work buffers of the per-sample kernel
#[derive(Debug, Clone)]
pub struct KernelScratch {
    /// Diagonal posterior variance, then second moment: k
    pub ilpsil: Vec<f32>,
    /// `LPsi` scaled by the posterior variance: k x n
    pub ilpsilx: Vec<f32>,
}

impl KernelScratch {
    pub fn try_new(n: usize, k: usize) -> anyhow::Result<Self> {
        Ok(KernelScratch {
            ilpsil: try_zeros_vec(k)?,
            ilpsilx: try_zeros_vec(k * n)?,
        })
    }

    pub fn clear(&mut self) {
        self.ilpsil.fill(0.0);
        self.ilpsilx.fill(0.0);
    }
}

/// Prior controls used when updating the variational parameters
#[derive(Debug, Clone, Copy)]
pub struct LatentPrior {
    /// Sparseness exponent on the factors
    pub spz: f32,
    /// Floor on the variational parameters
    pub lap: f32,
}

/// Estimate `E[z | x]` for one sample.
///
/// * `x` - data column: n
/// * `z` - output posterior mean: k
/// * `lapla` - variational parameters of this sample: k
/// * `stats` - if given, accumulate `sum1`, `sum2` and update `lapla`;
///   if `None`, only `z` is written
pub fn estimate_sample(
    precision: &FactorPrecision,
    x: &[f32],
    z: &mut [f32],
    lapla: &mut [f32],
    scratch: &mut KernelScratch,
    stats: Option<&mut SufficientStats>,
    prior: &LatentPrior,
) {
    let k = z.len();
    let n = x.len();
    let ilpsil = &mut scratch.ilpsil[..k];

    for f in 0..k {
        ilpsil[f] = 1.0 / (precision.lpsil[f] + lapla[f] + MACHINE_EPS);
        z[f] = 0.0;
    }

    let lpsi = precision.lpsi.as_slice();
    for ((lpsi_i, out_i), &x_i) in lpsi
        .chunks_exact(k)
        .zip(scratch.ilpsilx.chunks_exact_mut(k))
        .zip(x.iter())
    {
        for f in 0..k {
            out_i[f] = lpsi_i[f] * ilpsil[f];
            z[f] += out_i[f] * x_i;
        }
    }

    let Some(stats) = stats else {
        return;
    };

    let xv = DVectorView::from_slice(x, n);
    let zv = DVectorView::from_slice(z, k);
    stats.sum1.ger(1.0, &xv, &zv, 1.0);
    stats.sum2.ger(1.0, &zv, &zv, 1.0);

    for f in 0..k {
        stats.sum2[(f, f)] += ilpsil[f];
        ilpsil[f] += z[f] * z[f];
        let s = (MACHINE_EPS + ilpsil[f]).powf(-prior.spz);
        lapla[f] = s.max(prior.lap);
    }
}

/// Run the kernel over every sample on `pool`.
///
/// Samples are split into contiguous blocks, one per worker slot
/// (`scratch[b]`, `stats[b]`). The partition only depends on the number
/// of samples and slots. With `accumulate = false` neither `lapla` nor
/// the statistics are touched.
#[allow(clippy::too_many_arguments)]
pub fn run_estep(
    pool: &rayon::ThreadPool,
    x: &DMatrix<f32>,
    scores: &mut DMatrix<f32>,
    lapla: &mut DMatrix<f32>,
    precision: &FactorPrecision,
    scratch: &mut [KernelScratch],
    stats: &mut [SufficientStats],
    prior: &LatentPrior,
    accumulate: bool,
) {
    let (n, l) = x.shape();
    let k = precision.num_factors();
    let nslots = scratch.len().min(stats.len()).max(1);
    let block = l.div_ceil(nslots).max(1);
    let xs = x.as_slice();

    pool.install(|| {
        scratch
            .par_iter_mut()
            .zip(stats.par_iter_mut())
            .zip(scores.as_mut_slice().par_chunks_mut(block * k))
            .zip(lapla.as_mut_slice().par_chunks_mut(block * k))
            .enumerate()
            .for_each(|(b, (((scratch_b, stats_b), z_b), lapla_b))| {
                let x_b = &xs[(b * block * n)..];
                for ((x_j, z_j), lapla_j) in x_b
                    .chunks_exact(n)
                    .zip(z_b.chunks_exact_mut(k))
                    .zip(lapla_b.chunks_exact_mut(k))
                {
                    let acc = if accumulate {
                        Some(&mut *stats_b)
                    } else {
                        None
                    };
                    estimate_sample(precision, x_j, z_j, lapla_j, scratch_b, acc, prior);
                }
            });
    });
}
