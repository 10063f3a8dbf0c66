//! Sufficient statistics accumulated by the E-step.
//!
//! `sum1 = sum_j x_j z_j'` and `sum2 = sum_j (z_j z_j' + diag(var_j))`
//! form a monoid under element-wise addition with the zero identity.
//! Each worker accumulates into its own copy; the copies are then
//! merged into the first one, which also carries the `eps` diagonal
//! seeded once per iteration.

use crate::workspace::try_zeros;
use nalgebra::DMatrix;
use rayon::prelude::*;

#[derive(Debug, Clone)]
pub struct SufficientStats {
    /// Data-latent cross moment: n x k
    pub sum1: DMatrix<f32>,
    /// Latent second moment: k x k
    pub sum2: DMatrix<f32>,
}

impl SufficientStats {
    pub fn zeros(n: usize, k: usize) -> Self {
        SufficientStats {
            sum1: DMatrix::zeros(n, k),
            sum2: DMatrix::zeros(k, k),
        }
    }

    /// Same as [`SufficientStats::zeros`] but reports allocation failure
    pub fn try_zeros(n: usize, k: usize) -> anyhow::Result<Self> {
        Ok(SufficientStats {
            sum1: try_zeros(n, k)?,
            sum2: try_zeros(k, k)?,
        })
    }

    pub fn clear(&mut self) {
        self.sum1.fill(0.0);
        self.sum2.fill(0.0);
    }

    /// Set the `sum2` diagonal to `eps` so that the reduced matrix stays
    /// strictly positive definite
    pub fn seed_diagonal(&mut self, eps: f32) {
        self.sum2.fill_diagonal(eps);
    }

    pub fn add_assign(&mut self, other: &SufficientStats) {
        self.sum1 += &other.sum1;
        self.sum2 += &other.sum2;
    }

    /// Reduce every buffer into `stats[0]`, element by element in
    /// parallel. The order of summation over buffers is fixed, so the
    /// result depends on the number of buffers but not on scheduling.
    pub fn merge_into_first(stats: &mut [SufficientStats]) {
        let Some((head, rest)) = stats.split_first_mut() else {
            return;
        };
        if rest.is_empty() {
            return;
        }
        let rest: &[SufficientStats] = rest;

        head.sum1
            .as_mut_slice()
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, s)| {
                for other in rest {
                    *s += other.sum1.as_slice()[i];
                }
            });

        head.sum2
            .as_mut_slice()
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, s)| {
                for other in rest {
                    *s += other.sum2.as_slice()[i];
                }
            });
    }
}
