//! Progress reporting during a fit.

use log::info;
use matrix_util::traits::MatOps;
use nalgebra::{DMatrix, DVector};
use std::time::Duration;

/// Read-only view of the model after an EM iteration
pub struct FitSnapshot<'a> {
    pub iter: usize,
    pub elapsed: Duration,
    pub loadings: &'a DMatrix<f32>,
    pub scores: &'a DMatrix<f32>,
    pub psi: &'a DVector<f32>,
    pub lapla: &'a DMatrix<f32>,
}

impl FitSnapshot<'_> {
    pub fn num_factors(&self) -> usize {
        self.loadings.ncols()
    }

    pub fn mean_psi(&self) -> f32 {
        self.psi.mean()
    }

    /// Fraction of loadings that are exactly zero
    pub fn loading_sparsity(&self) -> f32 {
        self.loadings.count_zeros() as f32 / self.loadings.len().max(1) as f32
    }
}

/// Called every `verbose` iterations. The snapshot borrows the model
/// only for the duration of the call.
pub trait FitObserver {
    fn on_update(&mut self, snapshot: &FitSnapshot<'_>);
}

/// Ignore every update
pub struct Silent;

impl FitObserver for Silent {
    fn on_update(&mut self, _snapshot: &FitSnapshot<'_>) {}
}

/// One summary line per update through `log`
#[derive(Default)]
pub struct LogObserver;

impl FitObserver for LogObserver {
    fn on_update(&mut self, s: &FitSnapshot<'_>) {
        info!(
            "[{}] {:.2}s: mean psi {:.4}, |L| {:.4}, zero loadings {:.1}%",
            s.iter,
            s.elapsed.as_secs_f32(),
            s.mean_psi(),
            s.loadings.norm(),
            100.0 * s.loading_sparsity()
        );
    }
}
