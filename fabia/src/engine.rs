//! The variational EM loop.

use crate::estep::{run_estep, LatentPrior};
use crate::model::FabiaModel;
use crate::mstep::{
    flatten_collapsed, invert_spd_into, rescale_factors, reset_dead_factors, shrink_loadings,
    update_loadings, update_psi,
};
use crate::options::FabiaOptions;
use crate::progress::{FitObserver, FitSnapshot, LogObserver};
use crate::sufficient_stats::SufficientStats;
use crate::timing::PhaseTiming;
use crate::workspace::EmWorkspace;

use log::{debug, info, warn};
use nalgebra::DMatrix;
use rand::Rng;
use std::time::Instant;

/// How the EM loop ended
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitStatus {
    /// All `cyc` iterations ran and the final E-step produced `Z`
    Completed,
    /// The last update fell below `eps`; `Psi` and `lapla` were set to
    /// `eps` and `Z` to zero
    Collapsed { iteration: usize, last_update: f32 },
}

#[derive(Debug, Clone)]
pub struct FitSummary {
    pub status: FitStatus,
    /// Number of EM iterations started
    pub iterations: usize,
    /// Total number of factor resets over all iterations
    pub resets: usize,
    pub timing: PhaseTiming,
}

/// Approximate FABIA: sparse factor analysis for bicluster acquisition.
///
/// # Usage
///
/// ```ignore
/// use fabia::{Fabia, FabiaModel, FabiaOptions};
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(42);
/// let mut model = FabiaModel::init(&x, 5, &mut rng)?;
/// let summary = Fabia::new(FabiaOptions::default()).fit(&x, &mut model, &mut rng)?;
/// ```
pub struct Fabia {
    options: FabiaOptions,
}

impl Fabia {
    pub fn new(options: FabiaOptions) -> Self {
        Fabia { options }
    }

    /// Fit `model` to `x` (n x l), reporting progress through `log`
    pub fn fit<R: Rng + ?Sized>(
        &self,
        x: &DMatrix<f32>,
        model: &mut FabiaModel,
        rng: &mut R,
    ) -> anyhow::Result<FitSummary> {
        self.fit_with_observer(x, model, rng, &mut LogObserver)
    }

    /// Fit `model` to `x` (n x l).
    ///
    /// `model` holds the starting point on entry and the estimate on
    /// exit. `rng` is only used to re-draw dead factors. `observer` is
    /// called every `verbose` iterations.
    pub fn fit_with_observer<R, O>(
        &self,
        x: &DMatrix<f32>,
        model: &mut FabiaModel,
        rng: &mut R,
        observer: &mut O,
    ) -> anyhow::Result<FitSummary>
    where
        R: Rng + ?Sized,
        O: FitObserver + ?Sized,
    {
        let opts = &self.options;
        opts.validate()?;
        model.check_data(x)?;

        let t0 = Instant::now();
        let (n, l) = x.shape();
        let k = model.num_factors();

        let mut summary = FitSummary {
            status: FitStatus::Completed,
            iterations: 0,
            resets: 0,
            timing: PhaseTiming::default(),
        };

        if opts.cyc == 0 {
            debug!("no EM cycles requested");
            return Ok(summary);
        }

        let mut ws = match EmWorkspace::try_new(n, k, opts.nthreads) {
            Ok(ws) => ws,
            Err(e) => {
                model.loadings.fill(0.0);
                model.scores.fill(0.0);
                return Err(e.context(format!(
                    "cannot allocate the EM workspace for n={}, k={}, threads={}",
                    n, k, opts.nthreads
                )));
            }
        };

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(opts.nthreads)
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                model.loadings.fill(0.0);
                model.scores.fill(0.0);
                return Err(anyhow::anyhow!(
                    "cannot start {} worker threads: {}",
                    opts.nthreads,
                    e
                ));
            }
        };

        let prior = LatentPrior {
            spz: opts.spz,
            lap: opts.effective_lap(),
        };

        info!(
            "FABIA: {} features x {} samples, {} factors, {} cycles, {} threads",
            n, l, k, opts.cyc, opts.nthreads
        );

        ws.prepare(x);

        for iter in 1..=opts.cyc {
            summary.iterations = iter;

            ws.precision.refresh(&model.loadings, &model.psi);
            ws.reset_stats(opts.eps);

            let tic = Instant::now();
            run_estep(
                &pool,
                x,
                &mut model.scores,
                &mut model.lapla,
                &ws.precision,
                &mut ws.scratch,
                &mut ws.stats,
                &prior,
                true,
            );
            summary.timing.estep += tic.elapsed();

            let tic = Instant::now();
            pool.install(|| SufficientStats::merge_into_first(&mut ws.stats));
            let reduced = &mut ws.stats[0];
            invert_spd_into(&mut reduced.sum2, &mut ws.sum2_inv)
                .map_err(|e| e.context(format!("Cholesky failed at iteration {}", iter)))?;
            summary.timing.cholesky += tic.elapsed();

            let tic = Instant::now();
            update_loadings(&mut model.loadings, &reduced.sum1, &ws.sum2_inv);
            shrink_loadings(
                &pool,
                &mut model.loadings,
                &model.psi,
                opts.alpha,
                opts.spl,
                opts.non_negative,
            );

            let last_update = update_psi(
                &pool,
                &model.loadings,
                &reduced.sum1,
                &ws.xx,
                l,
                opts.eps,
                &mut model.psi,
            );

            if last_update < opts.eps {
                flatten_collapsed(&mut model.psi, &mut model.lapla, opts.eps);
                warn!(
                    "iter {}: last update {} < eps {}: model collapsed",
                    iter, last_update, opts.eps
                );
                summary.status = FitStatus::Collapsed {
                    iteration: iter,
                    last_update,
                };
                summary.timing.rest += tic.elapsed();
                break;
            }

            if opts.scale {
                rescale_factors(&mut model.loadings, &mut model.lapla, opts.spz);
            }

            let nreset = reset_dead_factors(&mut model.loadings, &mut model.lapla, rng);
            if nreset > 0 {
                info!("iter {}: reset {} factors", iter, nreset);
                summary.resets += nreset;
            }

            if opts.verbose > 0 && iter % opts.verbose == 0 {
                observer.on_update(&FitSnapshot {
                    iter,
                    elapsed: t0.elapsed(),
                    loadings: &model.loadings,
                    scores: &model.scores,
                    psi: &model.psi,
                    lapla: &model.lapla,
                });
            }
            summary.timing.rest += tic.elapsed();
        }

        match summary.status {
            FitStatus::Completed => {
                ws.precision.refresh(&model.loadings, &model.psi);
                run_estep(
                    &pool,
                    x,
                    &mut model.scores,
                    &mut model.lapla,
                    &ws.precision,
                    &mut ws.scratch,
                    &mut ws.stats,
                    &prior,
                    false,
                );
            }
            FitStatus::Collapsed { .. } => {
                model.scores.fill(0.0);
            }
        }

        summary.timing.total = t0.elapsed();
        summary.timing.log_table();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Silent;
    use rand::SeedableRng;

    fn options(cyc: usize) -> FabiaOptions {
        FabiaOptions {
            cyc,
            nthreads: 2,
            ..Default::default()
        }
    }

    #[test]
    fn zero_cycles_change_nothing() -> anyhow::Result<()> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let x = DMatrix::from_fn(5, 8, |i, j| (i + j) as f32);
        let mut model = FabiaModel::init(&x, 2, &mut rng)?;
        model.scores.fill(0.5);
        let before = model.clone();

        let summary = Fabia::new(options(0)).fit(&x, &mut model, &mut rng)?;

        assert_eq!(summary.iterations, 0);
        assert_eq!(summary.status, FitStatus::Completed);
        assert_eq!(model.loadings, before.loadings);
        assert_eq!(model.scores, before.scores);
        assert_eq!(model.psi, before.psi);
        assert_eq!(model.lapla, before.lapla);
        Ok(())
    }

    #[test]
    fn shape_mismatch_mutates_nothing() -> anyhow::Result<()> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(2);
        let x = DMatrix::<f32>::zeros(5, 8);
        let mut model = FabiaModel::init(&x, 2, &mut rng)?;
        let before = model.clone();

        let wrong = DMatrix::<f32>::zeros(6, 8);
        assert!(Fabia::new(options(3)).fit(&wrong, &mut model, &mut rng).is_err());
        assert_eq!(model.loadings, before.loadings);
        Ok(())
    }

    #[test]
    fn workspace_allocation_failure_zeroes_loadings_and_scores() -> anyhow::Result<()> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(4);
        let x = DMatrix::from_fn(5, 8, |i, j| (i * j) as f32);
        let mut model = FabiaModel::init(&x, 2, &mut rng)?;
        model.scores.fill(0.5);
        let psi = model.psi.clone();

        // one accumulator slot per thread: this many cannot be reserved
        let opts = FabiaOptions {
            cyc: 3,
            nthreads: usize::MAX / 8,
            ..Default::default()
        };
        assert!(Fabia::new(opts).fit(&x, &mut model, &mut rng).is_err());

        assert!(model.loadings.iter().all(|&v| v == 0.0));
        assert!(model.scores.iter().all(|&v| v == 0.0));
        assert_eq!(model.psi, psi);
        Ok(())
    }

    #[test]
    fn negative_lap_fits_like_eps() -> anyhow::Result<()> {
        let x = DMatrix::from_fn(10, 16, |i, j| {
            let signal = if i < 4 && j < 6 { 2.0 } else { 0.0 };
            signal + ((i * 13 + j * 7) % 5) as f32 / 5.0 - 0.4
        });

        let run = |lap: f32| -> anyhow::Result<FabiaModel> {
            let mut rng = rand::rngs::StdRng::seed_from_u64(5);
            let mut model = FabiaModel::init(&x, 2, &mut rng)?;
            let opts = FabiaOptions {
                cyc: 8,
                lap,
                nthreads: 2,
                ..Default::default()
            };
            let eps = opts.eps;
            Fabia::new(opts).fit_with_observer(&x, &mut model, &mut rng, &mut Silent)?;
            assert!(model.lapla.iter().all(|&v| v >= eps));
            Ok(model)
        };

        let negative = run(-1.0)?;
        let floor = run(FabiaOptions::default().eps)?;
        assert_eq!(negative.loadings, floor.loadings);
        assert_eq!(negative.scores, floor.scores);
        assert_eq!(negative.psi, floor.psi);
        assert_eq!(negative.lapla, floor.lapla);
        Ok(())
    }

    #[test]
    fn invariants_hold_after_every_iteration() -> anyhow::Result<()> {
        struct Check {
            eps: f32,
            lap: f32,
            calls: usize,
        }
        impl FitObserver for Check {
            fn on_update(&mut self, s: &FitSnapshot<'_>) {
                self.calls += 1;
                assert!(s.psi.iter().all(|&p| p >= self.eps));
                assert!(s.lapla.iter().all(|&v| v >= self.lap));
                for f in 0..s.num_factors() {
                    assert!(s.loadings.column(f).iter().any(|&v| v != 0.0));
                }
            }
        }

        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let x = DMatrix::from_fn(12, 30, |i, j| {
            let signal = if i < 4 && j < 10 { 3.0 } else { 0.0 };
            signal + ((i * 31 + j * 17) % 7) as f32 / 7.0 - 0.5
        });
        let mut model = FabiaModel::init(&x, 3, &mut rng)?;
        let opts = FabiaOptions {
            cyc: 15,
            verbose: 1,
            lap: 0.5,
            nthreads: 3,
            ..Default::default()
        };
        let mut check = Check {
            eps: opts.eps,
            lap: opts.effective_lap(),
            calls: 0,
        };

        let summary = Fabia::new(opts).fit_with_observer(&x, &mut model, &mut rng, &mut check)?;

        assert_eq!(summary.status, FitStatus::Completed);
        assert_eq!(check.calls, 15);
        assert_eq!(model.psi.len(), 12);
        assert!(model.psi.iter().all(|p| p.is_finite()));
        Ok(())
    }
}
