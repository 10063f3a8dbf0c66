use log::info;
use std::time::Duration;

/// Wall-clock time spent in each phase, summed over iterations
#[derive(Debug, Clone, Default)]
pub struct PhaseTiming {
    /// E-step kernel over all samples
    pub estep: Duration,
    /// Reduction and Cholesky inverse
    pub cholesky: Duration,
    /// Loadings, shrinkage, noise, rescale, reset
    pub rest: Duration,
    /// The whole fit including the final pass
    pub total: Duration,
}

impl PhaseTiming {
    fn fraction(&self, d: Duration) -> f32 {
        let tot = self.total.as_secs_f32();
        if tot > 0.0 {
            d.as_secs_f32() / tot
        } else {
            0.0
        }
    }

    pub fn log_table(&self) {
        info!(
            "E-step:   {:8.3}s ({:.3})",
            self.estep.as_secs_f32(),
            self.fraction(self.estep)
        );
        info!(
            "Cholesky: {:8.3}s ({:.3})",
            self.cholesky.as_secs_f32(),
            self.fraction(self.cholesky)
        );
        info!(
            "Rest:     {:8.3}s ({:.3})",
            self.rest.as_secs_f32(),
            self.fraction(self.rest)
        );
        info!("Total:    {:8.3}s", self.total.as_secs_f32());
    }
}
