//! EM controls for the approximate FABIA fit.

/// Numerical floor used in reciprocals and negative powers
pub const MACHINE_EPS: f32 = 1e-7;

/// Options for the variational EM loop.
#[derive(Debug, Clone)]
pub struct FabiaOptions {
    /// Number of EM cycles. Default: 500
    pub cyc: usize,
    /// Strength of the Laplace shrinkage on the loadings. Default: 0.01
    pub alpha: f32,
    /// Regularisation floor for `Psi` and the `sum2` diagonal. Default: 1e-3
    pub eps: f32,
    /// Extra sparseness exponent on the loadings. Default: 0.0
    pub spl: f32,
    /// Extra sparseness exponent on the factors. Default: 0.5
    pub spz: f32,
    /// Rescale loadings to unit mean square after every M-step. Default: false
    pub scale: bool,
    /// Lower bound of the variational parameters, raised to at least
    /// `eps`. Default: 1.0
    pub lap: f32,
    /// Call the progress observer every `verbose` iterations (0 = never)
    pub verbose: usize,
    /// Worker threads for the E-step and element-wise M-step loops.
    /// Default: number of logical CPUs
    pub nthreads: usize,
    /// Keep only positive loadings. Default: false
    pub non_negative: bool,
}

impl Default for FabiaOptions {
    fn default() -> Self {
        FabiaOptions {
            cyc: 500,
            alpha: 0.01,
            eps: 1e-3,
            spl: 0.0,
            spz: 0.5,
            scale: false,
            lap: 1.0,
            verbose: 0,
            nthreads: num_cpus::get().max(1),
            non_negative: false,
        }
    }
}

impl FabiaOptions {
    /// `lap` raised to the regularisation floor
    pub fn effective_lap(&self) -> f32 {
        self.lap.max(self.eps)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.eps.is_finite() && self.eps > 0.0) {
            anyhow::bail!("eps must be positive and finite: {}", self.eps);
        }

        // `lap` is raised to `eps` and the threshold takes `|alpha|`
        for (name, value) in [("alpha", self.alpha), ("lap", self.lap)] {
            if !value.is_finite() {
                anyhow::bail!("{} must be finite: {}", name, value);
            }
        }

        for (name, value) in [("spl", self.spl), ("spz", self.spz)] {
            if !(value.is_finite() && value >= 0.0) {
                anyhow::bail!("{} must be non-negative and finite: {}", name, value);
            }
        }

        if self.nthreads == 0 {
            anyhow::bail!("need at least one thread");
        }
        Ok(())
    }
}
