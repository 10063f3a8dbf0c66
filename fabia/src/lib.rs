//! Approximate FABIA (Factor Analysis for Bicluster Acquisition).
//!
//! Fits the sparse factor model
//!
//! ```text
//! X = L Z + ε,   ε ~ N(0, diag(Psi))
//! ```
//!
//! to an `n x l` data matrix (features x samples) by variational EM.
//! The per-sample E-step runs on a dedicated rayon pool, each worker
//! accumulating its own sufficient statistics, which are reduced before
//! the M-step. Loadings are sparsified by soft-thresholding; factors
//! whose loadings vanish are re-drawn.
//!
//! # References
//!
//! Hochreiter et al. (2010). "FABIA: factor analysis for bicluster
//! acquisition." Bioinformatics 26(12):1520-1527.

/// Fit controls
pub mod options;

/// Loadings, scores, noise variances and variational parameters
pub mod model;

/// Per-worker sums `X E[z]'` and `E[z z']`
pub mod sufficient_stats;

/// Per-sample posterior of the factors (E-step)
pub mod estep;

/// Loadings, shrinkage and noise update (M-step)
pub mod mstep;

/// Scratch buffers allocated once per fit
pub mod workspace;

/// The EM driver
pub mod engine;

/// Callbacks during a fit
pub mod progress;

/// Wall-clock time per phase
pub mod timing;

/// Planted-bicluster data generator
pub mod simulate;

pub use engine::{Fabia, FitStatus, FitSummary};
pub use model::FabiaModel;
pub use options::{FabiaOptions, MACHINE_EPS};
pub use progress::{FitObserver, FitSnapshot, LogObserver, Silent};
pub use timing::PhaseTiming;
