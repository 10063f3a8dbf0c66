//! The in/out parameter arrays of a FABIA fit.

use matrix_util::traits::SampleOps;
use nalgebra::{DMatrix, DVector};
use rand::Rng;

/// Initial noise variance used by [`FabiaModel::init`]
pub const DEFAULT_INIT_PSI: f32 = 0.2;

/// Factor model `x ≈ L z + ε`, `ε ~ N(0, diag(Psi))`.
///
/// All matrices are column-major. `lapla` is stored factor-major
/// within each sample (`k x l`), the transpose of the `l x k`
/// layout some presentations use.
#[derive(Debug, Clone)]
pub struct FabiaModel {
    /// Loadings `L`: n x k
    pub loadings: DMatrix<f32>,
    /// Factor scores `Z`: k x l
    pub scores: DMatrix<f32>,
    /// Noise variances `Psi`: n
    pub psi: DVector<f32>,
    /// Variational parameters: k x l
    pub lapla: DMatrix<f32>,
}

impl FabiaModel {
    pub fn new(
        loadings: DMatrix<f32>,
        scores: DMatrix<f32>,
        psi: DVector<f32>,
        lapla: DMatrix<f32>,
    ) -> anyhow::Result<Self> {
        let (n, k) = loadings.shape();
        let l = scores.ncols();

        if n == 0 || k == 0 || l == 0 {
            anyhow::bail!("empty model: n={}, k={}, l={}", n, k, l);
        }
        if scores.nrows() != k {
            anyhow::bail!("scores must be {} x {}, got {:?}", k, l, scores.shape());
        }
        if lapla.shape() != (k, l) {
            anyhow::bail!("lapla must be {} x {}, got {:?}", k, l, lapla.shape());
        }
        if psi.len() != n {
            anyhow::bail!("psi must have {} elements, got {}", n, psi.len());
        }

        Ok(FabiaModel {
            loadings,
            scores,
            psi,
            lapla,
        })
    }

    /// Default starting point for `k` factors on data `x` (n x l):
    /// `L ~ N(0,1)`, `Z = 0`, `Psi = 0.2`, `lapla = 1`.
    pub fn init<R: Rng + ?Sized>(x: &DMatrix<f32>, k: usize, rng: &mut R) -> anyhow::Result<Self> {
        let (n, l) = x.shape();
        Self::new(
            DMatrix::<f32>::rnorm_with(n, k, rng),
            DMatrix::zeros(k, l),
            DVector::from_element(n, DEFAULT_INIT_PSI),
            DMatrix::from_element(k, l, 1.0),
        )
    }

    /// Check that `x` is `n x l` for this model
    pub fn check_data(&self, x: &DMatrix<f32>) -> anyhow::Result<()> {
        let expected = (self.num_features(), self.num_samples());
        if x.shape() != expected {
            anyhow::bail!(
                "data must be {} x {} (features x samples), got {:?}",
                expected.0,
                expected.1,
                x.shape()
            );
        }
        Ok(())
    }

    pub fn num_features(&self) -> usize {
        self.loadings.nrows()
    }

    pub fn num_factors(&self) -> usize {
        self.loadings.ncols()
    }

    pub fn num_samples(&self) -> usize {
        self.scores.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn init_shapes() -> anyhow::Result<()> {
        let x = DMatrix::<f32>::zeros(6, 9);
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let model = FabiaModel::init(&x, 2, &mut rng)?;

        assert_eq!(model.loadings.shape(), (6, 2));
        assert_eq!(model.scores.shape(), (2, 9));
        assert_eq!(model.lapla.shape(), (2, 9));
        assert_eq!(model.psi.len(), 6);
        assert!(model.lapla.iter().all(|&v| v == 1.0));
        model.check_data(&x)?;
        assert!(model.check_data(&DMatrix::zeros(9, 6)).is_err());
        Ok(())
    }

    #[test]
    fn mismatched_arrays_are_rejected() {
        let bad = FabiaModel::new(
            DMatrix::zeros(4, 2),
            DMatrix::zeros(2, 5),
            DVector::zeros(4),
            DMatrix::zeros(5, 2),
        );
        assert!(bad.is_err());
    }
}
