//! M-step: loadings, shrinkage, noise variances, rescaling and reset.

use crate::options::MACHINE_EPS;
use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;

/// Invert a symmetric positive-definite matrix through its Cholesky
/// factor, writing the symmetric inverse into `inv`.
///
/// `a` is overwritten with its lower Cholesky factor. If `a` is not
/// positive definite an error is returned and `a` is left empty.
pub fn invert_spd_into(a: &mut DMatrix<f32>, inv: &mut DMatrix<f32>) -> anyhow::Result<()> {
    let k = a.nrows();
    debug_assert_eq!(inv.shape(), (k, k));

    let owned = std::mem::replace(a, DMatrix::zeros(0, 0));
    let chol = Cholesky::new(owned)
        .ok_or_else(|| anyhow::anyhow!("{} x {} matrix is not positive definite", k, k))?;

    inv.fill_with_identity();
    chol.solve_mut(inv);
    *a = chol.unpack();

    // lower triangle into the upper
    for j in 0..k {
        for i in (j + 1)..k {
            inv[(j, i)] = inv[(i, j)];
        }
    }
    Ok(())
}

/// `L = sum1 * sum2_inv`
pub fn update_loadings(loadings: &mut DMatrix<f32>, sum1: &DMatrix<f32>, sum2_inv: &DMatrix<f32>) {
    loadings.gemm(1.0, sum1, sum2_inv, 0.0);
}

/// Soft-thresholding rule for one loading `s` of a feature with noise
/// variance `psi_i`. The threshold is `|psi_i * alpha * (eps + |s|)^-spl|`.
#[inline]
pub fn soft_threshold(s: f32, psi_i: f32, alpha: f32, spl: f32, non_negative: bool) -> f32 {
    let sgn = if s > 0.0 {
        1.0
    } else if s < 0.0 {
        -1.0
    } else {
        0.0
    };

    if non_negative && sgn <= 0.0 {
        return 0.0;
    }

    let t = (psi_i * alpha * (MACHINE_EPS + s.abs()).powf(-spl)).abs();
    if s.abs() > t {
        s - sgn * t
    } else {
        0.0
    }
}

/// Apply [`soft_threshold`] to every loading, one column per task
pub fn shrink_loadings(
    pool: &rayon::ThreadPool,
    loadings: &mut DMatrix<f32>,
    psi: &DVector<f32>,
    alpha: f32,
    spl: f32,
    non_negative: bool,
) {
    let n = loadings.nrows();
    let psi = psi.as_slice();
    pool.install(|| {
        loadings
            .as_mut_slice()
            .par_chunks_mut(n)
            .for_each(|l_f| {
                for (l_if, &psi_i) in l_f.iter_mut().zip(psi) {
                    *l_if = soft_threshold(*l_if, psi_i, alpha, spl, non_negative);
                }
            });
    });
}

/// `Psi[i] = max(XX[i] - d[i] / l, eps)` with `d = diag(L * sum1')`.
///
/// Returns `max_i |d[i]|`, the size of the last update.
pub fn update_psi(
    pool: &rayon::ThreadPool,
    loadings: &DMatrix<f32>,
    sum1: &DMatrix<f32>,
    xx: &DVector<f32>,
    num_samples: usize,
    eps: f32,
    psi: &mut DVector<f32>,
) -> f32 {
    let (n, k) = loadings.shape();
    let ll = loadings.as_slice();
    let s1 = sum1.as_slice();
    let denom = num_samples as f32;

    pool.install(|| {
        psi.as_mut_slice()
            .par_iter_mut()
            .zip(xx.as_slice().par_iter())
            .enumerate()
            .map(|(i, (psi_i, &xx_i))| {
                let d: f32 = (0..k).map(|f| ll[i + f * n] * s1[i + f * n]).sum();
                *psi_i = (xx_i - d / denom).max(eps);
                d.abs()
            })
            .reduce(|| 0.0, f32::max)
    })
}

/// Publish the collapsed state: `Psi = eps`, `lapla = eps`
pub fn flatten_collapsed(psi: &mut DVector<f32>, lapla: &mut DMatrix<f32>, eps: f32) {
    psi.fill(eps);
    lapla.fill(eps);
}

/// Scale each loading column to unit mean square and compensate the
/// matching row of `lapla` by `(s^2)^-spz`.
pub fn rescale_factors(loadings: &mut DMatrix<f32>, lapla: &mut DMatrix<f32>, spz: f32) {
    let n = loadings.nrows() as f32;
    for f in 0..loadings.ncols() {
        let mut l_f = loadings.column_mut(f);
        let s = 1.0 / ((l_f.norm_squared() / n).sqrt() + MACHINE_EPS);
        l_f *= s;

        let c = (s * s).powf(-spz);
        for v in lapla.row_mut(f).iter_mut() {
            *v *= c;
        }
    }
}

/// Re-draw every all-zero loading column from `N(0,1)` and set the
/// matching row of `lapla` to 1. Returns the number of columns reset.
pub fn reset_dead_factors<R: Rng + ?Sized>(
    loadings: &mut DMatrix<f32>,
    lapla: &mut DMatrix<f32>,
    rng: &mut R,
) -> usize {
    let mut nreset = 0;
    for f in 0..loadings.ncols() {
        if loadings.column(f).iter().any(|&v| v != 0.0) {
            continue;
        }
        nreset += 1;
        for v in loadings.column_mut(f).iter_mut() {
            *v = rng.sample(StandardNormal);
        }
        lapla.row_mut(f).fill(1.0);
    }
    nreset
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use matrix_util::traits::SampleOps;
    use rand::SeedableRng;

    fn pool(n: usize) -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .expect("pool")
    }

    #[test]
    fn spd_inverse_is_symmetric() -> anyhow::Result<()> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let b = DMatrix::<f32>::rnorm_with(6, 4, &mut rng);
        let mut a = b.transpose() * &b;
        for i in 0..4 {
            a[(i, i)] += 1e-3;
        }
        let a0 = a.clone();
        let mut inv = DMatrix::zeros(4, 4);

        invert_spd_into(&mut a, &mut inv)?;

        for i in 0..4 {
            for j in 0..4 {
                assert!((inv[(i, j)] - inv[(j, i)]).abs() < 1e-5);
            }
        }
        let eye = &a0 * &inv;
        assert_abs_diff_eq!(eye, DMatrix::identity(4, 4), epsilon = 1e-3);
        Ok(())
    }

    #[test]
    fn indefinite_matrix_is_an_error() {
        let mut a = DMatrix::<f32>::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        let mut inv = DMatrix::zeros(2, 2);
        assert!(invert_spd_into(&mut a, &mut inv).is_err());
    }

    #[test]
    fn soft_threshold_law() {
        let (psi_i, alpha, spl) = (0.5, 0.2, 0.5);
        for &s in &[-3.0f32, -0.4, -0.01, 0.0, 0.02, 0.3, 2.5] {
            let t = (psi_i * alpha * (MACHINE_EPS + s.abs()).powf(-spl)).abs();
            let out = soft_threshold(s, psi_i, alpha, spl, false);
            if out != 0.0 {
                assert_relative_eq!(s.abs() - out.abs(), t, max_relative = 1e-5);
                assert_eq!(out.signum(), s.signum());
            } else {
                assert!(s.abs() <= t);
            }
        }
    }

    #[test]
    fn non_negative_drops_negative_loadings() {
        assert_eq!(soft_threshold(-2.0, 0.1, 0.01, 0.0, true), 0.0);
        assert!(soft_threshold(2.0, 0.1, 0.01, 0.0, true) > 0.0);
    }

    #[test]
    fn strong_shrinkage_zeroes_everything_and_resets_every_factor() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(13);
        let (n, k, l) = (10, 3, 7);
        let mut loadings = DMatrix::<f32>::rnorm_with(n, k, &mut rng);
        let psi = DVector::from_element(n, 1.0);
        let mut lapla = DMatrix::from_element(k, l, 0.3);

        shrink_loadings(&pool(2), &mut loadings, &psi, 1e3, 0.5, false);
        assert!(loadings.iter().all(|&v| v == 0.0));

        let nreset = reset_dead_factors(&mut loadings, &mut lapla, &mut rng);
        assert_eq!(nreset, k);
        for f in 0..k {
            assert!(loadings.column(f).iter().any(|&v| v != 0.0));
        }
        assert!(lapla.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn psi_is_floored_and_reports_largest_update() {
        let (n, k) = (3, 2);
        let loadings = DMatrix::from_row_slice(n, k, &[1.0, 0.0, 0.5, 0.5, 0.0, 0.0]);
        let sum1 = DMatrix::from_row_slice(n, k, &[4.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        let xx = DVector::from_vec(vec![2.0, 0.1, 1.0]);
        let mut psi = DVector::zeros(n);

        let t = update_psi(&pool(2), &loadings, &sum1, &xx, 4, 1e-3, &mut psi);

        // d = (4, 2, 0)
        assert_abs_diff_eq!(t, 4.0);
        assert_abs_diff_eq!(psi[0], 1.0);
        assert_abs_diff_eq!(psi[1], 1e-3);
        assert_abs_diff_eq!(psi[2], 1.0);
    }

    #[test]
    fn rescale_gives_unit_mean_square() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(17);
        let (n, k, l) = (20, 3, 5);
        let mut loadings = DMatrix::<f32>::rnorm_with(n, k, &mut rng) * 4.0;
        let before = loadings.clone();
        let mut lapla = DMatrix::from_element(k, l, 2.0);
        let spz = 0.5;

        rescale_factors(&mut loadings, &mut lapla, spz);

        for f in 0..k {
            let ms = loadings.column(f).norm_squared() / n as f32;
            assert_abs_diff_eq!(ms, 1.0, epsilon = 1e-4);

            let s = loadings[(0, f)] / before[(0, f)];
            let c = (s * s).powf(-spz);
            for j in 0..l {
                assert_relative_eq!(lapla[(f, j)], 2.0 * c, max_relative = 1e-4);
            }
        }
    }

    #[test]
    fn loadings_solve_the_normal_equations() -> anyhow::Result<()> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(19);
        let sum1 = DMatrix::<f32>::rnorm_with(5, 2, &mut rng);
        let mut sum2 = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
        let sum2_0 = sum2.clone();
        let mut inv = DMatrix::zeros(2, 2);
        invert_spd_into(&mut sum2, &mut inv)?;

        let mut loadings = DMatrix::zeros(5, 2);
        update_loadings(&mut loadings, &sum1, &inv);

        assert_abs_diff_eq!(&loadings * &sum2_0, sum1, epsilon = 1e-4);
        Ok(())
    }
}
