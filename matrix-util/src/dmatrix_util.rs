use crate::traits::*;
pub use nalgebra::{DMatrix, DVector};
use num_traits::{Float, FromPrimitive};
use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;

impl<T> SampleOps for DMatrix<T>
where
    T: nalgebra::Scalar + Float + Send,
{
    type Mat = Self;
    type Scalar = T;

    fn runif(nrow: usize, ncol: usize) -> Self::Mat {
        let rvec: Vec<T> = (0..(nrow * ncol))
            .into_par_iter()
            .map_init(rand::rng, |rng, _| {
                let x: f32 = rng.random();
                T::from(x).unwrap_or_else(T::zero)
            })
            .collect();
        DMatrix::from_vec(nrow, ncol, rvec)
    }

    fn rnorm_with<R: Rng + ?Sized>(nrow: usize, ncol: usize, rng: &mut R) -> Self::Mat {
        DMatrix::from_fn(nrow, ncol, |_, _| {
            let x: f32 = rng.sample(StandardNormal);
            T::from(x).unwrap_or_else(T::zero)
        })
    }
}

impl<T> MatOps for DMatrix<T>
where
    T: nalgebra::RealField + FromPrimitive + Copy,
{
    type Mat = Self;
    type Vec = DVector<T>;
    type Scalar = T;

    fn centre_rows_inplace(&mut self) {
        if self.ncols() == 0 {
            return;
        }
        let denom = T::from_usize(self.ncols()).unwrap_or_else(T::one);
        let mu: DVector<T> = self.column_sum() / denom;
        for mut x_j in self.column_iter_mut() {
            x_j -= &mu;
        }
    }

    fn row_mean_squares(&self) -> Self::Vec {
        let mut ret = DVector::<T>::zeros(self.nrows());
        for x_j in self.column_iter() {
            for (r, &x) in ret.iter_mut().zip(x_j.iter()) {
                *r += x * x;
            }
        }
        if self.ncols() > 0 {
            ret /= T::from_usize(self.ncols()).unwrap_or_else(T::one);
        }
        ret
    }

    fn count_zeros(&self) -> usize {
        self.iter().filter(|&&x| x == T::zero()).count()
    }
}

/// Frobenius norm of `a - b` relative to the norm of `b`
pub fn relative_frobenius_error(a: &DMatrix<f32>, b: &DMatrix<f32>) -> f32 {
    let denom = b.norm().max(f32::EPSILON);
    (a - b).norm() / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    #[test]
    fn centred_rows_have_zero_mean() {
        let mut xx = DMatrix::<f32>::runif(7, 40);
        xx.centre_rows_inplace();
        for row in xx.row_iter() {
            assert_abs_diff_eq!(row.sum() / 40.0, 0.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn mean_squares_by_row() {
        let xx = DMatrix::<f32>::from_row_slice(2, 4, &[1., -1., 1., -1., 2., 0., 2., 0.]);
        let xx2 = xx.row_mean_squares();
        assert_abs_diff_eq!(xx2[0], 1.0);
        assert_abs_diff_eq!(xx2[1], 2.0);
    }

    #[test]
    fn seeded_rnorm_is_reproducible() {
        let mut rng_a = rand::rngs::StdRng::seed_from_u64(7);
        let mut rng_b = rand::rngs::StdRng::seed_from_u64(7);
        let a = DMatrix::<f32>::rnorm_with(5, 3, &mut rng_a);
        let b = DMatrix::<f32>::rnorm_with(5, 3, &mut rng_b);
        assert_eq!(a, b);
    }

    #[test]
    fn relative_error_is_scale_free() {
        let b = DMatrix::<f32>::from_element(3, 3, 2.0);
        let a = &b * 1.01;
        assert_abs_diff_eq!(relative_frobenius_error(&a, &b), 0.01, epsilon = 1e-5);
        assert_abs_diff_eq!(relative_frobenius_error(&(&a * 10.0), &(&b * 10.0)), 0.01, epsilon = 1e-5);
    }
}
