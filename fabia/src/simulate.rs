//! Synthetic data with planted biclusters.

use log::info;
use nalgebra::DMatrix;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Uniform};

pub struct BiclusterSimArgs {
    pub features: usize,
    pub samples: usize,
    pub biclusters: usize,
    /// Inclusive range of features per bicluster
    pub feature_block: (usize, usize),
    /// Inclusive range of samples per bicluster
    pub sample_block: (usize, usize),
    pub loading_mean: f32,
    pub loading_sd: f32,
    pub score_mean: f32,
    pub score_sd: f32,
    pub noise_sd: f32,
    pub rseed: u64,
}

impl Default for BiclusterSimArgs {
    fn default() -> Self {
        BiclusterSimArgs {
            features: 100,
            samples: 50,
            biclusters: 3,
            feature_block: (5, 20),
            sample_block: (5, 15),
            loading_mean: 2.0,
            loading_sd: 0.5,
            score_mean: 2.0,
            score_sd: 0.5,
            noise_sd: 0.5,
            rseed: 42,
        }
    }
}

pub struct BiclusterSimOut {
    /// n x l
    pub data: DMatrix<f32>,
    /// n x k, zero outside each bicluster's features
    pub loadings: DMatrix<f32>,
    /// k x l, zero outside each bicluster's samples
    pub scores: DMatrix<f32>,
    /// sorted feature indices of each bicluster
    pub feature_members: Vec<Vec<usize>>,
    /// sorted sample indices of each bicluster
    pub sample_members: Vec<Vec<usize>>,
}

fn check_block(name: &str, (lb, ub): (usize, usize), total: usize) -> anyhow::Result<()> {
    if lb == 0 || lb > ub || ub > total {
        anyhow::bail!(
            "{} block size range [{}, {}] must satisfy 1 <= min <= max <= {}",
            name,
            lb,
            ub,
            total
        );
    }
    Ok(())
}

/// Draw a sorted random subset whose size is uniform on `block`
fn sample_members<R: Rng + ?Sized>(
    rng: &mut R,
    total: usize,
    block: (usize, usize),
) -> anyhow::Result<Vec<usize>> {
    let size = Uniform::new_inclusive(block.0, block.1)?.sample(rng);
    let mut members = index::sample(rng, total, size).into_vec();
    members.sort_unstable();
    Ok(members)
}

/// Generate `X = L Z + E` with `k` planted biclusters.
///
/// ```text
/// L(i,f) = s_f |a|,  a ~ N(loading_mean, loading_sd^2), i in I_f
/// Z(f,j) = s_f |b|,  b ~ N(score_mean, score_sd^2),     j in J_f
/// E(i,j) ~ N(0, noise_sd^2)
/// ```
///
/// where `s_f` is a random sign per bicluster and `I_f`, `J_f` are
/// random subsets of features and samples.
pub fn simulate_biclusters(args: &BiclusterSimArgs) -> anyhow::Result<BiclusterSimOut> {
    let (nn, ll, kk) = (args.features, args.samples, args.biclusters);

    if nn == 0 || ll == 0 || kk == 0 {
        anyhow::bail!(
            "need features, samples and biclusters > 0, got {}, {}, {}",
            nn,
            ll,
            kk
        );
    }
    check_block("feature", args.feature_block, nn)?;
    check_block("sample", args.sample_block, ll)?;

    let mut rng = rand::rngs::StdRng::seed_from_u64(args.rseed);

    let loading_dist = Normal::new(args.loading_mean, args.loading_sd)?;
    let score_dist = Normal::new(args.score_mean, args.score_sd)?;

    let mut loadings = DMatrix::<f32>::zeros(nn, kk);
    let mut scores = DMatrix::<f32>::zeros(kk, ll);
    let mut feature_members = Vec::with_capacity(kk);
    let mut sample_members_out = Vec::with_capacity(kk);

    for f in 0..kk {
        let rows = sample_members(&mut rng, nn, args.feature_block)?;
        let cols = sample_members(&mut rng, ll, args.sample_block)?;
        let sign: f32 = if rng.random::<bool>() { 1.0 } else { -1.0 };

        for &i in rows.iter() {
            loadings[(i, f)] = sign * loading_dist.sample(&mut rng).abs().max(f32::EPSILON);
        }
        for &j in cols.iter() {
            scores[(f, j)] = sign * score_dist.sample(&mut rng).abs().max(f32::EPSILON);
        }

        feature_members.push(rows);
        sample_members_out.push(cols);
    }

    let mut data = &loadings * &scores;
    if args.noise_sd > 0.0 {
        let noise = Normal::new(0.0, args.noise_sd)?;
        data.iter_mut().for_each(|x| *x += noise.sample(&mut rng));
    }

    info!("simulated {} x {} data with {} biclusters", nn, ll, kk);

    Ok(BiclusterSimOut {
        data,
        loadings,
        scores,
        feature_members,
        sample_members: sample_members_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn noiseless_data_is_the_product() -> anyhow::Result<()> {
        let args = BiclusterSimArgs {
            noise_sd: 0.0,
            ..Default::default()
        };
        let sim = simulate_biclusters(&args)?;
        assert_abs_diff_eq!(sim.data, &sim.loadings * &sim.scores, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn support_matches_membership() -> anyhow::Result<()> {
        let args = BiclusterSimArgs::default();
        let sim = simulate_biclusters(&args)?;

        for f in 0..args.biclusters {
            let rows = &sim.feature_members[f];
            let cols = &sim.sample_members[f];
            assert!(rows.len() >= args.feature_block.0 && rows.len() <= args.feature_block.1);
            assert!(cols.len() >= args.sample_block.0 && cols.len() <= args.sample_block.1);

            for i in 0..args.features {
                assert_eq!(sim.loadings[(i, f)] != 0.0, rows.binary_search(&i).is_ok());
            }
            for j in 0..args.samples {
                assert_eq!(sim.scores[(f, j)] != 0.0, cols.binary_search(&j).is_ok());
            }
        }
        Ok(())
    }

    #[test]
    fn same_seed_same_data() -> anyhow::Result<()> {
        let a = simulate_biclusters(&BiclusterSimArgs::default())?;
        let b = simulate_biclusters(&BiclusterSimArgs::default())?;
        assert_eq!(a.data, b.data);
        Ok(())
    }

    #[test]
    fn oversized_block_is_rejected() {
        let args = BiclusterSimArgs {
            features: 10,
            feature_block: (5, 20),
            ..Default::default()
        };
        assert!(simulate_biclusters(&args).is_err());
    }
}
