use clap::Args;
use fabia::simulate::{simulate_biclusters, BiclusterSimArgs};
use log::info;
use matrix_util::common_io::mkdir_parent;
use matrix_util::traits::IoOps;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// Number of features (rows)
    #[arg(long, default_value_t = 100)]
    features: usize,

    /// Number of samples (columns)
    #[arg(long, default_value_t = 50)]
    samples: usize,

    /// Number of planted biclusters
    #[arg(long, default_value_t = 3)]
    biclusters: usize,

    /// Features per bicluster
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], default_values_t = [5, 20])]
    feature_block: Vec<usize>,

    /// Samples per bicluster
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], default_values_t = [5, 15])]
    sample_block: Vec<usize>,

    /// Standard deviation of the additive noise
    #[arg(long, default_value_t = 0.5)]
    noise: f32,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn block_range(v: &[usize]) -> anyhow::Result<(usize, usize)> {
    match v {
        [lb, ub] => Ok((*lb, *ub)),
        _ => anyhow::bail!("expected MIN MAX, got {:?}", v),
    }
}

pub fn simulate_data(args: &SimulateArgs) -> anyhow::Result<()> {
    let sim_args = BiclusterSimArgs {
        features: args.features,
        samples: args.samples,
        biclusters: args.biclusters,
        feature_block: block_range(&args.feature_block)?,
        sample_block: block_range(&args.sample_block)?,
        noise_sd: args.noise,
        rseed: args.seed,
        ..Default::default()
    };

    let sim = simulate_biclusters(&sim_args)?;

    let out = &args.out;
    mkdir_parent(out)?;

    sim.data.to_tsv(&format!("{}.data.tsv.gz", out))?;
    sim.loadings.to_tsv(&format!("{}.true_loadings.tsv.gz", out))?;
    sim.scores.to_tsv(&format!("{}.true_scores.tsv.gz", out))?;

    for (f, (rows, cols)) in sim
        .feature_members
        .iter()
        .zip(sim.sample_members.iter())
        .enumerate()
    {
        info!("bicluster {}: {} features x {} samples", f, rows.len(), cols.len());
    }

    info!(
        "wrote {}.{{data,true_loadings,true_scores}}.tsv.gz",
        out
    );
    Ok(())
}
