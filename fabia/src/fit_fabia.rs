use clap::Args;
use fabia::{Fabia, FabiaModel, FabiaOptions, FitObserver, FitSnapshot, FitStatus};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use matrix_util::common_io::mkdir_parent;
use matrix_util::traits::{IoOps, MatOps};
use nalgebra::DMatrix;
use rand::SeedableRng;

#[derive(Args, Debug)]
pub struct FitArgs {
    /// Data file (features x samples; tab, space or comma separated)
    #[arg(required = true)]
    data_file: Box<str>,

    /// Number of factors (biclusters)
    #[arg(short = 'k', long, default_value_t = 5)]
    factors: usize,

    /// Output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// EM iterations
    #[arg(long, default_value_t = 500)]
    cyc: usize,

    /// Sparseness of the loadings
    #[arg(long, default_value_t = 0.01)]
    alpha: f32,

    /// Lower bound for the noise variances
    #[arg(long, default_value_t = 1e-3)]
    eps: f32,

    /// Sparseness prior on the loadings
    #[arg(long, default_value_t = 0.0)]
    spl: f32,

    /// Sparseness prior on the factors
    #[arg(long, default_value_t = 0.5)]
    spz: f32,

    /// Rescale loadings to unit mean square after each iteration
    #[arg(long, default_value_t = false)]
    scale: bool,

    /// Lower bound for the variational parameters
    #[arg(long, default_value_t = 1.0)]
    lap: f32,

    /// Report progress every `N` iterations (0: never)
    #[arg(long, short, default_value_t = 0)]
    verbose: usize,

    /// Number of threads (default: all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Random seed for initialization and factor resets
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Subtract each feature's mean before fitting
    #[arg(long, default_value_t = false)]
    center: bool,

    /// Number of header lines to skip
    #[arg(long, default_value_t = 0)]
    skip_header: usize,
}

impl FitArgs {
    fn options(&self) -> FabiaOptions {
        let default = FabiaOptions::default();
        FabiaOptions {
            cyc: self.cyc,
            alpha: self.alpha,
            eps: self.eps,
            spl: self.spl,
            spz: self.spz,
            scale: self.scale,
            lap: self.lap,
            verbose: self.verbose,
            nthreads: self.threads.unwrap_or(default.nthreads),
            ..default
        }
    }
}

/// Progress bar over EM iterations, advanced every `verbose` iterations
struct BarObserver {
    pb: ProgressBar,
}

impl BarObserver {
    fn new(cyc: usize, verbose: usize) -> anyhow::Result<Self> {
        if verbose == 0 {
            return Ok(BarObserver {
                pb: ProgressBar::hidden(),
            });
        }
        let pb = ProgressBar::new(cyc as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>5}/{len:5} iterations {msg}",
            )?
            .progress_chars("##-"),
        );
        Ok(BarObserver { pb })
    }
}

impl FitObserver for BarObserver {
    fn on_update(&mut self, s: &FitSnapshot<'_>) {
        self.pb.set_position(s.iter as u64);
        self.pb.set_message(format!(
            "mean psi {:.4}, zero loadings {:.1}%",
            s.mean_psi(),
            100.0 * s.loading_sparsity()
        ));
    }
}

pub fn fit_fabia(args: &FitArgs) -> anyhow::Result<()> {
    // 1. Read data
    let mut x = DMatrix::<f32>::read_file_delim(
        &args.data_file,
        &['\t', ' ', ','],
        Some(args.skip_header),
    )?;
    info!("Read {} features x {} samples", x.nrows(), x.ncols());

    if args.center {
        x.centre_rows_inplace();
    }

    // 2. Fit
    let options = args.options();
    let mut rng = rand::rngs::StdRng::seed_from_u64(args.seed);
    let mut model = FabiaModel::init(&x, args.factors, &mut rng)?;

    let mut bar = BarObserver::new(options.cyc, options.verbose)?;
    let summary = Fabia::new(options).fit_with_observer(&x, &mut model, &mut rng, &mut bar)?;
    bar.pb.finish_and_clear();

    match summary.status {
        FitStatus::Completed => {
            info!(
                "{} iterations, {} factor resets",
                summary.iterations, summary.resets
            );
        }
        FitStatus::Collapsed {
            iteration,
            last_update,
        } => {
            warn!(
                "collapsed at iteration {} (last update {}); scores are zero",
                iteration, last_update
            );
        }
    }

    // 3. Write
    let out = &args.out;
    mkdir_parent(out)?;

    let psi = DMatrix::from_column_slice(model.psi.len(), 1, model.psi.as_slice());
    model.loadings.to_tsv(&format!("{}.loadings.tsv.gz", out))?;
    model.scores.to_tsv(&format!("{}.scores.tsv.gz", out))?;
    psi.to_tsv(&format!("{}.psi.tsv.gz", out))?;
    model.lapla.to_tsv(&format!("{}.lapla.tsv.gz", out))?;

    info!("wrote {}.{{loadings,scores,psi,lapla}}.tsv.gz", out);
    Ok(())
}
