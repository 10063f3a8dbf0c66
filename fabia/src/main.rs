mod fit_fabia;
mod sim_fabia;

use fit_fabia::*;
use sim_fabia::*;

use clap::{Parser, Subcommand};
use log::info;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "FABIA",
    long_about = "Factor Analysis for Bicluster Acquisition\n\
		  Sparse factor model X = L Z + noise fitted by variational EM.\n\
		  Data files are delimited text (optionally `.gz`),\n\
		  rows = features, columns = samples."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Fit a sparse factor model to find biclusters",
        long_about = "Estimate loadings L, factors Z and noise variances Psi:\n\
		      (1) E-step: posterior of each sample's factors in parallel\n\
		      (2) M-step: loadings with soft-thresholding, then Psi\n\
		      (3) Reset factors whose loadings vanished.\n"
    )]
    Fit(FitArgs),

    /// Simulate data with planted biclusters
    Simulate(SimulateArgs),
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match &cli.commands {
        Commands::Fit(args) => {
            fit_fabia(args)?;
        }
        Commands::Simulate(args) => {
            simulate_data(args)?;
        }
    }

    info!("Done");
    Ok(())
}
