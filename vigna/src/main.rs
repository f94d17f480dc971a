mod fit_pseudotime;
mod simulate_expression;

use crate::fit_pseudotime::*;
use crate::simulate_expression::*;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "VIGNA",
    long_about = "Variational Inference of Gene expressioN Activation\n\
		  Order single cells along a latent pseudotime axis and\n\
		  summarize each gene's switching behaviour.\n\
		  Expression input is a dense TSV (cells x genes), plain or gzipped."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fit the pseudotime model to an expression matrix
    Fit(FitArgs),

    /// Simulate switch-like expression data with a planted pseudotime
    Simulate(SimulateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Fit(args) => {
            run_fit_pseudotime(args.clone())?;
        }
        Commands::Simulate(args) => {
            run_simulate_expression(args.clone())?;
        }
    }

    Ok(())
}
