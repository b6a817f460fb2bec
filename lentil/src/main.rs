mod cluster;
mod common_io;
mod density;
mod expr_data;
mod map_common;
mod map_input;
mod map_result;
mod preprocess;
mod run_map;
mod run_sim;

use run_map::*;
use run_sim::*;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "LENTIL",
    long_about = "Learning Expression-to-Niche Transfer by Iterative aLignment\n\
		  Align single-cell expression profiles onto spatial spots by\n\
		  training a probabilistic cell-to-spot mapping matrix.\n\
		  Expression tables are delimited text (optionally gzipped),\n\
		  observations in rows and genes in columns."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Map cells (or cell clusters) onto spatial spots",
        long_about = "Learn a cell-by-spot probability matrix in three stages:\n\
		      (1) Intersect gene sets and prepare density priors\n\
		      (2) Minimize the mapping objective by gradient descent\n\
		      (3) Report per-gene similarity scores and diagnostics.\n"
    )]
    Map(MapArgs),

    /// Simulate a paired single-cell and spatial dataset
    Simulate(SimArgs),
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Map(args) => {
            run_map(args)?;
        }
        Commands::Simulate(args) => {
            run_sim(args)?;
        }
    }

    Ok(())
}
