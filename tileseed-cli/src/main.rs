//! tileseed CLI - seed, reseed and truncate tile ranges from the command line.

mod commands;
mod error;

use clap::{Parser, Subcommand};

use commands::config::ConfigArgs;
use commands::run::RunArgs;

#[derive(Parser)]
#[command(name = "tileseed")]
#[command(version = tileseed::VERSION)]
#[command(about = "Schedule tile cache seeding jobs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, dispatch and watch a job against an in-memory demo layer
    Run(RunArgs),
    /// Print the resolved scheduler configuration
    Config(ConfigArgs),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Config(args) => commands::config::run(args),
    };

    if let Err(e) = result {
        e.exit();
    }
}
