mod commands;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gigaview", about = "Tiled viewer for very large images")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show image dimensions and the tile levels used to view it
    Info(commands::info::InfoArgs),
    /// Print the tile grid for one viewport state
    Grid(commands::grid::GridArgs),
    /// Drive the viewer headlessly and save the composited frame
    Render(commands::render::RenderArgs),
    /// Convert an image file to a memory-mappable raster
    Convert(commands::convert::ConvertArgs),
    /// Write a synthetic test raster of any size
    Synth(commands::synth::SynthArgs),
    /// Print the default viewer config as TOML
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Grid(args) => commands::grid::run(args),
        Commands::Render(args) => commands::render::run(args),
        Commands::Convert(args) => commands::convert::run(args),
        Commands::Synth(args) => commands::synth::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
