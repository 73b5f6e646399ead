//! audren CLI - drive the emulated audio renderer from the command line.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "audren")]
#[command(author, version, about = "Emulated audio renderer CLI", long_about = None)]
struct Cli {
    /// Renderer config file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a sine voice through a session and write a WAV file
    Render(commands::render::RenderArgs),

    /// List the output devices a revision exposes
    Devices(commands::devices::DevicesArgs),

    /// Show which features a revision enables
    Features(commands::features::FeaturesArgs),

    /// Show, create or validate the renderer config file
    Config(commands::config::ConfigArgs),
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
    tracing_log::LogTracer::init().ok();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Render(args) => commands::render::run(args, config),
        Commands::Devices(args) => commands::devices::run(args, config),
        Commands::Features(args) => commands::features::run(args, config),
        Commands::Config(args) => commands::config::run(args, config),
    }
}
