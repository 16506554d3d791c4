mod cli;
mod columns;
mod cycle;
mod dates;
mod error;
mod export;
mod fmt;
mod importer;
mod matcher;
mod models;
mod pipeline;
mod reconciler;
mod reference;
mod settings;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, ConfigCommands};

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Reconcile {
            gl,
            fep,
            json,
            export_dir,
        } => cli::reconcile::run(&gl, &fep, json, export_dir.as_deref(), config),
        Commands::Export {
            gl,
            fep,
            output_dir,
        } => cli::export::run(&gl, &fep, &output_dir, config),
        Commands::Config { command } => match command {
            ConfigCommands::Init { force } => cli::config::init(config, force),
            ConfigCommands::Show => cli::config::show(config),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
