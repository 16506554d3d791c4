pub mod config;
pub mod export;
pub mod reconcile;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use crate::error::Result;
use crate::importer::read_rows;
use crate::reconciler::{self, Reconciliation};
use crate::settings::{load_settings, load_settings_from, Settings};

#[derive(Parser)]
#[command(
    name = "atm-recon",
    version,
    about = "Reconcile an ATM cash cycle: GL load/unload exports against FEP withdrawal exports."
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Settings file (default: ~/.config/atm-recon/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile a GL export against a FEP export and print the result.
    Reconcile {
        /// GL export (CSV or XLSX)
        gl: PathBuf,
        /// FEP export (CSV or XLSX)
        fep: PathBuf,
        /// Print the full result as JSON instead of tables
        #[arg(long)]
        json: bool,
        /// Also write CSV extracts into this directory
        #[arg(long = "export-dir")]
        export_dir: Option<PathBuf>,
    },
    /// Write CSV extracts of matched and unmatched lines.
    Export {
        /// GL export (CSV or XLSX)
        gl: PathBuf,
        /// FEP export (CSV or XLSX)
        fep: PathBuf,
        /// Output directory (default: current directory)
        #[arg(long = "output-dir", default_value = ".")]
        output_dir: PathBuf,
    },
    /// Manage settings.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a settings file populated with the defaults.
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective settings as JSON.
    Show,
}

/// Settings from an explicit file (which must parse), else the default
/// location with fallback to built-in defaults.
pub(crate) fn resolve_settings(config: Option<&Path>) -> Result<Settings> {
    match config {
        Some(path) => load_settings_from(path),
        None => Ok(load_settings()),
    }
}

/// Read both files and run the reconciliation.
pub(crate) fn run_reconciliation(gl: &Path, fep: &Path, settings: &Settings) -> Result<Reconciliation> {
    let gl_rows = read_rows(gl, settings.max_file_bytes)?;
    let fep_rows = read_rows(fep, settings.max_file_bytes)?;
    info!(
        gl = %gl.display(),
        gl_rows = gl_rows.len(),
        fep = %fep.display(),
        fep_rows = fep_rows.len(),
        "read input files"
    );
    reconciler::reconcile(&gl_rows, &fep_rows, &settings.keywords)
}
