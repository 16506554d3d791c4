use std::path::Path;

use crate::cli::resolve_settings;
use crate::error::{ReconError, Result};
use crate::settings::{save_settings, settings_path, Settings};

pub fn init(config: Option<&Path>, force: bool) -> Result<()> {
    let path = config.map(Path::to_path_buf).unwrap_or_else(settings_path);
    if path.exists() && !force {
        return Err(ReconError::Settings(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    save_settings(&Settings::default(), &path)?;
    println!("Wrote default settings to {}", path.display());
    Ok(())
}

pub fn show(config: Option<&Path>) -> Result<()> {
    let path = config.map(Path::to_path_buf).unwrap_or_else(settings_path);
    let settings = resolve_settings(config)?;
    if path.exists() {
        eprintln!("Settings: {}", path.display());
    } else {
        eprintln!("Settings: {} (not found, using defaults)", path.display());
    }
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
