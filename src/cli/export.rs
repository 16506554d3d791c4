use std::path::Path;

use crate::cli::{resolve_settings, run_reconciliation};
use crate::error::Result;
use crate::export::export_all;

pub fn run(gl: &Path, fep: &Path, output_dir: &Path, config: Option<&Path>) -> Result<()> {
    let settings = resolve_settings(config)?;
    let rec = run_reconciliation(gl, fep, &settings)?;
    for path in export_all(output_dir, &rec)? {
        println!("Wrote {}", path.display());
    }
    Ok(())
}
