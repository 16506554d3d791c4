//! CSV extracts of the match buckets.
//!
//! Lines found only among filtered-out FEP rows are deliberately absent: they
//! are not missing, just excluded upstream.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::fmt::plain;
use crate::models::{GlTransaction, MatchReport};
use crate::reconciler::Reconciliation;

fn date_text(t: &GlTransaction) -> String {
    if t.datetime.is_parsed() {
        t.datetime.at.format("%Y-%m-%d %H:%M").to_string()
    } else {
        t.date_raw.clone()
    }
}

pub fn write_matched<W: Write>(out: W, report: &MatchReport) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record([
        "Reference",
        "GL Date",
        "GL Description",
        "GL Credit",
        "GL Debit",
        "FEP Reference",
        "FEP Amount",
        "FEP Date",
        "FEP Response",
    ])?;
    for m in &report.matched {
        let fep_date = if m.fep.datetime.is_parsed() {
            m.fep.datetime.at.format("%Y-%m-%d %H:%M:%S").to_string()
        } else {
            String::new()
        };
        w.write_record([
            m.reference.clone(),
            date_text(&m.gl),
            m.gl.description.clone(),
            m.gl.credit_raw.clone(),
            m.gl.debit_raw.clone(),
            m.fep.reference_raw.clone(),
            plain(m.fep.amount),
            fep_date,
            m.fep.response.clone(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_gl_not_on_fep<W: Write>(out: W, report: &MatchReport) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record(["Reference", "Date", "Description", "Credit", "Debit", "Amount"])?;
    for t in &report.gl_not_on_fep {
        w.write_record([
            t.reference_raw.clone(),
            date_text(t),
            t.description.clone(),
            t.credit_raw.clone(),
            t.debit_raw.clone(),
            plain(t.amount),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// FEP-only rows are written back with their original header and cells.
pub fn write_fep_not_on_gl<W: Write>(out: W, fep_header: &[String], report: &MatchReport) -> Result<()> {
    let mut w = csv::WriterBuilder::new().flexible(true).from_writer(out);
    w.write_record(fep_header)?;
    for row in &report.fep_not_on_gl {
        w.write_record(&row.cells)?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_nilled<W: Write>(out: W, report: &MatchReport) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record(["Reference", "Date", "Description", "Credit", "Debit", "Reversal"])?;
    for t in &report.nilled_duplicates {
        w.write_record([
            t.reference_raw.clone(),
            date_text(t),
            t.description.clone(),
            t.credit_raw.clone(),
            t.debit_raw.clone(),
            if t.is_reversal { "yes" } else { "no" }.to_string(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// Write all four extracts into `dir`, returning the paths written.
pub fn export_all(dir: &Path, rec: &Reconciliation) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let report = &rec.report;
    let open = |name: &str| -> Result<(PathBuf, std::fs::File)> {
        let path = dir.join(name);
        let file = std::fs::File::create(&path)?;
        Ok((path, file))
    };

    let mut written = Vec::new();
    let (path, file) = open("matched.csv")?;
    write_matched(file, report)?;
    written.push(path);

    let (path, file) = open("gl_not_on_fep.csv")?;
    write_gl_not_on_fep(file, report)?;
    written.push(path);

    let (path, file) = open("fep_not_on_gl.csv")?;
    write_fep_not_on_gl(file, &rec.fep_header, report)?;
    written.push(path);

    let (path, file) = open("nilled_gl_duplicates.csv")?;
    write_nilled(file, report)?;
    written.push(path);

    info!(dir = %dir.display(), files = written.len(), "wrote extracts");
    Ok(written)
}
