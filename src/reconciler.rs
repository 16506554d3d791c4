use serde::Serialize;
use tracing::info;

use crate::cycle::{extract_cycle, GlSheet};
use crate::error::Result;
use crate::matcher::match_transactions;
use crate::models::{
    FilteredRow, LoadUnloadSummary, MatchReport, ReconStatus, ReconciliationResult, TOLERANCE,
};
use crate::pipeline::{FepPipeline, FepSheet};
use crate::settings::Keywords;

/// Cycle-level check: GL net cash movement against FEP withdrawals.
pub fn assemble(summary: &LoadUnloadSummary, fep_total: f64) -> ReconciliationResult {
    let gl_net = summary.net_load - summary.net_unload;
    let difference = gl_net - fep_total;
    let status = if difference.abs() < TOLERANCE {
        ReconStatus::Balanced
    } else if difference > 0.0 {
        ReconStatus::GlMissing
    } else {
        ReconStatus::FepMissing
    };
    ReconciliationResult {
        net_load: summary.net_load,
        net_unload: summary.net_unload,
        fep_total,
        difference,
        status,
    }
}

/// Everything one GL/FEP pair produces. The cycle-level result and the
/// transaction-level report are computed independently and may disagree.
#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub gl_header: Vec<String>,
    pub fep_header: Vec<String>,
    pub summary: LoadUnloadSummary,
    pub result: ReconciliationResult,
    pub report: MatchReport,
    pub fep_transaction_count: usize,
    pub filtered_out: Vec<FilteredRow>,
}

/// Reconcile already-read GL and FEP rows (title rows included).
pub fn reconcile(gl_rows: &[Vec<String>], fep_rows: &[Vec<String>], kw: &Keywords) -> Result<Reconciliation> {
    let gl = GlSheet::from_rows(gl_rows, kw)?;
    let summary = extract_cycle(&gl, kw)?;

    let fep = FepSheet::from_rows(fep_rows, kw)?;
    let window = (summary.first_load_datetime, summary.last_unload_datetime);
    let pipeline = FepPipeline::run(&fep, window, kw)?;

    let result = assemble(&summary, pipeline.total_amount());
    info!(
        status = result.status.label(),
        difference = result.difference,
        "cycle reconciliation"
    );

    let report = match_transactions(&gl, pipeline.rows(), pipeline.filtered_out(), kw);

    Ok(Reconciliation {
        gl_header: gl.header,
        fep_header: fep.header,
        summary,
        result,
        report,
        fep_transaction_count: pipeline.transaction_count(),
        filtered_out: pipeline.filtered_out().to_vec(),
    })
}
