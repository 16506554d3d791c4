use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::{resolve_settings, run_reconciliation};
use crate::error::Result;
use crate::export::export_all;
use crate::fmt::money;
use crate::models::ReconStatus;
use crate::reconciler::Reconciliation;

pub fn run(
    gl: &Path,
    fep: &Path,
    json: bool,
    export_dir: Option<&Path>,
    config: Option<&Path>,
) -> Result<()> {
    let settings = resolve_settings(config)?;
    let rec = run_reconciliation(gl, fep, &settings)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rec)?);
    } else {
        println!("{}", format_summary(&rec, &settings.currency_symbol));
        println!();
        println!("{}", format_matching(&rec, &settings.currency_symbol));
        if !rec.report.gl_not_on_fep.is_empty() {
            println!();
            println!("{}", format_gl_not_on_fep(&rec, &settings.currency_symbol));
        }
        if !rec.report.fep_not_on_gl.is_empty() {
            println!();
            println!("{}", format_fep_not_on_gl(&rec, &settings.currency_symbol));
        }
    }

    if let Some(dir) = export_dir {
        let written = export_all(dir, &rec)?;
        // Keep stdout clean for --json consumers.
        for path in written {
            eprintln!("Wrote {}", path.display());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Pure formatting functions (reconciliation → String)
// ---------------------------------------------------------------------------

pub fn format_summary(rec: &Reconciliation, symbol: &str) -> String {
    let s = &rec.summary;
    let r = &rec.result;
    let mut table = Table::new();
    table.set_header(vec!["", "Amount", "Count"]);
    table.add_row(vec![
        Cell::new("Net load"),
        Cell::new(money(r.net_load, symbol)),
        Cell::new(s.load_count),
    ]);
    table.add_row(vec![
        Cell::new("Net unload"),
        Cell::new(money(r.net_unload, symbol)),
        Cell::new(s.unload_count),
    ]);
    table.add_row(vec![
        Cell::new("GL net movement".bold()),
        Cell::new(money(r.net_load - r.net_unload, symbol)),
        Cell::new(""),
    ]);
    table.add_row(vec![
        Cell::new("FEP withdrawals".bold()),
        Cell::new(money(r.fep_total, symbol)),
        Cell::new(rec.fep_transaction_count),
    ]);

    let status = match r.status {
        ReconStatus::Balanced => r.status.label().green().bold(),
        _ => r.status.label().red().bold(),
    };
    table.add_row(vec![
        Cell::new(status),
        Cell::new(money(r.difference, symbol)),
        Cell::new(""),
    ]);

    let window = format!(
        "Cycle {} to {}",
        s.first_load_datetime.format("%Y-%m-%d %H:%M"),
        s.last_unload_datetime.format("%Y-%m-%d %H:%M")
    );
    let mut out = format!("Cash Cycle\n{window}\n{table}");
    if let Some(e) = &s.excluded_load {
        out.push_str(&format!(
            "\nExcluded load after last unload: {} ({})",
            money(e.amount, symbol),
            e.description
        ));
    }
    if let Some(e) = &s.excluded_unload {
        out.push_str(&format!(
            "\nExcluded unload before first load: {} ({})",
            money(e.amount, symbol),
            e.description
        ));
    }
    out
}

pub fn format_matching(rec: &Reconciliation, symbol: &str) -> String {
    let report = &rec.report;
    let mut table = Table::new();
    table.set_header(vec!["Bucket", "Count", "Amount"]);
    table.add_row(vec![
        Cell::new("Matched"),
        Cell::new(report.matched_count()),
        Cell::new(money(report.matched_amount(), symbol)),
    ]);
    table.add_row(vec![
        Cell::new("GL not on FEP"),
        Cell::new(report.gl_not_on_fep_count()),
        Cell::new(format!(
            "Cr {} / Dr {}",
            money(report.gl_not_on_fep_credit_total, symbol),
            money(report.gl_not_on_fep_debit_total, symbol)
        )),
    ]);
    table.add_row(vec![
        Cell::new("FEP not on GL"),
        Cell::new(report.fep_not_on_gl_count()),
        Cell::new(money(report.fep_not_on_gl_amount(), symbol)),
    ]);
    table.add_row(vec![
        Cell::new("GL found in filtered FEP"),
        Cell::new(report.found_in_filtered_fep.count),
        Cell::new(money(report.found_in_filtered_fep.amount, symbol)),
    ]);
    table.add_row(vec![
        Cell::new("Nilled GL duplicates"),
        Cell::new(report.nilled_duplicates.len()),
        Cell::new(""),
    ]);

    let rate = format!("{:.1}%", report.match_rate());
    let rate = if report.is_fully_matched() {
        rate.green().bold()
    } else if report.match_rate() >= 90.0 {
        rate.yellow().bold()
    } else {
        rate.red().bold()
    };
    format!("Transaction Matching\n{table}\nMatch rate: {rate}")
}

pub fn format_gl_not_on_fep(rec: &Reconciliation, symbol: &str) -> String {
    let mut table = Table::new();
    table.set_header(vec!["Reference", "Description", "Amount"]);
    for t in &rec.report.gl_not_on_fep {
        let amount = if t.amount < 0.0 {
            money(t.amount.abs(), symbol).red().to_string()
        } else {
            money(t.amount, symbol)
        };
        table.add_row(vec![
            Cell::new(&t.reference),
            Cell::new(&t.description),
            Cell::new(amount),
        ]);
    }
    format!("GL Not on FEP\n{table}")
}

pub fn format_fep_not_on_gl(rec: &Reconciliation, symbol: &str) -> String {
    let mut table = Table::new();
    table.set_header(vec!["Reference", "Date", "Amount", "Response"]);
    for r in &rec.report.fep_not_on_gl {
        let date = if r.datetime.is_parsed() {
            r.datetime.at.format("%Y-%m-%d %H:%M").to_string()
        } else {
            String::new()
        };
        table.add_row(vec![
            Cell::new(&r.reference),
            Cell::new(date),
            Cell::new(money(r.amount, symbol)),
            Cell::new(&r.response),
        ]);
    }
    format!("FEP Not on GL\n{table}")
}
