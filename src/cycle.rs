//! Load/unload cycle extraction from the General Ledger export.

use tracing::{debug, info};

use crate::columns::{cell, find_header_row, GlColumns};
use crate::dates::gl_datetime;
use crate::error::{ReconError, Result};
use crate::importer::parse_amount;
use crate::models::{EntryKind, GlEntry, LoadUnloadSummary};
use crate::settings::Keywords;

/// GL data rows below the located header, with resolved columns.
#[derive(Debug, Clone)]
pub struct GlSheet {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub columns: GlColumns,
}

impl GlSheet {
    pub fn from_rows(raw: &[Vec<String>], kw: &Keywords) -> Result<Self> {
        let header_idx = find_header_row(raw, &kw.gl_header, &kw.gl_header_required)
            .ok_or_else(|| ReconError::HeaderNotFound {
                dataset: "GL".to_string(),
                expected: format!(
                    "one of {} and {}",
                    kw.gl_header.join("/"),
                    kw.gl_header_required.join(" and ")
                ),
            })?;
        let header = raw[header_idx].clone();
        let columns = GlColumns::resolve(&header, kw)?;
        info!(header_row = header_idx, rows = raw.len() - header_idx - 1, "located GL header");
        Ok(Self {
            header,
            rows: raw[header_idx + 1..].to_vec(),
            columns,
        })
    }

    pub fn description<'a>(&self, row: &'a [String]) -> &'a str {
        cell(row, Some(self.columns.description))
    }
}

pub fn is_reversal(description_lower: &str, kw: &Keywords) -> bool {
    kw.reversal
        .iter()
        .any(|k| description_lower.contains(&k.to_lowercase()))
}

/// Load, unload, or neither. "unload" contains "load", so it is checked first.
pub fn classify(description_lower: &str, kw: &Keywords) -> Option<EntryKind> {
    if description_lower.contains(&kw.unload.to_lowercase()) {
        Some(EntryKind::Unload)
    } else if description_lower.contains(&kw.load.to_lowercase()) {
        Some(EntryKind::Load)
    } else {
        None
    }
}

fn scan_entries(sheet: &GlSheet, kw: &Keywords) -> Vec<GlEntry> {
    let cols = &sheet.columns;
    let mut entries = Vec::new();
    for (row_index, row) in sheet.rows.iter().enumerate() {
        let description = sheet.description(row);
        if description.is_empty() {
            continue;
        }
        let lower = description.to_lowercase();
        let Some(kind) = classify(&lower, kw) else {
            continue;
        };
        let amount_col = match kind {
            EntryKind::Load => cols.debit,
            EntryKind::Unload => cols.credit,
        };
        entries.push(GlEntry {
            row_index,
            kind,
            amount: parse_amount(cell(row, amount_col)).abs(),
            datetime: gl_datetime(description, cell(row, cols.date), &kw.date_formats),
            is_reversal: is_reversal(&lower, kw),
            description: description.to_string(),
        });
    }
    entries
}

fn total(entries: &[GlEntry]) -> f64 {
    entries.iter().map(|e| e.amount).sum()
}

/// Scan the GL for the cycle's loads and unloads.
///
/// The date window spans every load/unload line, reversals included, and is
/// fixed before boundary trimming. Trimming then drops at most one unload
/// that precedes the first load (left over from the previous cycle) and at
/// most one load that follows the last unload (belongs to the next cycle);
/// both conditions are judged on the untrimmed lists.
pub fn extract_cycle(sheet: &GlSheet, kw: &Keywords) -> Result<LoadUnloadSummary> {
    let entries = scan_entries(sheet, kw);

    let first_load_datetime = entries.iter().map(|e| e.datetime.at).min();
    let last_unload_datetime = entries.iter().map(|e| e.datetime.at).max();

    let mut loads = Vec::new();
    let mut unloads = Vec::new();
    let mut load_reversals = Vec::new();
    let mut unload_reversals = Vec::new();
    for entry in entries {
        match (entry.kind, entry.is_reversal) {
            (EntryKind::Load, false) => loads.push(entry),
            (EntryKind::Load, true) => load_reversals.push(entry),
            (EntryKind::Unload, false) => unloads.push(entry),
            (EntryKind::Unload, true) => unload_reversals.push(entry),
        }
    }

    if loads.is_empty() && load_reversals.is_empty() {
        return Err(ReconError::NoLoads);
    }
    if unloads.is_empty() && unload_reversals.is_empty() {
        return Err(ReconError::NoUnloads);
    }
    let (Some(first_load_datetime), Some(last_unload_datetime)) =
        (first_load_datetime, last_unload_datetime)
    else {
        return Err(ReconError::NoLoads);
    };

    loads.sort_by_key(|e| e.datetime.at);
    unloads.sort_by_key(|e| e.datetime.at);

    let drop_unload = match (unloads.first(), loads.first()) {
        (Some(u), Some(l)) => u.datetime.at < l.datetime.at,
        _ => false,
    };
    let drop_load = match (loads.last(), unloads.last()) {
        (Some(l), Some(u)) => l.datetime.at > u.datetime.at,
        _ => false,
    };
    let excluded_unload = drop_unload.then(|| unloads.remove(0));
    let excluded_load = if drop_load { loads.pop() } else { None };

    if let Some(e) = &excluded_unload {
        info!(amount = e.amount, at = %e.datetime.at, "excluded unload from previous cycle");
    }
    if let Some(e) = &excluded_load {
        info!(amount = e.amount, at = %e.datetime.at, "excluded load belonging to next cycle");
    }

    let net_load = total(&loads) - total(&load_reversals);
    let net_unload = total(&unloads) - total(&unload_reversals);
    debug!(
        loads = loads.len(),
        unloads = unloads.len(),
        load_reversals = load_reversals.len(),
        unload_reversals = unload_reversals.len(),
        net_load,
        net_unload,
        "extracted GL cycle"
    );

    Ok(LoadUnloadSummary {
        net_load,
        net_unload,
        first_load_datetime,
        last_unload_datetime,
        load_count: loads.len() + load_reversals.len(),
        unload_count: unloads.len() + unload_reversals.len(),
        loads,
        unloads,
        load_reversals,
        unload_reversals,
        excluded_load,
        excluded_unload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn dt(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    /// (description, debit, credit)
    fn sheet(lines: &[(&str, &str, &str)]) -> GlSheet {
        let mut raw = vec![
            row(&["ATM 0042 GL", "", "", ""]),
            row(&["Posting Date", "Narration", "Debit", "Credit"]),
        ];
        for (desc, debit, credit) in lines {
            raw.push(row(&["", desc, debit, credit]));
        }
        GlSheet::from_rows(&raw, &Keywords::default()).unwrap()
    }

    #[test]
    fn test_classify() {
        let kw = Keywords::default();
        assert_eq!(classify("cash load term 1", &kw), Some(EntryKind::Load));
        assert_eq!(classify("cash unload term 1", &kw), Some(EntryKind::Unload));
        assert_eq!(classify("atm withdrawal", &kw), None);
        assert!(is_reversal("rvsl cash load", &kw));
        assert!(!is_reversal("cash load", &kw));
    }

    #[test]
    fn test_two_day_cycle_without_trimming() {
        let s = sheet(&[
            ("CASH LOAD 2024-03-01 / 8:00AM", "1000", ""),
            ("CASH UNLOAD 2024-03-01 / 5:00PM", "", "950"),
            ("CASH LOAD 2024-03-02 / 9:00AM", "500", ""),
            ("CASH UNLOAD 2024-03-02 / 6:00PM", "", "400"),
        ]);
        let summary = extract_cycle(&s, &Keywords::default()).unwrap();
        assert_eq!(summary.net_load, 1500.0);
        assert_eq!(summary.net_unload, 1350.0);
        assert_eq!(summary.load_count, 2);
        assert_eq!(summary.unload_count, 2);
        assert!(summary.excluded_load.is_none());
        assert!(summary.excluded_unload.is_none());
        assert_eq!(summary.first_load_datetime, dt(1, 8));
        assert_eq!(summary.last_unload_datetime, dt(2, 18));
    }

    #[test]
    fn test_boundary_entries_trimmed_but_window_kept() {
        let s = sheet(&[
            ("CASH UNLOAD 2024-03-01 / 7:00AM", "", "300"),
            ("CASH LOAD 2024-03-01 / 8:00AM", "1000", ""),
            ("CASH UNLOAD 2024-03-02 / 6:00PM", "", "600"),
            ("CASH LOAD 2024-03-02 / 7:00PM", "2000", ""),
        ]);
        let summary = extract_cycle(&s, &Keywords::default()).unwrap();
        assert_eq!(summary.net_load, 1000.0);
        assert_eq!(summary.net_unload, 600.0);
        assert_eq!(summary.load_count, 1);
        assert_eq!(summary.unload_count, 1);
        assert_eq!(summary.excluded_unload.as_ref().map(|e| e.amount), Some(300.0));
        assert_eq!(summary.excluded_load.as_ref().map(|e| e.amount), Some(2000.0));
        assert_eq!(summary.first_load_datetime, dt(1, 7));
        assert_eq!(summary.last_unload_datetime, dt(2, 19));
    }

    #[test]
    fn test_only_one_boundary_entry_dropped_per_side() {
        let s = sheet(&[
            ("CASH UNLOAD 2024-03-01 / 6:00AM", "", "100"),
            ("CASH UNLOAD 2024-03-01 / 7:00AM", "", "200"),
            ("CASH LOAD 2024-03-01 / 8:00AM", "1000", ""),
            ("CASH UNLOAD 2024-03-01 / 6:00PM", "", "400"),
        ]);
        let summary = extract_cycle(&s, &Keywords::default()).unwrap();
        assert_eq!(summary.net_unload, 600.0);
        assert_eq!(summary.unload_count, 2);
    }

    #[test]
    fn test_reversals_are_subtracted() {
        let s = sheet(&[
            ("CASH LOAD 2024-03-01 / 8:00AM", "1000", ""),
            ("CASH LOAD REVERSAL 2024-03-01 / 8:30AM", "200", ""),
            ("CASH UNLOAD 2024-03-01 / 5:00PM", "", "700"),
            ("RVSL CASH UNLOAD 2024-03-01 / 5:30PM", "", "100"),
        ]);
        let summary = extract_cycle(&s, &Keywords::default()).unwrap();
        assert_eq!(summary.net_load, 800.0);
        assert_eq!(summary.net_unload, 600.0);
        assert_eq!(summary.load_count, 2);
        assert_eq!(summary.unload_count, 2);
        assert_eq!(summary.last_unload_datetime, dt(1, 17) + chrono::Duration::minutes(30));
    }

    #[test]
    fn test_amounts_strip_formatting() {
        let s = sheet(&[
            ("CASH LOAD 2024-03-01 / 8:00AM", "NGN 1,000,000.00", ""),
            ("CASH UNLOAD 2024-03-01 / 5:00PM", "", "250,000.50"),
        ]);
        let summary = extract_cycle(&s, &Keywords::default()).unwrap();
        assert_eq!(summary.net_load, 1_000_000.0);
        assert_eq!(summary.net_unload, 250_000.5);
    }

    #[test]
    fn test_date_column_fallback() {
        let raw = vec![
            row(&["Date", "Description", "Debit", "Credit"]),
            row(&["2024-03-01", "CASH LOAD", "100", ""]),
            row(&["2024-03-05", "CASH UNLOAD", "", "50"]),
        ];
        let s = GlSheet::from_rows(&raw, &Keywords::default()).unwrap();
        let summary = extract_cycle(&s, &Keywords::default()).unwrap();
        assert_eq!(summary.first_load_datetime, dt(1, 0));
        assert_eq!(summary.last_unload_datetime, dt(5, 0));
    }

    #[test]
    fn test_missing_loads_or_unloads() {
        let s = sheet(&[("CASH UNLOAD 2024-03-01 / 5:00PM", "", "700")]);
        assert!(matches!(extract_cycle(&s, &Keywords::default()), Err(ReconError::NoLoads)));
        let s = sheet(&[("CASH LOAD 2024-03-01 / 5:00PM", "700", "")]);
        assert!(matches!(extract_cycle(&s, &Keywords::default()), Err(ReconError::NoUnloads)));
    }

    #[test]
    fn test_header_not_found() {
        let raw = vec![row(&["Date", "Amount"])];
        assert!(matches!(
            GlSheet::from_rows(&raw, &Keywords::default()),
            Err(ReconError::HeaderNotFound { .. })
        ));
    }
}
