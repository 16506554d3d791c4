//! Reduces raw FEP rows to successful, non-duplicate, in-cycle withdrawals.
//!
//! Each stage takes the current [`PipelineState`] and returns the next one.
//! Rows a stage removes are appended to `filtered_out`, which only ever
//! grows. The stage order is fixed by [`FepPipeline::run`]: duplicate
//! suppression must see REVERSAL rows before the type filter drops them.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use regex::{Regex, RegexBuilder};
use tracing::{info, warn};

use crate::columns::{cell, find_header_row, FepColumns};
use crate::dates::{fep_sentinel, parse_datetime, DateStamp};
use crate::error::{ReconError, Result};
use crate::importer::parse_amount;
use crate::models::{FepRow, FilterStage, FilteredRow, TxnType};
use crate::reference::normalize_reference;
use crate::settings::Keywords;

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// FEP data rows below the located header, parsed once.
#[derive(Debug, Clone)]
pub struct FepSheet {
    pub header: Vec<String>,
    pub columns: FepColumns,
    pub rows: Vec<FepRow>,
}

impl FepSheet {
    pub fn from_rows(raw: &[Vec<String>], kw: &Keywords) -> Result<Self> {
        let header_idx = find_header_row(raw, &[], &kw.fep_header).ok_or_else(|| {
            ReconError::HeaderNotFound {
                dataset: "FEP".to_string(),
                expected: kw.fep_header.join(" and "),
            }
        })?;
        let header = raw[header_idx].clone();
        let columns = FepColumns::resolve(&header, kw)?;

        let rows: Vec<FepRow> = raw[header_idx + 1..]
            .iter()
            .enumerate()
            .filter(|(_, cells)| cells.iter().any(|c| !c.trim().is_empty()))
            .map(|(row_index, cells)| build_row(row_index, cells, &columns, kw))
            .collect();
        info!(header_row = header_idx, rows = rows.len(), "located FEP header");
        Ok(Self { header, columns, rows })
    }
}

fn build_row(row_index: usize, cells: &[String], cols: &FepColumns, kw: &Keywords) -> FepRow {
    let reference_raw = cell(cells, cols.reference).to_string();
    let date_raw = cell(cells, cols.date);
    let datetime = parse_datetime(date_raw, &kw.date_formats)
        .map(DateStamp::parsed)
        .unwrap_or_else(|| DateStamp::fallback(fep_sentinel()));
    let response = [cell(cells, cols.response_code), cell(cells, cols.response)]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    FepRow {
        row_index,
        cells: cells.to_vec(),
        reference: normalize_reference(&reference_raw),
        reference_raw,
        datetime,
        amount: parse_amount(cell(cells, cols.amount)).abs(),
        txn_type: TxnType::parse(cell(cells, cols.transaction_type)),
        response,
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub surviving: Vec<FepRow>,
    pub filtered_out: Vec<FilteredRow>,
}

impl PipelineState {
    pub fn new(rows: Vec<FepRow>) -> Self {
        Self {
            surviving: rows,
            filtered_out: Vec::new(),
        }
    }

    /// Keep rows where `keep` holds; move the rest to `filtered_out` tagged
    /// with `stage`, preserving order on both sides.
    fn partition(self, stage: FilterStage, mut keep: impl FnMut(usize, &FepRow) -> bool) -> Self {
        let before = self.surviving.len();
        let mut surviving = Vec::with_capacity(before);
        let mut filtered_out = self.filtered_out;
        for (i, row) in self.surviving.into_iter().enumerate() {
            if keep(i, &row) {
                surviving.push(row);
            } else {
                filtered_out.push(FilteredRow { row, stage });
            }
        }
        info!(
            stage = stage.label(),
            kept = surviving.len(),
            removed = before - surviving.len(),
            "FEP filter stage"
        );
        Self { surviving, filtered_out }
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

pub struct ApprovalRules {
    approved: Regex,
    success_code: Regex,
    negation: Regex,
}

/// Configured patterns match case-insensitively, like the column keywords.
fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ReconError::InvalidPattern(format!("{pattern}: {e}")))
}

impl ApprovalRules {
    pub fn from_keywords(kw: &Keywords) -> Result<Self> {
        Ok(Self {
            approved: compile(&kw.approved_pattern)?,
            success_code: compile(&kw.success_code_pattern)?,
            negation: compile(&kw.negation_pattern)?,
        })
    }

    fn is_bare_code(&self, s: &str) -> bool {
        self.success_code
            .find(s)
            .map_or(false, |m| m.start() == 0 && m.end() == s.len())
    }

    /// Approved wording or a success code, with no negation other than a
    /// negation match that is itself just the success code.
    pub fn is_approved(&self, response: &str) -> bool {
        let text = response.trim().to_lowercase();
        if !(self.approved.is_match(&text) || self.success_code.is_match(&text)) {
            return false;
        }
        !self
            .negation
            .find_iter(&text)
            .any(|m| !self.is_bare_code(m.as_str()))
    }
}

/// Stage 1: keep approved responses.
pub fn approval_filter(state: PipelineState, rules: &ApprovalRules) -> PipelineState {
    state.partition(FilterStage::Approval, |_, row| rules.is_approved(&row.response))
}

/// Stage 2: resolve rows sharing a normalized reference.
///
/// INITIAL with REVERSAL cancels the whole group; INITIALs without a
/// REVERSAL keep only the first row; any other repeated shape is removed
/// entirely. Rows without a reference are left alone.
pub fn suppress_duplicates(state: PipelineState) -> PipelineState {
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, row) in state.surviving.iter().enumerate() {
        if !row.reference.is_empty() {
            groups.entry(row.reference.as_str()).or_default().push(i);
        }
    }

    let mut remove: HashSet<usize> = HashSet::new();
    for members in groups.values().filter(|m| m.len() > 1) {
        let count = |t: &TxnType| {
            members
                .iter()
                .filter(|&&i| &state.surviving[i].txn_type == t)
                .count()
        };
        let initials = count(&TxnType::Initial);
        let reversals = count(&TxnType::Reversal);
        if initials >= 2 && reversals == 0 {
            remove.extend(members.iter().skip(1));
        } else {
            remove.extend(members.iter());
        }
    }

    state.partition(FilterStage::Duplicate, |i, _| !remove.contains(&i))
}

/// Stage 3: drop REVERSAL rows. Rows with no type pass.
pub fn drop_reversal_types(state: PipelineState) -> PipelineState {
    state.partition(FilterStage::ReversalType, |_, row| row.txn_type != TxnType::Reversal)
}

/// Stage 4: stable sort by request time.
pub fn sort_chronologically(mut state: PipelineState) -> PipelineState {
    state.surviving.sort_by_key(|row| row.datetime.at);
    state
}

/// Stage 5: keep rows inside `[start, end]`. Without a date column nothing
/// can be placed in the window, so every row goes.
pub fn date_window_filter(
    state: PipelineState,
    start: NaiveDateTime,
    end: NaiveDateTime,
    has_date_column: bool,
) -> PipelineState {
    state.partition(FilterStage::DateWindow, |_, row| {
        has_date_column && row.datetime.at >= start && row.datetime.at <= end
    })
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FepPipeline {
    state: PipelineState,
}

impl FepPipeline {
    /// Run every stage in order against the cycle window from the GL.
    pub fn run(
        sheet: &FepSheet,
        window: (NaiveDateTime, NaiveDateTime),
        kw: &Keywords,
    ) -> Result<Self> {
        let mut state = PipelineState::new(sheet.rows.clone());

        if sheet.columns.response.is_some() || sheet.columns.response_code.is_some() {
            let rules = ApprovalRules::from_keywords(kw)?;
            state = approval_filter(state, &rules);
        } else {
            warn!("FEP file has no response column; skipping approval filter");
        }
        state = suppress_duplicates(state);
        state = drop_reversal_types(state);
        state = sort_chronologically(state);
        if sheet.columns.date.is_none() {
            warn!("FEP file has no date column; no rows can fall inside the cycle window");
        }
        state = date_window_filter(state, window.0, window.1, sheet.columns.date.is_some());

        Ok(Self { state })
    }

    pub fn transaction_count(&self) -> usize {
        self.state.surviving.len()
    }

    pub fn rows(&self) -> &[FepRow] {
        &self.state.surviving
    }

    pub fn total_amount(&self) -> f64 {
        self.state.surviving.iter().map(|r| r.amount).sum()
    }

    pub fn filtered_out(&self) -> &[FilteredRow] {
        &self.state.filtered_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    const HEADER: &[&str] = &["Retrieval Ref No", "Amount", "Request Date", "Response Meaning", "Tran Type"];

    /// (rrn, amount, date, response, type)
    fn fep_sheet(lines: &[(&str, &str, &str, &str, &str)]) -> FepSheet {
        let mut raw = vec![row(&["FEP export"]), row(HEADER)];
        for (rrn, amt, date, resp, kind) in lines {
            raw.push(row(&[rrn, amt, date, resp, kind]));
        }
        FepSheet::from_rows(&raw, &Keywords::default()).unwrap()
    }

    fn refs(rows: &[FepRow]) -> Vec<&str> {
        rows.iter().map(|r| r.reference.as_str()).collect()
    }

    fn dt(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    fn rules() -> ApprovalRules {
        ApprovalRules::from_keywords(&Keywords::default()).unwrap()
    }

    #[test]
    fn test_sheet_precomputes_fields() {
        let sheet = fep_sheet(&[("0000123456789012", "NGN 5,000.00", "2024-03-01 10:00:00", "Approved", "INITIAL")]);
        let r = &sheet.rows[0];
        assert_eq!(r.reference, "123456789012");
        assert_eq!(r.reference_raw, "0000123456789012");
        assert_eq!(r.amount, 5000.0);
        assert_eq!(r.datetime, DateStamp::parsed(dt(1, 10)));
        assert_eq!(r.txn_type, TxnType::Initial);
    }

    #[test]
    fn test_sheet_falls_back_on_bad_dates() {
        let sheet = fep_sheet(&[("1", "1", "yesterday", "00", "")]);
        assert!(!sheet.rows[0].datetime.is_parsed());
        assert_eq!(sheet.rows[0].datetime.at, fep_sentinel());
    }

    #[test]
    fn test_sheet_requires_header() {
        let raw = vec![row(&["RRN", "Amount"])];
        assert!(matches!(
            FepSheet::from_rows(&raw, &Keywords::default()),
            Err(ReconError::HeaderNotFound { .. })
        ));
    }

    #[test]
    fn test_approval_rules() {
        let r = rules();
        assert!(r.is_approved("00"));
        assert!(r.is_approved("0"));
        assert!(r.is_approved("Approved or completed successfully"));
        assert!(r.is_approved("AUTHORIZED"));
        assert!(!r.is_approved("declined"));
        assert!(!r.is_approved("Not approved"));
        assert!(!r.is_approved("00 declined"));
        assert!(!r.is_approved("51"));
        assert!(!r.is_approved(""));
    }

    #[test]
    fn test_negation_matching_only_the_code_is_ignored() {
        let mut kw = Keywords::default();
        kw.negation_pattern = r"not|declin|fail|revers|\b\d{2}\b".to_string();
        let r = ApprovalRules::from_keywords(&kw).unwrap();
        assert!(r.is_approved("00"));
        assert!(!r.is_approved("00 failed"));
        assert!(!r.is_approved("approved 51"));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let mut kw = Keywords::default();
        kw.approved_pattern = "(".to_string();
        assert!(matches!(
            ApprovalRules::from_keywords(&kw),
            Err(ReconError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_configured_patterns_ignore_case() {
        let mut kw = Keywords::default();
        kw.approved_pattern = "APPROVED|AUTH".to_string();
        kw.negation_pattern = "DECLIN".to_string();
        let r = ApprovalRules::from_keywords(&kw).unwrap();
        assert!(r.is_approved("Approved"));
        assert!(r.is_approved("auth ok"));
        assert!(!r.is_approved("Declined"));
    }

    #[test]
    fn test_approval_filter_moves_rejects_aside() {
        let sheet = fep_sheet(&[
            ("111111111111", "100", "2024-03-01 10:00:00", "Approved", "INITIAL"),
            ("222222222222", "100", "2024-03-01 11:00:00", "Insufficient funds", "INITIAL"),
        ]);
        let state = approval_filter(PipelineState::new(sheet.rows), &rules());
        assert_eq!(refs(&state.surviving), vec!["111111111111"]);
        assert_eq!(state.filtered_out.len(), 1);
        assert_eq!(state.filtered_out[0].stage, FilterStage::Approval);
        assert_eq!(state.filtered_out[0].reason(), "not approved: Insufficient funds");
    }

    #[test]
    fn test_duplicates_unique_refs_untouched() {
        let sheet = fep_sheet(&[
            ("333333333333", "1", "", "00", "INITIAL"),
            ("111111111111", "1", "", "00", "INITIAL"),
            ("222222222222", "1", "", "00", ""),
        ]);
        let state = suppress_duplicates(PipelineState::new(sheet.rows));
        assert_eq!(refs(&state.surviving), vec!["333333333333", "111111111111", "222222222222"]);
        assert!(state.filtered_out.is_empty());
    }

    #[test]
    fn test_duplicates_initial_reversal_cancel() {
        let sheet = fep_sheet(&[
            ("111111111111", "1", "", "00", "INITIAL"),
            ("999999999999", "1", "", "00", "INITIAL"),
            ("00111111111111", "1", "", "00", "REVERSAL"),
        ]);
        let state = suppress_duplicates(PipelineState::new(sheet.rows));
        assert_eq!(refs(&state.surviving), vec!["999999999999"]);
        assert_eq!(state.filtered_out.len(), 2);
        assert!(state.filtered_out.iter().all(|f| f.stage == FilterStage::Duplicate));
    }

    #[test]
    fn test_duplicates_multiple_initials_keep_first() {
        let sheet = fep_sheet(&[
            ("111111111111", "10", "", "00", "INITIAL"),
            ("111111111111", "20", "", "00", "INITIAL"),
            ("111111111111", "30", "", "00", "INITIAL"),
        ]);
        let state = suppress_duplicates(PipelineState::new(sheet.rows));
        assert_eq!(state.surviving.len(), 1);
        assert_eq!(state.surviving[0].amount, 10.0);
        assert_eq!(state.filtered_out.len(), 2);
    }

    #[test]
    fn test_duplicates_untyped_group_removed() {
        let sheet = fep_sheet(&[
            ("111111111111", "10", "", "00", ""),
            ("111111111111", "10", "", "00", ""),
        ]);
        let state = suppress_duplicates(PipelineState::new(sheet.rows));
        assert!(state.surviving.is_empty());
        assert_eq!(state.filtered_out.len(), 2);
    }

    #[test]
    fn test_duplicates_ignore_blank_references() {
        let sheet = fep_sheet(&[("", "10", "", "00", ""), ("", "20", "", "00", "")]);
        let state = suppress_duplicates(PipelineState::new(sheet.rows));
        assert_eq!(state.surviving.len(), 2);
    }

    #[test]
    fn test_stage_order_changes_outcome() {
        let sheet = fep_sheet(&[
            ("111111111111", "50", "", "00", "INITIAL"),
            ("111111111111", "50", "", "00", "REVERSAL"),
        ]);

        let dedup_first = drop_reversal_types(suppress_duplicates(PipelineState::new(sheet.rows.clone())));
        assert!(dedup_first.surviving.is_empty());
        assert!(dedup_first.filtered_out.iter().all(|f| f.stage == FilterStage::Duplicate));

        let type_first = suppress_duplicates(drop_reversal_types(PipelineState::new(sheet.rows)));
        assert_eq!(type_first.surviving.len(), 1);
        assert_eq!(type_first.filtered_out.len(), 1);
        assert_eq!(type_first.filtered_out[0].stage, FilterStage::ReversalType);
    }

    #[test]
    fn test_reversal_type_filter() {
        let sheet = fep_sheet(&[
            ("111111111111", "1", "", "00", " reversal "),
            ("222222222222", "1", "", "00", ""),
            ("333333333333", "1", "", "00", "ADVICE"),
        ]);
        let state = drop_reversal_types(PipelineState::new(sheet.rows));
        assert_eq!(refs(&state.surviving), vec!["222222222222", "333333333333"]);
    }

    #[test]
    fn test_sort_is_stable() {
        let sheet = fep_sheet(&[
            ("333333333333", "1", "2024-03-02 09:00:00", "00", ""),
            ("111111111111", "1", "2024-03-01 09:00:00", "00", ""),
            ("222222222222", "1", "2024-03-01 09:00:00", "00", ""),
        ]);
        let state = sort_chronologically(PipelineState::new(sheet.rows));
        assert_eq!(refs(&state.surviving), vec!["111111111111", "222222222222", "333333333333"]);
    }

    #[test]
    fn test_date_window_is_inclusive() {
        let sheet = fep_sheet(&[
            ("111111111111", "1", "2024-03-01 07:59:00", "00", ""),
            ("222222222222", "1", "2024-03-01 08:00:00", "00", ""),
            ("333333333333", "1", "2024-03-02 18:00:00", "00", ""),
            ("444444444444", "1", "2024-03-02 18:01:00", "00", ""),
            ("555555555555", "1", "", "00", ""),
        ]);
        let state = date_window_filter(PipelineState::new(sheet.rows), dt(1, 8), dt(2, 18), true);
        assert_eq!(refs(&state.surviving), vec!["222222222222", "333333333333"]);
        assert_eq!(state.filtered_out.len(), 3);
        assert!(state.filtered_out.iter().all(|f| f.stage == FilterStage::DateWindow));
    }

    #[test]
    fn test_pipeline_runs_all_stages() {
        let sheet = fep_sheet(&[
            ("111111111111", "100", "2024-03-01 12:00:00", "Approved", "INITIAL"),
            ("222222222222", "200", "2024-03-01 10:00:00", "Approved", "INITIAL"),
            ("333333333333", "300", "2024-03-01 11:00:00", "Declined", "INITIAL"),
            ("444444444444", "400", "2024-03-01 11:30:00", "Approved", "INITIAL"),
            ("444444444444", "400", "2024-03-01 11:31:00", "Approved", "REVERSAL"),
            ("555555555555", "500", "2024-03-01 11:45:00", "Approved", "REVERSAL"),
            ("666666666666", "600", "2024-04-01 11:45:00", "Approved", "INITIAL"),
        ]);
        let p = FepPipeline::run(&sheet, (dt(1, 8), dt(2, 18)), &Keywords::default()).unwrap();
        assert_eq!(p.transaction_count(), 2);
        assert_eq!(refs(p.rows()), vec!["222222222222", "111111111111"]);
        assert_eq!(p.total_amount(), 300.0);
        let stages: Vec<FilterStage> = p.filtered_out().iter().map(|f| f.stage).collect();
        assert_eq!(
            stages,
            vec![
                FilterStage::Approval,
                FilterStage::Duplicate,
                FilterStage::Duplicate,
                FilterStage::ReversalType,
                FilterStage::DateWindow,
            ]
        );
    }

    #[test]
    fn test_pipeline_without_response_column_skips_approval() {
        let raw = vec![
            row(&["Retrieval Reference", "Amount", "Date", "Response"]),
            row(&["111111111111", "100", "2024-03-01 12:00:00", ""]),
        ];
        let mut kw = Keywords::default();
        kw.fep_response = vec!["status".to_string()];
        let sheet = FepSheet::from_rows(&raw, &kw).unwrap();
        assert!(sheet.columns.response.is_none());
        let p = FepPipeline::run(&sheet, (dt(1, 8), dt(2, 18)), &kw).unwrap();
        assert_eq!(p.transaction_count(), 1);
    }

    #[test]
    fn test_filtered_reason_names_the_stage() {
        let sheet = fep_sheet(&[
            ("111111111111", "100", "2024-03-01 10:00:00", "Approved", "INITIAL"),
            ("111111111111", "100", "2024-03-01 10:01:00", "Approved", "REVERSAL"),
            ("222222222222", "100", "2024-03-01 10:00:00", "", ""),
        ]);
        let state = suppress_duplicates(PipelineState::new(sheet.rows));
        assert_eq!(state.filtered_out[0].reason(), "duplicate reference: Approved");
        let state = date_window_filter(state, dt(2, 8), dt(2, 18), true);
        assert_eq!(state.filtered_out[2].reason(), "outside cycle window");
    }

    #[test]
    fn test_pipeline_without_date_column_drops_every_row() {
        let raw = vec![
            row(&["Retrieval Reference", "Amount", "Response"]),
            row(&["111111111111", "100", "Approved"]),
            row(&["222222222222", "200", "00"]),
        ];
        let kw = Keywords::default();
        let sheet = FepSheet::from_rows(&raw, &kw).unwrap();
        assert!(sheet.columns.date.is_none());
        let p = FepPipeline::run(&sheet, (dt(1, 8), dt(2, 18)), &kw).unwrap();
        assert_eq!(p.transaction_count(), 0);
        assert_eq!(p.total_amount(), 0.0);
        assert_eq!(p.filtered_out().len(), 2);
        assert!(p
            .filtered_out()
            .iter()
            .all(|f| f.stage == FilterStage::DateWindow));
    }
}
