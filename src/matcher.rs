//! One-to-one matching of GL withdrawal lines to FEP transactions by
//! reference number.
//!
//! Every GL line with a reference (load/unload lines excluded) lands in
//! exactly one of matched, found-in-filtered-FEP, nilled duplicate, or GL
//! not on FEP. Every surviving FEP row lands in matched or FEP not on GL.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::columns::cell;
use crate::cycle::{is_reversal, GlSheet};
use crate::dates::gl_datetime;
use crate::importer::parse_amount;
use crate::models::{
    FepRow, FilteredHits, FilteredRow, GlTransaction, MatchReport, MatchedPair, TOLERANCE,
};
use crate::reference::{extract_reference, normalize_reference};
use crate::settings::Keywords;

/// Below this a parsed credit or debit counts as blank.
const ZERO: f64 = 0.005;

// ---------------------------------------------------------------------------
// Reference bag
// ---------------------------------------------------------------------------

/// Multiset of candidates keyed by normalized reference. Claiming takes the
/// most recently inserted candidate for a key.
#[derive(Debug, Clone)]
pub struct RefBag<T> {
    entries: HashMap<String, Vec<T>>,
    order: Vec<String>,
}

impl<T> Default for RefBag<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T> RefBag<T> {
    pub fn insert(&mut self, key: String, item: T) {
        if !self.entries.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.entries.entry(key).or_default().push(item);
    }

    pub fn claim(&mut self, key: &str) -> Option<T> {
        let stack = self.entries.get_mut(key)?;
        let item = stack.pop();
        if stack.is_empty() {
            self.entries.remove(key);
        }
        item
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unclaimed candidates, keys in first-insertion order.
    pub fn into_remaining(mut self) -> Vec<T> {
        let mut out = Vec::new();
        for key in &self.order {
            if let Some(items) = self.entries.remove(key) {
                out.extend(items);
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Reversal-pair detection
// ---------------------------------------------------------------------------

/// A GL line as seen by reversal-pair detection.
#[derive(Debug, Clone, PartialEq)]
pub struct GlRefEntry {
    pub row_index: usize,
    pub is_reversal: bool,
    pub credit: f64,
    pub debit: f64,
}

/// Some line in the group is worded as a reversal.
pub fn has_reversal_keyword(group: &[GlRefEntry]) -> bool {
    group.iter().any(|e| e.is_reversal)
}

/// One line's credit offsets another line's debit within tolerance. Blank
/// values never pair.
pub fn has_offsetting_values(group: &[GlRefEntry]) -> bool {
    group.iter().enumerate().any(|(i, a)| {
        a.credit.abs() > ZERO
            && group.iter().enumerate().any(|(j, b)| {
                i != j && b.debit.abs() > ZERO && (a.credit.abs() - b.debit.abs()).abs() < TOLERANCE
            })
    })
}

/// Best-effort: a repeated reference whose lines look like a posting and its
/// reversal, by wording or by value.
pub fn is_reversal_pair(group: &[GlRefEntry]) -> bool {
    group.len() > 1 && (has_reversal_keyword(group) || has_offsetting_values(group))
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

pub struct TransactionMatcher<'a> {
    gl: &'a GlSheet,
    kw: &'a Keywords,
    load: String,
    unload: String,
}

impl<'a> TransactionMatcher<'a> {
    pub fn new(gl: &'a GlSheet, kw: &'a Keywords) -> Self {
        Self {
            gl,
            kw,
            load: kw.load.to_lowercase(),
            unload: kw.unload.to_lowercase(),
        }
    }

    fn transaction(&self, row_index: usize, row: &[String], reference_raw: String) -> GlTransaction {
        let cols = &self.gl.columns;
        let description = self.gl.description(row);
        let credit_raw = cell(row, cols.credit).to_string();
        let debit_raw = cell(row, cols.debit).to_string();
        let credit = parse_amount(&credit_raw);
        let debit = parse_amount(&debit_raw);
        let amount = if credit.abs() > ZERO {
            credit.abs()
        } else {
            -debit.abs()
        };
        let date_raw = cell(row, cols.date).to_string();
        GlTransaction {
            row_index,
            description: description.to_string(),
            reference: normalize_reference(&reference_raw),
            reference_raw,
            amount,
            credit_raw,
            debit_raw,
            credit,
            debit,
            datetime: gl_datetime(description, &date_raw, &self.kw.date_formats),
            date_raw,
            is_reversal: is_reversal(&description.to_lowercase(), self.kw),
            cells: row.to_vec(),
        }
    }

    /// Every GL line with a description and reference, grouped by reference.
    fn gl_reference_index(&self) -> HashMap<String, Vec<GlRefEntry>> {
        let cols = &self.gl.columns;
        let mut index: HashMap<String, Vec<GlRefEntry>> = HashMap::new();
        for (row_index, row) in self.gl.rows.iter().enumerate() {
            let description = self.gl.description(row);
            if description.is_empty() {
                continue;
            }
            let Some(reference) = extract_reference(description) else {
                continue;
            };
            index
                .entry(normalize_reference(&reference))
                .or_default()
                .push(GlRefEntry {
                    row_index,
                    is_reversal: is_reversal(&description.to_lowercase(), self.kw),
                    credit: parse_amount(cell(row, cols.credit)),
                    debit: parse_amount(cell(row, cols.debit)),
                });
        }
        index
    }

    fn is_cycle_line(&self, description_lower: &str) -> bool {
        description_lower.contains(&self.load) || description_lower.contains(&self.unload)
    }

    pub fn run(&self, surviving: &[FepRow], filtered_out: &[FilteredRow]) -> MatchReport {
        let mut fep_bag: RefBag<FepRow> = RefBag::default();
        for row in surviving {
            fep_bag.insert(row.reference.clone(), row.clone());
        }
        let mut filtered_bag: RefBag<String> = RefBag::default();
        for f in filtered_out {
            filtered_bag.insert(f.row.reference.clone(), f.reason());
        }
        let gl_index = self.gl_reference_index();

        let mut report = MatchReport::default();
        let mut hits = FilteredHits::default();

        for (row_index, row) in self.gl.rows.iter().enumerate() {
            let description = self.gl.description(row);
            if description.is_empty() || self.is_cycle_line(&description.to_lowercase()) {
                continue;
            }
            let Some(reference_raw) = extract_reference(description) else {
                continue;
            };
            let txn = self.transaction(row_index, row, reference_raw);

            if let Some(fep) = fep_bag.claim(&txn.reference) {
                report.matched.push(MatchedPair {
                    reference: txn.reference.clone(),
                    gl: txn,
                    fep,
                });
                continue;
            }

            if let Some(reason) = filtered_bag.claim(&txn.reference) {
                debug!(reference = %txn.reference, %reason, "GL line found among filtered FEP rows");
                hits.count += 1;
                hits.amount += txn.amount.abs();
                continue;
            }

            let suppressed = gl_index
                .get(&txn.reference)
                .map_or(false, |group| is_reversal_pair(group));
            if suppressed {
                debug!(reference = %txn.reference, "nilled GL reversal pair");
                report.nilled_duplicates.push(txn);
                continue;
            }

            if txn.credit.abs() > ZERO {
                report.gl_not_on_fep_credit_total += txn.credit.abs();
            } else if txn.debit.abs() > ZERO {
                report.gl_not_on_fep_debit_total += txn.debit.abs();
            } else if txn.amount >= 0.0 {
                report.gl_not_on_fep_credit_total += txn.amount;
            } else {
                report.gl_not_on_fep_debit_total += -txn.amount;
            }
            report.gl_not_on_fep.push(txn);
        }

        report.fep_not_on_gl = fep_bag.into_remaining();
        report.found_in_filtered_fep = hits;

        info!(
            matched = report.matched_count(),
            gl_not_on_fep = report.gl_not_on_fep_count(),
            fep_not_on_gl = report.fep_not_on_gl_count(),
            found_in_filtered = hits.count,
            nilled = report.nilled_duplicates.len(),
            match_rate = report.match_rate(),
            "matched transactions"
        );
        report
    }
}

/// Match raw GL lines against the FEP rows that survived filtering.
pub fn match_transactions(
    gl: &GlSheet,
    surviving: &[FepRow],
    filtered_out: &[FilteredRow],
    kw: &Keywords,
) -> MatchReport {
    TransactionMatcher::new(gl, kw).run(surviving, filtered_out)
}
