use chrono::NaiveDateTime;
use serde::Serialize;

use crate::dates::DateStamp;

/// Absolute tolerance for "effectively equal" money comparisons.
pub const TOLERANCE: f64 = 0.01;

// ---------------------------------------------------------------------------
// GL cycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Load,
    Unload,
}

/// A load or unload line from the GL.
#[derive(Debug, Clone, Serialize)]
pub struct GlEntry {
    pub row_index: usize,
    pub kind: EntryKind,
    /// Unsigned: debit column for loads, credit column for unloads.
    pub amount: f64,
    pub datetime: DateStamp,
    pub is_reversal: bool,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadUnloadSummary {
    /// Loads minus load reversals, boundary entry excluded.
    pub net_load: f64,
    /// Unloads minus unload reversals, boundary entry excluded.
    pub net_unload: f64,
    pub first_load_datetime: NaiveDateTime,
    pub last_unload_datetime: NaiveDateTime,
    pub load_count: usize,
    pub unload_count: usize,
    pub loads: Vec<GlEntry>,
    pub unloads: Vec<GlEntry>,
    pub load_reversals: Vec<GlEntry>,
    pub unload_reversals: Vec<GlEntry>,
    /// Latest load, dropped because it falls after the last unload.
    pub excluded_load: Option<GlEntry>,
    /// Earliest unload, dropped because it falls before the first load.
    pub excluded_unload: Option<GlEntry>,
}

// ---------------------------------------------------------------------------
// FEP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxnType {
    Initial,
    Reversal,
    Other(String),
    Unspecified,
}

impl TxnType {
    pub fn parse(raw: &str) -> Self {
        let t = raw.trim();
        if t.is_empty() {
            Self::Unspecified
        } else if t.eq_ignore_ascii_case("initial") {
            Self::Initial
        } else if t.eq_ignore_ascii_case("reversal") {
            Self::Reversal
        } else {
            Self::Other(t.to_string())
        }
    }
}

/// A FEP data row with the fields every stage needs parsed up front.
#[derive(Debug, Clone, Serialize)]
pub struct FepRow {
    pub row_index: usize,
    pub cells: Vec<String>,
    pub reference_raw: String,
    /// Digits only, rightmost 12.
    pub reference: String,
    pub datetime: DateStamp,
    /// Unsigned.
    pub amount: f64,
    pub txn_type: TxnType,
    /// Response code and meaning text as it appears in the file.
    pub response: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    Approval,
    Duplicate,
    ReversalType,
    DateWindow,
}

impl FilterStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Approval => "not approved",
            Self::Duplicate => "duplicate reference",
            Self::ReversalType => "reversal transaction",
            Self::DateWindow => "outside cycle window",
        }
    }
}

/// A FEP row removed by a pipeline stage.
#[derive(Debug, Clone, Serialize)]
pub struct FilteredRow {
    pub row: FepRow,
    pub stage: FilterStage,
}

impl FilteredRow {
    /// The stage that removed the row, with its response text when present.
    pub fn reason(&self) -> String {
        if self.row.response.is_empty() {
            self.stage.label().to_string()
        } else {
            format!("{}: {}", self.stage.label(), self.row.response)
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction matching
// ---------------------------------------------------------------------------

/// A GL transaction line considered for matching. Raw cells are kept so the
/// line can be re-exported verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct GlTransaction {
    pub row_index: usize,
    pub description: String,
    /// Reference as extracted from the narration.
    pub reference_raw: String,
    pub reference: String,
    /// Credit positive, debit negative.
    pub amount: f64,
    pub credit_raw: String,
    pub debit_raw: String,
    pub credit: f64,
    pub debit: f64,
    pub date_raw: String,
    pub datetime: DateStamp,
    pub is_reversal: bool,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchedPair {
    pub reference: String,
    pub gl: GlTransaction,
    pub fep: FepRow,
}

/// GL lines whose reference only exists among filtered-out FEP rows. Only the
/// tally is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FilteredHits {
    pub count: usize,
    pub amount: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchReport {
    pub matched: Vec<MatchedPair>,
    pub gl_not_on_fep: Vec<GlTransaction>,
    pub gl_not_on_fep_credit_total: f64,
    pub gl_not_on_fep_debit_total: f64,
    pub fep_not_on_gl: Vec<FepRow>,
    pub found_in_filtered_fep: FilteredHits,
    pub nilled_duplicates: Vec<GlTransaction>,
}

impl MatchReport {
    pub fn matched_count(&self) -> usize {
        self.matched.len()
    }

    pub fn matched_amount(&self) -> f64 {
        self.matched.iter().map(|m| m.fep.amount).sum()
    }

    pub fn gl_not_on_fep_count(&self) -> usize {
        self.gl_not_on_fep.len()
    }

    pub fn fep_not_on_gl_count(&self) -> usize {
        self.fep_not_on_gl.len()
    }

    pub fn fep_not_on_gl_amount(&self) -> f64 {
        self.fep_not_on_gl.iter().map(|r| r.amount).sum()
    }

    /// Percentage of matched records over matched plus both unmatched sides.
    pub fn match_rate(&self) -> f64 {
        let denom = self.matched.len() + self.gl_not_on_fep.len() + self.fep_not_on_gl.len();
        if denom == 0 {
            0.0
        } else {
            self.matched.len() as f64 / denom as f64 * 100.0
        }
    }

    pub fn is_fully_matched(&self) -> bool {
        self.gl_not_on_fep.is_empty() && self.fep_not_on_gl.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Cycle-level result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconStatus {
    Balanced,
    /// GL net movement exceeds FEP withdrawals.
    GlMissing,
    /// FEP withdrawals exceed GL net movement.
    FepMissing,
}

impl ReconStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Balanced => "BALANCED",
            Self::GlMissing => "GL_MISSING",
            Self::FepMissing => "FEP_MISSING",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    pub net_load: f64,
    pub net_unload: f64,
    pub fep_total: f64,
    /// `(net_load - net_unload) - fep_total`
    pub difference: f64,
    pub status: ReconStatus,
}
