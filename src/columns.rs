//! Header-row location and keyword-based column resolution.
//!
//! Column roles are never fixed positions: each dataset's header row is
//! searched once, case-insensitively, and the result is kept in a small
//! typed map that every later stage reads.

use serde::Serialize;
use tracing::debug;

use crate::error::{ReconError, Result};
use crate::settings::Keywords;

fn lower_all(headers: &[String]) -> Vec<String> {
    headers.iter().map(|h| h.trim().to_lowercase()).collect()
}

/// First header containing a keyword. Keywords are tried in order, so an
/// earlier keyword beats a header that appears earlier in the row.
pub fn resolve_column(headers: &[String], keywords: &[String]) -> Option<usize> {
    let lowered = lower_all(headers);
    keywords.iter().find_map(|kw| {
        let kw = kw.to_lowercase();
        lowered.iter().position(|h| h.contains(&kw))
    })
}

/// Resolve a column by `base` keywords, preferring headers that also mention
/// one of `preferred`, then headers that mention none of `avoid`, then any
/// header with the base keyword.
pub fn resolve_preferring(
    headers: &[String],
    base: &[String],
    preferred: &[String],
    avoid: &[String],
) -> Option<usize> {
    let lowered = lower_all(headers);
    let has_base = |h: &str| base.iter().any(|b| h.contains(&b.to_lowercase()));
    let mentions = |h: &str, words: &[String]| words.iter().any(|w| h.contains(&w.to_lowercase()));

    lowered
        .iter()
        .position(|h| has_base(h) && mentions(h, preferred))
        .or_else(|| {
            lowered
                .iter()
                .position(|h| has_base(h) && !mentions(h, avoid))
        })
        .or_else(|| resolve_column(headers, base))
}

/// Index of the first row whose joined, lower-cased text contains at least
/// one of `any_of` (ignored when empty) and every one of `all_of`.
pub fn find_header_row(rows: &[Vec<String>], any_of: &[String], all_of: &[String]) -> Option<usize> {
    rows.iter().position(|row| {
        let joined = row.join(" ").to_lowercase();
        let any = any_of.is_empty() || any_of.iter().any(|k| joined.contains(&k.to_lowercase()));
        any && all_of.iter().all(|k| joined.contains(&k.to_lowercase()))
    })
}

/// Cell text at `idx`, empty when the column is absent or the row is short.
pub fn cell(row: &[String], idx: Option<usize>) -> &str {
    idx.and_then(|i| row.get(i)).map(|s| s.trim()).unwrap_or("")
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlColumns {
    pub description: usize,
    pub credit: Option<usize>,
    pub debit: Option<usize>,
    pub date: Option<usize>,
}

impl GlColumns {
    /// Credit and debit prefer an "amount" header over a same-named "count"
    /// column.
    pub fn resolve(headers: &[String], kw: &Keywords) -> Result<Self> {
        let description = resolve_column(headers, &kw.gl_description).ok_or_else(|| {
            ReconError::MissingColumn {
                dataset: "GL".to_string(),
                column: format!("description ({})", kw.gl_description.join(", ")),
            }
        })?;
        let amount = strings(&["amount"]);
        let count = strings(&["count"]);
        let cols = Self {
            description,
            credit: resolve_preferring(headers, &kw.gl_credit, &amount, &count),
            debit: resolve_preferring(headers, &kw.gl_debit, &amount, &count),
            date: resolve_column(headers, &kw.gl_date),
        };
        debug!(?cols, "resolved GL columns");
        Ok(cols)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FepColumns {
    pub response: Option<usize>,
    pub response_code: Option<usize>,
    pub reference: Option<usize>,
    pub amount: Option<usize>,
    pub date: Option<usize>,
    pub transaction_type: Option<usize>,
}

impl FepColumns {
    /// Fails only when neither a response nor a reference column exists.
    pub fn resolve(headers: &[String], kw: &Keywords) -> Result<Self> {
        let response = resolve_preferring(
            headers,
            &kw.fep_response,
            &kw.fep_response_preferred,
            &[],
        );
        let response_code = resolve_column(headers, &kw.fep_response_code)
            .filter(|idx| Some(*idx) != response);
        let reference = resolve_column(headers, &kw.fep_reference);
        if response.is_none() && reference.is_none() {
            return Err(ReconError::MissingColumn {
                dataset: "FEP".to_string(),
                column: format!(
                    "response ({}) or reference ({})",
                    kw.fep_response.join(", "),
                    kw.fep_reference.join(", ")
                ),
            });
        }
        let cols = Self {
            response,
            response_code,
            reference,
            amount: resolve_column(headers, &kw.fep_amount),
            date: resolve_column(headers, &kw.fep_date),
            transaction_type: resolve_column(headers, &kw.fep_transaction_type),
        };
        debug!(?cols, "resolved FEP columns");
        Ok(cols)
    }
}
