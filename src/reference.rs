use std::sync::OnceLock;

use regex::Regex;

/// Length of a retrieval reference number.
pub const RRN_LEN: usize = 12;

fn long_digit_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]{12,}").expect("static pattern"))
}

fn rightmost(digits: &str, n: usize) -> &str {
    // ASCII digits only, so byte slicing is safe.
    &digits[digits.len().saturating_sub(n)..]
}

/// Pull the reference number out of free text such as a GL narration.
///
/// The RRN is usually appended last and sometimes zero-padded, so the last
/// digit run of at least 12 digits wins and only its rightmost 12 are kept.
/// A run of exactly 12 digits is just the shortest such run.
pub fn extract_reference(text: &str) -> Option<String> {
    long_digit_run()
        .find_iter(text)
        .last()
        .map(|m| rightmost(m.as_str(), RRN_LEN).to_string())
}

/// Normalize a raw reference cell: keep digits only, then the rightmost 12.
/// Shorter values are returned as-is.
pub fn normalize_reference(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    rightmost(&digits, RRN_LEN).to_string()
}
