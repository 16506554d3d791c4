use std::path::Path;

use tracing::debug;

use crate::error::{ReconError, Result};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a monetary cell. Everything except digits, `.` and `-` is dropped
/// first, so currency symbols and thousands separators are harmless.
/// Unparseable values read as zero.
pub fn parse_amount(raw: &str) -> f64 {
    let s: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    s.parse().unwrap_or(0.0)
}

/// Render a spreadsheet number the way it reads on screen: integral values
/// lose the trailing `.0` so long reference numbers survive as text.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn check_size(file_path: &Path, limit: u64) -> Result<()> {
    let size = std::fs::metadata(file_path)?.len();
    if size > limit {
        return Err(ReconError::FileTooLarge {
            path: file_path.display().to_string(),
            size,
            limit,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// read_rows
// ---------------------------------------------------------------------------

/// Read every row of a CSV or spreadsheet file as strings. Title rows above
/// the header are kept; locating the header is the caller's job.
pub fn read_rows(file_path: &Path, max_bytes: u64) -> Result<Vec<Vec<String>>> {
    check_size(file_path, max_bytes)?;
    let ext = file_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let rows = match ext.as_str() {
        "csv" | "txt" => read_csv(file_path)?,
        #[cfg(feature = "xlsx")]
        "xlsx" | "xlsm" | "xls" | "ods" => read_workbook(file_path)?,
        other => return Err(ReconError::UnsupportedFormat(other.to_string())),
    };
    debug!(path = %file_path.display(), rows = rows.len(), "read tabular file");
    Ok(rows)
}

fn read_csv(file_path: &Path) -> Result<Vec<Vec<String>>> {
    let file = std::fs::File::open(file_path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(|f| f.to_string()).collect());
    }
    Ok(rows)
}

#[cfg(feature = "xlsx")]
fn read_workbook(file_path: &Path) -> Result<Vec<Vec<String>>> {
    use calamine::{Data, Reader};

    let mut workbook = calamine::open_workbook_auto(file_path)
        .map_err(|e| ReconError::Workbook(format!("Failed to open {}: {e}", file_path.display())))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ReconError::Workbook("workbook has no sheets".to_string()))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| ReconError::Workbook(format!("Failed to read sheet {sheet}: {e}")))?;

    let rows = range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Data::String(s) => s.clone(),
                    Data::Float(f) => format_number(*f),
                    Data::Int(i) => i.to_string(),
                    Data::Bool(b) => b.to_string(),
                    Data::DateTime(dt) => crate::dates::excel_serial_to_datetime(dt.as_f64())
                        .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default(),
                    Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
                    _ => String::new(),
                })
                .collect()
        })
        .collect();
    Ok(rows)
}
