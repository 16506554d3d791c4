use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Spreadsheet error: {0}")]
    Workbook(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("{path} is {size} bytes, larger than the {limit} byte limit")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    #[error("{dataset} file: no header row found (expected a row mentioning {expected})")]
    HeaderNotFound { dataset: String, expected: String },

    #[error("{dataset} file: no {column} column found")]
    MissingColumn { dataset: String, column: String },

    #[error("GL file: no load entries found")]
    NoLoads,

    #[error("GL file: no unload entries found")]
    NoUnloads,

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, ReconError>;
