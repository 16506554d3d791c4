use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReconError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default)]
    pub keywords: Keywords,
}

fn default_currency_symbol() -> String {
    "$".to_string()
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            currency_symbol: default_currency_symbol(),
            max_file_bytes: default_max_file_bytes(),
            keywords: Keywords::default(),
        }
    }
}

/// Column-matching and classification keywords. All matches are
/// case-insensitive substring matches evaluated in list order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Keywords {
    /// A GL header row mentions one of these...
    pub gl_header: Vec<String>,
    /// ...and every one of these.
    pub gl_header_required: Vec<String>,
    pub gl_description: Vec<String>,
    pub gl_credit: Vec<String>,
    pub gl_debit: Vec<String>,
    pub gl_date: Vec<String>,
    pub load: String,
    pub unload: String,
    pub reversal: Vec<String>,

    /// A FEP header row mentions every one of these.
    pub fep_header: Vec<String>,
    pub fep_response: Vec<String>,
    pub fep_response_preferred: Vec<String>,
    pub fep_response_code: Vec<String>,
    pub fep_reference: Vec<String>,
    pub fep_amount: Vec<String>,
    pub fep_date: Vec<String>,
    pub fep_transaction_type: Vec<String>,

    pub approved_pattern: String,
    pub success_code_pattern: String,
    pub negation_pattern: String,

    pub date_formats: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Keywords {
    fn default() -> Self {
        Self {
            gl_header: strings(&["description", "narrative", "narration"]),
            gl_header_required: strings(&["credit", "debit"]),
            gl_description: strings(&["description", "narrative", "narration"]),
            gl_credit: strings(&["credit"]),
            gl_debit: strings(&["debit"]),
            gl_date: strings(&["date"]),
            load: "load".to_string(),
            unload: "unload".to_string(),
            reversal: strings(&["reversal", "rvsl", "reversed", "reverse"]),

            fep_header: strings(&["retrieval", "response"]),
            fep_response: strings(&["response", "resp"]),
            fep_response_preferred: strings(&["meaning", "code", "status"]),
            fep_response_code: strings(&["rsp"]),
            fep_reference: strings(&["retrieval", "reference", "rrn"]),
            fep_amount: strings(&["amount", "amt"]),
            fep_date: strings(&["request date", "date", "time"]),
            fep_transaction_type: strings(&["tran type", "transaction type", "txn type", "type"]),

            approved_pattern: "approved|approve|authoriz|auth".to_string(),
            success_code_pattern: r"\b0{1,2}\b".to_string(),
            negation_pattern: "not|declin|fail|revers".to_string(),

            date_formats: strings(&[
                "%Y-%m-%d %H:%M:%S",
                "%Y-%m-%d %H:%M",
                "%Y-%m-%dT%H:%M:%S",
                "%Y-%m-%d %I:%M%p",
                "%Y-%m-%d %I:%M %p",
                "%m/%d/%Y %I:%M%p",
                "%m/%d/%Y %I:%M %p",
                "%m/%d/%Y %I:%M:%S %p",
                "%m/%d/%Y %H:%M:%S",
                "%m/%d/%Y %H:%M",
                "%d-%b-%y %H:%M:%S",
                "%d-%b-%y",
                "%d-%b-%Y",
                "%Y-%m-%d",
                "%m/%d/%Y",
                "%d/%m/%Y",
                "%d-%m-%Y",
                "%Y/%m/%d",
            ]),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("atm-recon")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Load settings from the default location, falling back to defaults when the
/// file is missing or unreadable.
pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

/// Load settings from an explicit path. Unlike [`load_settings`], a file that
/// does not parse is an error.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| ReconError::Settings(format!("{}: {e}", path.display())))
}

pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| ReconError::Settings(e.to_string()))?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}
