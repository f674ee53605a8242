use serde::{Deserialize, Serialize};
use std::fmt;

/// Text encoding the export was decoded with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TextEncoding {
    #[serde(rename = "UTF-8")]
    Utf8,
    #[serde(rename = "Latin-1")]
    Latin1,
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Utf8 => write!(f, "UTF-8"),
            TextEncoding::Latin1 => write!(f, "Latin-1"),
        }
    }
}

/// One line of the export. Blank cells are `None`; values are trimmed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based data row number (the header line is not counted)
    pub line: usize,
    pub fields: Vec<Option<String>>,
}

impl RawRow {
    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).and_then(|v| v.as_deref())
    }

    pub fn get_opt(&self, index: Option<usize>) -> Option<&str> {
        index.and_then(|i| self.get(i))
    }
}

/// The decoded export, before any classification.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    pub encoding: TextEncoding,
    /// Configured columns that were present and removed on load
    pub dropped_columns: Vec<String>,
    /// Hex SHA-256 of the input bytes
    pub checksum: String,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Outcome of one quality check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CheckStatus {
    Passed,
    Failed,
}

impl CheckStatus {
    /// Case-insensitive parse of a trimmed status cell.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("passed") {
            Some(CheckStatus::Passed)
        } else if trimmed.eq_ignore_ascii_case("failed") {
            Some(CheckStatus::Failed)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Passed => "Passed",
            CheckStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A repair order, built from its header row.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub lpn: String,
    /// Source row of the header that was kept
    pub line: usize,
    /// `None` when the cost cell was not numeric
    pub cost: Option<f64>,
    pub disposition: Option<String>,
    pub product_category: Option<String>,
    pub scheduled: Option<String>,
    pub started: Option<String>,
    pub completed: Option<String>,
    pub shipped: Option<String>,
    /// Raw cells of every order-level column, aligned with `WideTable::order_columns`
    pub values: Vec<Option<String>>,
}

/// A check step after its LPN has been resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckStep {
    pub lpn: String,
    pub line: usize,
    pub name: String,
    pub status: Option<String>,
    /// Raw execution-origin indicator
    pub origin: Option<String>,
}

/// Derived features of one order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderFeatures {
    pub is_liquidated: u8,
    pub cogs_bin: Option<String>,
    pub processing_days: Option<i64>,
    pub category_group: Option<String>,
    pub high_value_flag: u8,
    pub total_checks: usize,
    pub failed_checks_count: usize,
    pub passed_checks_count: usize,
    pub failure_rate: f64,
    pub check_efficiency: f64,
    /// One value per registry flag, in registry order
    pub flags: Vec<u8>,
    pub value_lost: Option<f64>,
    pub recovery_potential: Option<f64>,
    pub days_to_ship: Option<i64>,
}
