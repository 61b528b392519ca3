use std::fmt;
use std::path::PathBuf;

use serde_json::Value;

use crate::error::LoginError;

//==============================================================================
// Tabular data
//==============================================================================

/// A raw cell value as encoded by the source workbook.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Blank,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Blank)
    }

    /// JSON value for a RAW `values.update` payload. Blanks become `""`.
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Blank => Value::String(String::new()),
            CellValue::Text(s) => Value::String(s.clone()),
            CellValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(n.to_string())),
            CellValue::Bool(b) => Value::Bool(*b),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Blank => Ok(()),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// Ordered rows of cells. Rows may have different lengths; the header row is
/// not interpreted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularGrid {
    pub rows: Vec<Vec<CellValue>>,
}

impl TabularGrid {
    pub fn new(rows: Vec<Vec<CellValue>>) -> Self {
        Self { rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Length of the longest row.
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// True unless at least one row holds at least one cell.
    pub fn is_blank(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }

    /// Rows as a JSON array of arrays, the shape `values.update` expects.
    pub fn to_json_rows(&self) -> Vec<Vec<Value>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(CellValue::to_json).collect())
            .collect()
    }
}

//==============================================================================
// Run inputs and outputs
//==============================================================================

/// Login identity and secret for the source application.
#[derive(Clone, Default)]
pub struct Credentials {
    pub identity: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    pub fn ensure_present(&self) -> Result<(), LoginError> {
        if self.identity.trim().is_empty() || self.secret.trim().is_empty() {
            return Err(LoginError::MissingCredentials);
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// What a successful run reports.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub output_path: PathBuf,
    pub rows_written: usize,
}
