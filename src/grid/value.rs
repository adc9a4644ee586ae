use std::collections::HashMap;
use std::fmt;

/// Column name -> value mapping for one row.
pub type RowValues = HashMap<String, CellValue>;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    /// No value supplied; the database applies the column default.
    #[default]
    Default,
    /// Explicit SQL NULL.
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

pub(crate) static DEFAULT_VALUE: CellValue = CellValue::Default;

impl CellValue {
    /// Parse user input according to the column's declared type.
    /// Input that does not fit a numeric type is kept as text, like SQLite would.
    pub fn parse_for(ty: ColumnType, input: &str) -> Self {
        match ty {
            ColumnType::Integer => input
                .trim()
                .parse::<i64>()
                .map(CellValue::Integer)
                .unwrap_or_else(|_| CellValue::Text(input.to_string())),
            ColumnType::Real => input
                .trim()
                .parse::<f64>()
                .map(CellValue::Real)
                .unwrap_or_else(|_| CellValue::Text(input.to_string())),
            ColumnType::Text | ColumnType::Blob => CellValue::Text(input.to_string()),
        }
    }

    /// Text used when the value is placed in an edit buffer.
    pub fn edit_text(&self) -> String {
        match self {
            CellValue::Default | CellValue::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Default => f.write_str("DEFAULT"),
            CellValue::Null => f.write_str("NULL"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Real(r) => write!(f, "{r}"),
            CellValue::Text(t) => f.write_str(t),
            CellValue::Blob(b) => {
                f.write_str("0x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Blob,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Real)
    }

    /// Map a declared SQL type to a column type using SQLite's affinity rules.
    pub fn from_declared(decl: &str) -> Self {
        let d = decl.to_ascii_uppercase();
        if d.contains("INT") {
            ColumnType::Integer
        } else if d.contains("CHAR") || d.contains("CLOB") || d.contains("TEXT") {
            ColumnType::Text
        } else if d.contains("BLOB") {
            ColumnType::Blob
        } else if d.contains("REAL") || d.contains("FLOA") || d.contains("DOUB") {
            ColumnType::Real
        } else if d.is_empty() {
            ColumnType::Blob
        } else {
            // NUMERIC affinity
            ColumnType::Real
        }
    }
}

/// Column metadata as supplied by the query collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: ColumnType,
    pub primary_key: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, declared_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            declared_type,
            primary_key: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// Immutable per-column metadata for one loaded result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: ColumnType,
    pub initial_width: u32,
    pub icon: Option<char>,
    pub resizable: bool,
    pub primary_key: bool,
}
