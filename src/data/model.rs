use std::collections::BTreeSet;
use std::fmt;

// ---------------------------------------------------------------------------
// CellValue – a single table cell
// ---------------------------------------------------------------------------

/// A dynamically-typed table cell mirroring common Pandas dtypes.
///
/// Labels are passed through untouched ("raw" label mode), so a label may be
/// any of these.  Kept `Ord` so unique labels can live in a `BTreeSet`.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use CellValue::*;
        fn rank(v: &CellValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Null => write!(f, "<null>"),
        }
    }
}

impl CellValue {
    /// Guess the type of a textual cell (CSV has no dtypes).
    pub fn parse(s: &str) -> Self {
        if s.is_empty() {
            return CellValue::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return CellValue::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return CellValue::Float(f);
        }
        if s == "true" || s == "false" {
            return CellValue::Bool(s == "true");
        }
        CellValue::String(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// ExampleRow / ExampleTable
// ---------------------------------------------------------------------------

/// One row of a train/test split.
#[derive(Debug, Clone, PartialEq)]
pub struct ExampleRow {
    /// Image file name, relative to the image directory.
    pub filename: String,
    pub label: CellValue,
}

/// An ordered split table.  Row order is the iteration order.
#[derive(Debug, Clone, Default)]
pub struct ExampleTable {
    pub rows: Vec<ExampleRow>,
    pub unique_labels: BTreeSet<CellValue>,
}

impl ExampleTable {
    pub fn from_rows(rows: Vec<ExampleRow>) -> Self {
        let unique_labels = rows.iter().map(|r| r.label.clone()).collect();
        ExampleTable {
            rows,
            unique_labels,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows carrying `label`.
    pub fn count_label(&self, label: &CellValue) -> usize {
        self.rows.iter().filter(|r| &r.label == label).count()
    }

    /// `(label, rows)` for every unique label, in label order.
    pub fn label_counts(&self) -> Vec<(&CellValue, usize)> {
        self.unique_labels
            .iter()
            .map(|label| (label, self.count_label(label)))
            .collect()
    }
}
