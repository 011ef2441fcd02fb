use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// CellValue – a single cell of the segments table
// ---------------------------------------------------------------------------

/// A dynamically-typed table cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
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
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Integral value; floats qualify only without a fractional part (`3.0`).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Integer(i) => Some(*i),
            CellValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The cell read as an image path reference.
    ///
    /// Text is trimmed and blank text is not a reference. Other scalars
    /// (e.g. an integer-typed parquet column) are rendered as text so they
    /// still reach the opener.
    pub fn as_path(&self) -> Option<Cow<'_, str>> {
        match self {
            CellValue::String(s) if s.trim().is_empty() => None,
            CellValue::String(s) => Some(Cow::Borrowed(s.trim())),
            CellValue::Null => None,
            other => Some(Cow::Owned(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// TimepointIndexing
// ---------------------------------------------------------------------------

/// How frame numbers in the table are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimepointIndexing {
    #[default]
    ZeroBased,
    OneBased,
}

impl TimepointIndexing {
    pub fn from_one_based(one_based: bool) -> Self {
        if one_based {
            TimepointIndexing::OneBased
        } else {
            TimepointIndexing::ZeroBased
        }
    }

    /// Convert a timepoint as written in the table to a zero-based frame index.
    pub fn normalize(self, raw: i64) -> Result<usize, String> {
        let first = match self {
            TimepointIndexing::ZeroBased => 0,
            TimepointIndexing::OneBased => 1,
        };
        if raw < first {
            return Err(format!("timepoint {raw} is below the first frame ({first})"));
        }
        usize::try_from(raw - first).map_err(|e| format!("timepoint {raw}: {e}"))
    }
}

// ---------------------------------------------------------------------------
// SegmentRecord – one row of the table
// ---------------------------------------------------------------------------

/// One image segment (a row of the segments table).
///
/// Records are immutable once loaded. All records of a table share the
/// header, so the named cell lookups cost a scan over column names only.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRecord {
    columns: Arc<[String]>,
    cells: Vec<CellValue>,
    label_id: f64,
    timepoint: usize,
    anchor: Option<[f64; 3]>,
    image_id: Option<String>,
}

impl SegmentRecord {
    /// `cells` must be aligned with `columns`.
    pub fn new(
        columns: Arc<[String]>,
        cells: Vec<CellValue>,
        label_id: f64,
        timepoint: usize,
        anchor: Option<[f64; 3]>,
        image_id: Option<String>,
    ) -> Self {
        debug_assert_eq!(columns.len(), cells.len());
        Self {
            columns,
            cells,
            label_id,
            timepoint,
            anchor,
            image_id,
        }
    }

    /// Pixel value of this segment in its label image.
    pub fn label_id(&self) -> f64 {
        self.label_id
    }

    /// Zero-based frame index.
    pub fn timepoint(&self) -> usize {
        self.timepoint
    }

    pub fn anchor(&self) -> Option<[f64; 3]> {
        self.anchor
    }

    /// Relative path of the label image holding this segment, if the table has one.
    pub fn image_id(&self) -> Option<&str> {
        self.image_id.as_deref()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn cell(&self, column: &str) -> Option<&CellValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.cells.get(i))
    }

    /// `(column, value)` pairs in header order.
    pub fn cells(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.columns.iter().map(String::as_str).zip(self.cells.iter())
    }
}

// ---------------------------------------------------------------------------
// SegmentTable – the complete loaded table
// ---------------------------------------------------------------------------

/// Parsed segments table together with its label image column.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentTable {
    records: Vec<SegmentRecord>,
    label_image_column: Option<String>,
}

impl SegmentTable {
    pub fn new(records: Vec<SegmentRecord>, label_image_column: Option<String>) -> Self {
        Self {
            records,
            label_image_column,
        }
    }

    pub fn records(&self) -> &[SegmentRecord] {
        &self.records
    }

    /// Column holding the primary label image, when the table has one.
    pub fn label_image_column(&self) -> Option<&str> {
        self.label_image_column.as_deref()
    }

    pub fn into_parts(self) -> (Vec<SegmentRecord>, Option<String>) {
        (self.records, self.label_image_column)
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
