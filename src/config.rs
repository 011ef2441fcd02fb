use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::model::TimepointIndexing;
use crate::error::{Result, SegexpError};

/// Column-name prefix marking cells that hold image paths.
pub const DEFAULT_IMAGE_PATH_PREFIX: &str = "image_path_";

// ---------------------------------------------------------------------------
// SegmentColumns – names of the segment identity columns
// ---------------------------------------------------------------------------

/// Names of the columns carrying per-segment identity and position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentColumns {
    /// Pixel value of the segment in its label image (required).
    pub label_id: String,
    /// Frame the segment belongs to (optional, defaults to the first frame).
    pub timepoint: String,
    pub anchor_x: String,
    pub anchor_y: String,
    pub anchor_z: String,
}

impl Default for SegmentColumns {
    fn default() -> Self {
        Self {
            label_id: "label_id".to_string(),
            timepoint: "timepoint".to_string(),
            anchor_x: "anchor_x".to_string(),
            anchor_y: "anchor_y".to_string(),
            anchor_z: "anchor_z".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// DatasetConfig
// ---------------------------------------------------------------------------

/// Everything needed to open a segments dataset.
///
/// Can be deserialized from JSON:
///
/// ```json
/// {
///   "root_directory": "/data/experiment-1",
///   "relative_table_path": "tables/segments.tsv",
///   "isOneBasedTimePoint": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Root of the dataset; image paths in the table are relative to it.
    pub root_directory: PathBuf,
    /// Path of the segments table, relative to `root_directory`.
    pub relative_table_path: PathBuf,
    /// Whether timepoints in the table count from one.
    #[serde(default, alias = "isOneBasedTimePoint")]
    pub one_based_timepoint: bool,
    #[serde(default = "default_image_path_prefix")]
    pub image_path_prefix: String,
    /// Explicit label image column; detected from the headers when absent.
    #[serde(default)]
    pub label_image_column: Option<String>,
    #[serde(default)]
    pub columns: SegmentColumns,
}

fn default_image_path_prefix() -> String {
    DEFAULT_IMAGE_PATH_PREFIX.to_string()
}

impl DatasetConfig {
    pub fn new(root_directory: impl Into<PathBuf>, relative_table_path: impl Into<PathBuf>) -> Self {
        Self {
            root_directory: root_directory.into(),
            relative_table_path: relative_table_path.into(),
            one_based_timepoint: false,
            image_path_prefix: default_image_path_prefix(),
            label_image_column: None,
            columns: SegmentColumns::default(),
        }
    }

    pub fn with_one_based_timepoint(mut self, one_based: bool) -> Self {
        self.one_based_timepoint = one_based;
        self
    }

    pub fn with_image_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.image_path_prefix = prefix.into();
        self
    }

    pub fn with_label_image_column(mut self, column: impl Into<String>) -> Self {
        self.label_image_column = Some(column.into());
        self
    }

    /// Read a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SegexpError::configuration(format!("reading '{}': {e}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            SegexpError::configuration(format!("parsing '{}': {e}", path.display()))
        })
    }

    /// Check that the root directory is usable and the options are sane.
    pub fn validate(&self) -> Result<()> {
        let root = &self.root_directory;
        if !root.exists() {
            return Err(SegexpError::configuration(format!(
                "root directory '{}' does not exist",
                root.display()
            )));
        }
        if !root.is_dir() {
            return Err(SegexpError::configuration(format!(
                "root directory '{}' is not a directory",
                root.display()
            )));
        }
        if let Err(e) = std::fs::read_dir(root) {
            return Err(SegexpError::configuration(format!(
                "root directory '{}' is not readable: {e}",
                root.display()
            )));
        }
        if self.image_path_prefix.is_empty() {
            return Err(SegexpError::configuration("image path prefix must not be empty"));
        }
        Ok(())
    }

    /// Absolute location of the segments table.
    pub fn table_path(&self) -> PathBuf {
        self.root_directory.join(&self.relative_table_path)
    }

    pub fn timepoint_indexing(&self) -> TimepointIndexing {
        TimepointIndexing::from_one_based(self.one_based_timepoint)
    }
}
