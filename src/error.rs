use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures that abort opening a segments dataset.
///
/// None of these are retried; a dataset with a malformed table or an image
/// that cannot be decoded is not usable downstream.
#[derive(Debug, Error)]
pub enum SegexpError {
    /// The segments table is malformed or misses a required column.
    #[error("malformed segments table '{}': {reason}", .path.display())]
    TableFormat { path: PathBuf, reason: String },

    /// An image referenced by the table is missing, unreadable or unsupported.
    #[error("cannot open image '{}': {reason}", .path.display())]
    UnresolvableImage { path: PathBuf, reason: String },

    /// Invalid dataset configuration (e.g. missing root directory).
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, SegexpError>;

impl SegexpError {
    pub fn table_format(path: &Path, reason: impl Into<String>) -> Self {
        SegexpError::TableFormat {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn unresolvable_image(path: &Path, reason: impl Into<String>) -> Self {
        SegexpError::UnresolvableImage {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        SegexpError::Configuration(msg.into())
    }
}
