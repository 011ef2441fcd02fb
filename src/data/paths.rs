use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use super::model::SegmentRecord;

/// Distinct relative image paths, grouped by the column that references them.
pub type ColumnImagePaths = BTreeMap<String, BTreeSet<String>>;

/// One image referenced from one table cell.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImagePathReference {
    pub column: String,
    /// Relative to the dataset root.
    pub path: String,
}

/// All image references in `records`, one per non-blank cell of a column
/// whose name starts with `prefix`. Repeats are kept.
pub fn image_path_references<'a>(
    records: &'a [SegmentRecord],
    prefix: &'a str,
) -> impl Iterator<Item = ImagePathReference> + 'a {
    records.iter().flat_map(move |record| {
        record
            .cells()
            .filter(move |(column, _)| column.starts_with(prefix))
            .filter_map(|(column, value)| {
                value.as_path().map(|path| ImagePathReference {
                    column: column.to_string(),
                    path: path.into_owned(),
                })
            })
    })
}

/// Group the distinct image paths of every `prefix`-matching column.
///
/// Each path appears once per column no matter how many segments share it.
/// A matching column whose cells are all blank maps to an empty set; a table
/// without matching columns yields an empty map.
pub fn column_name_to_image_paths(records: &[SegmentRecord], prefix: &str) -> ColumnImagePaths {
    let mut grouped = ColumnImagePaths::new();
    for record in records {
        for column in record.column_names().filter(|c| c.starts_with(prefix)) {
            grouped.entry(column.to_string()).or_default();
        }
    }
    for reference in image_path_references(records, prefix) {
        grouped
            .entry(reference.column)
            .or_default()
            .insert(reference.path);
    }
    grouped
}

/// Join a table path string onto `root`.
///
/// Both `/` and `\` count as separators and `.` / empty segments are
/// dropped, so `raw\\img1.tif`, `./raw/img1.tif` and `/raw//img1.tif` all
/// resolve to `root/raw/img1.tif`.
pub fn resolve_relative_path(root: &Path, relative: &str) -> PathBuf {
    let mut resolved = root.to_path_buf();
    for part in relative.split(['/', '\\']) {
        if part.is_empty() || part == "." {
            continue;
        }
        resolved.push(part);
    }
    resolved
}
