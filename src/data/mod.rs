/// Table layer: segment records, table loading and image path extraction.
///
/// Architecture:
/// ```text
///  .tsv / .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → SegmentTable (+ label image column)
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ SegmentTable  │  Vec<SegmentRecord>, header
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  paths    │  image_path_* cells → column → {relative paths}
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod paths;
