//! Open a segmentation dataset: a table with one row per image segment plus
//! the images its `image_path_*` columns point at.
//!
//! ```text
//!  root/ + segments.tsv
//!        │
//!        ▼
//!   data::loader      table → SegmentRecords, label image column
//!        │
//!        ▼
//!   data::paths       image_path_* columns → distinct relative paths
//!        │
//!        ▼
//!   sources::opener   absolute path → one OpenedSource per channel
//!        │
//!        ▼
//!   dataset           merge, then classify → SourceMetadata
//! ```

pub mod config;
pub mod data;
pub mod dataset;
pub mod error;
pub mod sources;

pub use config::{DatasetConfig, SegmentColumns};
pub use data::model::{CellValue, SegmentRecord, SegmentTable, TimepointIndexing};
pub use dataset::{build_dataset, SegmentsDataset, SourceMetadata};
pub use error::{Result, SegexpError};
pub use sources::{FileImageOpener, ImageSourceOpener, OpenedChannel, OpenedSource, SourceId};
