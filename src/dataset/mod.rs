//! Dataset assembly: open every image a segments table references, then
//! classify the opened sources.
//!
//! Opening and classification are separate phases. [`open_sources`] yields
//! [`ProvisionalMetadata`] only; [`classify`] runs once over the complete
//! collection, after the label image column of the table is known, and is
//! the only way to obtain a [`SourceMetadata`].

pub mod assembler;
pub mod metadata;

pub use assembler::{
    build_dataset, classify, open_sources, DatasetSummary, GroupSummary, SegmentsDataset,
    SourceToMetadata,
};
pub use metadata::{ProvisionalMetadata, SourceMetadata, LABEL_MARKER};
