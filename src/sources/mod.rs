//! Opened image sources: one handle per channel of a decoded image file.

pub mod opener;
pub mod source;

pub use opener::{channel_name, FileImageOpener, ImageSourceOpener, OpenedChannel};
pub use source::{OpenedSource, SourceId};
