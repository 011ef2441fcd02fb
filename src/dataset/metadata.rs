use serde::Serialize;

/// Substring of a group id that marks a label (segmentation) image.
pub const LABEL_MARKER: &str = "label";

/// What is known about a source right after opening it: where it came
/// from, but not yet how it is classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalMetadata {
    image_id: String,
    group_id: String,
    channel_name: String,
}

impl ProvisionalMetadata {
    /// `group_id` is `column` followed by `channel_name`.
    pub fn new(column: &str, relative_path: &str, channel_name: impl Into<String>) -> Self {
        let channel_name = channel_name.into();
        Self {
            image_id: relative_path.to_string(),
            group_id: format!("{column}{channel_name}"),
            channel_name,
        }
    }

    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// Finish the record once the label image column of the table is known.
    pub fn classify(self, label_image_column: Option<&str>) -> SourceMetadata {
        let is_label_source = self.group_id.contains(LABEL_MARKER);
        let is_primary_label_source =
            label_image_column.is_some_and(|column| self.group_id.contains(column));
        SourceMetadata {
            image_id: self.image_id,
            group_id: self.group_id,
            channel_name: self.channel_name,
            is_label_source,
            is_primary_label_source,
        }
    }
}

/// Fully classified description of one opened source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceMetadata {
    image_id: String,
    group_id: String,
    channel_name: String,
    is_label_source: bool,
    is_primary_label_source: bool,
}

impl SourceMetadata {
    /// Relative path (as written in the table) the source was opened from.
    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    /// Table column plus channel name.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn is_label_source(&self) -> bool {
        self.is_label_source
    }

    /// Whether the source comes from the table's label image column.
    pub fn is_primary_label_source(&self) -> bool {
        self.is_primary_label_source
    }
}
