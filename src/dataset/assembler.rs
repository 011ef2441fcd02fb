use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::time::Instant;

use log::{debug, info};
use serde::Serialize;

use super::metadata::{ProvisionalMetadata, SourceMetadata};
use crate::config::DatasetConfig;
use crate::data::loader::{SegmentTableLoader, TableLoader};
use crate::data::model::SegmentRecord;
use crate::data::paths::{column_name_to_image_paths, resolve_relative_path, ColumnImagePaths};
use crate::error::{Result, SegexpError};
use crate::sources::{FileImageOpener, ImageSourceOpener, OpenedSource};

pub type SourceToMetadata = HashMap<OpenedSource, SourceMetadata>;

// ---------------------------------------------------------------------------
// SegmentsDataset – the assembled result
// ---------------------------------------------------------------------------

/// Segments of a table together with every image source they reference.
#[derive(Debug, Clone)]
pub struct SegmentsDataset {
    segments: Vec<SegmentRecord>,
    source_to_metadata: SourceToMetadata,
    label_image_column: Option<String>,
}

impl SegmentsDataset {
    /// Open a dataset from disk with the default table loader and image opener.
    pub fn open(config: &DatasetConfig) -> Result<Self> {
        build_dataset(config, &TableLoader::from_config(config), &FileImageOpener)
    }

    pub fn segments(&self) -> &[SegmentRecord] {
        &self.segments
    }

    pub fn source_to_metadata(&self) -> &SourceToMetadata {
        &self.source_to_metadata
    }

    pub fn label_image_column(&self) -> Option<&str> {
        self.label_image_column.as_deref()
    }

    pub fn label_sources(&self) -> impl Iterator<Item = (&OpenedSource, &SourceMetadata)> {
        self.source_to_metadata
            .iter()
            .filter(|(_, meta)| meta.is_label_source())
    }

    pub fn primary_label_sources(&self) -> impl Iterator<Item = (&OpenedSource, &SourceMetadata)> {
        self.source_to_metadata
            .iter()
            .filter(|(_, meta)| meta.is_primary_label_source())
    }

    /// All sources sharing `group_id`, i.e. one column/channel across images.
    pub fn sources_in_group<'a>(
        &'a self,
        group_id: &'a str,
    ) -> impl Iterator<Item = (&'a OpenedSource, &'a SourceMetadata)> + 'a {
        self.source_to_metadata
            .iter()
            .filter(move |(_, meta)| meta.group_id() == group_id)
    }

    /// Distinct group ids, sorted.
    pub fn group_ids(&self) -> Vec<&str> {
        self.source_to_metadata
            .values()
            .map(SourceMetadata::group_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn summary(&self) -> DatasetSummary {
        let mut groups: BTreeMap<&str, GroupSummary> = BTreeMap::new();
        for meta in self.source_to_metadata.values() {
            let group = groups
                .entry(meta.group_id())
                .or_insert_with(|| GroupSummary {
                    group_id: meta.group_id().to_string(),
                    sources: 0,
                    is_label_source: meta.is_label_source(),
                    is_primary_label_source: meta.is_primary_label_source(),
                    image_ids: BTreeSet::new(),
                });
            group.sources += 1;
            group.image_ids.insert(meta.image_id().to_string());
        }
        DatasetSummary {
            segments: self.segments.len(),
            label_image_column: self.label_image_column.clone(),
            groups: groups.into_values().collect(),
        }
    }
}

/// Per-group overview of an assembled dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub segments: usize,
    pub label_image_column: Option<String>,
    pub groups: Vec<GroupSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub group_id: String,
    pub sources: usize,
    pub is_label_source: bool,
    pub is_primary_label_source: bool,
    pub image_ids: BTreeSet<String>,
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Load the segments table, open every image it references and classify
/// the opened sources.
///
/// Any failure aborts the whole operation; no partial dataset is returned.
pub fn build_dataset<L, O>(config: &DatasetConfig, loader: &L, opener: &O) -> Result<SegmentsDataset>
where
    L: SegmentTableLoader + ?Sized,
    O: ImageSourceOpener + ?Sized,
{
    config.validate()?;

    let table_path = config.table_path();
    info!("Loading segments from {}", table_path.display());
    let table = loader.load(
        &table_path,
        config.timepoint_indexing(),
        &config.image_path_prefix,
    )?;
    let (segments, label_image_column) = table.into_parts();

    let image_paths = column_name_to_image_paths(&segments, &config.image_path_prefix);
    let opened = open_sources(&config.root_directory, &image_paths, opener)?;
    let source_to_metadata = classify(opened, label_image_column.as_deref());

    info!(
        "Opened {} segments with {} image sources (label image column: {})",
        segments.len(),
        source_to_metadata.len(),
        label_image_column.as_deref().unwrap_or("<none>")
    );

    Ok(SegmentsDataset {
        segments,
        source_to_metadata,
        label_image_column,
    })
}

/// Open every distinct image path, column by column in sorted order.
///
/// The opener must hand out a new handle per channel per call; a handle
/// seen twice is reported as an unresolvable image.
pub fn open_sources<O>(
    root_directory: &Path,
    column_name_to_image_paths: &ColumnImagePaths,
    opener: &O,
) -> Result<Vec<(OpenedSource, ProvisionalMetadata)>>
where
    O: ImageSourceOpener + ?Sized,
{
    let mut opened = Vec::new();
    let mut seen = HashSet::new();

    for (column, paths) in column_name_to_image_paths {
        info!("Parsing images from column {column}...");
        let start = Instant::now();

        for relative_path in paths {
            let absolute_path = resolve_relative_path(root_directory, relative_path);
            let channels = opener.open(&absolute_path)?;
            debug!(
                "{relative_path}: {} channel(s) from {}",
                channels.len(),
                absolute_path.display()
            );

            for channel in channels {
                if !seen.insert(channel.source.id()) {
                    return Err(SegexpError::unresolvable_image(
                        &absolute_path,
                        format!("opener returned source {} twice", channel.source.id()),
                    ));
                }
                let meta = ProvisionalMetadata::new(column, relative_path, channel.channel_name);
                opened.push((channel.source, meta));
            }
        }

        info!("...done in {} ms", start.elapsed().as_millis());
    }

    Ok(opened)
}

/// Classify the complete set of opened sources.
pub fn classify(
    opened: Vec<(OpenedSource, ProvisionalMetadata)>,
    label_image_column: Option<&str>,
) -> SourceToMetadata {
    opened
        .into_iter()
        .map(|(source, meta)| (source, meta.classify(label_image_column)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{channel_name, OpenedChannel};
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    /// Hands out `channels` synthetic sources per path and records the calls.
    struct StubOpener {
        channels: usize,
        opened: RefCell<Vec<PathBuf>>,
    }

    impl StubOpener {
        fn new(channels: usize) -> Self {
            Self {
                channels,
                opened: RefCell::new(Vec::new()),
            }
        }
    }

    impl ImageSourceOpener for StubOpener {
        fn open(&self, absolute_path: &Path) -> Result<Vec<OpenedChannel>> {
            self.opened.borrow_mut().push(absolute_path.to_path_buf());
            let image = Arc::new(DynamicImage::new_luma8(1, 1));
            Ok((0..self.channels)
                .map(|c| {
                    OpenedChannel::new(
                        OpenedSource::new(absolute_path.to_path_buf(), c, Arc::clone(&image)),
                        channel_name(c, self.channels),
                    )
                })
                .collect())
        }
    }

    /// Returns the same handle for every call.
    struct RepeatingOpener(OpenedSource);

    impl ImageSourceOpener for RepeatingOpener {
        fn open(&self, _absolute_path: &Path) -> Result<Vec<OpenedChannel>> {
            Ok(vec![OpenedChannel::new(self.0.clone(), "")])
        }
    }

    const NUCLEI_TABLE: &str = "label_id\ttimepoint\timage_path_raw\timage_path_nuclei_label\n\
                                1\t0\traw/img1.tif\tlabels/img1_label.tif\n\
                                2\t0\traw/img1.tif\t\n";

    fn dataset_dir(table: &str) -> (TempDir, DatasetConfig) {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("segments.tsv"), table).unwrap();
        let config = DatasetConfig::new(dir.path(), "segments.tsv");
        (dir, config)
    }

    fn find<'a>(dataset: &'a SegmentsDataset, image_id: &str) -> Vec<&'a SourceMetadata> {
        dataset
            .source_to_metadata()
            .values()
            .filter(|m| m.image_id() == image_id)
            .collect()
    }

    #[test]
    fn nuclei_dataset_is_classified() {
        let (_dir, config) = dataset_dir(NUCLEI_TABLE);
        let opener = StubOpener::new(1);

        let dataset = build_dataset(&config, &TableLoader::default(), &opener).unwrap();

        assert_eq!(dataset.segments().len(), 2);
        assert_eq!(dataset.label_image_column(), Some("image_path_nuclei_label"));
        // raw/img1.tif is referenced twice but opened once
        assert_eq!(opener.opened.borrow().len(), 2);
        assert_eq!(dataset.source_to_metadata().len(), 2);

        let raw = find(&dataset, "raw/img1.tif");
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].group_id(), "image_path_raw");
        assert!(!raw[0].is_label_source());
        assert!(!raw[0].is_primary_label_source());

        let label = find(&dataset, "labels/img1_label.tif");
        assert_eq!(label.len(), 1);
        assert_eq!(label[0].group_id(), "image_path_nuclei_label");
        assert!(label[0].is_label_source());
        assert!(label[0].is_primary_label_source());

        assert_eq!(dataset.primary_label_sources().count(), 1);
        assert_eq!(
            dataset.group_ids(),
            vec!["image_path_nuclei_label", "image_path_raw"]
        );
    }

    #[test]
    fn sources_keep_their_opened_path() {
        let (dir, config) = dataset_dir(NUCLEI_TABLE);
        let dataset = build_dataset(&config, &TableLoader::default(), &StubOpener::new(1)).unwrap();
        for (source, meta) in dataset.source_to_metadata() {
            assert_eq!(source.path(), resolve_relative_path(dir.path(), meta.image_id()));
        }
    }

    #[test]
    fn flags_follow_group_ids() {
        let table = "label_id\timage_path_raw\timage_path_nuclei_label\timage_path_cell_label\n\
                     1\tr1.tif\tn1.tif\tc1.tif\n\
                     2\tr2.tif\tn2.tif\tc2.tif\n";
        let (_dir, config) = dataset_dir(table);
        let config = config.with_label_image_column("image_path_cell_label");

        let dataset =
            build_dataset(&config, &TableLoader::from_config(&config), &StubOpener::new(2)).unwrap();

        assert_eq!(dataset.source_to_metadata().len(), 12);
        for (source, meta) in dataset.source_to_metadata() {
            let column = dataset
                .segments()
                .iter()
                .flat_map(|s| s.cells())
                .find(|(c, v)| {
                    c.starts_with("image_path_") && v.as_path().as_deref() == Some(meta.image_id())
                })
                .map(|(c, _)| c)
                .unwrap();
            assert_eq!(meta.group_id(), format!("{column}{}", meta.channel_name()));
            assert_eq!(meta.channel_name(), format!("_ch{}", source.channel()));
            assert_eq!(meta.is_label_source(), meta.group_id().contains("label"));
            assert_eq!(
                meta.is_primary_label_source(),
                meta.group_id().contains("image_path_cell_label")
            );
        }
        assert_eq!(dataset.label_sources().count(), 8);
        assert_eq!(dataset.primary_label_sources().count(), 4);
        assert_eq!(dataset.sources_in_group("image_path_raw_ch1").count(), 2);
    }

    #[test]
    fn table_without_image_columns_has_no_sources() {
        let (_dir, config) = dataset_dir("label_id\tarea\n1\t10\n2\t12\n");
        let opener = StubOpener::new(1);

        let dataset = build_dataset(&config, &TableLoader::default(), &opener).unwrap();

        assert_eq!(dataset.segments().len(), 2);
        assert!(dataset.source_to_metadata().is_empty());
        assert!(opener.opened.borrow().is_empty());
        assert_eq!(dataset.label_image_column(), None);
    }

    #[test]
    fn missing_image_fails_the_whole_dataset() {
        let (_dir, config) = dataset_dir(NUCLEI_TABLE);
        let err = build_dataset(&config, &TableLoader::default(), &FileImageOpener).unwrap_err();
        assert!(matches!(err, SegexpError::UnresolvableImage { .. }));
    }

    #[test]
    fn malformed_table_fails_before_opening() {
        let (_dir, config) = dataset_dir("image_path_raw\nraw/img1.tif\n");
        let opener = StubOpener::new(1);
        let err = build_dataset(&config, &TableLoader::default(), &opener).unwrap_err();
        assert!(matches!(err, SegexpError::TableFormat { .. }));
        assert!(opener.opened.borrow().is_empty());
    }

    #[test]
    fn custom_prefix_reaches_the_loader() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("segments.csv"), "label_id,img_raw\n1,001\n").unwrap();
        let config = DatasetConfig::new(dir.path(), "segments.csv").with_image_path_prefix("img_");

        // `001` stays text under the configured prefix and is looked up as-is
        let err = build_dataset(&config, &TableLoader::default(), &FileImageOpener).unwrap_err();
        match err {
            SegexpError::UnresolvableImage { path, .. } => assert!(path.ends_with("001")),
            other => panic!("expected UnresolvableImage, got {other:?}"),
        }
    }

    #[test]
    fn missing_root_is_a_configuration_error() {
        let config = DatasetConfig::new("/definitely/not/here", "segments.tsv");
        let err = build_dataset(&config, &TableLoader::default(), &StubOpener::new(1)).unwrap_err();
        assert!(matches!(err, SegexpError::Configuration(_)));
    }

    #[test]
    fn repeated_handles_are_rejected() {
        let (_dir, config) = dataset_dir(NUCLEI_TABLE);
        let handle = OpenedSource::new(
            PathBuf::from("x.tif"),
            0,
            Arc::new(DynamicImage::new_luma8(1, 1)),
        );
        let err =
            build_dataset(&config, &TableLoader::default(), &RepeatingOpener(handle)).unwrap_err();
        assert!(matches!(err, SegexpError::UnresolvableImage { .. }));
    }

    #[test]
    fn rebuilding_gives_the_same_metadata() {
        let (_dir, config) = dataset_dir(NUCLEI_TABLE);
        let sorted = |dataset: SegmentsDataset| {
            let mut metas: Vec<SourceMetadata> =
                dataset.source_to_metadata().values().cloned().collect();
            metas.sort();
            metas
        };

        let first = build_dataset(&config, &TableLoader::default(), &StubOpener::new(3)).unwrap();
        let second = build_dataset(&config, &TableLoader::default(), &StubOpener::new(3)).unwrap();

        assert!(first
            .source_to_metadata()
            .keys()
            .all(|s| !second.source_to_metadata().contains_key(s)));
        assert_eq!(sorted(first), sorted(second));
    }

    #[test]
    fn summary_groups_sources() {
        let (_dir, config) = dataset_dir(NUCLEI_TABLE);
        let dataset = build_dataset(&config, &TableLoader::default(), &StubOpener::new(1)).unwrap();
        let summary = dataset.summary();

        assert_eq!(summary.segments, 2);
        assert_eq!(summary.groups.len(), 2);
        let label = &summary.groups[0];
        assert_eq!(label.group_id, "image_path_nuclei_label");
        assert!(label.is_primary_label_source);
        assert_eq!(label.image_ids, BTreeSet::from(["labels/img1_label.tif".to_string()]));
    }

    #[test]
    fn opens_real_images_from_disk() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("raw")).unwrap();
        std::fs::create_dir_all(dir.path().join("labels")).unwrap();
        GrayImage::from_pixel(4, 4, Luma([90]))
            .save(dir.path().join("raw/img1.png"))
            .unwrap();
        let labels: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(4, 4, |x, _| Luma([if x < 2 { 1 } else { 2 }]));
        labels.save(dir.path().join("labels/img1_label.png")).unwrap();
        std::fs::write(
            dir.path().join("segments.csv"),
            "label_id,timepoint,image_path_raw,image_path_nuclei_label\n\
             1,1,raw/img1.png,labels/img1_label.png\n\
             2,1,raw\\img1.png,labels/img1_label.png\n",
        )
        .unwrap();

        let config = DatasetConfig::new(dir.path(), "segments.csv").with_one_based_timepoint(true);
        let dataset = SegmentsDataset::open(&config).unwrap();

        assert!(dataset.segments().iter().all(|s| s.timepoint() == 0));
        // `raw\img1.png` is a different spelling of the same file and is opened again
        assert_eq!(dataset.source_to_metadata().len(), 3);
        let (label_source, _) = dataset.primary_label_sources().next().unwrap();
        assert_eq!(label_source.channel_values(), vec![1u16, 1, 2, 2].repeat(4));
    }
}
