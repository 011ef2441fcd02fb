use std::path::Path;
use std::sync::Arc;

use log::debug;

use super::source::OpenedSource;
use crate::error::{Result, SegexpError};

/// A freshly opened source with the channel name its opener assigned.
#[derive(Debug, Clone)]
pub struct OpenedChannel {
    pub source: OpenedSource,
    /// Empty for single-channel images.
    pub channel_name: String,
}

impl OpenedChannel {
    pub fn new(source: OpenedSource, channel_name: impl Into<String>) -> Self {
        Self {
            source,
            channel_name: channel_name.into(),
        }
    }
}

/// Opens an image file as one source per channel.
pub trait ImageSourceOpener {
    /// Must return fresh handles on every call.
    /// Fails with [`SegexpError::UnresolvableImage`] when the file cannot be decoded.
    fn open(&self, absolute_path: &Path) -> Result<Vec<OpenedChannel>>;
}

/// Channel discriminator appended to a column name to form a group id.
pub fn channel_name(index: usize, count: usize) -> String {
    if count <= 1 {
        String::new()
    } else {
        format!("_ch{index}")
    }
}

/// Decodes image files from disk with the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileImageOpener;

impl ImageSourceOpener for FileImageOpener {
    fn open(&self, absolute_path: &Path) -> Result<Vec<OpenedChannel>> {
        if !absolute_path.is_file() {
            return Err(SegexpError::unresolvable_image(absolute_path, "no such file"));
        }
        let image = image::open(absolute_path)
            .map_err(|e| SegexpError::unresolvable_image(absolute_path, e.to_string()))?;

        let count = usize::from(image.color().channel_count());
        debug!(
            "Opened {} ({}x{}, {:?})",
            absolute_path.display(),
            image.width(),
            image.height(),
            image.color()
        );

        let image = Arc::new(image);
        Ok((0..count)
            .map(|channel| {
                OpenedChannel::new(
                    OpenedSource::new(absolute_path.to_path_buf(), channel, Arc::clone(&image)),
                    channel_name(channel, count),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma, RgbImage};
    use tempfile::tempdir;

    #[test]
    fn grayscale_image_is_one_unnamed_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gray.png");
        GrayImage::from_pixel(3, 2, Luma([7])).save(&path).unwrap();

        let channels = FileImageOpener.open(&path).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].channel_name, "");
        assert_eq!(channels[0].source.path(), path.as_path());
        assert_eq!(channels[0].source.channel_values(), vec![7u16 * 257; 6]);
    }

    #[test]
    fn sixteen_bit_labels_keep_their_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.png");
        let labels: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(2, 2, |x, y| Luma([(y * 2 + x) as u16 + 300]));
        labels.save(&path).unwrap();

        let channels = FileImageOpener.open(&path).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].source.bit_depth(), 16);
        assert_eq!(channels[0].source.channel_values(), vec![300u16, 301, 302, 303]);
    }

    #[test]
    fn colour_image_splits_into_channels() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rgb.png");
        RgbImage::new(4, 4).save(&path).unwrap();

        let channels = FileImageOpener.open(&path).unwrap();
        let names: Vec<_> = channels.iter().map(|c| c.channel_name.as_str()).collect();
        assert_eq!(names, vec!["_ch0", "_ch1", "_ch2"]);
        assert_eq!(
            channels.iter().map(|c| c.source.channel()).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_ne!(channels[0].source, channels[1].source);
    }

    #[test]
    fn every_call_returns_fresh_handles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gray.png");
        GrayImage::new(1, 1).save(&path).unwrap();

        let first = FileImageOpener.open(&path).unwrap();
        let second = FileImageOpener.open(&path).unwrap();
        assert_ne!(first[0].source, second[0].source);
    }

    #[test]
    fn missing_file_is_unresolvable() {
        let dir = tempdir().unwrap();
        let err = FileImageOpener
            .open(&dir.path().join("absent.tif"))
            .unwrap_err();
        assert!(matches!(err, SegexpError::UnresolvableImage { .. }));
    }

    #[test]
    fn undecodable_file_is_unresolvable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        let err = FileImageOpener.open(&path).unwrap_err();
        assert!(matches!(err, SegexpError::UnresolvableImage { .. }));
    }
}
