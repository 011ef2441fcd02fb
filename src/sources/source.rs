use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::DynamicImage;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an opened source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Mint a fresh id; never returns the same value twice.
    pub fn next() -> Self {
        SourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// OpenedSource – one channel of a decoded image
// ---------------------------------------------------------------------------

/// Handle to one channel of a decoded image file.
///
/// Equality and hashing use the handle's [`SourceId`] only: two handles for
/// the same file and channel are distinct sources. Channels of one file share
/// the decoded pixels.
#[derive(Clone)]
pub struct OpenedSource {
    id: SourceId,
    path: PathBuf,
    channel: usize,
    image: Arc<DynamicImage>,
}

impl OpenedSource {
    pub fn new(path: PathBuf, channel: usize, image: Arc<DynamicImage>) -> Self {
        Self {
            id: SourceId::next(),
            path,
            channel,
            image,
        }
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Absolute path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Index of this channel within its image.
    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Bits per sample of the decoded image.
    pub fn bit_depth(&self) -> u16 {
        let color = self.image.color();
        color.bits_per_pixel() / u16::from(color.channel_count())
    }

    /// Number of channels in the image this source belongs to.
    pub fn channel_count(&self) -> usize {
        usize::from(self.image.color().channel_count())
    }

    /// This channel's samples, row-major, widened to 16 bits.
    pub fn channel_values(&self) -> Vec<u16> {
        let count = self.channel_count();
        let interleaved = match count {
            1 => self.image.to_luma16().into_raw(),
            2 => self.image.to_luma_alpha16().into_raw(),
            3 => self.image.to_rgb16().into_raw(),
            _ => self.image.to_rgba16().into_raw(),
        };
        let stride = count.clamp(1, 4);
        interleaved
            .into_iter()
            .skip(self.channel)
            .step_by(stride)
            .collect()
    }
}

impl PartialEq for OpenedSource {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for OpenedSource {}

impl Hash for OpenedSource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for OpenedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedSource")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("channel", &self.channel)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}
