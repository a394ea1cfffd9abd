// Frames that are already RGB (decoded stills, screenshots, test patterns).
// Uses every default of `PixelSource`: the RGB difference path with a 128 gray.

use std::path::Path;

use image::RgbImage;
use tracing::debug;

use crate::error::{Error, Result};
use crate::source::PixelSource;
use crate::types::FrameSize;

pub struct RgbSource {
    frames: Vec<RgbImage>,
}

impl RgbSource {
    pub fn from_images(frames: Vec<RgbImage>) -> Self {
        Self { frames }
    }

    /// Decode one still image per frame, in the given order.
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut frames = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let img = image::open(path).map_err(|e| match e {
                image::ImageError::IoError(source) => Error::SourceOpen { path: path.to_path_buf(), source },
                other => Error::Image(other),
            })?;
            debug!(path = %path.display(), width = img.width(), height = img.height(), "decoded still");
            frames.push(img.to_rgb8());
        }
        Ok(Self { frames })
    }
}

impl PixelSource for RgbSource {
    fn frame_size(&self) -> FrameSize {
        self.frames
            .first()
            .map(|f| FrameSize::new(f.width(), f.height()))
            .unwrap_or_default()
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Non-empty, and every frame shares the first frame's size.
    fn is_format_valid(&self) -> bool {
        let size = self.frame_size();
        !size.is_empty() && self.frames.iter().all(|f| f.dimensions() == (size.width, size.height))
    }

    fn load_rgb(&self, frame_index: usize) -> Option<RgbImage> {
        self.frames.get(frame_index).cloned()
    }
}
