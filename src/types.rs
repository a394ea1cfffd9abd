// Core types shared by the engine, the sources and the drawing code.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Software canvas the viewer presents; also the target of pixel-value rendering.
#[derive(Clone)]
pub struct FrameBuffer {
    pub width: usize,      // canvas width in screen pixels
    pub height: usize,     // canvas height in screen pixels
    pub pixels: Vec<u32>,  // each entry is 0x00RRGGBB for minifb
}

impl FrameBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, pixels: vec![0u32; width * height] }
    }

    pub fn clear(&mut self, color: u32) {
        self.pixels.fill(color);
    }

    /// Color at (x, y), `None` outside the canvas.
    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y * self.width + x])
    }
}

/// Width/height of a frame in luma samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Componentwise minimum: the area both frames cover.
    pub fn min(self, other: FrameSize) -> FrameSize {
        FrameSize { width: self.width.min(other.width), height: self.height.min(other.height) }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(self, pos: Point) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    pub fn area(self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for FrameSize {
    type Err = Error;

    /// Parses `1920x1080` (`X` and `*` are accepted as separators too).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || Error::InvalidGeometry(format!("expected WIDTHxHEIGHT, got {s:?}"));
        let (w, h) = s.trim().split_once(['x', 'X', '*']).ok_or_else(bad)?;
        let width = w.trim().parse::<u32>().map_err(|_| bad())?;
        let height = h.trim().parse::<u32>().map_err(|_| bad())?;
        if width == 0 || height == 0 {
            return Err(bad());
        }
        Ok(FrameSize { width, height })
    }
}

/// Pixel position inside a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Which part of a frame is on the canvas, and how large one frame pixel is drawn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelView {
    pub origin: Point, // frame pixel drawn at canvas (0,0)
    pub zoom: u32,     // canvas pixels per frame pixel (>= 1)
}

impl PixelView {
    pub fn new(origin: Point, zoom: u32) -> Self {
        Self { origin, zoom: zoom.max(1) }
    }

    /// Frame pixels visible on a canvas of the given size, clipped to `frame`.
    /// Returns (x0, y0, x1, y1), end exclusive.
    pub fn visible_range(&self, canvas: &FrameBuffer, frame: FrameSize) -> (u32, u32, u32, u32) {
        let zoom = self.zoom.max(1) as usize;
        let cols = canvas.width.div_ceil(zoom) as u32;
        let rows = canvas.height.div_ceil(zoom) as u32;
        let x0 = self.origin.x.min(frame.width);
        let y0 = self.origin.y.min(frame.height);
        let x1 = x0.saturating_add(cols).min(frame.width);
        let y1 = y0.saturating_add(rows).min(frame.height);
        (x0, y0, x1, y1)
    }

    /// Canvas position of the top-left corner of frame pixel `pos`.
    pub fn to_canvas(&self, pos: Point) -> (i32, i32) {
        let zoom = self.zoom.max(1) as i64;
        let x = (pos.x as i64 - self.origin.x as i64) * zoom;
        let y = (pos.y as i64 - self.origin.y as i64) * zoom;
        (x.clamp(i32::MIN as i64, i32::MAX as i64) as i32, y.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
    }
}

impl Default for PixelView {
    fn default() -> Self {
        Self { origin: Point::default(), zoom: 1 }
    }
}

/// A labeled value for an info panel (pixel probe, first-difference report).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValuePair {
    pub label: String,
    pub value: String,
}

impl ValuePair {
    pub fn new(label: impl Into<String>, value: impl ToString) -> Self {
        Self { label: label.into(), value: value.to_string() }
    }
}

impl fmt::Display for ValuePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.value)
    }
}

/// Per-frame statistics a difference computation reports (type, MSE per component).
pub type DifferenceInfo = ValuePair;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_is_componentwise() {
        let a = FrameSize::new(1920, 720);
        let b = FrameSize::new(1280, 1080);
        assert_eq!(a.min(b), FrameSize::new(1280, 720));
        assert_eq!(b.min(a), FrameSize::new(1280, 720));
    }

    #[test]
    fn parses_geometry_strings() {
        assert_eq!("416x240".parse::<FrameSize>().unwrap(), FrameSize::new(416, 240));
        assert_eq!(" 64X32 ".parse::<FrameSize>().unwrap(), FrameSize::new(64, 32));
        assert!("416".parse::<FrameSize>().is_err());
        assert!("0x240".parse::<FrameSize>().is_err());
        assert!("ax2".parse::<FrameSize>().is_err());
    }

    #[test]
    fn visible_range_is_clipped_to_frame() {
        let canvas = FrameBuffer::new(100, 50);
        let view = PixelView::new(Point::new(10, 4), 20);
        // 5 columns x 3 rows fit (rounded up), frame ends at 12x6
        assert_eq!(view.visible_range(&canvas, FrameSize::new(12, 6)), (10, 4, 12, 6));
        assert_eq!(view.to_canvas(Point::new(11, 5)), (20, 20));
    }
}
