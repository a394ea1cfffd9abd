//! Planar raw YUV frames (8 or 10 bit; 4:2:0, 4:2:2 or 4:4:4).
//!
//! A raw `.yuv` file is just frames laid back to back: the full Y plane,
//! then U, then V. 10 bit samples are little-endian 16 bit words. There is
//! no header, so geometry and format come from the caller.
//!
//! Two YUV sources of the same format are compared plane by plane; the
//! rendered difference places "no difference" at the middle sample value
//! (128 at 8 bit), which the BT.709 conversion maps to RGB 130.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use image::{Rgb, RgbImage};
use tracing::{debug, warn};

use crate::color::YuvToRgbLut;
use crate::draw::{self, ValueCell};
use crate::error::{Error, Result};
use crate::source::{
    amplify, rgb_difference, rgb_pixel_values, render_rgb_values, DifferenceFrame, PixelSource,
    SquaredError, MARKED, UNMARKED,
};
use crate::types::{FrameBuffer, FrameSize, PixelView, Point, ValuePair};

const COMPONENTS: [&str; 3] = ["Y", "U", "V"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChromaSubsampling {
    #[default]
    Yuv420,
    Yuv422,
    Yuv444,
}

impl ChromaSubsampling {
    /// Horizontal and vertical chroma decimation.
    pub fn factors(self) -> (u32, u32) {
        match self {
            ChromaSubsampling::Yuv420 => (2, 2),
            ChromaSubsampling::Yuv422 => (2, 1),
            ChromaSubsampling::Yuv444 => (1, 1),
        }
    }
}

impl fmt::Display for ChromaSubsampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChromaSubsampling::Yuv420 => "4:2:0",
            ChromaSubsampling::Yuv422 => "4:2:2",
            ChromaSubsampling::Yuv444 => "4:4:4",
        })
    }
}

impl FromStr for ChromaSubsampling {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "420" | "4:2:0" => Ok(ChromaSubsampling::Yuv420),
            "422" | "4:2:2" => Ok(ChromaSubsampling::Yuv422),
            "444" | "4:4:4" => Ok(ChromaSubsampling::Yuv444),
            other => Err(Error::SourceFormat(format!("unknown chroma subsampling {other:?}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct YuvFormat {
    pub subsampling: ChromaSubsampling,
    pub bit_depth: u8,
}

impl YuvFormat {
    pub const I420: YuvFormat = YuvFormat { subsampling: ChromaSubsampling::Yuv420, bit_depth: 8 };

    pub fn new(subsampling: ChromaSubsampling, bit_depth: u8) -> Self {
        Self { subsampling, bit_depth }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self.bit_depth, 8 | 10)
    }

    fn bytes_per_sample(&self) -> usize {
        if self.bit_depth > 8 { 2 } else { 1 }
    }

    fn max_value(&self) -> i32 {
        (1 << self.bit_depth) - 1
    }

    fn mid_value(&self) -> i32 {
        1 << (self.bit_depth - 1)
    }

    /// Whether luma dimensions are compatible with the chroma decimation.
    pub fn fits(&self, size: FrameSize) -> bool {
        let (sx, sy) = self.subsampling.factors();
        !size.is_empty() && size.width % sx == 0 && size.height % sy == 0
    }

    /// Size of plane `component` (0 = Y, 1 = U, 2 = V) for a frame of `size`.
    pub fn plane_size(&self, size: FrameSize, component: usize) -> FrameSize {
        if component == 0 {
            return size;
        }
        let (sx, sy) = self.subsampling.factors();
        FrameSize::new(size.width / sx, size.height / sy)
    }

    pub fn frame_bytes(&self, size: FrameSize) -> usize {
        let samples: usize = (0..3).map(|c| self.plane_size(size, c).area()).sum();
        samples * self.bytes_per_sample()
    }
}

impl Default for YuvFormat {
    fn default() -> Self {
        YuvFormat::I420
    }
}

impl fmt::Display for YuvFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "YUV {} {} bit", self.subsampling, self.bit_depth)
    }
}

/// One frame: Y, U and V planes, row-major, at the source's native depth.
#[derive(Clone, Debug, PartialEq)]
pub struct YuvFrame {
    planes: [Vec<u16>; 3],
}

impl YuvFrame {
    pub fn from_planes(y: Vec<u16>, u: Vec<u16>, v: Vec<u16>) -> Self {
        Self { planes: [y, u, v] }
    }

    /// A frame with every sample of each plane set to `values[component]`.
    pub fn filled(size: FrameSize, format: YuvFormat, values: [u16; 3]) -> Self {
        let planes = [0, 1, 2].map(|c| vec![values[c]; format.plane_size(size, c).area()]);
        Self { planes }
    }

    pub fn plane(&self, component: usize) -> &[u16] {
        &self.planes[component]
    }

    pub fn plane_mut(&mut self, component: usize) -> &mut [u16] {
        &mut self.planes[component]
    }
}

pub struct YuvSource {
    size: FrameSize,
    format: YuvFormat,
    frames: Vec<YuvFrame>,
    lut: YuvToRgbLut,
}

impl YuvSource {
    /// Samples are masked to the format's bit depth.
    pub fn new(size: FrameSize, format: YuvFormat, mut frames: Vec<YuvFrame>) -> Self {
        if format.is_supported() {
            let mask = format.max_value() as u16;
            for plane in frames.iter_mut().flat_map(|f| f.planes.iter_mut()) {
                plane.iter_mut().for_each(|s| *s &= mask);
            }
        }
        Self { size, format, frames, lut: YuvToRgbLut::new() }
    }

    /// Slice raw planar bytes into frames. A trailing partial frame is dropped.
    pub fn from_bytes(size: FrameSize, format: YuvFormat, bytes: &[u8]) -> Result<Self> {
        if !format.is_supported() {
            return Err(Error::SourceFormat(format!("unsupported bit depth {}", format.bit_depth)));
        }
        if !format.fits(size) {
            return Err(Error::SourceFormat(format!("{size} does not fit {format}")));
        }
        let frame_bytes = format.frame_bytes(size);
        let count = bytes.len() / frame_bytes;
        if count == 0 {
            return Err(Error::SourceFormat(format!(
                "{} bytes is less than one {size} {format} frame ({frame_bytes} bytes)",
                bytes.len()
            )));
        }
        let rest = bytes.len() % frame_bytes;
        if rest != 0 {
            warn!(rest, frame_bytes, "ignoring trailing partial frame");
        }

        let frames = bytes
            .chunks_exact(frame_bytes)
            .map(|chunk| {
                let mut offset = 0;
                let planes = [0, 1, 2].map(|c| {
                    let n = format.plane_size(size, c).area() * format.bytes_per_sample();
                    let raw = &chunk[offset..offset + n];
                    offset += n;
                    if format.bytes_per_sample() == 1 {
                        raw.iter().map(|&b| b as u16).collect::<Vec<_>>()
                    } else {
                        raw.chunks_exact(2).map(|p| u16::from_le_bytes([p[0], p[1]])).collect()
                    }
                });
                YuvFrame { planes }
            })
            .collect::<Vec<_>>();

        debug!(frames = frames.len(), %size, %format, "sliced raw yuv");
        Ok(Self::new(size, format, frames))
    }

    /// Read a whole raw `.yuv` file.
    pub fn open<P: AsRef<Path>>(path: P, size: FrameSize, format: YuvFormat) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| Error::SourceOpen { path: path.to_path_buf(), source })?;
        Self::from_bytes(size, format, &bytes)
    }

    pub fn format(&self) -> YuvFormat {
        self.format
    }

    pub fn frame(&self, frame_index: usize) -> Option<&YuvFrame> {
        self.frames.get(frame_index)
    }

    /// Sample of `component` covering luma position (x, y).
    #[inline]
    fn sample(&self, frame: &YuvFrame, component: usize, x: u32, y: u32) -> i32 {
        let (x, y) = if component == 0 {
            (x, y)
        } else {
            let (sx, sy) = self.format.subsampling.factors();
            (x / sx, y / sy)
        };
        let stride = self.format.plane_size(self.size, component).width as usize;
        frame.planes[component][y as usize * stride + x as usize] as i32
    }

    fn deltas(&self, fa: &YuvFrame, other: &YuvSource, fb: &YuvFrame, x: u32, y: u32) -> [i32; 3] {
        [0, 1, 2].map(|c| self.sample(fa, c, x, y) - other.sample(fb, c, x, y))
    }

    fn to_8bit(&self, v: i32) -> u8 {
        (v >> (self.format.bit_depth - 8)) as u8
    }

    /// Amplified delta around mid, reduced to 8 bit. A nonzero delta stays at
    /// least one 8 bit step off mid so it never renders as the neutral gray.
    fn render_delta(&self, delta: i32, amplification: u32) -> u8 {
        let (mid, max) = (self.format.mid_value(), self.format.max_value());
        let step = 1 << (self.format.bit_depth - 8);
        let v = amplify(delta, amplification, mid, max);
        let v = match delta.signum() {
            1 => v.max(mid + step),
            -1 => v.min(mid - step),
            _ => v,
        };
        self.to_8bit(v)
    }

    fn yuv_difference(
        &self,
        other: &YuvSource,
        frame_index: usize,
        amplification: u32,
        mark_difference: bool,
    ) -> Option<DifferenceFrame> {
        let fa = self.frames.get(frame_index)?;
        let fb = other.frames.get(frame_index)?;
        let common = self.size.min(other.size);

        let image = RgbImage::from_fn(common.width, common.height, |x, y| {
            let d = self.deltas(fa, other, fb, x, y);
            if mark_difference {
                return if d.iter().any(|&v| v != 0) { MARKED } else { UNMARKED };
            }
            let [ry, ru, rv] = d.map(|v| self.render_delta(v, amplification));
            Rgb(self.lut.to_rgb(ry, ru, rv))
        });

        // MSE runs over each plane's own samples, unamplified
        let mut err = SquaredError::default();
        for c in 0..3 {
            let plane = self.format.plane_size(common, c);
            let stride_a = self.format.plane_size(self.size, c).width as usize;
            let stride_b = other.format.plane_size(other.size, c).width as usize;
            for py in 0..plane.height as usize {
                for px in 0..plane.width as usize {
                    let a = fa.planes[c][py * stride_a + px] as i32;
                    let b = fb.planes[c][py * stride_b + px] as i32;
                    err.add(c, a - b);
                }
            }
        }

        let mut info = vec![ValuePair::new("Difference Type", self.format)];
        info.extend(err.report(COMPONENTS));
        Some(DifferenceFrame { image, info, neutral_gray: self.lut.neutral_gray() })
    }

    /// The other side, when it can be compared plane by plane.
    fn comparable<'a>(&self, other: &'a dyn PixelSource) -> Option<&'a YuvSource> {
        other.as_yuv().filter(|o| o.format == self.format)
    }
}

impl PixelSource for YuvSource {
    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn is_format_valid(&self) -> bool {
        let lengths_ok = self.frames.iter().all(|f| {
            (0..3).all(|c| f.planes[c].len() == self.format.plane_size(self.size, c).area())
        });
        self.format.is_supported() && self.format.fits(self.size) && !self.frames.is_empty() && lengths_ok
    }

    fn load_rgb(&self, frame_index: usize) -> Option<RgbImage> {
        let frame = self.frames.get(frame_index)?;
        Some(RgbImage::from_fn(self.size.width, self.size.height, |x, y| {
            let [ly, lu, lv] = [0, 1, 2].map(|c| self.to_8bit(self.sample(frame, c, x, y)));
            Rgb(self.lut.to_rgb(ly, lu, lv))
        }))
    }

    fn as_yuv(&self) -> Option<&YuvSource> {
        Some(self)
    }

    fn compute_difference(
        &self,
        other: &dyn PixelSource,
        frame_index: usize,
        amplification: u32,
        mark_difference: bool,
    ) -> Option<DifferenceFrame> {
        match self.comparable(other) {
            Some(o) => self.yuv_difference(o, frame_index, amplification, mark_difference),
            None => {
                debug!("inputs do not share a yuv format, comparing rgb renditions");
                rgb_difference(self, other, frame_index, amplification, mark_difference)
            }
        }
    }

    fn probe_pixel_values(&self, pos: Point, frame_index: usize, other: &dyn PixelSource) -> Vec<ValuePair> {
        let Some(o) = self.comparable(other) else {
            return rgb_pixel_values(self, pos, frame_index, other);
        };
        let (Some(fa), Some(fb)) = (self.frames.get(frame_index), o.frames.get(frame_index)) else {
            return Vec::new();
        };
        if !self.size.min(o.size).contains(pos) {
            return Vec::new();
        }
        let d = self.deltas(fa, o, fb, pos.x, pos.y);
        COMPONENTS.iter().zip(d).map(|(label, v)| ValuePair::new(*label, v)).collect()
    }

    fn render_pixel_values(
        &self,
        canvas: &mut FrameBuffer,
        frame_index: usize,
        view: &PixelView,
        other: &dyn PixelSource,
        mark_difference: bool,
    ) {
        let Some(o) = self.comparable(other) else {
            render_rgb_values(self, canvas, frame_index, view, other, mark_difference);
            return;
        };
        let (Some(fa), Some(fb)) = (self.frames.get(frame_index), o.frames.get(frame_index)) else {
            return;
        };
        let common = self.size.min(o.size);
        draw::draw_value_cells(canvas, view, common, mark_difference, |pos| {
            let d = self.deltas(fa, o, fb, pos.x, pos.y);
            Some(ValueCell {
                lines: COMPONENTS.iter().zip(d).map(|(label, v)| format!("{label}{v}")).collect(),
                differs: d.iter().any(|&v| v != 0),
            })
        });
    }
}
