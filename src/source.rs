//! The `PixelSource` capability the difference engine consumes.
//!
//! The provided methods implement the generic RGB difference path: both
//! frames are rendered to RGB and compared channel by channel. Sources with
//! a richer native format (planar YUV) override them and fall back to these
//! when the other side does not share that format.

use image::{Rgb, RgbImage};

use crate::draw::{self, ValueCell};
use crate::types::{DifferenceInfo, FrameBuffer, FrameSize, PixelView, Point, ValuePair};
use crate::yuv::YuvSource;

/// Unmarked RGB difference of identical pixels.
pub const RGB_NEUTRAL_GRAY: u8 = 128;

/// Mark-mode colors.
pub const MARKED: Rgb<u8> = Rgb([255, 255, 255]);
pub const UNMARKED: Rgb<u8> = Rgb([0, 0, 0]);

/// Output of one difference computation.
#[derive(Clone, Debug)]
pub struct DifferenceFrame {
    pub image: RgbImage,
    pub info: Vec<DifferenceInfo>,
    /// Gray this rendering uses for "no difference" when unmarked.
    pub neutral_gray: u8,
}

pub trait PixelSource {
    fn frame_size(&self) -> FrameSize;

    fn frame_count(&self) -> usize;

    fn is_format_valid(&self) -> bool;

    /// RGB rendition of a frame, `None` when the index is out of range.
    fn load_rgb(&self, frame_index: usize) -> Option<RgbImage>;

    /// Planar YUV view of this source, if it has one.
    fn as_yuv(&self) -> Option<&YuvSource> {
        None
    }

    /// Difference of `self` minus `other` for one frame, clipped to the common size.
    fn compute_difference(
        &self,
        other: &dyn PixelSource,
        frame_index: usize,
        amplification: u32,
        mark_difference: bool,
    ) -> Option<DifferenceFrame> {
        rgb_difference(self, other, frame_index, amplification, mark_difference)
    }

    /// Labeled per-component differences at `pos`; empty when `pos` is outside both frames.
    fn probe_pixel_values(&self, pos: Point, frame_index: usize, other: &dyn PixelSource) -> Vec<ValuePair> {
        rgb_pixel_values(self, pos, frame_index, other)
    }

    /// Draw the per-pixel differences into the zoomed cells of `canvas`.
    fn render_pixel_values(
        &self,
        canvas: &mut FrameBuffer,
        frame_index: usize,
        view: &PixelView,
        other: &dyn PixelSource,
        mark_difference: bool,
    ) {
        render_rgb_values(self, canvas, frame_index, view, other, mark_difference);
    }
}

/// `clamp(mid + delta * amplification)` without overflowing on large factors.
#[inline]
pub(crate) fn amplify(delta: i32, amplification: u32, mid: i32, max: i32) -> i32 {
    let v = mid as i64 + delta as i64 * amplification as i64;
    v.clamp(0, max as i64) as i32
}

/// Running sum of squared sample deltas per component.
#[derive(Default)]
pub(crate) struct SquaredError {
    sums: [u64; 3],
    counts: [u64; 3],
}

impl SquaredError {
    #[inline]
    pub(crate) fn add(&mut self, component: usize, delta: i32) {
        self.sums[component] += (delta as i64 * delta as i64) as u64;
        self.counts[component] += 1;
    }

    pub(crate) fn mse(&self, component: usize) -> f64 {
        match self.counts[component] {
            0 => 0.0,
            n => self.sums[component] as f64 / n as f64,
        }
    }

    /// `MSE <label>` per component plus `MSE All`, the mean of the three.
    pub(crate) fn report(&self, labels: [&str; 3]) -> Vec<DifferenceInfo> {
        let mut out = Vec::with_capacity(4);
        let mut all = 0.0;
        for (c, label) in labels.iter().enumerate() {
            let mse = self.mse(c);
            all += mse;
            out.push(ValuePair::new(format!("MSE {label}"), format_mse(mse)));
        }
        out.push(ValuePair::new("MSE All", format_mse(all / 3.0)));
        out
    }
}

fn format_mse(mse: f64) -> String {
    format!("{mse:.4}")
}

/// Generic path: compare the RGB renditions of both sources.
pub fn rgb_difference<A: PixelSource + ?Sized>(
    a: &A,
    b: &dyn PixelSource,
    frame_index: usize,
    amplification: u32,
    mark_difference: bool,
) -> Option<DifferenceFrame> {
    let img_a = a.load_rgb(frame_index)?;
    let img_b = b.load_rgb(frame_index)?;
    let w = img_a.width().min(img_b.width());
    let h = img_a.height().min(img_b.height());

    let mut err = SquaredError::default();
    let image = RgbImage::from_fn(w, h, |x, y| {
        let pa = img_a.get_pixel(x, y);
        let pb = img_b.get_pixel(x, y);
        let mut out = [0u8; 3];
        let mut differs = false;
        for c in 0..3 {
            let delta = pa[c] as i32 - pb[c] as i32;
            err.add(c, delta);
            differs |= delta != 0;
            out[c] = amplify(delta, amplification, RGB_NEUTRAL_GRAY as i32, 255) as u8;
        }
        if mark_difference {
            if differs { MARKED } else { UNMARKED }
        } else {
            Rgb(out)
        }
    });

    let mut info = vec![ValuePair::new("Difference Type", "RGB")];
    info.extend(err.report(["R", "G", "B"]));
    Some(DifferenceFrame { image, info, neutral_gray: RGB_NEUTRAL_GRAY })
}

fn rgb_deltas(a: &RgbImage, b: &RgbImage, pos: Point) -> Option<[i32; 3]> {
    let (x, y) = (pos.x, pos.y);
    if x >= a.width().min(b.width()) || y >= a.height().min(b.height()) {
        return None;
    }
    let pa = a.get_pixel(x, y);
    let pb = b.get_pixel(x, y);
    Some([0, 1, 2].map(|c| pa[c] as i32 - pb[c] as i32))
}

pub fn rgb_pixel_values<A: PixelSource + ?Sized>(
    a: &A,
    pos: Point,
    frame_index: usize,
    b: &dyn PixelSource,
) -> Vec<ValuePair> {
    let (Some(img_a), Some(img_b)) = (a.load_rgb(frame_index), b.load_rgb(frame_index)) else {
        return Vec::new();
    };
    match rgb_deltas(&img_a, &img_b, pos) {
        Some([r, g, b]) => vec![ValuePair::new("R", r), ValuePair::new("G", g), ValuePair::new("B", b)],
        None => Vec::new(),
    }
}

pub fn render_rgb_values<A: PixelSource + ?Sized>(
    a: &A,
    canvas: &mut FrameBuffer,
    frame_index: usize,
    view: &PixelView,
    b: &dyn PixelSource,
    mark_difference: bool,
) {
    if view.zoom < draw::VALUE_CELL_MIN_ZOOM {
        return;
    }
    let (Some(img_a), Some(img_b)) = (a.load_rgb(frame_index), b.load_rgb(frame_index)) else {
        return;
    };
    let frame = a.frame_size().min(b.frame_size());
    draw::draw_value_cells(canvas, view, frame, mark_difference, |pos| {
        let d = rgb_deltas(&img_a, &img_b, pos)?;
        Some(ValueCell {
            lines: vec![format!("R{}", d[0]), format!("G{}", d[1]), format!("B{}", d[2])],
            differs: d.iter().any(|&v| v != 0),
        })
    });
}
