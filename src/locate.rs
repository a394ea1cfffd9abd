//! Hierarchical search for the first differing block of a difference image.
//!
//! The frame is cut into 64x64 largest coding units (LCUs) scanned in raster
//! order. Inside each LCU the search walks a quad tree down to 4x4 leaves,
//! visiting quadrants top-left, top-right, bottom-left, bottom-right, which
//! is the order a codec visits coding blocks. The first leaf holding a pixel
//! that is not the "no difference" baseline wins.

use std::fmt;
use std::str::FromStr;

use image::{Rgb, RgbImage};

use crate::error::Error;
use crate::types::{FrameSize, ValuePair};

/// Block traversal used to define "first".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CodingOrder {
    #[default]
    Hevc,
}

impl CodingOrder {
    pub const ALL: [CodingOrder; 1] = [CodingOrder::Hevc];

    /// Side of the root block.
    pub fn lcu_size(self) -> u32 {
        match self {
            CodingOrder::Hevc => 64,
        }
    }

    /// Side of the smallest block the tree splits down to.
    pub fn min_block_size(self) -> u32 {
        match self {
            CodingOrder::Hevc => 4,
        }
    }
}

impl fmt::Display for CodingOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodingOrder::Hevc => f.write_str("HEVC"),
        }
    }
}

impl FromStr for CodingOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HEVC" => Ok(CodingOrder::Hevc),
            other => Err(Error::UnknownCodingOrder(other.to_string())),
        }
    }
}

/// What a pixel without any difference looks like in the rendered image.
///
/// Unmarked renderings put "no difference" at a neutral gray whose value
/// depends on the routine that drew the image (130 for the BT.709 YUV path,
/// 128 for the RGB path). Marked renderings are black.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Baseline {
    Marked,
    Amplified { gray: u8 },
}

impl Baseline {
    /// Gray used when nothing better is known.
    pub const DEFAULT_GRAY: u8 = 130;

    pub fn for_mode(mark_difference: bool, gray: u8) -> Self {
        if mark_difference { Baseline::Marked } else { Baseline::Amplified { gray } }
    }

    #[inline]
    pub fn differs(&self, px: &Rgb<u8>) -> bool {
        match *self {
            Baseline::Marked => px.0 != [0, 0, 0],
            Baseline::Amplified { gray } => px.0 != [gray, gray, gray],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FirstDifferenceLocation {
    /// Raster index of the LCU: `row * width_in_lcus + col`.
    pub lcu_index: u32,
    /// Top-left corner of the first differing leaf block.
    pub x: u32,
    pub y: u32,
    /// Leaves of this LCU found clean before the differing one.
    pub part_index: u32,
}

impl FirstDifferenceLocation {
    pub fn to_value_pairs(&self) -> Vec<ValuePair> {
        vec![
            ValuePair::new("First Difference LCU", self.lcu_index),
            ValuePair::new("First Difference X", self.x),
            ValuePair::new("First Difference Y", self.y),
            ValuePair::new("First Difference partIndex", self.part_index),
        ]
    }
}

/// Report shown when the scan finds nothing.
pub fn identical_report() -> Vec<ValuePair> {
    vec![ValuePair::new("Difference", "Frames are identical")]
}

/// Result of scanning one block of the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BlockScan {
    /// Nothing found; `leaves` in-frame leaves were checked.
    Clean { leaves: u32 },
    /// Leaf at (x, y) differs; `clean_leaves` leaves of this block came before it.
    Differs { x: u32, y: u32, clean_leaves: u32 },
}

struct Scanner<'a> {
    image: &'a RgbImage,
    frame: FrameSize,
    baseline: Baseline,
    min_block: u32,
}

impl Scanner<'_> {
    fn scan(&self, x: u32, y: u32, size: u32) -> BlockScan {
        if x >= self.frame.width || y >= self.frame.height {
            return BlockScan::Clean { leaves: 0 };
        }

        if size <= self.min_block {
            return if self.leaf_differs(x, y, size) {
                BlockScan::Differs { x, y, clean_leaves: 0 }
            } else {
                BlockScan::Clean { leaves: 1 }
            };
        }

        let half = size / 2;
        let mut scanned = 0;
        for (dx, dy) in [(0, 0), (half, 0), (0, half), (half, half)] {
            match self.scan(x + dx, y + dy, half) {
                BlockScan::Clean { leaves } => scanned += leaves,
                BlockScan::Differs { x, y, clean_leaves } => {
                    return BlockScan::Differs { x, y, clean_leaves: scanned + clean_leaves };
                }
            }
        }
        BlockScan::Clean { leaves: scanned }
    }

    /// Columns outer, rows inner. Pixels past the frame edge are skipped.
    fn leaf_differs(&self, x: u32, y: u32, size: u32) -> bool {
        let x_end = (x + size).min(self.frame.width);
        let y_end = (y + size).min(self.frame.height);
        (x..x_end).any(|sx| (y..y_end).any(|sy| self.baseline.differs(self.image.get_pixel(sx, sy))))
    }
}

/// Find the first differing block of `image` in `order`.
///
/// Returns `None` when the frames are identical, and also when the image does
/// not match `frame_size` (a stale buffer is never scanned).
pub fn locate_first_difference(
    image: &RgbImage,
    frame_size: FrameSize,
    baseline: Baseline,
    order: CodingOrder,
) -> Option<FirstDifferenceLocation> {
    if image.dimensions() != (frame_size.width, frame_size.height) || frame_size.is_empty() {
        return None;
    }

    let lcu = order.lcu_size();
    let width_in_lcus = frame_size.width.div_ceil(lcu);
    let height_in_lcus = frame_size.height.div_ceil(lcu);
    let scanner = Scanner { image, frame: frame_size, baseline, min_block: order.min_block_size() };

    for row in 0..height_in_lcus {
        for col in 0..width_in_lcus {
            if let BlockScan::Differs { x, y, clean_leaves } = scanner.scan(col * lcu, row * lcu, lcu) {
                return Some(FirstDifferenceLocation {
                    lcu_index: row * width_in_lcus + col,
                    x,
                    y,
                    part_index: clean_leaves,
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAY: Rgb<u8> = Rgb([130, 130, 130]);
    const AMPLIFIED: Baseline = Baseline::Amplified { gray: 130 };

    fn gray(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, GRAY)
    }

    fn locate(img: &RgbImage, baseline: Baseline) -> Option<FirstDifferenceLocation> {
        locate_first_difference(img, FrameSize::new(img.width(), img.height()), baseline, CodingOrder::Hevc)
    }

    #[test]
    fn identical_frames_are_not_found() {
        assert_eq!(locate(&gray(128, 64), AMPLIFIED), None);
        assert_eq!(locate(&RgbImage::new(64, 64), Baseline::Marked), None);
    }

    #[test]
    fn size_mismatch_is_not_scanned() {
        let mut img = gray(64, 64);
        img.put_pixel(0, 0, Rgb([0, 0, 0]));
        let found = locate_first_difference(&img, FrameSize::new(64, 32), AMPLIFIED, CodingOrder::Hevc);
        assert_eq!(found, None);
    }

    #[test]
    fn reports_leaf_origin_not_pixel() {
        let mut img = gray(64, 64);
        img.put_pixel(6, 3, Rgb([131, 130, 130]));
        let found = locate(&img, AMPLIFIED).unwrap();
        assert_eq!((found.x, found.y), (4, 0));
        assert_eq!(found.lcu_index, 0);
        // leaf (0,0) was clean
        assert_eq!(found.part_index, 1);
    }

    #[test]
    fn part_index_follows_z_order() {
        let cases = [
            ((0, 4), 2),   // third leaf of the first 8x8
            ((4, 4), 3),
            ((8, 0), 4),   // first leaf of the second 8x8
            ((0, 8), 8),
            ((16, 0), 16), // second 16x16 quadrant
            ((32, 32), 192),
            ((60, 60), 255),
        ];
        for ((px, py), part) in cases {
            let mut img = gray(64, 64);
            img.put_pixel(px, py, Rgb([0, 0, 0]));
            let found = locate(&img, AMPLIFIED).unwrap();
            assert_eq!(found.part_index, part, "pixel ({px},{py})");
            assert_eq!((found.x, found.y), (px - px % 4, py - py % 4));
        }
    }

    #[test]
    fn lcus_are_raster_scanned() {
        let mut img = gray(192, 128);
        // LCU (col 2, row 0) comes before LCU (col 0, row 1)
        img.put_pixel(0, 64, Rgb([0, 0, 0]));
        img.put_pixel(130, 10, Rgb([0, 0, 0]));
        let found = locate(&img, AMPLIFIED).unwrap();
        assert_eq!(found.lcu_index, 2);
        assert_eq!((found.x, found.y), (128, 8));
    }

    #[test]
    fn part_index_restarts_per_lcu() {
        let mut img = gray(128, 64);
        img.put_pixel(64, 0, Rgb([0, 0, 0]));
        let found = locate(&img, AMPLIFIED).unwrap();
        assert_eq!(found, FirstDifferenceLocation { lcu_index: 1, x: 64, y: 0, part_index: 0 });
    }

    #[test]
    fn marked_baseline_is_black() {
        let mut img = RgbImage::new(64, 64);
        img.put_pixel(20, 20, Rgb([255, 255, 255]));
        let found = locate(&img, Baseline::Marked).unwrap();
        assert_eq!((found.x, found.y), (20, 20));
        // the same image read as unmarked differs everywhere
        assert_eq!(locate(&img, AMPLIFIED).unwrap().part_index, 0);
    }

    #[test]
    fn last_pixel_of_unaligned_frame_is_found() {
        let mut img = gray(1000, 1000);
        img.put_pixel(999, 999, Rgb([130, 131, 130]));
        let found = locate(&img, AMPLIFIED).unwrap();
        let width_in_lcus = 1000u32.div_ceil(64);
        assert_eq!(found.lcu_index, (999 / 64) * width_in_lcus + 999 / 64);
        assert_eq!((found.x, found.y), (996, 996));
    }

    #[test]
    fn clipped_lcu_skips_leaves_outside_frame() {
        // 72x8: second LCU only holds an 8x8 area
        let mut img = gray(72, 8);
        img.put_pixel(68, 4, Rgb([0, 0, 0]));
        let found = locate(&img, AMPLIFIED).unwrap();
        assert_eq!(found.lcu_index, 1);
        assert_eq!(found.part_index, 3);
    }

    #[test]
    fn unaligned_leaf_edges_are_not_read() {
        // width 66: leaf at x=64 only has two columns
        let mut img = gray(66, 4);
        assert_eq!(locate(&img, AMPLIFIED), None);
        img.put_pixel(65, 3, Rgb([0, 0, 0]));
        assert_eq!(locate(&img, AMPLIFIED).unwrap().x, 64);
    }

    #[test]
    fn report_labels() {
        let loc = FirstDifferenceLocation { lcu_index: 3, x: 8, y: 12, part_index: 7 };
        let pairs = loc.to_value_pairs();
        assert_eq!(pairs[0], ValuePair::new("First Difference LCU", "3"));
        assert_eq!(pairs[3], ValuePair::new("First Difference partIndex", "7"));
        assert_eq!(identical_report()[0].value, "Frames are identical");
    }

    #[test]
    fn coding_order_names() {
        assert_eq!(CodingOrder::Hevc.to_string(), "HEVC");
        assert_eq!("hevc".parse::<CodingOrder>().unwrap(), CodingOrder::Hevc);
        assert!(matches!("vvc".parse::<CodingOrder>(), Err(Error::UnknownCodingOrder(name)) if name == "VVC"));
    }
}
