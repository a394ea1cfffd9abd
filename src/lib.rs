//! Side-by-side difference analysis for YUV video.
//!
//! A [`DifferenceEngine`] pairs two [`PixelSource`]s, renders their per-pixel
//! difference for a frame (optionally amplified, or marked black/white) and
//! locates the first differing block in codec coding order: 64x64 LCUs in
//! raster order, each walked as a quad tree down to 4x4 blocks.
//!
//! ```no_run
//! use std::rc::Rc;
//! use yuv_diff::{DifferenceEngine, FrameSize, PixelSource, YuvFormat, YuvSource};
//!
//! # fn main() -> yuv_diff::Result<()> {
//! let size = FrameSize::new(416, 240);
//! let a: Rc<dyn PixelSource> = Rc::new(YuvSource::open("a.yuv", size, YuvFormat::I420)?);
//! let b: Rc<dyn PixelSource> = Rc::new(YuvSource::open("b.yuv", size, YuvFormat::I420)?);
//!
//! let mut engine = DifferenceEngine::new();
//! engine.set_inputs(Some(&a), Some(&b));
//! for line in engine.report_first_difference_position(0) {
//!     println!("{line}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod color;
pub mod draw;
pub mod engine;
pub mod error;
pub mod locate;
pub mod rgb;
pub mod source;
pub mod types;
pub mod yuv;

pub use engine::{DifferenceConfig, DifferenceEngine, EngineEvent};
pub use error::{Error, Result};
pub use locate::{locate_first_difference, Baseline, CodingOrder, FirstDifferenceLocation};
pub use rgb::RgbSource;
pub use source::{DifferenceFrame, PixelSource};
pub use types::{DifferenceInfo, FrameBuffer, FrameSize, PixelView, Point, ValuePair};
pub use yuv::{ChromaSubsampling, YuvFormat, YuvFrame, YuvSource};
