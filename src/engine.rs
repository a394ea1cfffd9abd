//! Difference engine: pairs two pixel sources, renders their difference for
//! a frame and answers "where is the first difference" on demand.
//!
//! The engine never owns its inputs. It keeps `Weak` handles and re-checks
//! them on every call, so a source dropped by its owner simply turns the
//! engine "not ready": queries return empty results instead of failing.

use std::rc::{Rc, Weak};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::locate::{self, Baseline, CodingOrder, FirstDifferenceLocation};
use crate::source::PixelSource;
use crate::types::{DifferenceInfo, FrameBuffer, FrameSize, PixelView, Point, ValuePair};

/// Knobs controlling how the difference is rendered and scanned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DifferenceConfig {
    /// Render any difference white on black instead of an offset gray.
    pub mark_difference: bool,
    /// Multiplier on raw deltas before rendering (>= 1).
    pub amplification_factor: u32,
    pub coding_order: CodingOrder,
    /// Overrides the source-derived gray that means "no difference".
    pub neutral_gray: Option<u8>,
}

impl Default for DifferenceConfig {
    fn default() -> Self {
        Self {
            mark_difference: false,
            amplification_factor: 1,
            coding_order: CodingOrder::Hevc,
            neutral_gray: None,
        }
    }
}

/// Something observers must react to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// Pixels are stale: redraw (and reload the frame).
    ContentInvalidated,
    /// The difference frame size changed: relayout.
    GeometryInvalidated { old: FrameSize, new: FrameSize },
    /// Derived results (first difference) are stale; pixels on screen are fine.
    AnalysisInvalidated,
}

type Observer = Box<dyn FnMut(EngineEvent)>;

type Input = Option<Weak<dyn PixelSource>>;

pub struct DifferenceEngine {
    inputs: [Input; 2],
    config: DifferenceConfig,
    frame_size: FrameSize,
    current_frame: Option<RgbImage>,
    current_frame_idx: Option<usize>,
    /// "No difference" gray of the routine that rendered `current_frame`.
    rendered_gray: u8,
    difference_info: Vec<DifferenceInfo>,
    observers: Vec<Observer>,
}

impl DifferenceEngine {
    pub fn new() -> Self {
        Self::with_config(DifferenceConfig::default())
    }

    pub fn with_config(config: DifferenceConfig) -> Self {
        let amplification_factor = config.amplification_factor.max(1);
        Self {
            inputs: [None, None],
            config: DifferenceConfig { amplification_factor, ..config },
            frame_size: FrameSize::default(),
            current_frame: None,
            current_frame_idx: None,
            rendered_gray: Baseline::DEFAULT_GRAY,
            difference_info: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Register a callback for every `EngineEvent`.
    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: FnMut(EngineEvent) + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    fn emit(&mut self, event: EngineEvent) {
        for observer in &mut self.observers {
            observer(event);
        }
    }

    /// Pair two sources. Re-assigning the same pair is a no-op.
    pub fn set_inputs(&mut self, a: Option<&Rc<dyn PixelSource>>, b: Option<&Rc<dyn PixelSource>>) {
        if same_input(&self.inputs[0], a) && same_input(&self.inputs[1], b) {
            return;
        }
        self.inputs = [a.map(Rc::downgrade), b.map(Rc::downgrade)];
        self.current_frame_idx = None;

        if let Some((a, b)) = self.live_inputs() {
            let old = self.frame_size;
            let new = a.frame_size().min(b.frame_size());
            self.frame_size = new;
            if old != new {
                info!(%old, %new, "difference frame size changed");
                self.emit(EngineEvent::GeometryInvalidated { old, new });
            }
        }

        // a different pair at the same size still has to be redrawn
        self.emit(EngineEvent::ContentInvalidated);
    }

    /// Both inputs alive and each with a usable format.
    fn live_inputs(&self) -> Option<(Rc<dyn PixelSource>, Rc<dyn PixelSource>)> {
        let a = self.inputs[0].as_ref()?.upgrade()?;
        let b = self.inputs[1].as_ref()?.upgrade()?;
        (a.is_format_valid() && b.is_format_valid()).then_some((a, b))
    }

    pub fn is_ready(&self) -> bool {
        self.live_inputs().is_some()
    }

    /// Render the difference for `frame_index`, reusing the cached frame if it is current.
    pub fn load_frame(&mut self, frame_index: usize) {
        let Some((a, b)) = self.live_inputs() else {
            return;
        };
        if self.current_frame_idx == Some(frame_index) && self.current_frame.is_some() {
            debug!(frame_index, "difference frame cached");
            return;
        }

        self.difference_info.clear();
        let cfg = self.config;
        match a.compute_difference(&*b, frame_index, cfg.amplification_factor, cfg.mark_difference) {
            Some(diff) => {
                debug!(
                    frame_index,
                    width = diff.image.width(),
                    height = diff.image.height(),
                    amplification = cfg.amplification_factor,
                    mark = cfg.mark_difference,
                    neutral_gray = diff.neutral_gray,
                    "difference frame computed"
                );
                self.current_frame = Some(diff.image);
                self.rendered_gray = diff.neutral_gray;
                self.difference_info = diff.info;
                self.current_frame_idx = Some(frame_index);
            }
            None => {
                warn!(frame_index, "inputs cannot provide this frame");
                self.current_frame = None;
                self.current_frame_idx = None;
            }
        }

        // new pixels: whatever was derived from the old ones is stale
        self.emit(EngineEvent::AnalysisInvalidated);
    }

    /// Per-component differences at `pos`; empty when not ready.
    pub fn pixel_values(&self, pos: Point, frame_index: usize) -> Vec<ValuePair> {
        match self.live_inputs() {
            Some((a, b)) => a.probe_pixel_values(pos, frame_index, &*b),
            None => Vec::new(),
        }
    }

    /// Draw the per-pixel differences into the zoomed cells of `canvas`.
    pub fn render_pixel_values(&self, canvas: &mut FrameBuffer, frame_index: usize, view: &PixelView) {
        if let Some((a, b)) = self.live_inputs() {
            a.render_pixel_values(canvas, frame_index, view, &*b, self.config.mark_difference);
        }
    }

    pub fn set_mark_difference(&mut self, mark_difference: bool) {
        if self.config.mark_difference == mark_difference {
            return;
        }
        self.config.mark_difference = mark_difference;
        self.current_frame_idx = None;
        self.emit(EngineEvent::ContentInvalidated);
    }

    /// Values below 1 are raised to 1.
    pub fn set_amplification_factor(&mut self, factor: u32) {
        let factor = if factor == 0 {
            warn!("amplification factor 0 raised to 1");
            1
        } else {
            factor
        };
        if self.config.amplification_factor == factor {
            return;
        }
        self.config.amplification_factor = factor;
        self.current_frame_idx = None;
        self.emit(EngineEvent::ContentInvalidated);
    }

    pub fn set_coding_order(&mut self, order: CodingOrder) {
        if self.config.coding_order == order {
            return;
        }
        self.config.coding_order = order;
        self.emit(EngineEvent::AnalysisInvalidated);
    }

    pub fn set_neutral_gray(&mut self, gray: Option<u8>) {
        if self.config.neutral_gray == gray {
            return;
        }
        self.config.neutral_gray = gray;
        self.emit(EngineEvent::AnalysisInvalidated);
    }

    fn baseline(&self) -> Baseline {
        let gray = self.config.neutral_gray.unwrap_or(self.rendered_gray);
        Baseline::for_mode(self.config.mark_difference, gray)
    }

    /// First difference of the frame currently held, if any.
    pub fn first_difference(&self) -> Option<FirstDifferenceLocation> {
        self.live_inputs()?;
        self.current_frame_idx?;
        let image = self.current_frame.as_ref()?;
        locate::locate_first_difference(image, self.frame_size, self.baseline(), self.config.coding_order)
    }

    /// First-difference report for `frame_index`, formatted for an info panel.
    ///
    /// Empty when the inputs are not ready or the held frame does not match
    /// the configured size; "Frames are identical" when nothing differs.
    pub fn report_first_difference_position(&mut self, frame_index: usize) -> Vec<ValuePair> {
        self.load_frame(frame_index);
        if !self.is_ready() || self.current_frame_idx != Some(frame_index) {
            return Vec::new();
        }
        let Some(image) = self.current_frame.as_ref() else {
            return Vec::new();
        };
        if image.dimensions() != (self.frame_size.width, self.frame_size.height) {
            return Vec::new();
        }
        match self.first_difference() {
            Some(location) => location.to_value_pairs(),
            None => locate::identical_report(),
        }
    }

    pub fn config(&self) -> &DifferenceConfig {
        &self.config
    }

    pub fn frame_size(&self) -> FrameSize {
        self.frame_size
    }

    pub fn current_frame(&self) -> Option<&RgbImage> {
        self.current_frame.as_ref()
    }

    pub fn current_frame_index(&self) -> Option<usize> {
        self.current_frame_idx
    }

    /// Type and MSE lines from the last computation.
    pub fn difference_info(&self) -> &[DifferenceInfo] {
        &self.difference_info
    }

    /// Frames both inputs can provide (0 when not ready).
    pub fn frame_count(&self) -> usize {
        self.live_inputs()
            .map(|(a, b)| a.frame_count().min(b.frame_count()))
            .unwrap_or(0)
    }
}

impl Default for DifferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn same_input(current: &Input, new: Option<&Rc<dyn PixelSource>>) -> bool {
    match (current, new) {
        (None, None) => true,
        (Some(weak), Some(rc)) => Weak::ptr_eq(weak, &Rc::downgrade(rc)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    use image::Rgb;

    use crate::rgb::RgbSource;
    use crate::source::DifferenceFrame;
    use crate::yuv::{ChromaSubsampling, YuvFormat, YuvFrame, YuvSource};

    fn yuv_gray(size: FrameSize, format: YuvFormat) -> Rc<dyn PixelSource> {
        Rc::new(YuvSource::new(size, format, vec![YuvFrame::filled(size, format, [128, 128, 128])]))
    }

    fn source(w: u32, h: u32, v: u8) -> Rc<dyn PixelSource> {
        Rc::new(RgbSource::from_images(vec![RgbImage::from_pixel(w, h, Rgb([v, v, v]))]))
    }

    fn recorder(engine: &mut DifferenceEngine) -> Rc<RefCell<Vec<EngineEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        engine.subscribe(move |e| sink.borrow_mut().push(e));
        events
    }

    /// Counts how often the engine asks for a difference.
    struct Counting {
        inner: RgbSource,
        calls: Rc<Cell<usize>>,
    }

    impl PixelSource for Counting {
        fn frame_size(&self) -> FrameSize {
            self.inner.frame_size()
        }
        fn frame_count(&self) -> usize {
            self.inner.frame_count()
        }
        fn is_format_valid(&self) -> bool {
            self.inner.is_format_valid()
        }
        fn load_rgb(&self, frame_index: usize) -> Option<RgbImage> {
            self.inner.load_rgb(frame_index)
        }
        fn compute_difference(
            &self,
            other: &dyn PixelSource,
            frame_index: usize,
            amplification: u32,
            mark_difference: bool,
        ) -> Option<DifferenceFrame> {
            self.calls.set(self.calls.get() + 1);
            self.inner.compute_difference(other, frame_index, amplification, mark_difference)
        }
    }

    #[test]
    fn frame_size_is_componentwise_min() {
        let a = source(128, 32, 0);
        let b = source(64, 96, 0);
        let mut engine = DifferenceEngine::new();
        engine.set_inputs(Some(&a), Some(&b));
        assert_eq!(engine.frame_size(), FrameSize::new(64, 32));
        engine.load_frame(0);
        assert_eq!(engine.current_frame().unwrap().dimensions(), (64, 32));
    }

    #[test]
    fn missing_input_makes_everything_a_no_op() {
        let b = source(8, 8, 0);
        let mut engine = DifferenceEngine::new();
        engine.set_inputs(None, Some(&b));
        assert!(!engine.is_ready());
        engine.load_frame(0);
        assert!(engine.current_frame().is_none());
        assert!(engine.pixel_values(Point::new(0, 0), 0).is_empty());
        assert!(engine.report_first_difference_position(0).is_empty());
        assert_eq!(engine.first_difference(), None);
        assert_eq!(engine.frame_count(), 0);
    }

    #[test]
    fn dropped_source_is_noticed() {
        let a = source(8, 8, 0);
        let b = source(8, 8, 0);
        let mut engine = DifferenceEngine::new();
        engine.set_inputs(Some(&a), Some(&b));
        assert!(engine.is_ready());
        drop(b);
        assert!(!engine.is_ready());
        assert!(engine.pixel_values(Point::new(1, 1), 0).is_empty());
    }

    #[test]
    fn reassigning_same_pair_is_silent() {
        let a = source(8, 8, 0);
        let b = source(8, 8, 0);
        let mut engine = DifferenceEngine::new();
        let events = recorder(&mut engine);

        engine.set_inputs(Some(&a), Some(&b));
        assert_eq!(
            *events.borrow(),
            vec![
                EngineEvent::GeometryInvalidated { old: FrameSize::default(), new: FrameSize::new(8, 8) },
                EngineEvent::ContentInvalidated,
            ]
        );
        engine.set_inputs(Some(&a), Some(&b));
        assert_eq!(events.borrow().len(), 2);
    }

    #[test]
    fn new_pair_of_same_size_redraws_without_relayout() {
        let a = source(8, 8, 0);
        let b = source(8, 8, 0);
        let c = source(8, 8, 5);
        let mut engine = DifferenceEngine::new();
        engine.set_inputs(Some(&a), Some(&b));
        let events = recorder(&mut engine);
        engine.set_inputs(Some(&a), Some(&c));
        assert_eq!(*events.borrow(), vec![EngineEvent::ContentInvalidated]);
    }

    #[test]
    fn load_frame_is_cached_until_rendering_changes() {
        let calls = Rc::new(Cell::new(0));
        let a: Rc<dyn PixelSource> = Rc::new(Counting {
            inner: RgbSource::from_images(vec![RgbImage::new(8, 8)]),
            calls: Rc::clone(&calls),
        });
        let b = source(8, 8, 0);
        let mut engine = DifferenceEngine::new();
        engine.set_inputs(Some(&a), Some(&b));

        engine.load_frame(0);
        engine.load_frame(0);
        assert_eq!(engine.current_frame_index(), Some(0));
        assert_eq!(calls.get(), 1);

        engine.set_amplification_factor(4);
        assert_eq!(engine.current_frame_index(), None);
        engine.load_frame(0);
        assert_eq!(calls.get(), 2);

        engine.set_mark_difference(true);
        engine.load_frame(0);
        assert_eq!(calls.get(), 3);

        // analysis-only settings keep the pixels
        engine.set_coding_order(CodingOrder::Hevc);
        engine.set_neutral_gray(Some(128));
        engine.load_frame(0);
        assert_eq!(calls.get(), 3);

        engine.load_frame(1);
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn setters_emit_the_right_events() {
        let a = source(8, 8, 0);
        let b = source(8, 8, 0);
        let mut engine = DifferenceEngine::new();
        engine.set_inputs(Some(&a), Some(&b));
        let events = recorder(&mut engine);

        engine.set_mark_difference(true);
        engine.set_mark_difference(true);
        engine.set_amplification_factor(3);
        engine.set_neutral_gray(Some(128));
        engine.load_frame(0);
        assert_eq!(
            *events.borrow(),
            vec![
                EngineEvent::ContentInvalidated,
                EngineEvent::ContentInvalidated,
                EngineEvent::AnalysisInvalidated,
                EngineEvent::AnalysisInvalidated,
            ]
        );
    }

    #[test]
    fn zero_amplification_is_raised_to_one() {
        let mut engine = DifferenceEngine::with_config(DifferenceConfig { amplification_factor: 0, ..Default::default() });
        assert_eq!(engine.config().amplification_factor, 1);
        engine.set_amplification_factor(5);
        engine.set_amplification_factor(0);
        assert_eq!(engine.config().amplification_factor, 1);
    }

    #[test]
    fn reports_identical_and_first_difference() {
        let a = source(64, 64, 40);
        let b = source(64, 64, 40);
        let mut engine = DifferenceEngine::new();
        engine.set_inputs(Some(&a), Some(&b));
        assert_eq!(
            engine.report_first_difference_position(0),
            vec![ValuePair::new("Difference", "Frames are identical")]
        );

        let mut img = RgbImage::from_pixel(64, 64, Rgb([40, 40, 40]));
        img.put_pixel(9, 13, Rgb([41, 40, 40]));
        let c: Rc<dyn PixelSource> = Rc::new(RgbSource::from_images(vec![img]));
        engine.set_inputs(Some(&c), Some(&b));
        let report = engine.report_first_difference_position(0);
        assert_eq!(report[0], ValuePair::new("First Difference LCU", "0"));
        assert_eq!(report[1], ValuePair::new("First Difference X", "8"));
        assert_eq!(report[2], ValuePair::new("First Difference Y", "12"));
        // three full 8x8 quadrants, then (8,8) and (12,8)
        assert_eq!(report[3], ValuePair::new("First Difference partIndex", "14"));
    }

    #[test]
    fn out_of_range_frame_reports_nothing() {
        let a = source(8, 8, 0);
        let b = source(8, 8, 0);
        let mut engine = DifferenceEngine::new();
        engine.set_inputs(Some(&a), Some(&b));
        assert!(engine.report_first_difference_position(3).is_empty());
        assert!(engine.current_frame().is_none());
    }

    #[test]
    fn neutral_gray_override_changes_the_baseline() {
        let a = source(8, 8, 0);
        let b = source(8, 8, 0);
        let mut engine = DifferenceEngine::new();
        engine.set_inputs(Some(&a), Some(&b));
        engine.load_frame(0);
        assert_eq!(engine.first_difference(), None);

        // rgb renders 128; pretending the neutral value is 130 makes everything differ
        engine.set_neutral_gray(Some(130));
        let found = engine.first_difference().unwrap();
        assert_eq!((found.x, found.y, found.part_index), (0, 0, 0));
    }

    #[test]
    fn identical_yuv_and_rgb_are_identical() {
        let size = FrameSize::new(64, 64);
        let yuv = yuv_gray(size, YuvFormat::I420);
        // the LUT renders mid-level YUV as 130
        let rgb = source(64, 64, 130);
        let identical = vec![ValuePair::new("Difference", "Frames are identical")];

        for (a, b) in [(&yuv, &rgb), (&rgb, &yuv)] {
            let mut engine = DifferenceEngine::new();
            engine.set_inputs(Some(a), Some(b));
            assert_eq!(engine.report_first_difference_position(0), identical);
            assert_eq!(engine.difference_info()[0], ValuePair::new("Difference Type", "RGB"));
        }
    }

    #[test]
    fn identical_yuv_of_different_formats_are_identical() {
        let size = FrameSize::new(64, 64);
        let a = yuv_gray(size, YuvFormat::I420);
        let b = yuv_gray(size, YuvFormat::new(ChromaSubsampling::Yuv444, 8));
        let mut engine = DifferenceEngine::new();
        engine.set_inputs(Some(&a), Some(&b));
        assert_eq!(
            engine.report_first_difference_position(0),
            vec![ValuePair::new("Difference", "Frames are identical")]
        );
    }

    #[test]
    fn mixed_inputs_still_locate_a_difference() {
        let size = FrameSize::new(64, 64);
        let yuv = yuv_gray(size, YuvFormat::I420);
        let mut img = RgbImage::from_pixel(64, 64, Rgb([130, 130, 130]));
        img.put_pixel(10, 5, Rgb([130, 130, 131]));
        let rgb: Rc<dyn PixelSource> = Rc::new(RgbSource::from_images(vec![img]));
        let mut engine = DifferenceEngine::new();
        engine.set_inputs(Some(&yuv), Some(&rgb));

        let report = engine.report_first_difference_position(0);
        assert_eq!(report[1], ValuePair::new("First Difference X", "8"));
        assert_eq!(report[2], ValuePair::new("First Difference Y", "4"));
    }

    #[test]
    fn ten_bit_delta_of_one_is_not_identical() {
        let size = FrameSize::new(64, 64);
        let fmt = YuvFormat::new(ChromaSubsampling::Yuv420, 10);
        let mut fa = YuvFrame::filled(size, fmt, [512, 512, 512]);
        fa.plane_mut(0)[0] = 513;
        let a: Rc<dyn PixelSource> = Rc::new(YuvSource::new(size, fmt, vec![fa]));
        let b: Rc<dyn PixelSource> =
            Rc::new(YuvSource::new(size, fmt, vec![YuvFrame::filled(size, fmt, [512, 512, 512])]));
        let mut engine = DifferenceEngine::new();
        engine.set_inputs(Some(&a), Some(&b));

        let report = engine.report_first_difference_position(0);
        assert_eq!(report[0], ValuePair::new("First Difference LCU", "0"));
        assert_eq!(report[1], ValuePair::new("First Difference X", "0"));
        assert_eq!(report[2], ValuePair::new("First Difference Y", "0"));
    }
}
