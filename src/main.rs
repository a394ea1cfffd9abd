// What you SEE now:
// • The difference between two inputs (raw YUV files or PNG stills), zoomed.
//   Gray means "no difference"; with M (mark mode) differences are white on black.
// • A box + crosshair on the first differing 4x4 block in HEVC coding order.
// • Left/Right: frame. Up/Down: amplification. M: mark mode.
//   F: jump to the first difference. W/A/S/D: pan. ESC quits.
// • At zoom >= 32 each pixel shows its per-component differences.
// With --report no window opens: the first-difference report is printed per frame.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::Parser;
use minifb::Key;
use tracing::info;
use tracing_subscriber::EnvFilter;

use yuv_diff::draw::{blit_image, draw_text_5x7, mark_block, Drawer};
use yuv_diff::{
    ChromaSubsampling, CodingOrder, DifferenceConfig, DifferenceEngine, Error, FrameBuffer, FrameSize,
    PixelSource, PixelView, Point, RgbSource, ValuePair, YuvFormat, YuvSource,
};

const MAX_WINDOW: (u32, u32) = (1600, 900);
const MIN_WINDOW: (u32, u32) = (480, 120);
const BACKGROUND: u32 = 0x00_20_20_20;
const MARKER: u32 = 0x00_FF_CC_33;
const HUD: u32 = 0x00_FF_FF_FF;

#[derive(Parser)]
#[command(name = "yuv-diff", version)]
#[command(about = "Show and locate the differences between two YUV sequences")]
struct Cli {
    /// First input: raw planar .yuv, or a .png still
    a: PathBuf,

    /// Second input, subtracted from the first
    b: PathBuf,

    /// Frame size of raw inputs, e.g. 1920x1080
    #[arg(short, long)]
    size: Option<FrameSize>,

    /// Frame size of the second raw input, if it differs from --size
    #[arg(long)]
    size_b: Option<FrameSize>,

    /// Chroma subsampling of raw inputs (420, 422, 444)
    #[arg(long, default_value = "420")]
    format: ChromaSubsampling,

    /// Bits per sample of raw inputs (8 or 10)
    #[arg(long, default_value_t = 8)]
    bit_depth: u8,

    /// First frame to show / report
    #[arg(short, long, default_value_t = 0)]
    frame: usize,

    /// Multiply differences before rendering
    #[arg(long, default_value_t = 1)]
    amplify: u32,

    /// Render differences white on black
    #[arg(short, long)]
    mark: bool,

    /// Block order used to define the first difference
    #[arg(long, default_value = "HEVC")]
    coding_order: CodingOrder,

    /// RGB gray that means "no difference" (derived from the input when unset)
    #[arg(long)]
    neutral_gray: Option<u8>,

    /// Screen pixels per frame pixel
    #[arg(short, long, default_value_t = 1)]
    zoom: u32,

    /// Print the first-difference report for every frame and exit
    #[arg(long)]
    report: bool,

    /// Write the difference image of --frame to this PNG
    #[arg(long)]
    save: Option<PathBuf>,

    /// Debug logging (YUV_DIFF_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("YUV_DIFF_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn open_source(path: &Path, size: Option<FrameSize>, format: YuvFormat) -> Result<Rc<dyn PixelSource>, Error> {
    let is_still = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("png"));
    if is_still {
        return Ok(Rc::new(RgbSource::open(&[path])?));
    }
    let size = size.ok_or_else(|| Error::InvalidGeometry("--size is required for raw yuv input".into()))?;
    Ok(Rc::new(YuvSource::open(path, size, format)?))
}

fn join(pairs: &[ValuePair]) -> String {
    pairs.iter().map(ValuePair::to_string).collect::<Vec<_>>().join(", ")
}

fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    /* --- Inputs + engine ---
       The engine only borrows the sources; `a` and `b` keep them alive. */
    let format = YuvFormat::new(cli.format, cli.bit_depth);
    let a = open_source(&cli.a, cli.size, format)?;
    let b = open_source(&cli.b, cli.size_b.or(cli.size), format)?;

    let mut engine = DifferenceEngine::with_config(DifferenceConfig {
        mark_difference: cli.mark,
        amplification_factor: cli.amplify,
        coding_order: cli.coding_order,
        neutral_gray: cli.neutral_gray,
    });

    // Anything the engine reports makes the HUD's first-difference text stale.
    let analysis_stale = Rc::new(Cell::new(true));
    {
        let stale = Rc::clone(&analysis_stale);
        engine.subscribe(move |_| stale.set(true));
    }

    engine.set_inputs(Some(&a), Some(&b));
    if !engine.is_ready() {
        return Err(Error::SourceFormat("inputs have no usable frames".into()));
    }
    let frame_count = engine.frame_count();
    info!(size = %engine.frame_size(), frames = frame_count, "inputs paired");

    if let Some(path) = &cli.save {
        engine.load_frame(cli.frame);
        if let Some(img) = engine.current_frame() {
            img.save(path)?;
            info!(path = %path.display(), "difference image written");
        }
    }

    /* --- Headless report --- */
    if cli.report {
        for idx in cli.frame..frame_count {
            let report = engine.report_first_difference_position(idx);
            println!("frame {idx}: {}", join(&report));
            println!("frame {idx}: {}", join(engine.difference_info()));
        }
        return Ok(());
    }

    /* --- Window + canvas ---
       Window is the zoomed frame, clamped to a sane size. */
    let frame = engine.frame_size();
    let zoom = cli.zoom.max(1);
    let width = (frame.width.saturating_mul(zoom)).clamp(MIN_WINDOW.0, MAX_WINDOW.0) as usize;
    let height = (frame.height.saturating_mul(zoom)).clamp(MIN_WINDOW.1, MAX_WINDOW.1) as usize;
    let mut drawer = Drawer::new("yuv-diff", width, height)?;
    let mut canvas = FrameBuffer::new(width, height);

    let mut view = PixelView::new(Point::default(), zoom);
    let mut frame_index = cli.frame.min(frame_count.saturating_sub(1));
    let mut hud_report = String::new();
    let mut location = None;

    /* ------------------------------ Main loop ------------------------------ */
    while drawer.is_open() && !drawer.esc_pressed() {
        /* 1) Keys */
        if drawer.pressed_repeat(Key::Right) && frame_index + 1 < frame_count {
            frame_index += 1;
            analysis_stale.set(true);
        }
        if drawer.pressed_repeat(Key::Left) && frame_index > 0 {
            frame_index -= 1;
            analysis_stale.set(true);
        }
        let amp = engine.config().amplification_factor;
        if drawer.pressed_repeat(Key::Up) {
            engine.set_amplification_factor(amp.saturating_add(1));
        }
        if drawer.pressed_repeat(Key::Down) && amp > 1 {
            engine.set_amplification_factor(amp - 1);
        }
        if drawer.pressed_once(Key::M) {
            let mark = engine.config().mark_difference;
            engine.set_mark_difference(!mark);
        }

        // Pan by an eighth of the visible area
        let (x0, y0, x1, y1) = view.visible_range(&canvas, frame);
        let step_x = ((x1 - x0) / 8).max(1);
        let step_y = ((y1 - y0) / 8).max(1);
        if drawer.pressed_repeat(Key::A) { view.origin.x = view.origin.x.saturating_sub(step_x); }
        if drawer.pressed_repeat(Key::D) { view.origin.x = (view.origin.x + step_x).min(frame.width.saturating_sub(1)); }
        if drawer.pressed_repeat(Key::W) { view.origin.y = view.origin.y.saturating_sub(step_y); }
        if drawer.pressed_repeat(Key::S) { view.origin.y = (view.origin.y + step_y).min(frame.height.saturating_sub(1)); }

        /* 2) Difference for this frame (cached by the engine unless settings changed) */
        engine.load_frame(frame_index);

        /* 3) First difference, only when something invalidated it */
        if analysis_stale.replace(false) {
            let report = engine.report_first_difference_position(frame_index);
            location = engine.first_difference();
            hud_report = join(&report);
            info!(frame_index, report = %hud_report, "first difference");
        }

        if drawer.pressed_once(Key::F) {
            if let Some(loc) = location {
                // Center the view on the block
                let cols = (canvas.width as u32 / zoom) / 2;
                let rows = (canvas.height as u32 / zoom) / 2;
                view.origin = Point::new(loc.x.saturating_sub(cols), loc.y.saturating_sub(rows));
            }
        }

        /* 4) Compose: difference image, per-pixel values, marker, HUD */
        canvas.clear(BACKGROUND);
        if let Some(img) = engine.current_frame() {
            blit_image(&mut canvas, img, &view);
        }
        engine.render_pixel_values(&mut canvas, frame_index, &view);
        if let Some(loc) = location {
            let block = engine.config().coding_order.min_block_size();
            mark_block(&mut canvas, &view, Point::new(loc.x, loc.y), block, MARKER);
        }

        let cfg = engine.config();
        let mode = if cfg.mark_difference { "MARK" } else { "GRAY" };
        let status = format!(
            "FRAME {}/{} | AMP X{} | {} | {}",
            frame_index, frame_count, cfg.amplification_factor, mode, cfg.coding_order
        );
        draw_text_5x7(&mut canvas, 8, 8, &status, HUD);
        draw_text_5x7(&mut canvas, 8, 20, &hud_report, HUD);

        /* 5) Present */
        drawer.present(&canvas)?;
    }

    Ok(())
}
