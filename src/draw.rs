// Window + software drawing utilities.
// What lives here:
// 1) A window that shows the difference canvas (viewer builds only).
// 2) Blitting a difference image into the canvas at a zoom level.
// 3) Crosshair / block outline to point at the first difference.
// 4) A tiny 5x7 bitmap font for HUD text and per-pixel values.

use image::RgbImage;

use crate::types::{FrameBuffer, FrameSize, PixelView, Point};

/// Below this zoom a frame pixel is too small to hold its value text.
pub const VALUE_CELL_MIN_ZOOM: u32 = 32;

pub const WHITE: u32 = 0x00_FF_FF_FF;
pub const BLACK: u32 = 0x00_00_00_00;

#[cfg(feature = "viewer")]
pub use window::Drawer;

#[cfg(feature = "viewer")]
mod window {
    use minifb::{Key, KeyRepeat, Window, WindowOptions};

    use crate::error::Error;
    use crate::types::FrameBuffer;

    pub struct Drawer {
        window: Window, // the on-screen window you see
    }

    impl Drawer {
        /// Create a window sized to the canvas.
        pub fn new(title: &str, width: usize, height: usize) -> Result<Self, Error> {
            let mut window = Window::new(title, width, height, WindowOptions::default())
                .map_err(|e| Error::WindowInit(e.to_string()))?;
            window.set_target_fps(60);
            Ok(Self { window })
        }

        /// Push the canvas to the screen.
        pub fn present(&mut self, framebuffer: &FrameBuffer) -> Result<(), Error> {
            self.window
                .update_with_buffer(&framebuffer.pixels, framebuffer.width, framebuffer.height)
                .map_err(|e| Error::WindowUpdate(e.to_string()))?;
            Ok(())
        }

        /// Returns false when the user closes the window (so we can stop the loop).
        pub fn is_open(&self) -> bool {
            self.window.is_open()
        }

        pub fn esc_pressed(&self) -> bool {
            self.window.is_key_down(Key::Escape)
        }

        /// True once per physical key press.
        pub fn pressed_once(&self, key: Key) -> bool {
            self.window.is_key_pressed(key, KeyRepeat::No)
        }

        /// True on press and on key repeat (for panning / stepping).
        pub fn pressed_repeat(&self, key: Key) -> bool {
            self.window.is_key_pressed(key, KeyRepeat::Yes)
        }
    }
}

/* ---------- Software drawing: pixels, lines, markers ---------- */

#[inline]
pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Rec.601 luma of a packed color, used to pick readable text on top of it.
#[inline]
fn luma_of(color: u32) -> u32 {
    let r = (color >> 16) & 0xFF;
    let g = (color >> 8) & 0xFF;
    let b = color & 0xFF;
    (299 * r + 587 * g + 114 * b) / 1000
}

/// Put a pixel on the canvas if (x,y) is inside bounds.
#[inline]
fn put_pixel(fb: &mut FrameBuffer, x: i32, y: i32, color: u32) {
    if x < 0 || y < 0 {
        return;
    }
    let (x, y) = (x as usize, y as usize);
    if x >= fb.width || y >= fb.height {
        return;
    }
    let idx = y * fb.width + x;
    fb.pixels[idx] = color;
}

/// Draw a thin line between (x0,y0) and (x1,y1) using Bresenham.
fn draw_line(fb: &mut FrameBuffer, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
    let (mut x0, mut y0) = (x0, y0);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put_pixel(fb, x0, y0, color);
        if x0 == x1 && y0 == y1 { break; }
        let e2 = 2 * err;
        if e2 >= dy { err += dy; x0 += sx; }
        if e2 <= dx { err += dx; y0 += sy; }
    }
}

/// Draw a small crosshair centered at (cx,cy), with a gap at the center.
pub fn draw_crosshair(fb: &mut FrameBuffer, cx: i32, cy: i32, size: i32, color: u32) {
    draw_line(fb, cx - size, cy, cx - 2, cy, color);
    draw_line(fb, cx + 2, cy, cx + size, cy, color);
    draw_line(fb, cx, cy - size, cx, cy - 2, color);
    draw_line(fb, cx, cy + 2, cx, cy + size, color);
    put_pixel(fb, cx, cy, color);
}

/// Outline of a w x h rectangle whose top-left corner is (x,y).
pub fn draw_rect_outline(fb: &mut FrameBuffer, x: i32, y: i32, w: i32, h: i32, color: u32) {
    if w <= 0 || h <= 0 {
        return;
    }
    let (x1, y1) = (x + w - 1, y + h - 1);
    draw_line(fb, x, y, x1, y, color);
    draw_line(fb, x, y1, x1, y1, color);
    draw_line(fb, x, y, x, y1, color);
    draw_line(fb, x1, y, x1, y1, color);
}

/// Mark a `block` x `block` frame area starting at `pos` with an outline and a crosshair.
pub fn mark_block(fb: &mut FrameBuffer, view: &PixelView, pos: Point, block: u32, color: u32) {
    let (x, y) = view.to_canvas(pos);
    let side = (block * view.zoom.max(1)) as i32;
    draw_rect_outline(fb, x - 1, y - 1, side + 2, side + 2, color);
    draw_crosshair(fb, x + side / 2, y + side / 2, side.max(12), color);
}

/// Nearest-neighbour copy of the visible part of `image` into the canvas.
/// Canvas area not covered by the image is left untouched.
pub fn blit_image(fb: &mut FrameBuffer, image: &RgbImage, view: &PixelView) {
    let frame = FrameSize::new(image.width(), image.height());
    let zoom = view.zoom.max(1) as usize;
    let (x0, y0, x1, y1) = view.visible_range(fb, frame);

    for fy in y0..y1 {
        let cy = (fy - y0) as usize * zoom;
        for fx in x0..x1 {
            let cx = (fx - x0) as usize * zoom;
            let p = image.get_pixel(fx, fy);
            let color = pack_rgb(p[0], p[1], p[2]);

            for yy in cy..(cy + zoom).min(fb.height) {
                let row = yy * fb.width;
                let end = (cx + zoom).min(fb.width);
                if cx < end {
                    fb.pixels[row + cx..row + end].fill(color);
                }
            }
        }
    }
}

/// Text shown inside one zoomed frame pixel.
pub struct ValueCell {
    pub lines: Vec<String>,
    pub differs: bool,
}

/// Draw per-pixel values into each visible cell of the canvas.
///
/// `cell` is asked for every visible frame pixel; returning `None` leaves the
/// cell empty. With `mark_difference` set the canvas is black/white, so text
/// color follows `differs`; otherwise it follows the brightness under the cell.
pub fn draw_value_cells<F>(
    fb: &mut FrameBuffer,
    view: &PixelView,
    frame: FrameSize,
    mark_difference: bool,
    mut cell: F,
) where
    F: FnMut(Point) -> Option<ValueCell>,
{
    if view.zoom < VALUE_CELL_MIN_ZOOM {
        return;
    }
    let zoom = view.zoom as i32;
    let (x0, y0, x1, y1) = view.visible_range(fb, frame);

    for fy in y0..y1 {
        for fx in x0..x1 {
            let pos = Point::new(fx, fy);
            let Some(ValueCell { lines, differs }) = cell(pos) else { continue };
            let (cx, cy) = view.to_canvas(pos);

            let color = if mark_difference {
                if differs { BLACK } else { WHITE }
            } else {
                let under = fb
                    .pixel((cx + zoom / 2).max(0) as usize, (cy + zoom / 2).max(0) as usize)
                    .unwrap_or(BLACK);
                if luma_of(under) > 128 { BLACK } else { WHITE }
            };

            // Center the block of lines inside the cell
            let block_h = lines.len() as i32 * LINE_HEIGHT;
            let mut ty = cy + (zoom - block_h) / 2;
            for line in &lines {
                let tx = cx + (zoom - text_width(line)) / 2;
                draw_text_plain(fb, tx, ty, line, color);
                ty += LINE_HEIGHT;
            }
        }
    }
}

/* ---------- 5x7 bitmap font ---------- */

const GLYPH_ADVANCE: i32 = 6; // 5 pixels glyph width + 1 pixel spacing
const LINE_HEIGHT: i32 = 8;

/// Width in pixels of `text` drawn with the 5x7 font.
pub fn text_width(text: &str) -> i32 {
    text.chars().count() as i32 * GLYPH_ADVANCE
}

/// Return a 5x7 glyph bitmap. Each u8 is a row; the low 5 bits are the pixels
/// (bit 4 = leftmost). Lowercase letters use the uppercase glyphs.
fn glyph5x7(ch: char) -> Option<[u8; 7]> {
    macro_rules! g { ($a:expr,$b:expr,$c:expr,$d:expr,$e:expr,$f:expr,$g:expr) => {
        Some([$a,$b,$c,$d,$e,$f,$g])
    }; }

    match ch.to_ascii_uppercase() {
        '0' => g!(0b01110,0b10001,0b10011,0b10101,0b11001,0b10001,0b01110),
        '1' => g!(0b00100,0b01100,0b00100,0b00100,0b00100,0b00100,0b01110),
        '2' => g!(0b01110,0b10001,0b00001,0b00010,0b00100,0b01000,0b11111),
        '3' => g!(0b11110,0b00001,0b00001,0b01110,0b00001,0b00001,0b11110),
        '4' => g!(0b00010,0b00110,0b01010,0b10010,0b11111,0b00010,0b00010),
        '5' => g!(0b11111,0b10000,0b11110,0b00001,0b00001,0b10001,0b01110),
        '6' => g!(0b00110,0b01000,0b10000,0b11110,0b10001,0b10001,0b01110),
        '7' => g!(0b11111,0b00001,0b00010,0b00100,0b01000,0b01000,0b01000),
        '8' => g!(0b01110,0b10001,0b10001,0b01110,0b10001,0b10001,0b01110),
        '9' => g!(0b01110,0b10001,0b10001,0b01111,0b00001,0b00010,0b01100),

        'A' => g!(0b01110,0b10001,0b10001,0b11111,0b10001,0b10001,0b10001),
        'B' => g!(0b11110,0b10001,0b10001,0b11110,0b10001,0b10001,0b11110),
        'C' => g!(0b01110,0b10001,0b10000,0b10000,0b10000,0b10001,0b01110),
        'D' => g!(0b11100,0b10010,0b10001,0b10001,0b10001,0b10010,0b11100),
        'E' => g!(0b11111,0b10000,0b10000,0b11110,0b10000,0b10000,0b11111),
        'F' => g!(0b11111,0b10000,0b10000,0b11110,0b10000,0b10000,0b10000),
        'G' => g!(0b01110,0b10001,0b10000,0b10111,0b10001,0b10001,0b01111),
        'H' => g!(0b10001,0b10001,0b10001,0b11111,0b10001,0b10001,0b10001),
        'I' => g!(0b01110,0b00100,0b00100,0b00100,0b00100,0b00100,0b01110),
        'J' => g!(0b00111,0b00010,0b00010,0b00010,0b00010,0b10010,0b01100),
        'K' => g!(0b10001,0b10010,0b10100,0b11000,0b10100,0b10010,0b10001),
        'L' => g!(0b10000,0b10000,0b10000,0b10000,0b10000,0b10000,0b11111),
        'M' => g!(0b10001,0b11011,0b10101,0b10101,0b10001,0b10001,0b10001),
        'N' => g!(0b10001,0b10001,0b11001,0b10101,0b10011,0b10001,0b10001),
        'O' => g!(0b01110,0b10001,0b10001,0b10001,0b10001,0b10001,0b01110),
        'P' => g!(0b11110,0b10001,0b10001,0b11110,0b10000,0b10000,0b10000),
        'Q' => g!(0b01110,0b10001,0b10001,0b10001,0b10101,0b10010,0b01101),
        'R' => g!(0b11110,0b10001,0b10001,0b11110,0b10100,0b10010,0b10001),
        'S' => g!(0b01111,0b10000,0b10000,0b01110,0b00001,0b00001,0b11110),
        'T' => g!(0b11111,0b00100,0b00100,0b00100,0b00100,0b00100,0b00100),
        'U' => g!(0b10001,0b10001,0b10001,0b10001,0b10001,0b10001,0b01110),
        'V' => g!(0b10001,0b10001,0b10001,0b10001,0b10001,0b01010,0b00100),
        'W' => g!(0b10001,0b10001,0b10001,0b10101,0b10101,0b10101,0b01010),
        'X' => g!(0b10001,0b10001,0b01010,0b00100,0b01010,0b10001,0b10001),
        'Y' => g!(0b10001,0b10001,0b01010,0b00100,0b00100,0b00100,0b00100),
        'Z' => g!(0b11111,0b00001,0b00010,0b00100,0b01000,0b10000,0b11111),

        ' ' => g!(0b00000,0b00000,0b00000,0b00000,0b00000,0b00000,0b00000),
        '|' => g!(0b00100,0b00100,0b00100,0b00100,0b00100,0b00100,0b00100),
        ':' => g!(0b00000,0b00100,0b00000,0b00000,0b00100,0b00000,0b00000),
        '.' => g!(0b00000,0b00000,0b00000,0b00000,0b00000,0b00100,0b00000),
        ',' => g!(0b00000,0b00000,0b00000,0b00000,0b00110,0b00100,0b01000),
        '-' => g!(0b00000,0b00000,0b00000,0b11111,0b00000,0b00000,0b00000),
        '+' => g!(0b00000,0b00100,0b00100,0b11111,0b00100,0b00100,0b00000),
        '=' => g!(0b00000,0b00000,0b11111,0b00000,0b11111,0b00000,0b00000),
        '/' => g!(0b00001,0b00010,0b00010,0b00100,0b01000,0b01000,0b10000),

        _ => None,
    }
}

fn draw_glyph(fb: &mut FrameBuffer, x: i32, y: i32, rows: &[u8; 7], color: u32) {
    for (ry, rowbits) in rows.iter().enumerate() {
        for rx in 0..5 {
            if (rowbits & (1 << (4 - rx))) != 0 {
                put_pixel(fb, x + rx, y + ry as i32, color);
            }
        }
    }
}

/// Single-color text, no shadow (pixel value cells are too small for one).
fn draw_text_plain(fb: &mut FrameBuffer, mut x: i32, y: i32, text: &str, color: u32) {
    for ch in text.chars() {
        if let Some(rows) = glyph5x7(ch) {
            draw_glyph(fb, x, y, &rows, color);
        }
        x += GLYPH_ADVANCE;
    }
}

/// HUD text: glyphs with a 1-pixel black shadow for contrast on any background.
pub fn draw_text_5x7(fb: &mut FrameBuffer, mut x: i32, y: i32, text: &str, color: u32) {
    for ch in text.chars() {
        if let Some(rows) = glyph5x7(ch) {
            draw_glyph(fb, x + 1, y + 1, &rows, BLACK);
            draw_glyph(fb, x, y, &rows, color);
        }
        x += GLYPH_ADVANCE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn blit_scales_each_pixel_to_a_zoom_square() {
        let mut img = RgbImage::from_pixel(4, 4, Rgb([130, 130, 130]));
        img.put_pixel(1, 0, Rgb([255, 0, 0]));
        let mut fb = FrameBuffer::new(8, 8);
        blit_image(&mut fb, &img, &PixelView::new(Point::new(0, 0), 2));

        assert_eq!(fb.pixel(2, 0), Some(0x00_FF_00_00));
        assert_eq!(fb.pixel(3, 1), Some(0x00_FF_00_00));
        assert_eq!(fb.pixel(4, 0), Some(pack_rgb(130, 130, 130)));
        assert_eq!(fb.pixel(7, 7), Some(pack_rgb(130, 130, 130)));
    }

    #[test]
    fn blit_honours_view_origin() {
        let mut img = RgbImage::new(8, 8);
        img.put_pixel(5, 6, Rgb([1, 2, 3]));
        let mut fb = FrameBuffer::new(3, 2);
        blit_image(&mut fb, &img, &PixelView::new(Point::new(4, 5), 1));
        assert_eq!(fb.pixel(1, 1), Some(pack_rgb(1, 2, 3)));
    }

    #[test]
    fn value_cells_need_enough_zoom() {
        let mut fb = FrameBuffer::new(64, 64);
        let mut asked = 0;
        draw_value_cells(&mut fb, &PixelView::new(Point::default(), 16), FrameSize::new(4, 4), false, |_| {
            asked += 1;
            None
        });
        assert_eq!(asked, 0);

        draw_value_cells(&mut fb, &PixelView::new(Point::default(), 32), FrameSize::new(4, 4), true, |_| {
            asked += 1;
            Some(ValueCell { lines: vec!["1".into()], differs: false })
        });
        // 2x2 cells visible on a 64x64 canvas
        assert_eq!(asked, 4);
        assert!(fb.pixels.iter().any(|&p| p == WHITE));
    }

    #[test]
    fn text_uses_unknown_glyph_spacing() {
        assert_eq!(text_width("Y-12"), 24);
        let mut fb = FrameBuffer::new(30, 10);
        draw_text_5x7(&mut fb, 0, 0, "~1", WHITE);
        // '~' has no glyph but still advances
        assert!((0..6).all(|x| fb.pixel(x, 0) == Some(BLACK)));
        assert!(fb.pixels.iter().any(|&p| p == WHITE));
    }
}
