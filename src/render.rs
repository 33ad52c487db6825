//! Annotated overlay rendering
//!
//! Draws the final object set onto a copy of the (restored) frame: thick
//! contour outlines, a filled+outlined centroid marker, and a numeric ID
//! label on a dark background plate. Colors rotate through a fixed palette
//! keyed by object ID.

use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;

use crate::detect::Region;

/// Rotating annotation palette
const PALETTE: [Rgb<u8>; 10] = [
    Rgb([0, 255, 0]),     // green
    Rgb([255, 0, 0]),     // red
    Rgb([0, 0, 255]),     // blue
    Rgb([255, 255, 0]),   // yellow
    Rgb([255, 0, 255]),   // magenta
    Rgb([0, 255, 255]),   // cyan
    Rgb([255, 165, 0]),   // orange
    Rgb([128, 0, 128]),   // purple
    Rgb([255, 192, 203]), // pink
    Rgb([0, 128, 0]),     // dark green
];

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const PLATE: Rgb<u8> = Rgb([0, 0, 0]);

/// Contour line half-thickness in pixels (3px lines)
const LINE_SPREAD: i32 = 1;

/// Centroid marker radius
const MARKER_RADIUS: i32 = 6;

/// Digit cell geometry: 3x5 bitmap font at 2x scale
const DIGIT_SCALE: i32 = 2;
const DIGIT_WIDTH: i32 = 3 * DIGIT_SCALE + DIGIT_SCALE; // glyph + spacing
const DIGIT_HEIGHT: i32 = 5 * DIGIT_SCALE;

/// 3x5 digit glyphs, one row per entry, low 3 bits used
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111], // 0
    [0b010, 0b110, 0b010, 0b010, 0b111], // 1
    [0b111, 0b001, 0b111, 0b100, 0b111], // 2
    [0b111, 0b001, 0b111, 0b001, 0b111], // 3
    [0b101, 0b101, 0b111, 0b001, 0b001], // 4
    [0b111, 0b100, 0b111, 0b001, 0b111], // 5
    [0b111, 0b100, 0b111, 0b101, 0b111], // 6
    [0b111, 0b001, 0b001, 0b001, 0b001], // 7
    [0b111, 0b101, 0b111, 0b101, 0b111], // 8
    [0b111, 0b101, 0b111, 0b001, 0b111], // 9
];

/// Overlay renderer
pub struct Renderer;

impl Renderer {
    /// Draw all regions onto the canvas; object IDs are 1-based positions
    /// in the slice
    pub fn draw_annotations(canvas: &mut RgbImage, regions: &[Region]) {
        for (index, region) in regions.iter().enumerate() {
            let id = index as u32 + 1;
            let color = PALETTE[(id as usize - 1) % PALETTE.len()];

            Self::draw_outline(canvas, region, color);
            Self::draw_centroid(canvas, region, color);
            Self::draw_label(canvas, region, id);
        }
    }

    /// Thick closed polyline through the region outline
    fn draw_outline(canvas: &mut RgbImage, region: &Region, color: Rgb<u8>) {
        let points = &region.outline;
        if points.len() < 2 {
            return;
        }

        for i in 0..points.len() {
            let a = points[i];
            let b = points[(i + 1) % points.len()];

            for dy in -LINE_SPREAD..=LINE_SPREAD {
                for dx in -LINE_SPREAD..=LINE_SPREAD {
                    draw_line_segment_mut(
                        canvas,
                        ((a.x + dx) as f32, (a.y + dy) as f32),
                        ((b.x + dx) as f32, (b.y + dy) as f32),
                        color,
                    );
                }
            }
        }
    }

    /// Filled white disc with a colored ring at the bounding-box center
    fn draw_centroid(canvas: &mut RgbImage, region: &Region, color: Rgb<u8>) {
        let (cx, cy) = region.center();
        let center = (cx.round() as i32, cy.round() as i32);

        draw_filled_circle_mut(canvas, center, MARKER_RADIUS, WHITE);
        draw_hollow_circle_mut(canvas, center, MARKER_RADIUS, color);
        draw_hollow_circle_mut(canvas, center, MARKER_RADIUS - 1, color);
    }

    /// Numeric ID on a dark plate above the bounding box
    fn draw_label(canvas: &mut RgbImage, region: &Region, id: u32) {
        let digits: Vec<usize> = id
            .to_string()
            .bytes()
            .map(|b| (b - b'0') as usize)
            .collect();

        let text_width = digits.len() as i32 * DIGIT_WIDTH;
        let x0 = region.x as i32;
        let y0 = region.y as i32 - DIGIT_HEIGHT - 10;

        let plate_w = (text_width + 6) as u32;
        let plate_h = (DIGIT_HEIGHT + 6) as u32;
        draw_filled_rect_mut(
            canvas,
            Rect::at(x0 - 3, y0 - 3).of_size(plate_w, plate_h),
            PLATE,
        );

        let mut x = x0;
        for &digit in &digits {
            draw_digit(canvas, digit, x, y0, WHITE);
            x += DIGIT_WIDTH;
        }
    }
}

/// Paint one glyph at (x0, y0); pixels outside the canvas are skipped
fn draw_digit(canvas: &mut RgbImage, digit: usize, x0: i32, y0: i32, color: Rgb<u8>) {
    let glyph = &DIGITS[digit];
    let (width, height) = canvas.dimensions();

    for (row, bits) in glyph.iter().enumerate() {
        for col in 0..3 {
            if bits & (0b100 >> col) == 0 {
                continue;
            }
            for sy in 0..DIGIT_SCALE {
                for sx in 0..DIGIT_SCALE {
                    let px = x0 + col as i32 * DIGIT_SCALE + sx;
                    let py = y0 + row as i32 * DIGIT_SCALE + sy;
                    if px >= 0 && py >= 0 && (px as u32) < width && (py as u32) < height {
                        canvas.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
    }
}

// ============================================================
// Tests
// ============================================================
