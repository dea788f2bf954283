//! Annotation primitives for published frames.
//!
//! Every primitive clips to the frame and is infallible, so drawing can never
//! abort a control decision. With `vision-opencv` the shapes and text come from
//! `imgproc`; otherwise a raster backend with a 5x7 font draws them.

#[cfg(feature = "vision-opencv")]
mod cv;
#[cfg(not(feature = "vision-opencv"))]
mod raster;

#[cfg(feature = "vision-opencv")]
use self::cv as backend;
#[cfg(not(feature = "vision-opencv"))]
use self::raster as backend;

use crate::frame::Frame;

pub const GREEN: [u8; 3] = [0, 255, 0];
pub const RED: [u8; 3] = [255, 0, 0];
pub const BLUE: [u8; 3] = [0, 0, 255];
pub const YELLOW: [u8; 3] = [255, 255, 0];
pub const AMBER: [u8; 3] = [255, 200, 0];
pub const ORANGE: [u8; 3] = [255, 165, 0];
pub const MAGENTA: [u8; 3] = [255, 0, 255];
pub const WHITE: [u8; 3] = [255, 255, 255];
pub const SHADOW: [u8; 3] = [0, 0, 0];

/// Outline a rectangle given by its inclusive corners.
pub fn draw_rect(frame: &mut Frame, x0: i32, y0: i32, x1: i32, y1: i32, color: [u8; 3]) {
    backend::draw_rect(frame, x0, y0, x1, y1, color);
}

pub fn draw_line(frame: &mut Frame, x0: i32, y0: i32, x1: i32, y1: i32, color: [u8; 3]) {
    backend::draw_line(frame, x0, y0, x1, y1, color);
}

pub fn fill_circle(frame: &mut Frame, cx: i32, cy: i32, radius: i32, color: [u8; 3]) {
    backend::fill_circle(frame, cx, cy, radius, color);
}

/// Draw text with its top-left corner at `(x, y)` on a dark backing strip.
pub fn draw_label(frame: &mut Frame, x: i32, y: i32, text: &str, color: [u8; 3]) {
    backend::draw_label(frame, x, y, text, color);
}

/// Pixel width of `text` when drawn with `draw_label`.
pub fn label_width(text: &str) -> i32 {
    backend::label_width(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_clip_outside_the_frame() {
        let mut frame = Frame::filled(20, 10, SHADOW);
        draw_rect(&mut frame, -5, -5, 40, 40, GREEN);
        draw_line(&mut frame, -100, 5, 100, 5, RED);
        fill_circle(&mut frame, 19, 9, 6, BLUE);
        draw_label(&mut frame, 15, 8, "NO LINE DETECTED", WHITE);
        assert_eq!(frame.pixel(0, 5), Some(RED));
    }

    #[test]
    fn rect_outline_leaves_interior() {
        let mut frame = Frame::filled(10, 10, SHADOW);
        draw_rect(&mut frame, 1, 1, 8, 8, GREEN);
        assert_eq!(frame.pixel(1, 4), Some(GREEN));
        assert_eq!(frame.pixel(8, 8), Some(GREEN));
        assert_eq!(frame.pixel(4, 4), Some(SHADOW));
    }

    #[test]
    fn filled_circle_covers_its_centre() {
        let mut frame = Frame::filled(30, 30, SHADOW);
        fill_circle(&mut frame, 15, 15, 5, RED);
        assert_eq!(frame.pixel(15, 15), Some(RED));
        assert_eq!(frame.pixel(17, 15), Some(RED));
        assert_eq!(frame.pixel(0, 0), Some(SHADOW));
    }

    #[test]
    fn label_paints_text_over_a_backing_strip() {
        let mut frame = Frame::filled(80, 24, [10, 10, 10]);
        draw_label(&mut frame, 2, 2, "LINE", YELLOW);

        assert_eq!(frame.pixel(0, 0), Some(SHADOW));
        let painted = (0..80)
            .flat_map(|x| (0..24).map(move |y| (x, y)))
            .filter(|&(x, y)| frame.pixel(x, y) == Some(YELLOW))
            .count();
        assert!(painted > 0);
        assert!(label_width("LINES") > label_width("LINE"));
    }
}
