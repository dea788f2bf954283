//! `imgproc` drawing on a matrix view of the frame.

use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::imgproc;
use opencv::prelude::*;

use super::SHADOW;
use crate::frame::Frame;
use crate::vision::cv::rgb_mat;

const FONT: i32 = imgproc::FONT_HERSHEY_SIMPLEX;
const FONT_SCALE: f64 = 0.4;

fn color(rgb: [u8; 3]) -> Scalar {
    Scalar::new(rgb[0] as f64, rgb[1] as f64, rgb[2] as f64, 0.0)
}

/// Run one drawing pass and write the pixels back. Failures leave the frame as it was.
fn with_canvas(frame: &mut Frame, draw: impl FnOnce(&mut Mat) -> opencv::Result<()>) {
    let result = rgb_mat(frame.pixels(), frame.width(), frame.height()).and_then(|mut mat| {
        draw(&mut mat)?;
        frame.pixels_mut().copy_from_slice(mat.data_bytes()?);
        Ok(())
    });
    if let Err(err) = result {
        log::debug!("overlay draw skipped: {err}");
    }
}

fn corners(x0: i32, y0: i32, x1: i32, y1: i32) -> Rect {
    Rect::new(
        x0.min(x1),
        y0.min(y1),
        (x1 - x0).abs() + 1,
        (y1 - y0).abs() + 1,
    )
}

pub(super) fn draw_rect(frame: &mut Frame, x0: i32, y0: i32, x1: i32, y1: i32, rgb: [u8; 3]) {
    with_canvas(frame, |mat| {
        imgproc::rectangle(mat, corners(x0, y0, x1, y1), color(rgb), 1, imgproc::LINE_8, 0)
    });
}

pub(super) fn draw_line(frame: &mut Frame, x0: i32, y0: i32, x1: i32, y1: i32, rgb: [u8; 3]) {
    with_canvas(frame, |mat| {
        imgproc::line(
            mat,
            Point::new(x0, y0),
            Point::new(x1, y1),
            color(rgb),
            1,
            imgproc::LINE_8,
            0,
        )
    });
}

pub(super) fn fill_circle(frame: &mut Frame, cx: i32, cy: i32, radius: i32, rgb: [u8; 3]) {
    with_canvas(frame, |mat| {
        imgproc::circle(
            mat,
            Point::new(cx, cy),
            radius,
            color(rgb),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
    });
}

pub(super) fn draw_label(frame: &mut Frame, x: i32, y: i32, text: &str, rgb: [u8; 3]) {
    with_canvas(frame, |mat| {
        let mut baseline = 0;
        let size = imgproc::get_text_size(text, FONT, FONT_SCALE, 1, &mut baseline)?;
        imgproc::rectangle(
            mat,
            Rect::new(x - 2, y - 2, size.width + 4, size.height + baseline + 4),
            color(SHADOW),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;
        imgproc::put_text(
            mat,
            text,
            Point::new(x, y + size.height),
            FONT,
            FONT_SCALE,
            color(rgb),
            1,
            imgproc::LINE_8,
            false,
        )
    });
}

pub(super) fn label_width(text: &str) -> i32 {
    let mut baseline = 0;
    match imgproc::get_text_size(text, FONT, FONT_SCALE, 1, &mut baseline) {
        Ok(size) => size.width,
        Err(err) => {
            log::debug!("text measurement failed: {err}");
            text.chars().count() as i32 * 8
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inclusive_corners_map_to_rect() {
        assert_eq!(corners(8, 8, 1, 1), Rect::new(1, 1, 8, 8));
    }
}
