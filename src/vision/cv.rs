//! OpenCV band segmentation.

use opencv::core::{self, Mat, Point, Scalar, Size, Vector, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::*;

use super::color::{HsvRange, LineColorProfile};
use super::line::{Blob, LineExtractorConfig, Moments, Segmentation};

/// Copy an RGB24 buffer into a fresh `CV_8UC3` matrix.
pub(crate) fn rgb_mat(pixels: &[u8], width: u32, height: u32) -> opencv::Result<Mat> {
    let mut mat =
        Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC3, Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(pixels);
    Ok(mat)
}

fn range_mask(hsv: &Mat, range: &HsvRange) -> opencv::Result<Mat> {
    let [l0, l1, l2] = range.lower.map(f64::from);
    let [u0, u1, u2] = range.upper.map(f64::from);
    let mut mask = Mat::default();
    core::in_range(
        hsv,
        &Scalar::new(l0, l1, l2, 0.0),
        &Scalar::new(u0, u1, u2, 0.0),
        &mut mask,
    )?;
    Ok(mask)
}

pub(super) fn segment(
    band: &[u8],
    width: u32,
    height: u32,
    profile: &LineColorProfile,
    config: &LineExtractorConfig,
) -> opencv::Result<Segmentation> {
    let rgb = rgb_mat(band, width, height)?;
    let mut hsv = Mat::default();
    imgproc::cvt_color(&rgb, &mut hsv, imgproc::COLOR_RGB2HSV, 0)?;

    let mut mask = range_mask(&hsv, &profile.range)?;
    if let Some(wrap) = &profile.wrap {
        let seam = range_mask(&hsv, wrap)?;
        let mut merged = Mat::default();
        core::bitwise_or(&mask, &seam, &mut merged, &core::no_array())?;
        mask = merged;
    }

    let kernel = imgproc::get_structuring_element(
        imgproc::MORPH_RECT,
        Size::new(3, 3),
        Point::new(-1, -1),
    )?;
    let border = imgproc::morphology_default_border_value()?;
    let mut eroded = Mat::default();
    imgproc::erode(
        &mask,
        &mut eroded,
        &kernel,
        Point::new(-1, -1),
        config.erode_iterations as i32,
        core::BORDER_CONSTANT,
        border,
    )?;
    let mut opened = Mat::default();
    imgproc::dilate(
        &eroded,
        &mut opened,
        &kernel,
        Point::new(-1, -1),
        config.dilate_iterations as i32,
        core::BORDER_CONSTANT,
        border,
    )?;

    let mut contours = Vector::<Vector<Point>>::new();
    imgproc::find_contours(
        &opened,
        &mut contours,
        imgproc::RETR_EXTERNAL,
        imgproc::CHAIN_APPROX_NONE,
        Point::new(0, 0),
    )?;

    let mut blobs = Vec::with_capacity(contours.len());
    let mut outlines = Vec::with_capacity(contours.len());
    for contour in contours.iter() {
        let m = imgproc::moments(&contour, false)?;
        let area = imgproc::contour_area(&contour, false)?;
        blobs.push(Blob::new(
            area,
            Moments {
                m00: m.m00,
                m10: m.m10,
                m01: m.m01,
            },
        ));
        outlines.push(contour.iter().map(|p| (p.x, p.y)).collect());
    }
    Ok(Segmentation { blobs, outlines })
}
