//! Portable band segmentation used when the crate is built without OpenCV.
//!
//! Mirrors the OpenCV pipeline step for step: HSV conversion on the 0..=180
//! hue scale, inclusive range masks, a 3x3 opening and external blobs.
//! Blob area is the pixel count rather than the contour area.

use super::color::LineColorProfile;
use super::line::{Blob, LineExtractorConfig, Moments, Segmentation};

/// 8-bit HSV with hue halved into 0..=180.
fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(|c| c as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = max - min;

    let s = if max > 0.0 { diff * 255.0 / max } else { 0.0 };
    let mut h = if diff == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / diff
    } else if max == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }
    [(h / 2.0).round() as u8, s.round() as u8, max as u8]
}

pub(super) fn segment(
    band: &[u8],
    width: u32,
    height: u32,
    profile: &LineColorProfile,
    config: &LineExtractorConfig,
) -> Segmentation {
    let (w, h) = (width as usize, height as usize);
    let mut mask: Vec<bool> = band
        .chunks_exact(3)
        .map(|px| profile.matches(rgb_to_hsv([px[0], px[1], px[2]])))
        .collect();

    for _ in 0..config.erode_iterations {
        mask = morph(&mask, w, h, false);
    }
    for _ in 0..config.dilate_iterations {
        mask = morph(&mask, w, h, true);
    }

    let (labels, blobs) = label_blobs(&mask, w, h);
    let outlines = (1..=blobs.len() as u32)
        .map(|label| boundary(&labels, w, h, label))
        .collect();
    Segmentation { blobs, outlines }
}

/// One 3x3 erosion (`dilate == false`) or dilation pass. Neighbours outside
/// the band are ignored.
fn morph(mask: &[bool], w: usize, h: usize, dilate: bool) -> Vec<bool> {
    let mut out = vec![false; mask.len()];
    for y in 0..h {
        for x in 0..w {
            let mut hit = !dilate;
            'window: for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    if mask[ny * w + nx] == dilate {
                        hit = dilate;
                        break 'window;
                    }
                }
            }
            out[y * w + x] = hit;
        }
    }
    out
}

/// 8-connected component labelling. Label `i + 1` belongs to `blobs[i]`.
fn label_blobs(mask: &[bool], w: usize, h: usize) -> (Vec<u32>, Vec<Blob>) {
    let mut labels = vec![0u32; mask.len()];
    let mut blobs = Vec::new();
    let mut stack = Vec::new();

    for start in 0..mask.len() {
        if !mask[start] || labels[start] != 0 {
            continue;
        }
        let label = blobs.len() as u32 + 1;
        let mut moments = Moments::default();
        labels[start] = label;
        stack.push(start);

        while let Some(index) = stack.pop() {
            let (x, y) = (index % w, index / w);
            moments.m00 += 1.0;
            moments.m10 += x as f64;
            moments.m01 += y as f64;
            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    let n = ny * w + nx;
                    if mask[n] && labels[n] == 0 {
                        labels[n] = label;
                        stack.push(n);
                    }
                }
            }
        }
        blobs.push(Blob::new(moments.m00, moments));
    }
    (labels, blobs)
}

fn boundary(labels: &[u32], w: usize, h: usize, label: u32) -> Vec<(i32, i32)> {
    let mut points = Vec::new();
    for y in 0..h {
        for x in 0..w {
            if labels[y * w + x] != label {
                continue;
            }
            let edge = x == 0
                || y == 0
                || x + 1 == w
                || y + 1 == h
                || labels[y * w + x - 1] != label
                || labels[y * w + x + 1] != label
                || labels[(y - 1) * w + x] != label
                || labels[(y + 1) * w + x] != label;
            if edge {
                points.push((x as i32, y as i32));
            }
        }
    }
    points
}
