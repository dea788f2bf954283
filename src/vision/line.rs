use anyhow::{anyhow, Result};

use super::color::LineColorProfile;
use crate::frame::Frame;

/// Tuning for the line band segmentation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineExtractorConfig {
    /// Rows at the bottom of the frame that are analysed.
    pub band_height: u32,
    pub erode_iterations: u32,
    pub dilate_iterations: u32,
    /// Blobs larger than this count towards a junction.
    pub significant_area: f64,
    /// Total blob area above which the band is treated as a junction.
    pub junction_area: f64,
}

impl Default for LineExtractorConfig {
    fn default() -> Self {
        Self {
            band_height: 90,
            erode_iterations: 2,
            dilate_iterations: 2,
            significant_area: 500.0,
            junction_area: 8000.0,
        }
    }
}

/// Raw spatial moments up to first order.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Moments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

impl Moments {
    /// Mass centre, or `None` when the zeroth moment vanishes.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.m00 > 0.0 && self.m00.is_finite() {
            Some((self.m10 / self.m00, self.m01 / self.m00))
        } else {
            None
        }
    }
}

/// One external connected region of the line mask.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Blob {
    pub area: f64,
    pub moments: Moments,
}

impl Blob {
    pub fn new(area: f64, moments: Moments) -> Self {
        Self { area, moments }
    }

    /// Pixel centroid truncated to integer band coordinates.
    pub fn centroid(&self) -> Option<(i32, i32)> {
        self.moments
            .centroid()
            .map(|(cx, cy)| (cx as i32, cy as i32))
    }
}

/// Blobs found in one band plus the junction classification.
#[derive(Clone, Debug, PartialEq)]
pub struct LineDetection {
    pub blobs: Vec<Blob>,
    pub band_width: u32,
    pub band_height: u32,
    /// Indices into `blobs` whose area exceeds the significance threshold.
    pub significant: Vec<usize>,
    pub total_area: f64,
    pub is_junction: bool,
}

impl LineDetection {
    pub fn from_blobs(
        blobs: Vec<Blob>,
        band_width: u32,
        band_height: u32,
        config: &LineExtractorConfig,
    ) -> Self {
        let significant: Vec<usize> = blobs
            .iter()
            .enumerate()
            .filter(|(_, blob)| blob.area > config.significant_area)
            .map(|(i, _)| i)
            .collect();
        let total_area: f64 = blobs.iter().map(|blob| blob.area).sum();
        let is_junction = significant.len() > 1 || total_area > config.junction_area;
        Self {
            blobs,
            band_width,
            band_height,
            significant,
            total_area,
            is_junction,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Index of the largest blob. The first one wins ties.
    pub fn largest(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, blob) in self.blobs.iter().enumerate() {
            match best {
                Some(b) if self.blobs[b].area >= blob.area => {}
                _ => best = Some(i),
            }
        }
        best
    }

    pub fn center_x(&self) -> i32 {
        self.band_width as i32 / 2
    }
}

/// Detection plus per-blob outlines, kept for overlays.
#[derive(Clone, Debug)]
pub struct LineExtraction {
    pub detection: LineDetection,
    /// First frame row of the band.
    pub band_top: u32,
    outlines: Vec<Vec<(i32, i32)>>,
}

impl LineExtraction {
    /// Boundary pixels of blob `index` in band coordinates.
    pub fn outline(&self, index: usize) -> &[(i32, i32)] {
        self.outlines.get(index).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Blobs of one band, index-aligned with their outlines.
pub(super) struct Segmentation {
    pub blobs: Vec<Blob>,
    pub outlines: Vec<Vec<(i32, i32)>>,
}

/// Segments the band nearest the robot against a colour profile.
#[derive(Clone, Debug, Default)]
pub struct LineExtractor {
    config: LineExtractorConfig,
}

impl LineExtractor {
    pub fn new(config: LineExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LineExtractorConfig {
        &self.config
    }

    pub fn extract(&self, frame: &Frame, profile: &LineColorProfile) -> Result<LineExtraction> {
        let width = frame.width();
        let band_height = self.config.band_height;
        if band_height == 0 || frame.height() < band_height {
            return Err(anyhow!(
                "frame height {} cannot hold a {}-row line band",
                frame.height(),
                band_height
            ));
        }
        let band_top = frame.height() - band_height;

        let offset = band_top as usize * width as usize * 3;
        let band = &frame.pixels()[offset..offset + width as usize * band_height as usize * 3];

        #[cfg(feature = "vision-opencv")]
        let segmentation = super::cv::segment(band, width, band_height, profile, &self.config)
            .map_err(|err| anyhow!("OpenCV line segmentation failed: {err}"))?;
        #[cfg(not(feature = "vision-opencv"))]
        let segmentation = super::raster::segment(band, width, band_height, profile, &self.config);

        Ok(LineExtraction {
            detection: LineDetection::from_blobs(
                segmentation.blobs,
                width,
                band_height,
                &self.config,
            ),
            band_top,
            outlines: segmentation.outlines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOOR: [u8; 3] = [200, 200, 200];
    const TAPE: [u8; 3] = [10, 10, 10];

    fn blob_at(area: f64, cx: f64, cy: f64) -> Blob {
        Blob::new(
            area,
            Moments {
                m00: area,
                m10: area * cx,
                m01: area * cy,
            },
        )
    }

    #[test]
    fn zero_moments_have_no_centroid() {
        assert_eq!(Moments::default().centroid(), None);
        assert_eq!(Blob::new(600.0, Moments::default()).centroid(), None);
    }

    #[test]
    fn extracts_single_vertical_stripe() -> Result<()> {
        let mut frame = Frame::filled(320, 240, FLOOR);
        frame.fill_rect(150, 0, 169, 239, TAPE);

        let extraction = LineExtractor::default().extract(&frame, &LineColorProfile::default())?;
        let detection = &extraction.detection;
        assert_eq!(extraction.band_top, 150);
        assert_eq!(detection.blobs.len(), 1);
        // Pixel count and contour area differ by the one-pixel boundary.
        let area = detection.blobs[0].area;
        assert!((19.0 * 89.0..=20.0 * 90.0).contains(&area), "area {area}");
        assert_eq!(detection.blobs[0].centroid(), Some((159, 44)));
        assert!(!detection.is_junction);
        Ok(())
    }

    #[test]
    fn speckle_is_removed_by_opening() -> Result<()> {
        let mut frame = Frame::filled(64, 90, FLOOR);
        frame.set_pixel(10, 10, TAPE);
        frame.fill_rect(30, 30, 31, 31, TAPE);

        let extraction = LineExtractor::default().extract(&frame, &LineColorProfile::default())?;
        assert!(extraction.detection.is_empty());
        Ok(())
    }

    #[test]
    fn two_branches_classify_as_junction() -> Result<()> {
        let mut frame = Frame::filled(320, 240, FLOOR);
        frame.fill_rect(40, 150, 70, 239, TAPE);
        frame.fill_rect(220, 150, 250, 239, TAPE);

        let extraction = LineExtractor::default().extract(&frame, &LineColorProfile::default())?;
        let detection = &extraction.detection;
        assert_eq!(detection.significant.len(), 2);
        assert!(detection.is_junction);
        assert!(!extraction.outline(0).is_empty());
        assert!(extraction.outline(2).is_empty());
        Ok(())
    }

    #[test]
    fn large_total_area_alone_is_a_junction() {
        let config = LineExtractorConfig::default();
        let detection = LineDetection::from_blobs(vec![blob_at(9000.0, 160.0, 45.0)], 320, 90, &config);
        assert_eq!(detection.significant, vec![0]);
        assert!(detection.is_junction);
    }

    #[test]
    fn largest_prefers_first_on_ties() {
        let config = LineExtractorConfig::default();
        let detection = LineDetection::from_blobs(
            vec![
                blob_at(100.0, 10.0, 10.0),
                blob_at(700.0, 20.0, 10.0),
                blob_at(700.0, 30.0, 10.0),
            ],
            320,
            90,
            &config,
        );
        assert_eq!(detection.largest(), Some(1));
    }

    #[test]
    fn short_frames_are_rejected() {
        let frame = Frame::filled(320, 60, FLOOR);
        assert!(LineExtractor::default()
            .extract(&frame, &LineColorProfile::default())
            .is_err());
    }
}
