//! Frame containers.
//!
//! - `Frame`: Owned RGB24 pixel buffer captured from a `FrameSource`.
//! - `EncodedFrame`: JPEG bytes of an annotated frame, stamped with a sequence number.
//! - `LatestFrame`: Single-slot, last-write-wins holder for the most recent `EncodedFrame`.
//!
//! The scheduler is the only writer of `LatestFrame`. Stream readers clone an
//! `Arc` out of the slot, so a publish never waits on a slow reader and a
//! reader never observes a half-written JPEG.

use anyhow::{anyhow, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

// ----------------------------------------------------------------------------
// Frame: RGB pixel buffer
// ----------------------------------------------------------------------------

/// RGB24 frame, row-major, 3 bytes per pixel.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    /// Wrap an RGB24 buffer. Fails when the buffer length does not match the dimensions.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Frame filled with a single colour.
    pub fn filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&color);
        }
        Self {
            data,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    #[cfg(feature = "vision-opencv")]
    pub(crate) fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = self.offset(x, y);
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Write one pixel. Out-of-bounds coordinates are ignored.
    pub fn set_pixel(&mut self, x: i32, y: i32, color: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let idx = self.offset(x as u32, y as u32);
        self.data[idx..idx + 3].copy_from_slice(&color);
    }

    /// Fill the inclusive rectangle `(x0, y0)..=(x1, y1)`, clipped to the frame.
    pub fn fill_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: [u8; 3]) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let max_x = self.width as i32 - 1;
        let max_y = self.height as i32 - 1;
        let (left, right) = (x0.min(x1).clamp(0, max_x), x0.max(x1).clamp(0, max_x));
        let (top, bottom) = (y0.min(y1).clamp(0, max_y), y0.max(y1).clamp(0, max_y));
        if x0.max(x1) < 0 || y0.max(y1) < 0 || x0.min(x1) > max_x || y0.min(y1) > max_y {
            return;
        }
        for y in top..=bottom {
            for x in left..=right {
                self.set_pixel(x, y, color);
            }
        }
    }

    /// Mirror around the vertical axis (camera mounted facing the operator).
    pub fn mirror_horizontal(&mut self) {
        let row_len = self.width as usize * 3;
        for row in self.data.chunks_exact_mut(row_len) {
            let mut left = 0usize;
            let mut right = self.width as usize;
            while left + 1 < right {
                right -= 1;
                for c in 0..3 {
                    row.swap(left * 3 + c, right * 3 + c);
                }
                left += 1;
            }
        }
    }

    /// Luma plane (BT.601 weights), one byte per pixel.
    pub fn to_gray(&self) -> Vec<u8> {
        self.data
            .chunks_exact(3)
            .map(|px| {
                let luma = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                luma.round().clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Encode as baseline JPEG.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let image =
            ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(self.width, self.height, self.data.as_slice())
                .ok_or_else(|| anyhow!("failed to view frame as image buffer"))?;
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
            .encode_image(&image)
            .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;
        Ok(buffer)
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 3
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))
}

// ----------------------------------------------------------------------------
// EncodedFrame / LatestFrame
// ----------------------------------------------------------------------------

/// Published, immutable JPEG snapshot.
#[derive(Debug)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
    /// Monotonic publish counter, starting at 1.
    pub sequence: u64,
}

/// Single-slot holder of the most recently published frame. No history is kept.
#[derive(Debug, Default)]
pub struct LatestFrame {
    slot: Mutex<Option<Arc<EncodedFrame>>>,
    sequence: AtomicU64,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slot with a new JPEG and return its sequence number.
    pub fn publish(&self, jpeg: Vec<u8>) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let encoded = Arc::new(EncodedFrame { jpeg, sequence });
        let mut guard = match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // A slower concurrent publisher must not roll the slot back.
        if guard.as_ref().map_or(true, |current| current.sequence < sequence) {
            *guard = Some(encoded);
        }
        sequence
    }

    pub fn latest(&self) -> Option<Arc<EncodedFrame>> {
        match self.slot.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        }
    }

    /// Latest frame if it is newer than `seen`.
    pub fn latest_after(&self, seen: u64) -> Option<Arc<EncodedFrame>> {
        self.latest().filter(|frame| frame.sequence > seen)
    }

    /// Sequence number of the last publish (0 before the first).
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}
