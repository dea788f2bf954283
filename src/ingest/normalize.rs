//! Camera buffer to RGB24 conversion (BT.601 full range).

use anyhow::{anyhow, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    /// Packed 4:2:2, `Y0 U Y1 V` per pixel pair.
    Yuyv,
    /// Planar luma followed by interleaved half-resolution `U V`.
    Nv12,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"NV12" => Some(PixelFormat::Nv12),
            _ => None,
        }
    }

    /// Bytes one `width` x `height` buffer occupies in this format.
    pub(crate) fn buffer_len(self, width: u32, height: u32) -> Result<usize> {
        let pixels = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        let len = match self {
            PixelFormat::Rgb24 => pixels.checked_mul(3),
            PixelFormat::Yuyv => pixels.checked_mul(2),
            PixelFormat::Nv12 => pixels.checked_add(pixels / 2),
        };
        len.ok_or_else(|| anyhow!("frame dimensions overflow"))
    }

    /// Convert one captured buffer. Drivers may pad buffers, so trailing
    /// bytes beyond the expected length are ignored.
    pub(crate) fn to_rgb(self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
        let expected = self.buffer_len(width, height)?;
        if pixels.len() < expected {
            return Err(anyhow!(
                "{:?} buffer too short: expected {} bytes, got {}",
                self,
                expected,
                pixels.len()
            ));
        }
        let pixels = &pixels[..expected];
        match self {
            PixelFormat::Rgb24 => Ok(pixels.to_vec()),
            PixelFormat::Yuyv => {
                if width % 2 != 0 {
                    return Err(anyhow!("YUYV needs an even width, got {}", width));
                }
                Ok(yuyv_to_rgb(pixels))
            }
            PixelFormat::Nv12 => Ok(nv12_to_rgb(pixels, width as usize, height as usize)),
        }
    }
}

fn yuyv_to_rgb(pixels: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixels.len() / 2 * 3);
    for quad in pixels.chunks_exact(4) {
        let (u, v) = (quad[1], quad[3]);
        rgb.extend_from_slice(&ycbcr(quad[0], u, v));
        rgb.extend_from_slice(&ycbcr(quad[2], u, v));
    }
    rgb
}

fn nv12_to_rgb(pixels: &[u8], width: usize, height: usize) -> Vec<u8> {
    let (luma, chroma) = pixels.split_at(width * height);
    let mut rgb = Vec::with_capacity(width * height * 3);
    for (row, luma_row) in luma.chunks_exact(width).enumerate() {
        let chroma_row = &chroma[(row / 2) * width..];
        for (col, &y) in luma_row.iter().enumerate() {
            let pair = (col / 2) * 2;
            rgb.extend_from_slice(&ycbcr(y, chroma_row[pair], chroma_row[pair + 1]));
        }
    }
    rgb
}

fn ycbcr(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    [
        saturate(y + 1.402 * v),
        saturate(y - 0.344_136 * u - 0.714_136 * v),
        saturate(y + 1.772 * u),
    ]
}

fn saturate(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_chroma_yields_gray() -> Result<()> {
        let yuyv = [64u8, 128, 200, 128];
        assert_eq!(
            PixelFormat::Yuyv.to_rgb(&yuyv, 2, 1)?,
            vec![64, 64, 64, 200, 200, 200]
        );

        let nv12 = [90u8, 90, 90, 90, 128, 128];
        assert_eq!(PixelFormat::Nv12.to_rgb(&nv12, 2, 2)?, vec![90u8; 12]);
        Ok(())
    }

    #[test]
    fn strong_red_chroma_saturates() -> Result<()> {
        let yuyv = [200u8, 128, 200, 255];
        let rgb = PixelFormat::Yuyv.to_rgb(&yuyv, 2, 1)?;
        assert_eq!(rgb[0], 255);
        assert!(rgb[1] < 200);
        Ok(())
    }

    #[test]
    fn short_buffers_are_rejected_and_padding_ignored() {
        assert!(PixelFormat::Rgb24.to_rgb(&[1u8; 8], 1, 3).is_err());
        assert!(PixelFormat::Rgb24.to_rgb(&[1u8; 12], 1, 3).is_ok());
        assert!(PixelFormat::Yuyv.to_rgb(&[0u8; 6], 3, 1).is_err());
    }

    #[test]
    fn fourcc_lookup() {
        assert_eq!(PixelFormat::from_fourcc(b"YUYV"), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), None);
    }
}
