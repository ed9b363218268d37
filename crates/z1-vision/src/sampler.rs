use image::{GrayImage, RgbaImage};

use crate::calibration::{Calibration, PixelRect};
use crate::layout::CanonicalRect;

/// Read-only view of one frame through one calibration.
/// Shared by every matching worker for the duration of a tick.
pub struct FrameView<'a> {
    rgba: &'a RgbaImage,
    luma: &'a GrayImage,
    calibration: &'a Calibration,
}

impl<'a> FrameView<'a> {
    pub fn new(rgba: &'a RgbaImage, luma: &'a GrayImage, calibration: &'a Calibration) -> Self {
        debug_assert_eq!(rgba.dimensions(), luma.dimensions());
        Self {
            rgba,
            luma,
            calibration,
        }
    }

    pub fn rgba(&self) -> &RgbaImage {
        self.rgba
    }

    pub fn luma_image(&self) -> &GrayImage {
        self.luma
    }

    /// Luma at the frame pixel under the centre of canonical pixel (cx, cy).
    /// Points outside the frame read as black.
    pub fn luma_at(&self, cx: f32, cy: f32) -> f32 {
        let (fx, fy) = self.calibration.to_frame(cx + 0.5, cy + 0.5);
        if fx < 0.0 || fy < 0.0 {
            return 0.0;
        }
        let (x, y) = (fx as u32, fy as u32);
        if x >= self.luma.width() || y >= self.luma.height() {
            return 0.0;
        }
        self.luma.get_pixel(x, y)[0] as f32
    }

    /// Sample a `width` x `height` block of canonical pixels starting at (cx, cy),
    /// row-major, into `out`.
    pub fn sample_block(&self, cx: f32, cy: f32, width: u32, height: u32, out: &mut Vec<f32>) {
        out.clear();
        out.reserve((width * height) as usize);
        for j in 0..height {
            for i in 0..width {
                out.push(self.luma_at(cx + i as f32, cy + j as f32));
            }
        }
    }

    /// Frame pixels covered by a canonical rectangle, clamped to the image
    /// actually being sampled
    pub fn frame_rect(&self, rect: &CanonicalRect) -> PixelRect {
        self.calibration
            .frame_rect(rect)
            .clamp_to(self.luma.width(), self.luma.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_block_through_scale() {
        // 3x scale: each canonical pixel covers a 3x3 block of frame pixels
        let luma = GrayImage::from_fn(768, 720, |x, y| image::Luma([((x / 3 + y / 3) % 200) as u8]));
        let rgba = RgbaImage::new(768, 720);
        let cal = Calibration::identity(768, 720);
        let view = FrameView::new(&rgba, &luma, &cal);

        let mut out = Vec::new();
        view.sample_block(10.0, 20.0, 4, 2, &mut out);
        assert_eq!(out, vec![30.0, 31.0, 32.0, 33.0, 31.0, 32.0, 33.0, 34.0]);
    }

    #[test]
    fn test_outside_frame_reads_black() {
        let luma = GrayImage::from_pixel(256, 240, image::Luma([200]));
        let rgba = RgbaImage::new(256, 240);
        let cal = Calibration::identity(256, 240);
        let view = FrameView::new(&rgba, &luma, &cal);
        assert_eq!(view.luma_at(-3.0, 5.0), 0.0);
        assert_eq!(view.luma_at(300.0, 5.0), 0.0);
        assert_eq!(view.luma_at(3.0, 5.0), 200.0);
    }
}
