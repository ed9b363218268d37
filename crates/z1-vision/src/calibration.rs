use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::{self, CanonicalRect};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("Landmark `{name}` is not a finite number: {value}")]
    NonFinite { name: &'static str, value: f32 },

    #[error("Glyph height must be positive, got {0}")]
    GlyphHeight(f32),

    #[error("HUD boundary (y={boundary}) must lie below the glyph top (y={glyph_top})")]
    BoundaryAboveGlyph { glyph_top: f32, boundary: f32 },

    #[error("Item slots must be distinct and ordered left to right (left={left}, right={right})")]
    SlotOrder { left: f32, right: f32 },

    #[error("Frame size must be non-zero, got {width}x{height}")]
    EmptyFrame { width: u32, height: u32 },

    #[error("Canonical landmark spans must be positive")]
    CanonicalSpan,
}

/// Landmarks measured in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Landmarks {
    /// Top edge of the counter-marker glyph
    pub glyph_top_y: f32,
    /// Vertical span of the counter-marker glyph
    pub glyph_height: f32,
    /// First row of the gameplay area below the HUD
    pub hud_boundary_y: f32,
    /// Left edge of the B item slot
    pub slot_left_x: f32,
    /// Left edge of the A item slot
    pub slot_right_x: f32,
    /// Left edge of the game picture, taken as-is
    pub crop_x: f32,
    pub frame_width: u32,
    pub frame_height: u32,
}

/// Where the same landmarks sit in canonical coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanonicalLandmarks {
    pub glyph_y: f32,
    pub glyph_height: f32,
    pub hud_boundary_y: f32,
    pub slot_left_x: f32,
    pub slot_right_x: f32,
}

impl Default for CanonicalLandmarks {
    fn default() -> Self {
        Self {
            glyph_y: layout::MARKER_GLYPH_Y as f32,
            glyph_height: layout::SMALL_GLYPH.1 as f32,
            hud_boundary_y: layout::GAMEPLAY.y as f32,
            slot_left_x: layout::B_SLOT_X as f32,
            slot_right_x: layout::A_SLOT_X as f32,
        }
    }
}

/// Affine mapping from canonical coordinates to frame pixels:
/// `px = crop_x + (cx + grid_dx) * scale_x`, `py = crop_y + (cy + grid_dy) * scale_y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calibration {
    pub crop_x: f32,
    pub crop_y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub grid_dx: f32,
    pub grid_dy: f32,
    pub frame_width: u32,
    pub frame_height: u32,
}

/// Rectangle in frame pixels, clamped to the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Shrink to fit inside a `width` x `height` image
    pub fn clamp_to(self, width: u32, height: u32) -> Self {
        Self {
            x0: self.x0.min(width),
            y0: self.y0.min(height),
            x1: self.x1.min(width),
            y1: self.y1.min(height),
        }
    }
}

impl Calibration {
    /// Identity-scale mapping for a frame that is exactly the canonical picture
    pub fn identity(frame_width: u32, frame_height: u32) -> Self {
        Self {
            crop_x: 0.0,
            crop_y: 0.0,
            scale_x: frame_width as f32 / layout::CANONICAL_WIDTH as f32,
            scale_y: frame_height as f32 / layout::CANONICAL_HEIGHT as f32,
            grid_dx: 0.0,
            grid_dy: 0.0,
            frame_width,
            frame_height,
        }
    }

    /// Whether this mapping was derived for frames of this size
    pub fn matches_frame(&self, width: u32, height: u32) -> bool {
        self.frame_width == width && self.frame_height == height
    }

    pub fn to_frame(&self, cx: f32, cy: f32) -> (f32, f32) {
        (
            self.crop_x + (cx + self.grid_dx) * self.scale_x,
            self.crop_y + (cy + self.grid_dy) * self.scale_y,
        )
    }

    /// Map a canonical rectangle onto frame pixels, clamped to the frame
    pub fn frame_rect(&self, rect: &CanonicalRect) -> PixelRect {
        let (fx0, fy0) = self.to_frame(rect.x as f32, rect.y as f32);
        let (fx1, fy1) = self.to_frame((rect.x + rect.width) as f32, (rect.y + rect.height) as f32);
        let clamp_x = |v: f32| v.round().clamp(0.0, self.frame_width as f32) as u32;
        let clamp_y = |v: f32| v.round().clamp(0.0, self.frame_height as f32) as u32;
        PixelRect {
            x0: clamp_x(fx0),
            y0: clamp_y(fy0),
            x1: clamp_x(fx1),
            y1: clamp_y(fy1),
        }
    }
}

/// Derive the canonical-to-frame mapping from measured landmarks.
///
/// `scale_y` is the mean of the glyph-height ratio and the glyph-to-boundary
/// distance ratio. `crop_y` is back-solved so the glyph's canonical top lands
/// on its measured top. The fine grid offset is left at zero.
pub fn calibrate(
    measured: &Landmarks,
    canonical: &CanonicalLandmarks,
) -> Result<Calibration, CalibrationError> {
    for (name, value) in [
        ("glyph_top_y", measured.glyph_top_y),
        ("glyph_height", measured.glyph_height),
        ("hud_boundary_y", measured.hud_boundary_y),
        ("slot_left_x", measured.slot_left_x),
        ("slot_right_x", measured.slot_right_x),
        ("crop_x", measured.crop_x),
    ] {
        if !value.is_finite() {
            return Err(CalibrationError::NonFinite { name, value });
        }
    }
    if measured.frame_width == 0 || measured.frame_height == 0 {
        return Err(CalibrationError::EmptyFrame {
            width: measured.frame_width,
            height: measured.frame_height,
        });
    }
    if measured.glyph_height <= 0.0 {
        return Err(CalibrationError::GlyphHeight(measured.glyph_height));
    }
    if measured.hud_boundary_y <= measured.glyph_top_y {
        return Err(CalibrationError::BoundaryAboveGlyph {
            glyph_top: measured.glyph_top_y,
            boundary: measured.hud_boundary_y,
        });
    }
    if measured.slot_right_x <= measured.slot_left_x {
        return Err(CalibrationError::SlotOrder {
            left: measured.slot_left_x,
            right: measured.slot_right_x,
        });
    }

    let canonical_gap_y = canonical.hud_boundary_y - canonical.glyph_y;
    let canonical_gap_x = canonical.slot_right_x - canonical.slot_left_x;
    if canonical.glyph_height <= 0.0 || canonical_gap_y <= 0.0 || canonical_gap_x <= 0.0 {
        return Err(CalibrationError::CanonicalSpan);
    }

    let scale_from_glyph = measured.glyph_height / canonical.glyph_height;
    let scale_from_boundary = (measured.hud_boundary_y - measured.glyph_top_y) / canonical_gap_y;
    let scale_y = (scale_from_glyph + scale_from_boundary) / 2.0;
    let scale_x = (measured.slot_right_x - measured.slot_left_x) / canonical_gap_x;

    Ok(Calibration {
        crop_x: measured.crop_x,
        crop_y: measured.glyph_top_y - canonical.glyph_y * scale_y,
        scale_x,
        scale_y,
        grid_dx: 0.0,
        grid_dy: 0.0,
        frame_width: measured.frame_width,
        frame_height: measured.frame_height,
    })
}
