use image::RgbaImage;
use tracing::debug;

use crate::calibration::Landmarks;
use crate::layout::{
    self, A_SLOT_X, B_SLOT_X, ITEM_SLOT_Y, MARKER_GLYPH_X, MARKER_GLYPH_Y, SLOT_LABEL_Y, SMALL_GLYPH, TALL_GLYPH,
};

/// Minimum brightness rise between the HUD and the gameplay area
const MIN_BOUNDARY_RISE: f64 = 15.0;

/// Column brightness above which a column belongs to the game picture
const CONTENT_BRIGHTNESS: f64 = 20.0;

/// Pixels brighter than this are glyph or item strokes. Excludes the blue slot frames.
const STROKE_BRIGHTNESS: f64 = 150.0;

/// Best-effort landmark measurement from a single gameplay frame.
///
/// Finds the HUD/gameplay boundary as the largest brightness rise, the left and
/// right edges of the picture below it, the bomb-counter "X" glyph in its
/// column band, and the columns of the B and A item slots.
///
/// Returns `None` on frames without a visible HUD over a lit gameplay area
/// (transitions, dark rooms, menus).
pub fn detect_landmarks(frame: &RgbaImage) -> Option<Landmarks> {
    let (w, h) = (frame.width(), frame.height());
    if w < layout::CANONICAL_WIDTH / 2 || h < layout::CANONICAL_HEIGHT / 2 {
        return None;
    }

    let boundary = find_hud_boundary(frame)?;
    let (left, right) = find_content_columns(frame, boundary)?;
    let rough_scale_x = (right - left) as f64 / layout::CANONICAL_WIDTH as f64;
    if rough_scale_x <= 0.0 {
        return None;
    }

    // Bomb marker: lowest stroke run in the marker column band above the boundary
    let band_x0 = left + (MARKER_GLYPH_X as f64 * rough_scale_x) as u32;
    let band_x1 = left + ((MARKER_GLYPH_X + SMALL_GLYPH.0) as f64 * rough_scale_x) as u32;
    let rows = stroke_rows(frame, band_x0, band_x1, 0, boundary);
    let min_run = (rough_scale_x as usize).max(1);
    let (glyph_top, glyph_bottom) = *find_bright_segments(&rows, 0.0, min_run).last()?;
    debug!("Marker glyph rows {}..{}", glyph_top, glyph_bottom);

    // Slot columns come from the "B"/"A" labels, which are drawn from the first
    // frame of a run; the item sprites below them are the fallback.
    let canonical_gap_y = (layout::GAMEPLAY.y - MARKER_GLYPH_Y) as f64;
    let rough_scale_y = (boundary as f64 - glyph_top as f64) / canonical_gap_y;
    let slot_x0 = left + ((B_SLOT_X - SMALL_GLYPH.0) as f64 * rough_scale_x) as u32;
    let slot_x1 = left + ((A_SLOT_X + 2 * SMALL_GLYPH.0) as f64 * rough_scale_x) as u32;
    let row_band = |canonical_y: u32, canonical_height: u32| {
        let above = |cy: u32| ((MARKER_GLYPH_Y - cy) as f64 * rough_scale_y) as u32;
        (
            (glyph_top as u32).saturating_sub(above(canonical_y)),
            (glyph_top as u32).saturating_sub(above(canonical_y + canonical_height)),
        )
    };
    let bands = [
        ("labels", row_band(SLOT_LABEL_Y, SMALL_GLYPH.1)),
        ("item sprites", row_band(ITEM_SLOT_Y, TALL_GLYPH.1)),
    ];
    let Some((source, slots)) = bands.iter().find_map(|&(source, (y0, y1))| {
        let columns = stroke_columns(frame, slot_x0, slot_x1, y0, y1);
        let slots = find_bright_segments(&columns, 0.0, min_run);
        (slots.len() >= 2).then_some((source, slots))
    }) else {
        debug!("No item slot columns found");
        return None;
    };
    debug!("Item slots from {}: {:?}", source, &slots[..2]);

    let landmarks = Landmarks {
        glyph_top_y: glyph_top as f32,
        glyph_height: (glyph_bottom - glyph_top) as f32,
        hud_boundary_y: boundary as f32,
        slot_left_x: (slot_x0 as usize + slots[0].0) as f32,
        slot_right_x: (slot_x0 as usize + slots[1].0) as f32,
        crop_x: left as f32,
        frame_width: w,
        frame_height: h,
    };
    debug!("Detected landmarks: {:?}", landmarks);
    Some(landmarks)
}

/// Row where mean brightness rises the most, searched in the upper part of the frame
fn find_hud_boundary(frame: &RgbaImage) -> Option<u32> {
    let h = frame.height();
    let window = (h / 120).max(2);
    let search_top = (h / 10).max(window);
    let search_bottom = (h * 6 / 10).min(h.saturating_sub(window));

    let mut best: Option<(u32, f64)> = None;
    for y in search_top..search_bottom {
        let above = avg_brightness_rows(frame, y - window, window);
        let below = avg_brightness_rows(frame, y, window);
        let rise = below - above;
        if rise > MIN_BOUNDARY_RISE && best.map_or(true, |(_, r)| rise > r) {
            best = Some((y, rise));
        }
    }

    let (y, rise) = best?;
    debug!("HUD boundary at y={} (rise {:.1})", y, rise);
    Some(y)
}

/// First and one-past-last column of the picture below the boundary
fn find_content_columns(frame: &RgbaImage, boundary: u32) -> Option<(u32, u32)> {
    let (w, h) = (frame.width(), frame.height());
    let step = ((h - boundary) / 40).max(1);
    let lit: Vec<bool> = (0..w)
        .map(|x| {
            let mut sum = 0.0;
            let mut n = 0u32;
            let mut y = boundary;
            while y < h {
                sum += brightness(frame, x, y);
                n += 1;
                y += step;
            }
            n > 0 && sum / n as f64 > CONTENT_BRIGHTNESS
        })
        .collect();
    let left = lit.iter().position(|&b| b)?;
    let right = lit.iter().rposition(|&b| b)? + 1;
    Some((left as u32, right as u32))
}

/// Per-row count of stroke pixels inside `[x0, x1) x [y0, y1)`, indexed from row 0
fn stroke_rows(frame: &RgbaImage, x0: u32, x1: u32, y0: u32, y1: u32) -> Vec<f64> {
    let (x1, y1) = (x1.min(frame.width()), y1.min(frame.height()));
    let mut rows = vec![0.0; y1 as usize];
    for y in y0..y1 {
        rows[y as usize] = (x0..x1)
            .filter(|&x| brightness(frame, x, y) > STROKE_BRIGHTNESS)
            .count() as f64;
    }
    rows
}

/// Per-column count of stroke pixels inside `[x0, x1) x [y0, y1)`, indexed from `x0`
fn stroke_columns(frame: &RgbaImage, x0: u32, x1: u32, y0: u32, y1: u32) -> Vec<f64> {
    let (x1, y1) = (x1.min(frame.width()), y1.min(frame.height()));
    (x0..x1)
        .map(|x| {
            (y0..y1)
                .filter(|&y| brightness(frame, x, y) > STROKE_BRIGHTNESS)
                .count() as f64
        })
        .collect()
}

fn brightness(frame: &RgbaImage, x: u32, y: u32) -> f64 {
    let px = frame.get_pixel(x, y);
    (px[0] as f64 + px[1] as f64 + px[2] as f64) / 3.0
}

/// Average brightness of sampled pixels in a row (middle 60% of width).
fn row_brightness(frame: &RgbaImage, y: u32) -> f64 {
    let w = frame.width();
    let step = (w / 50).max(1);
    let x_end = w * 4 / 5;

    let mut sum = 0.0;
    let mut count = 0u32;
    let mut x = w / 5;
    while x < x_end {
        sum += brightness(frame, x, y);
        count += 1;
        x += step;
    }
    if count > 0 {
        sum / count as f64
    } else {
        0.0
    }
}

/// Average brightness over `count` consecutive rows.
fn avg_brightness_rows(frame: &RgbaImage, start_y: u32, count: u32) -> f64 {
    let h = frame.height();
    let mut sum = 0.0;
    let mut n = 0u32;
    for y in start_y..start_y + count {
        if y < h {
            sum += row_brightness(frame, y);
            n += 1;
        }
    }
    if n > 0 {
        sum / n as f64
    } else {
        0.0
    }
}

/// Half-open runs where the profile stays above `threshold` for at least `min_width` samples
fn find_bright_segments(profile: &[f64], threshold: f64, min_width: usize) -> Vec<(usize, usize)> {
    let mut segments = Vec::new();
    let mut in_bright = false;
    let mut start = 0;

    for (i, &val) in profile.iter().enumerate() {
        if !in_bright && val > threshold {
            start = i;
            in_bright = true;
        } else if in_bright && val <= threshold {
            if i - start >= min_width {
                segments.push((start, i));
            }
            in_bright = false;
        }
    }
    if in_bright && profile.len() - start >= min_width {
        segments.push((start, profile.len()));
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{calibrate, CanonicalLandmarks};
    use image::Rgba;

    const SCALE: u32 = 3;
    const OX: u32 = 40;
    const OY: u32 = 30;

    fn fill(frame: &mut RgbaImage, cx: u32, cy: u32, cw: u32, ch: u32, color: Rgba<u8>) {
        for y in OY + cy * SCALE..OY + (cy + ch) * SCALE {
            for x in OX + cx * SCALE..OX + (cx + cw) * SCALE {
                frame.put_pixel(x, y, color);
            }
        }
    }

    /// Canonical picture drawn at 3x inside black borders
    fn make_frame() -> RgbaImage {
        let mut frame = RgbaImage::from_pixel(
            256 * SCALE + 2 * OX,
            240 * SCALE + 2 * OY,
            Rgba([0, 0, 0, 255]),
        );
        let white = Rgba([252, 252, 252, 255]);
        // Overworld sand below the HUD
        fill(&mut frame, 0, 64, 256, 176, Rgba([252, 216, 168, 255]));
        // Blue slot frames, too dark to count as strokes
        fill(&mut frame, 120, 16, 2, 32, Rgba([32, 56, 236, 255]));
        fill(&mut frame, 144, 16, 2, 32, Rgba([32, 56, 236, 255]));
        // Slot labels
        fill(&mut frame, 128, 16, 8, 8, white);
        fill(&mut frame, 152, 16, 8, 8, white);
        // Rupee and bomb markers, rupee digits
        fill(&mut frame, 88, 16, 8, 8, white);
        fill(&mut frame, 88, 40, 8, 8, white);
        fill(&mut frame, 96, 16, 16, 8, white);
        // B item and sword
        fill(&mut frame, 128, 24, 8, 16, Rgba([252, 188, 60, 255]));
        fill(&mut frame, 152, 24, 8, 16, white);
        frame
    }

    #[test]
    fn test_detects_scaled_hud() {
        let frame = make_frame();
        let m = detect_landmarks(&frame).unwrap();
        assert_eq!(m.hud_boundary_y, (OY + 64 * SCALE) as f32);
        assert_eq!(m.crop_x, OX as f32);
        assert_eq!(m.glyph_top_y, (OY + 40 * SCALE) as f32);
        assert_eq!(m.glyph_height, (8 * SCALE) as f32);
        assert_eq!(m.slot_left_x, (OX + 128 * SCALE) as f32);
        assert_eq!(m.slot_right_x, (OX + 152 * SCALE) as f32);
    }

    #[test]
    fn test_detected_landmarks_calibrate() {
        let frame = make_frame();
        let m = detect_landmarks(&frame).unwrap();
        let cal = calibrate(&m, &CanonicalLandmarks::default()).unwrap();
        assert!((cal.scale_x - 3.0).abs() < 1e-4);
        assert!((cal.scale_y - 3.0).abs() < 1e-4);
        assert!((cal.crop_y - OY as f32).abs() < 1e-3);
        assert!((cal.crop_x - OX as f32).abs() < 1e-3);
    }

    #[test]
    fn test_black_frame_has_no_landmarks() {
        let frame = RgbaImage::from_pixel(768, 720, Rgba([0, 0, 0, 255]));
        assert!(detect_landmarks(&frame).is_none());
    }

    fn expect_slots(frame: &RgbaImage) {
        let m = detect_landmarks(frame).unwrap();
        assert_eq!(m.slot_left_x, (OX + 128 * SCALE) as f32);
        assert_eq!(m.slot_right_x, (OX + 152 * SCALE) as f32);
    }

    #[test]
    fn test_empty_slots_at_start_of_run() {
        let mut frame = make_frame();
        let black = Rgba([0, 0, 0, 255]);
        fill(&mut frame, 128, 24, 8, 16, black);
        fill(&mut frame, 152, 24, 8, 16, black);
        expect_slots(&frame);
    }

    #[test]
    fn test_item_sprites_when_labels_unreadable() {
        let mut frame = make_frame();
        let black = Rgba([0, 0, 0, 255]);
        fill(&mut frame, 128, 16, 8, 8, black);
        fill(&mut frame, 152, 16, 8, 8, black);
        expect_slots(&frame);
    }

    #[test]
    fn test_no_slot_columns() {
        let mut frame = make_frame();
        fill(&mut frame, 120, 16, 48, 24, Rgba([0, 0, 0, 255]));
        assert!(detect_landmarks(&frame).is_none());
    }

    #[test]
    fn test_bright_segments() {
        let profile = [0.0, 3.0, 4.0, 0.0, 1.0, 0.0, 2.0, 2.0];
        assert_eq!(find_bright_segments(&profile, 0.0, 2), vec![(1, 3), (6, 8)]);
    }
}
