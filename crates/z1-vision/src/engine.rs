use image::RgbaImage;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use z1_data::TemplateGroup;
use z1_state::FloorItem;

use crate::calibration::Calibration;
use crate::layout::{self, TileDefinition, TileId};
use crate::sampler::FrameView;
use crate::templates::{RoomTemplate, TemplateBank, TemplateLibrary};

/// Minimum score for a floor-item detection to be reported
pub const FLOOR_ITEM_MIN_SCORE: f32 = 0.85;

/// Gameplay brightness reads every 4th frame pixel on both axes
const BRIGHTNESS_STEP: u32 = 4;

/// Max channel above which a status-text pixel counts as lit
const BRIGHT_TEXT_CHANNEL: u8 = 200;

/// One independent piece of per-frame matching work.
/// Units only read the frame view, so any number can run concurrently.
pub trait Scoreable: Sync {
    type Output: Send;

    fn score(&self, view: &FrameView<'_>) -> Self::Output;
}

/// Score every unit in parallel and return once all have finished
pub fn dispatch<U: Scoreable>(units: &[U], view: &FrameView<'_>) -> Vec<U::Output> {
    units.par_iter().map(|unit| unit.score(view)).collect()
}

/// Best template for one tile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileMatch {
    pub tile: TileId,
    /// Name of the winning template, `None` when the bank is empty
    pub label: Option<String>,
    pub score: f32,
    /// Canonical offset at which the best score was found
    pub offset: (i32, i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoomMatch {
    pub room_id: u16,
    pub score: f32,
}

/// Coarse region signals that need no templates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RegionSignals {
    /// Mean luma over the gameplay area
    pub gameplay_brightness: f32,
    /// Fraction of status-text pixels with a bright max channel
    pub status_text_ratio: f32,
    pub reward_gold_pixels: u32,
    pub reward_region_pixels: u32,
}

impl RegionSignals {
    pub fn reward_gold_ratio(&self) -> f32 {
        if self.reward_region_pixels == 0 {
            return 0.0;
        }
        self.reward_gold_pixels as f32 / self.reward_region_pixels as f32
    }
}

/// Everything measured on one frame. Built only after every unit finished.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameMeasurements {
    pub tiles: Vec<TileMatch>,
    pub regions: RegionSignals,
    pub rooms: Vec<RoomMatch>,
    pub floor_items: Vec<FloorItem>,
}

impl FrameMeasurements {
    pub fn tile(&self, id: TileId) -> Option<&TileMatch> {
        self.tiles.iter().find(|t| t.tile == id)
    }

    /// Highest-scoring room; first wins on ties
    pub fn best_room(&self) -> Option<RoomMatch> {
        let mut best: Option<RoomMatch> = None;
        for room in &self.rooms {
            if best.map_or(true, |b| room.score > b.score) {
                best = Some(*room);
            }
        }
        best
    }
}

/// Per-tile NCC with a (2r+1)^2 positional search around the calibrated spot
struct TileJob<'a> {
    tile: &'a TileDefinition,
    bank: Option<&'a TemplateBank>,
    radius: i32,
}

impl Scoreable for TileJob<'_> {
    type Output = TileMatch;

    fn score(&self, view: &FrameView<'_>) -> TileMatch {
        let Some(bank) = self.bank else {
            return TileMatch {
                tile: self.tile.id,
                label: None,
                score: 0.0,
                offset: (0, 0),
            };
        };

        let mut sample = Vec::with_capacity((self.tile.width * self.tile.height) as usize);
        let mut best_index = 0;
        let mut best_score = f32::NEG_INFINITY;
        let mut best_offset = (0, 0);

        for dy in -self.radius..=self.radius {
            for dx in -self.radius..=self.radius {
                view.sample_block(
                    (self.tile.canonical_x as i32 + dx) as f32,
                    (self.tile.canonical_y as i32 + dy) as f32,
                    self.tile.width,
                    self.tile.height,
                    &mut sample,
                );
                if let Some(m) = bank.best_match(&sample) {
                    if m.score > best_score {
                        best_score = m.score;
                        best_index = m.index;
                        best_offset = (dx, dy);
                    }
                }
            }
        }

        TileMatch {
            tile: self.tile.id,
            label: bank.name(best_index).map(str::to_string),
            score: best_score.max(-1.0),
            offset: best_offset,
        }
    }
}

/// One room reference against the already downsampled gameplay area
struct RoomJob<'a> {
    room: &'a RoomTemplate,
    thumbnail: &'a [f32],
}

impl Scoreable for RoomJob<'_> {
    type Output = RoomMatch;

    fn score(&self, _view: &FrameView<'_>) -> RoomMatch {
        RoomMatch {
            room_id: self.room.id,
            score: self.room.template.score(self.thumbnail),
        }
    }
}

/// One grid cell of the gameplay area against the floor-item bank
struct FloorJob<'a> {
    x: u32,
    y: u32,
    bank: &'a TemplateBank,
}

impl Scoreable for FloorJob<'_> {
    type Output = Option<FloorItem>;

    fn score(&self, view: &FrameView<'_>) -> Option<FloorItem> {
        let (w, h) = self.bank.dimensions();
        let mut sample = Vec::with_capacity((w * h) as usize);
        view.sample_block(self.x as f32, self.y as f32, w, h, &mut sample);
        let m = self.bank.best_match(&sample)?;
        if m.score < FLOOR_ITEM_MIN_SCORE {
            return None;
        }
        Some(FloorItem {
            name: self.bank.name(m.index)?.to_string(),
            x: self.x,
            y: self.y,
            score: m.score,
        })
    }
}

/// Turns one frame into raw measurements by fanning out tile, region, room
/// and floor-item work over the rayon pool, then joining the results.
pub struct MatchingEngine {
    library: Arc<TemplateLibrary>,
    tiles: Vec<TileDefinition>,
    floor_cells: Vec<(u32, u32)>,
    search_radius: i32,
}

impl MatchingEngine {
    pub fn new(library: Arc<TemplateLibrary>, search_radius: u32) -> Self {
        Self {
            library,
            tiles: layout::hud_tiles(),
            floor_cells: layout::floor_grid(),
            search_radius: search_radius as i32,
        }
    }

    pub fn tiles(&self) -> &[TileDefinition] {
        &self.tiles
    }

    /// Measure one frame. Blocks until every unit of work has completed, so the
    /// result never mixes two frames.
    pub fn measure(&self, frame: &RgbaImage, calibration: &Calibration) -> FrameMeasurements {
        let started = Instant::now();
        let luma = image::imageops::grayscale(frame);
        let view = FrameView::new(frame, &luma, calibration);

        let ((tiles, floor_items), (regions, rooms)) = rayon::join(
            || rayon::join(|| self.match_tiles(&view), || self.scan_floor(&view)),
            || rayon::join(|| measure_regions(&view), || self.match_rooms(&view)),
        );

        debug!(
            "Measured frame in {:.2}ms: {} tiles, {} rooms, {} floor item(s)",
            started.elapsed().as_secs_f64() * 1000.0,
            tiles.len(),
            rooms.len(),
            floor_items.len()
        );

        FrameMeasurements {
            tiles,
            regions,
            rooms,
            floor_items,
        }
    }

    fn match_tiles(&self, view: &FrameView<'_>) -> Vec<TileMatch> {
        let jobs: Vec<TileJob<'_>> = self
            .tiles
            .iter()
            .map(|tile| TileJob {
                tile,
                bank: self.library.bank(tile.group),
                radius: self.search_radius,
            })
            .collect();
        dispatch(&jobs, view)
    }

    fn match_rooms(&self, view: &FrameView<'_>) -> Vec<RoomMatch> {
        let rooms = self.library.rooms();
        if rooms.is_empty() {
            return Vec::new();
        }
        let thumbnail = gameplay_thumbnail(view);
        let jobs: Vec<RoomJob<'_>> = rooms
            .iter()
            .map(|room| RoomJob {
                room,
                thumbnail: &thumbnail,
            })
            .collect();
        dispatch(&jobs, view)
    }

    fn scan_floor(&self, view: &FrameView<'_>) -> Vec<FloorItem> {
        let Some(bank) = self.library.bank(TemplateGroup::FloorItem) else {
            return Vec::new();
        };
        let jobs: Vec<FloorJob<'_>> = self
            .floor_cells
            .iter()
            .map(|&(x, y)| FloorJob { x, y, bank })
            .collect();
        dispatch(&jobs, view).into_iter().flatten().collect()
    }
}

/// Gameplay area downsampled to the room thumbnail size
pub fn gameplay_thumbnail(view: &FrameView<'_>) -> Vec<f32> {
    let rect = view.frame_rect(&layout::GAMEPLAY);
    let (tw, th) = layout::ROOM_SAMPLE;
    if rect.width() == 0 || rect.height() == 0 {
        return vec![0.0; (tw * th) as usize];
    }
    let crop = image::imageops::crop_imm(view.luma_image(), rect.x0, rect.y0, rect.width(), rect.height())
        .to_image();
    let small = image::imageops::resize(&crop, tw, th, image::imageops::FilterType::Triangle);
    small.as_raw().iter().map(|&p| p as f32).collect()
}

/// Gold-coloured pixel: high red, moderate green, low blue, red above green
fn is_gold(r: u8, g: u8, b: u8) -> bool {
    r > 180 && (90..=210).contains(&g) && b < 90 && r > g
}

fn measure_regions(view: &FrameView<'_>) -> RegionSignals {
    let rgba = view.rgba();

    let gameplay = view.frame_rect(&layout::GAMEPLAY);
    let mut sum = 0.0;
    let mut count = 0u32;
    let luma = view.luma_image();
    let mut y = gameplay.y0;
    while y < gameplay.y1 {
        let mut x = gameplay.x0;
        while x < gameplay.x1 {
            sum += luma.get_pixel(x, y)[0] as f64;
            count += 1;
            x += BRIGHTNESS_STEP;
        }
        y += BRIGHTNESS_STEP;
    }
    let gameplay_brightness = if count > 0 {
        (sum / count as f64) as f32
    } else {
        0.0
    };

    let status = view.frame_rect(&layout::STATUS_TEXT);
    let mut lit = 0u64;
    for y in status.y0..status.y1 {
        for x in status.x0..status.x1 {
            let px = rgba.get_pixel(x, y);
            if px[0].max(px[1]).max(px[2]) > BRIGHT_TEXT_CHANNEL {
                lit += 1;
            }
        }
    }
    let status_text_ratio = if status.area() > 0 {
        lit as f32 / status.area() as f32
    } else {
        0.0
    };

    let reward = view.frame_rect(&layout::REWARD_REGION);
    let mut gold = 0u32;
    for y in reward.y0..reward.y1 {
        for x in reward.x0..reward.x1 {
            let px = rgba.get_pixel(x, y);
            if is_gold(px[0], px[1], px[2]) {
                gold += 1;
            }
        }
    }

    RegionSignals {
        gameplay_brightness,
        status_text_ratio,
        reward_gold_pixels: gold,
        reward_region_pixels: reward.area() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::NormalizedTemplate;
    use image::Rgba;

    fn glyph_pixels(seed: u32, w: u32, h: u32) -> Vec<f32> {
        (0..w * h)
            .map(|i| if (i.wrapping_mul(seed) / 5) % 3 == 0 { 240.0 } else { 10.0 })
            .collect()
    }

    /// Paint canonical pixels into a frame drawn at `scale` with an origin offset
    fn paint(frame: &mut RgbaImage, scale: u32, ox: u32, oy: u32, cx: u32, cy: u32, w: u32, pixels: &[f32]) {
        for (i, v) in pixels.iter().enumerate() {
            let (px, py) = (cx + i as u32 % w, cy + i as u32 / w);
            for sy in 0..scale {
                for sx in 0..scale {
                    let v = *v as u8;
                    frame.put_pixel(ox + px * scale + sx, oy + py * scale + sy, Rgba([v, v, v, 255]));
                }
            }
        }
    }

    fn calibration(scale: f32, ox: f32, oy: f32, w: u32, h: u32) -> Calibration {
        Calibration {
            crop_x: ox,
            crop_y: oy,
            scale_x: scale,
            scale_y: scale,
            grid_dx: 0.0,
            grid_dy: 0.0,
            frame_width: w,
            frame_height: h,
        }
    }

    fn glyph_library() -> TemplateLibrary {
        let mut bank = TemplateBank::new(8, 8);
        for (name, seed) in [("x", 3), ("7", 11), ("l", 17)] {
            bank.push(NormalizedTemplate::from_pixels(name, &glyph_pixels(seed, 8, 8)));
        }
        let mut library = TemplateLibrary::default();
        library.insert_bank(TemplateGroup::Glyph, bank);
        library
    }

    #[test]
    fn test_tile_recognized_through_calibration() {
        let (w, h) = (2 * 256 + 20, 2 * 240 + 10);
        let mut frame = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]));
        paint(&mut frame, 2, 20, 10, 88, 16, 8, &glyph_pixels(3, 8, 8));

        let engine = MatchingEngine::new(Arc::new(glyph_library()), 1);
        let m = engine.measure(&frame, &calibration(2.0, 20.0, 10.0, w, h));
        let marker = m.tile(TileId::HudMarker).unwrap();
        assert_eq!(marker.label.as_deref(), Some("x"));
        assert!(marker.score > 0.99, "score {}", marker.score);
        assert_eq!(marker.offset, (0, 0));
    }

    #[test]
    fn test_subpixel_search_recovers_misalignment() {
        let (w, h) = (256, 240);
        let mut frame = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]));
        // Glyph drawn one canonical pixel right and down of where the layout expects it
        paint(&mut frame, 1, 0, 0, 89, 17, 8, &glyph_pixels(11, 8, 8));

        let aligned = MatchingEngine::new(Arc::new(glyph_library()), 0)
            .measure(&frame, &Calibration::identity(w, h));
        let searched = MatchingEngine::new(Arc::new(glyph_library()), 1)
            .measure(&frame, &Calibration::identity(w, h));

        let before = aligned.tile(TileId::HudMarker).unwrap();
        let after = searched.tile(TileId::HudMarker).unwrap();
        assert!(after.score > before.score);
        assert_eq!(after.label.as_deref(), Some("7"));
        assert_eq!(after.offset, (1, 1));
        assert!(after.score > 0.99);
    }

    #[test]
    fn test_empty_bank_scores_zero() {
        let frame = RgbaImage::from_pixel(256, 240, Rgba([90, 90, 90, 255]));
        let engine = MatchingEngine::new(Arc::new(TemplateLibrary::default()), 1);
        let m = engine.measure(&frame, &Calibration::identity(256, 240));
        assert_eq!(m.tiles.len(), engine.tiles().len());
        for tile in &m.tiles {
            assert_eq!(tile.score, 0.0);
            assert!(tile.label.is_none());
        }
        assert!(m.rooms.is_empty());
        assert!(m.best_room().is_none());
    }

    #[test]
    fn test_frame_smaller_than_calibration_does_not_panic() {
        let frame = RgbaImage::from_pixel(256, 240, Rgba([120, 120, 120, 255]));
        let mut library = glyph_library();
        library.add_room(119, NormalizedTemplate::from_pixels("start", &glyph_pixels(5, 32, 22)));
        let engine = MatchingEngine::new(Arc::new(library), 1);
        let m = engine.measure(&frame, &calibration(3.0, 40.0, 30.0, 848, 720));
        assert_eq!(m.tiles.len(), engine.tiles().len());
        assert_eq!(m.rooms.len(), 1);
        assert!(m.regions.gameplay_brightness.is_finite());
        // Reward region lies entirely off the image
        assert_eq!(m.regions.reward_region_pixels, 0);
    }

    #[test]
    fn test_region_signals() {
        let (w, h) = (256, 240);
        let mut frame = RgbaImage::from_pixel(w, h, Rgba([100, 100, 100, 255]));
        for y in 128..144 {
            for x in 112..144 {
                frame.put_pixel(x, y, Rgba([230, 160, 30, 255]));
            }
        }
        for x in 176..240 {
            for y in 16..20 {
                frame.put_pixel(x, y, Rgba([250, 250, 250, 255]));
            }
        }
        let engine = MatchingEngine::new(Arc::new(TemplateLibrary::default()), 1);
        let m = engine.measure(&frame, &Calibration::identity(w, h));
        assert!((m.regions.reward_gold_ratio() - 0.5).abs() < 1e-6);
        assert!((m.regions.status_text_ratio - 0.5).abs() < 1e-6);
        assert!(m.regions.gameplay_brightness > 100.0);
    }

    #[test]
    fn test_room_match_prefers_matching_room() {
        let (w, h) = (256, 240);
        let frame = RgbaImage::from_fn(w, h, |x, y| {
            let v = if y >= 64 && (x / 32 + y / 24) % 2 == 0 { 200 } else { 40 };
            Rgba([v, v, v, 255])
        });
        let cal = Calibration::identity(w, h);
        let luma = image::imageops::grayscale(&frame);
        let view = FrameView::new(&frame, &luma, &cal);
        let thumbnail = gameplay_thumbnail(&view);
        let inverted: Vec<f32> = thumbnail.iter().map(|v| 255.0 - v).collect();

        let mut library = TemplateLibrary::default();
        library.add_room(7, NormalizedTemplate::from_pixels("other", &inverted));
        library.add_room(119, NormalizedTemplate::from_pixels("start", &thumbnail));

        let engine = MatchingEngine::new(Arc::new(library), 1);
        let m = engine.measure(&frame, &cal);
        let best = m.best_room().unwrap();
        assert_eq!(best.room_id, 119);
        assert!(best.score > 0.99);
        assert_eq!(m.rooms.len(), 2);
    }

    #[test]
    fn test_floor_item_detected_on_grid() {
        let (w, h) = (256, 240);
        let mut frame = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]));
        let item = glyph_pixels(7, 8, 16);
        paint(&mut frame, 1, 0, 0, 120, 136, 8, &item);

        let mut bank = TemplateBank::new(8, 16);
        bank.push(NormalizedTemplate::from_pixels("heart_container", &item));
        let mut library = TemplateLibrary::default();
        library.insert_bank(TemplateGroup::FloorItem, bank);

        let engine = MatchingEngine::new(Arc::new(library), 1);
        let m = engine.measure(&frame, &Calibration::identity(w, h));
        assert!(m
            .floor_items
            .iter()
            .any(|f| f.name == "heart_container" && f.x == 120 && f.y == 136));
    }
}
