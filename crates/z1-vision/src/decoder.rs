use tracing::debug;
use z1_state::{BItem, RawGameState, ScreenType};

use crate::engine::{FrameMeasurements, TileMatch};
use crate::layout::{TileId, HEART_SLOTS};

/// Minimum NCC score for a tile reading to be trusted
pub const MIN_TILE_SCORE: f32 = 0.6;

/// Minimum NCC score for a room guess
pub const MIN_ROOM_SCORE: f32 = 0.5;

/// Gameplay brightness below which the frame is treated as a black transition
const DARK_SCREEN_BRIGHTNESS: f32 = 12.0;

/// Caves keep the overworld HUD but have a mostly black floor
const CAVE_BRIGHTNESS: f32 = 30.0;

const ALARM_TEXT_RATIO: f32 = 0.2;
const REWARD_GOLD_RATIO: f32 = 0.04;

/// Label of a tile, if its score clears the trust floor
fn label(m: &FrameMeasurements, id: TileId) -> Option<&str> {
    m.tile(id)
        .filter(|t| t.score >= MIN_TILE_SCORE)
        .and_then(|t| t.label.as_deref())
}

/// Read a counter from consecutive glyph tiles. Leading blanks are skipped;
/// any unreadable tile, or a blank after the first digit, makes the whole
/// number unreadable.
pub fn read_number(tiles: &[Option<&TileMatch>]) -> Option<u32> {
    let mut value: Option<u32> = None;
    for tile in tiles {
        let tile = (*tile).filter(|t| t.score >= MIN_TILE_SCORE)?;
        let text = tile.label.as_deref()?;
        match (text, value) {
            ("blank", None) => continue,
            ("blank", Some(_)) => return None,
            _ => {
                let digit = text.parse::<u32>().ok().filter(|d| *d < 10)?;
                value = Some(value.unwrap_or(0) * 10 + digit);
            }
        }
    }
    value
}

fn sword_level(text: &str) -> Option<u8> {
    match text {
        "none" => Some(0),
        "wood" => Some(1),
        "white" => Some(2),
        "magical" => Some(3),
        _ => None,
    }
}

/// Count heart containers and filled hearts. `None` when no container is readable.
fn read_hearts(m: &FrameMeasurements) -> (Option<u8>, Option<u8>) {
    let mut containers = 0u8;
    let mut filled = 0u8;
    for i in 0..HEART_SLOTS {
        match label(m, TileId::Heart(i)) {
            Some("full") | Some("half") => {
                containers += 1;
                filled += 1;
            }
            Some("empty") => containers += 1,
            _ => {}
        }
    }
    if containers == 0 {
        return (None, None);
    }
    (Some(filled), Some(containers))
}

fn classify_screen(m: &FrameMeasurements, hud_present: bool) -> ScreenType {
    let brightness = m.regions.gameplay_brightness;
    if !hud_present {
        return if brightness < DARK_SCREEN_BRIGHTNESS {
            ScreenType::Transition
        } else {
            ScreenType::Unknown
        };
    }
    if label(m, TileId::LevelLabel) == Some("l") {
        ScreenType::Dungeon
    } else if brightness < CAVE_BRIGHTNESS {
        ScreenType::Cave
    } else {
        ScreenType::Overworld
    }
}

/// Turn one frame's measurements into a raw state.
/// HUD fields are left unobserved when the HUD marker is not on screen.
pub fn decode(m: &FrameMeasurements) -> RawGameState {
    let hud_present = label(m, TileId::HudMarker) == Some("x");
    let screen_type = classify_screen(m, hud_present);

    let mut raw = RawGameState {
        screen_type,
        floor_items: m.floor_items.clone(),
        ..Default::default()
    };

    if !hud_present {
        debug!("No HUD on screen ({:?})", screen_type);
        return raw;
    }

    raw.dungeon_level = if screen_type == ScreenType::Dungeon {
        label(m, TileId::LevelDigit)
            .and_then(|d| d.parse::<u8>().ok())
            .filter(|d| (1..=9).contains(d))
    } else {
        Some(0)
    };

    raw.rupees = read_number(&[
        m.tile(TileId::Rupee(0)),
        m.tile(TileId::Rupee(1)),
        m.tile(TileId::Rupee(2)),
    ])
    .and_then(|v| u16::try_from(v).ok());

    // The key counter shows "A" once the master key is held
    let key_tiles = [m.tile(TileId::Key(0)), m.tile(TileId::Key(1))];
    if label(m, TileId::Key(0)) == Some("a") {
        raw.master_key = Some(true);
    } else {
        raw.keys = read_number(&key_tiles).and_then(|v| u8::try_from(v).ok());
        if raw.keys.is_some() {
            raw.master_key = Some(false);
        }
    }

    raw.bombs = read_number(&[m.tile(TileId::Bomb(0)), m.tile(TileId::Bomb(1))])
        .and_then(|v| u8::try_from(v).ok());

    let (current, max) = read_hearts(m);
    raw.hearts_current = current;
    raw.hearts_max = max;

    raw.sword_level = label(m, TileId::Sword).and_then(sword_level);

    raw.b_item = match label(m, TileId::BItem) {
        Some("empty") => Some(None),
        Some(text) => BItem::from_label(text).map(Some),
        None => None,
    };

    raw.alarm = Some(m.regions.status_text_ratio >= ALARM_TEXT_RATIO);
    raw.reward_icon = Some(m.regions.reward_gold_ratio() >= REWARD_GOLD_RATIO);

    if screen_type.is_gameplay() {
        raw.map_position = m
            .best_room()
            .filter(|r| r.score >= MIN_ROOM_SCORE)
            .map(|r| r.room_id);
    }

    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RegionSignals, RoomMatch};

    fn tile(id: TileId, text: &str, score: f32) -> TileMatch {
        TileMatch {
            tile: id,
            label: Some(text.to_string()),
            score,
            offset: (0, 0),
        }
    }

    fn hud(brightness: f32) -> FrameMeasurements {
        let mut tiles = vec![
            tile(TileId::HudMarker, "x", 0.95),
            tile(TileId::LevelLabel, "blank", 0.9),
            tile(TileId::LevelDigit, "blank", 0.9),
            tile(TileId::Rupee(0), "blank", 0.9),
            tile(TileId::Rupee(1), "4", 0.9),
            tile(TileId::Rupee(2), "2", 0.9),
            tile(TileId::Key(0), "blank", 0.9),
            tile(TileId::Key(1), "1", 0.9),
            tile(TileId::Bomb(0), "1", 0.9),
            tile(TileId::Bomb(1), "0", 0.9),
            tile(TileId::Sword, "white", 0.8),
            tile(TileId::BItem, "candle", 0.8),
        ];
        for i in 0..HEART_SLOTS {
            let text = match i {
                0..=3 => "full",
                4 => "half",
                5..=7 => "empty",
                _ => "blank",
            };
            tiles.push(tile(TileId::Heart(i), text, 0.9));
        }
        FrameMeasurements {
            tiles,
            regions: RegionSignals {
                gameplay_brightness: brightness,
                status_text_ratio: 0.0,
                reward_gold_pixels: 0,
                reward_region_pixels: 1024,
            },
            rooms: vec![
                RoomMatch { room_id: 7, score: 0.3 },
                RoomMatch { room_id: 119, score: 0.8 },
            ],
            floor_items: vec![],
        }
    }

    fn set(m: &mut FrameMeasurements, id: TileId, text: &str, score: f32) {
        if let Some(t) = m.tiles.iter_mut().find(|t| t.tile == id) {
            *t = tile(id, text, score);
        }
    }

    #[test]
    fn test_read_number() {
        let a = tile(TileId::Rupee(0), "blank", 0.9);
        let b = tile(TileId::Rupee(1), "0", 0.9);
        let c = tile(TileId::Rupee(2), "7", 0.9);
        assert_eq!(read_number(&[Some(&a), Some(&b), Some(&c)]), Some(7));

        let low = tile(TileId::Rupee(2), "7", 0.2);
        assert_eq!(read_number(&[Some(&a), Some(&b), Some(&low)]), None);
        assert_eq!(read_number(&[Some(&b), Some(&a)]), None);
        assert_eq!(read_number(&[Some(&a), None]), None);
        assert_eq!(read_number(&[Some(&a), Some(&a)]), None);
    }

    #[test]
    fn test_decode_overworld_hud() {
        let raw = decode(&hud(120.0));
        assert_eq!(raw.screen_type, ScreenType::Overworld);
        assert_eq!(raw.dungeon_level, Some(0));
        assert_eq!(raw.rupees, Some(42));
        assert_eq!(raw.keys, Some(1));
        assert_eq!(raw.master_key, Some(false));
        assert_eq!(raw.bombs, Some(10));
        assert_eq!(raw.hearts_current, Some(5));
        assert_eq!(raw.hearts_max, Some(8));
        assert_eq!(raw.sword_level, Some(2));
        assert_eq!(raw.b_item, Some(Some(BItem::Candle)));
        assert_eq!(raw.map_position, Some(119));
        assert_eq!(raw.alarm, Some(false));
        assert_eq!(raw.reward_icon, Some(false));
    }

    #[test]
    fn test_decode_dungeon_and_master_key() {
        let mut m = hud(60.0);
        set(&mut m, TileId::LevelLabel, "l", 0.9);
        set(&mut m, TileId::LevelDigit, "4", 0.9);
        set(&mut m, TileId::Key(0), "a", 0.9);
        set(&mut m, TileId::BItem, "empty", 0.9);
        let raw = decode(&m);
        assert_eq!(raw.screen_type, ScreenType::Dungeon);
        assert_eq!(raw.dungeon_level, Some(4));
        assert_eq!(raw.master_key, Some(true));
        assert_eq!(raw.keys, None);
        assert_eq!(raw.b_item, Some(None));
    }

    #[test]
    fn test_decode_cave() {
        let raw = decode(&hud(18.0));
        assert_eq!(raw.screen_type, ScreenType::Cave);
    }

    #[test]
    fn test_no_hud_leaves_fields_unobserved() {
        let mut m = hud(3.0);
        set(&mut m, TileId::HudMarker, "x", 0.1);
        let raw = decode(&m);
        assert_eq!(raw.screen_type, ScreenType::Transition);
        assert_eq!(raw.hearts_current, None);
        assert_eq!(raw.rupees, None);
        assert_eq!(raw.map_position, None);

        let mut m = hud(140.0);
        set(&mut m, TileId::HudMarker, "7", 0.9);
        assert_eq!(decode(&m).screen_type, ScreenType::Unknown);
    }

    #[test]
    fn test_low_scores_are_unobserved() {
        let mut m = hud(120.0);
        set(&mut m, TileId::Sword, "magical", 0.3);
        set(&mut m, TileId::BItem, "bow", 0.3);
        for room in &mut m.rooms {
            room.score = 0.1;
        }
        let raw = decode(&m);
        assert_eq!(raw.sword_level, None);
        assert_eq!(raw.b_item, None);
        assert_eq!(raw.map_position, None);
    }

    #[test]
    fn test_dead_link_reads_zero_hearts() {
        let mut m = hud(120.0);
        for i in 0..8 {
            set(&mut m, TileId::Heart(i), "empty", 0.9);
        }
        let raw = decode(&m);
        assert_eq!(raw.hearts_current, Some(0));
        assert_eq!(raw.hearts_max, Some(8));
    }
}
