//! Fixed HUD layout on the 256x240 canonical grid.

use serde::{Deserialize, Serialize};
use z1_data::TemplateGroup;

pub const CANONICAL_WIDTH: u32 = 256;
pub const CANONICAL_HEIGHT: u32 = 240;

pub const SMALL_GLYPH: (u32, u32) = (8, 8);
pub const TALL_GLYPH: (u32, u32) = (8, 16);

/// Row of the "X" glyph in front of the bomb counter, used as the height landmark
pub const MARKER_GLYPH_Y: u32 = 40;
/// Column of the "X" glyphs in front of every counter
pub const MARKER_GLYPH_X: u32 = 88;

pub const B_SLOT_X: u32 = 128;
pub const A_SLOT_X: u32 = 152;
/// Row of the "B" and "A" labels above the item slots; drawn even when a slot is empty
pub const SLOT_LABEL_Y: u32 = 16;
pub const ITEM_SLOT_Y: u32 = 24;

const COUNTER_X: u32 = 96;
const RUPEE_Y: u32 = 16;
const KEY_Y: u32 = 32;
const BOMB_Y: u32 = 40;

const HEARTS_X: u32 = 176;
const HEARTS_LOWER_Y: u32 = 40;
const HEARTS_UPPER_Y: u32 = 32;
pub const HEART_SLOTS: u8 = 16;

const LEVEL_LABEL_X: u32 = 16;
const LEVEL_DIGIT_X: u32 = 64;
const LEVEL_Y: u32 = 8;

/// Room thumbnails are compared at this size
pub const ROOM_SAMPLE: (u32, u32) = (32, 22);

/// Floor items are searched on this canonical grid step
pub const FLOOR_GRID_STEP: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CanonicalRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Everything below the HUD
pub const GAMEPLAY: CanonicalRect = CanonicalRect::new(0, 64, 256, 176);

/// "-LIFE-" label row; it turns bright while the status alarm flashes
pub const STATUS_TEXT: CanonicalRect = CanonicalRect::new(176, 16, 64, 8);

/// Centre of the room where a dungeon's reward is displayed
pub const REWARD_REGION: CanonicalRect = CanonicalRect::new(112, 128, 32, 32);

/// Identity of one recognizable HUD tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileId {
    /// "X" in front of the rupee counter; present whenever the HUD is on screen
    HudMarker,
    /// "L" of the "LEVEL-n" label shown inside dungeons
    LevelLabel,
    LevelDigit,
    Rupee(u8),
    Key(u8),
    Bomb(u8),
    Heart(u8),
    BItem,
    Sword,
}

/// One fixed-size tile to be matched against a template group
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileDefinition {
    pub id: TileId,
    pub canonical_x: u32,
    pub canonical_y: u32,
    pub width: u32,
    pub height: u32,
    pub group: TemplateGroup,
}

impl TileDefinition {
    fn small(id: TileId, x: u32, y: u32, group: TemplateGroup) -> Self {
        Self {
            id,
            canonical_x: x,
            canonical_y: y,
            width: SMALL_GLYPH.0,
            height: SMALL_GLYPH.1,
            group,
        }
    }

    fn tall(id: TileId, x: u32, y: u32, group: TemplateGroup) -> Self {
        Self {
            id,
            canonical_x: x,
            canonical_y: y,
            width: TALL_GLYPH.0,
            height: TALL_GLYPH.1,
            group,
        }
    }
}

/// The closed set of HUD tiles
pub fn hud_tiles() -> Vec<TileDefinition> {
    let mut tiles = vec![
        TileDefinition::small(TileId::HudMarker, MARKER_GLYPH_X, RUPEE_Y, TemplateGroup::Glyph),
        TileDefinition::small(TileId::LevelLabel, LEVEL_LABEL_X, LEVEL_Y, TemplateGroup::Glyph),
        TileDefinition::small(TileId::LevelDigit, LEVEL_DIGIT_X, LEVEL_Y, TemplateGroup::Glyph),
        TileDefinition::tall(TileId::BItem, B_SLOT_X, ITEM_SLOT_Y, TemplateGroup::BItem),
        TileDefinition::tall(TileId::Sword, A_SLOT_X, ITEM_SLOT_Y, TemplateGroup::Sword),
    ];

    for i in 0..3u8 {
        let x = COUNTER_X + i as u32 * SMALL_GLYPH.0;
        tiles.push(TileDefinition::small(TileId::Rupee(i), x, RUPEE_Y, TemplateGroup::Glyph));
    }
    for i in 0..2u8 {
        let x = COUNTER_X + i as u32 * SMALL_GLYPH.0;
        tiles.push(TileDefinition::small(TileId::Key(i), x, KEY_Y, TemplateGroup::Glyph));
        tiles.push(TileDefinition::small(TileId::Bomb(i), x, BOMB_Y, TemplateGroup::Glyph));
    }

    // Hearts fill the lower row first, eight per row
    for i in 0..HEART_SLOTS {
        let column = (i % 8) as u32;
        let y = if i < 8 { HEARTS_LOWER_Y } else { HEARTS_UPPER_Y };
        tiles.push(TileDefinition::small(
            TileId::Heart(i),
            HEARTS_X + column * SMALL_GLYPH.0,
            y,
            TemplateGroup::Heart,
        ));
    }

    tiles
}

/// Canonical top-left corners scanned for floor items
pub fn floor_grid() -> Vec<(u32, u32)> {
    let mut cells = Vec::new();
    let mut y = GAMEPLAY.y;
    while y + TALL_GLYPH.1 <= GAMEPLAY.y + GAMEPLAY.height {
        let mut x = GAMEPLAY.x;
        while x + TALL_GLYPH.0 <= GAMEPLAY.x + GAMEPLAY.width {
            cells.push((x, y));
            x += FLOOR_GRID_STEP;
        }
        y += FLOOR_GRID_STEP;
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tiles_inside_canonical_frame() {
        for tile in hud_tiles() {
            assert!(tile.canonical_x + tile.width <= CANONICAL_WIDTH, "{:?}", tile.id);
            assert!(tile.canonical_y + tile.height <= GAMEPLAY.y, "{:?}", tile.id);
            assert_eq!((tile.width, tile.height), tile.group.size().dimensions());
        }
    }

    #[test]
    fn test_tile_ids_unique() {
        let tiles = hud_tiles();
        let ids: HashSet<_> = tiles.iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), tiles.len());
        assert_eq!(tiles.len(), 5 + 3 + 2 + 2 + HEART_SLOTS as usize);
    }

    #[test]
    fn test_floor_grid_covers_gameplay() {
        let grid = floor_grid();
        assert_eq!(grid.first(), Some(&(0, 64)));
        assert_eq!(grid.last(), Some(&(248, 224)));
        assert_eq!(grid.len(), 32 * 21);
    }
}
