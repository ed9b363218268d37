use serde::{Deserialize, Serialize};

/// Coarse classification of what the frame is showing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenType {
    #[default]
    Unknown,
    /// Black or fading frame between rooms
    Transition,
    Overworld,
    Cave,
    Dungeon,
}

impl ScreenType {
    /// Screens where Link is on the playfield and the HUD is live
    pub fn is_gameplay(self) -> bool {
        matches!(
            self,
            ScreenType::Overworld | ScreenType::Cave | ScreenType::Dungeon
        )
    }
}

/// Items that can be equipped in the B slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BItem {
    Boomerang,
    MagicBoomerang,
    Bomb,
    Bow,
    Candle,
    RedCandle,
    Recorder,
    Food,
    Letter,
    Potion,
    RedPotion,
    MagicRod,
}

impl BItem {
    /// Map a template name to an item. Names follow the serde spelling.
    pub fn from_label(label: &str) -> Option<Self> {
        let item = match label {
            "boomerang" => BItem::Boomerang,
            "magic_boomerang" => BItem::MagicBoomerang,
            "bomb" => BItem::Bomb,
            "bow" => BItem::Bow,
            "candle" => BItem::Candle,
            "red_candle" => BItem::RedCandle,
            "recorder" => BItem::Recorder,
            "food" => BItem::Food,
            "letter" => BItem::Letter,
            "potion" => BItem::Potion,
            "red_potion" => BItem::RedPotion,
            "magic_rod" => BItem::MagicRod,
            _ => return None,
        };
        Some(item)
    }

    pub fn label(self) -> &'static str {
        match self {
            BItem::Boomerang => "boomerang",
            BItem::MagicBoomerang => "magic_boomerang",
            BItem::Bomb => "bomb",
            BItem::Bow => "bow",
            BItem::Candle => "candle",
            BItem::RedCandle => "red_candle",
            BItem::Recorder => "recorder",
            BItem::Food => "food",
            BItem::Letter => "letter",
            BItem::Potion => "potion",
            BItem::RedPotion => "red_potion",
            BItem::MagicRod => "magic_rod",
        }
    }
}

/// A pickup seen on the floor this tick. Positions are canonical pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorItem {
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// One tick's worth of decoded measurements.
///
/// HUD-derived readings are `None` when the field could not be observed this
/// tick (no HUD on screen, tile below the match floor). `None` is not a value:
/// the stabilizer leaves that field's streak untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGameState {
    pub screen_type: ScreenType,
    /// 0 outside dungeons
    pub dungeon_level: Option<u8>,
    pub rupees: Option<u16>,
    pub keys: Option<u8>,
    pub bombs: Option<u8>,
    pub hearts_current: Option<u8>,
    pub hearts_max: Option<u8>,
    pub sword_level: Option<u8>,
    /// Outer `None`: unreadable. Inner `None`: the slot is empty.
    pub b_item: Option<Option<BItem>>,
    pub master_key: Option<bool>,
    pub alarm: Option<bool>,
    pub reward_icon: Option<bool>,
    pub map_position: Option<u16>,
    pub floor_items: Vec<FloorItem>,
}

/// Debounced game state; the only state published as current truth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StableGameState {
    pub screen_type: ScreenType,
    pub dungeon_level: u8,
    pub rupees: u16,
    pub keys: u8,
    pub bombs: u8,
    pub hearts_current: u8,
    pub hearts_max: u8,
    pub sword_level: u8,
    pub b_item: Option<BItem>,
    pub master_key: bool,
    pub alarm: bool,
    pub reward_icon: bool,
    pub map_position: Option<u16>,
    /// Passed through from the latest raw state, never debounced
    pub floor_items: Vec<FloorItem>,
}

impl StableGameState {
    pub fn in_dungeon(&self, level: u8) -> bool {
        self.screen_type == ScreenType::Dungeon && self.dungeon_level == level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_b_item_labels_round_trip() {
        for item in [BItem::Boomerang, BItem::RedCandle, BItem::MagicRod] {
            assert_eq!(BItem::from_label(item.label()), Some(item));
        }
        assert_eq!(BItem::from_label("empty"), None);
    }

    #[test]
    fn test_gameplay_screens() {
        assert!(ScreenType::Dungeon.is_gameplay());
        assert!(ScreenType::Cave.is_gameplay());
        assert!(!ScreenType::Transition.is_gameplay());
        assert!(!ScreenType::Unknown.is_gameplay());
    }

    #[test]
    fn test_stable_state_field_names() {
        let state = StableGameState {
            hearts_max: 3,
            ..Default::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["heartsMax"], 3);
        assert_eq!(json["screenType"], "unknown");
        assert!(json["bItem"].is_null());
    }
}
