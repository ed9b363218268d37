use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};
use z1_state::{ScreenType, StableGameState};

use crate::event::{EventType, GameEvent, TickInfo};
use crate::memo::SessionMemo;

/// Overworld map width in rooms
const OVERWORLD_COLUMNS: u16 = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceConfigError {
    #[error("Cooldown `{field}` must be at least 1 frame")]
    ZeroCooldown { field: &'static str },
}

/// Frame-based cooldowns and the room ids some rules key on.
///
/// Overworld room ids are `row * 16 + column`; dungeon room ids are whatever
/// the room manifest assigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Frames after a death during which another death is ignored (~30s at 30fps)
    pub death_cooldown_frames: u64,
    pub warp_cooldown_frames: u64,
    /// Overworld room where the game restarts
    pub start_room: u16,
    pub ganon_room: u16,
    pub d9_triforce_room: u16,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            death_cooldown_frames: 900,
            warp_cooldown_frames: 300,
            start_room: 0x77,
            ganon_room: 0x0935,
            d9_triforce_room: 0x0925,
        }
    }
}

impl InferenceConfig {
    pub fn validate(&self) -> Result<(), InferenceConfigError> {
        if self.death_cooldown_frames == 0 {
            return Err(InferenceConfigError::ZeroCooldown {
                field: "death_cooldown_frames",
            });
        }
        if self.warp_cooldown_frames == 0 {
            return Err(InferenceConfigError::ZeroCooldown {
                field: "warp_cooldown_frames",
            });
        }
        Ok(())
    }
}

/// Diffs consecutive stable states of one racer into game events.
///
/// Holds no per-session state of its own; everything that must survive
/// between ticks lives in the [`SessionMemo`] passed to [`infer`](Self::infer).
#[derive(Debug, Clone)]
pub struct EventInferencer {
    racer_id: String,
    config: InferenceConfig,
}

impl EventInferencer {
    pub fn new(racer_id: impl Into<String>, config: InferenceConfig) -> Result<Self, InferenceConfigError> {
        config.validate()?;
        Ok(Self {
            racer_id: racer_id.into(),
            config,
        })
    }

    /// Run every transition check for one tick. The first tick of a session
    /// only seeds the memo and never emits.
    pub fn infer(&self, memo: &mut SessionMemo, state: &StableGameState, tick: TickInfo) -> Vec<GameEvent> {
        let Some(prev) = memo.previous.take() else {
            self.seed(memo, state);
            memo.previous = Some(state.clone());
            return Vec::new();
        };

        let mut events = Vec::new();
        events.extend(self.heart_container(&prev, state, tick));
        events.extend(self.dungeon_first_visit(memo, state, tick));
        events.extend(self.sword_upgrade(&prev, state, tick));
        events.extend(self.b_item_change(&prev, state, tick));
        events.extend(self.death(memo, &prev, state, tick));
        events.extend(self.up_a_warp(memo, state, tick));
        events.extend(self.triforce(memo, state, tick));
        events.extend(self.master_key(memo, &prev, state, tick));
        events.extend(self.ganon_fight(memo, state, tick));
        events.extend(self.game_complete(memo, &prev, state, tick));

        for event in &events {
            info!(
                "[{}] {} at frame {}: {}",
                self.racer_id,
                event.event_type.as_str(),
                event.frame_number,
                event.description
            );
        }

        memo.previous = Some(state.clone());
        events
    }

    /// Mark whatever the racer is already in the middle of as seen
    fn seed(&self, memo: &mut SessionMemo, state: &StableGameState) {
        if state.screen_type == ScreenType::Dungeon && state.dungeon_level > 0 {
            memo.visited_dungeons.insert(state.dungeon_level);
            if state.reward_icon && state.dungeon_level <= 8 {
                memo.triforces.insert(state.dungeon_level);
            }
        }
        if state.screen_type == ScreenType::Overworld {
            memo.last_overworld_room = state.map_position;
        }
        if state.master_key {
            memo.master_key_seen = true;
        }
        if self.in_d9_room(state, self.config.ganon_room) {
            memo.ganon_fight_seen = true;
        }
        if self.in_d9_room(state, self.config.d9_triforce_room) {
            memo.d9_triforce_entered = true;
        }
        debug!(
            "[{}] Seeded session memo: visited={:?}, master_key={}",
            self.racer_id, memo.visited_dungeons, memo.master_key_seen
        );
    }

    fn event(&self, event_type: EventType, tick: TickInfo, description: impl Into<String>) -> GameEvent {
        GameEvent::new(event_type, &self.racer_id, tick, description)
    }

    fn in_d9_room(&self, state: &StableGameState, room: u16) -> bool {
        state.in_dungeon(9) && state.map_position == Some(room)
    }

    fn heart_container(&self, prev: &StableGameState, state: &StableGameState, tick: TickInfo) -> Option<GameEvent> {
        if state.hearts_max <= prev.hearts_max {
            return None;
        }
        Some(
            self.event(
                EventType::HeartContainer,
                tick,
                format!("Heart container: {} -> {} hearts", prev.hearts_max, state.hearts_max),
            )
            .with_data(json!({ "from": prev.hearts_max, "to": state.hearts_max })),
        )
    }

    fn dungeon_first_visit(&self, memo: &mut SessionMemo, state: &StableGameState, tick: TickInfo) -> Option<GameEvent> {
        let level = state.dungeon_level;
        if state.screen_type != ScreenType::Dungeon || level == 0 {
            return None;
        }
        if !memo.visited_dungeons.insert(level) {
            return None;
        }
        Some(
            self.event(EventType::DungeonFirstVisit, tick, format!("Entered level {} for the first time", level))
                .with_data(json!({ "level": level })),
        )
    }

    fn sword_upgrade(&self, prev: &StableGameState, state: &StableGameState, tick: TickInfo) -> Option<GameEvent> {
        if state.sword_level <= prev.sword_level {
            return None;
        }
        Some(
            self.event(
                EventType::SwordUpgrade,
                tick,
                format!("Sword upgraded: level {} -> {}", prev.sword_level, state.sword_level),
            )
            .with_data(json!({ "from": prev.sword_level, "to": state.sword_level })),
        )
    }

    fn b_item_change(&self, prev: &StableGameState, state: &StableGameState, tick: TickInfo) -> Option<GameEvent> {
        if prev.b_item == state.b_item {
            return None;
        }
        let from = prev.b_item.map(|i| i.label());
        let to = state.b_item.map(|i| i.label());
        Some(
            self.event(
                EventType::BItemChange,
                tick,
                format!("B item: {} -> {}", from.unwrap_or("empty"), to.unwrap_or("empty")),
            )
            .with_data(json!({ "from": from, "to": to })),
        )
    }

    fn death(
        &self,
        memo: &mut SessionMemo,
        prev: &StableGameState,
        state: &StableGameState,
        tick: TickInfo,
    ) -> Option<GameEvent> {
        if !state.screen_type.is_gameplay() || prev.hearts_current == 0 || state.hearts_current != 0 {
            return None;
        }
        if let Some(last) = memo.last_death_frame {
            if tick.frame_number.saturating_sub(last) <= self.config.death_cooldown_frames {
                debug!("[{}] Death at frame {} inside cooldown", self.racer_id, tick.frame_number);
                return None;
            }
        }
        memo.last_death_frame = Some(tick.frame_number);
        Some(self.event(EventType::Death, tick, "Link died"))
    }

    /// Arriving at the start room from a room that does not border it
    fn up_a_warp(&self, memo: &mut SessionMemo, state: &StableGameState, tick: TickInfo) -> Option<GameEvent> {
        if state.screen_type != ScreenType::Overworld {
            return None;
        }
        let room = state.map_position?;
        let from = memo.last_overworld_room.replace(room)?;
        let start = self.config.start_room;
        if room != start || from == start || rooms_adjacent(from, start) {
            return None;
        }
        if let Some(last) = memo.last_warp_frame {
            if tick.frame_number.saturating_sub(last) <= self.config.warp_cooldown_frames {
                return None;
            }
        }
        memo.last_warp_frame = Some(tick.frame_number);
        Some(
            self.event(EventType::UpAWarp, tick, format!("Warped to start from room {:#04x}", from))
                .with_data(json!({ "from": from })),
        )
    }

    fn triforce(&self, memo: &mut SessionMemo, state: &StableGameState, tick: TickInfo) -> Option<GameEvent> {
        let level = state.dungeon_level;
        if !state.reward_icon || state.screen_type != ScreenType::Dungeon || !(1..=8).contains(&level) {
            return None;
        }
        if !memo.triforces.insert(level) {
            return None;
        }
        Some(
            self.event(EventType::TriforceInferred, tick, format!("Triforce piece from level {}", level))
                .with_data(json!({ "level": level, "count": memo.triforces.len() })),
        )
    }

    fn master_key(
        &self,
        memo: &mut SessionMemo,
        prev: &StableGameState,
        state: &StableGameState,
        tick: TickInfo,
    ) -> Option<GameEvent> {
        if memo.master_key_seen || prev.master_key || !state.master_key {
            return None;
        }
        memo.master_key_seen = true;
        Some(self.event(EventType::MasterKey, tick, "Picked up the magic key"))
    }

    fn ganon_fight(&self, memo: &mut SessionMemo, state: &StableGameState, tick: TickInfo) -> Option<GameEvent> {
        if memo.ganon_fight_seen || !self.in_d9_room(state, self.config.ganon_room) {
            return None;
        }
        memo.ganon_fight_seen = true;
        Some(self.event(EventType::GanonFight, tick, "Entered Ganon's room"))
    }

    /// Leaving level 9 after reaching its triforce room. One-shot.
    fn game_complete(
        &self,
        memo: &mut SessionMemo,
        prev: &StableGameState,
        state: &StableGameState,
        tick: TickInfo,
    ) -> Option<GameEvent> {
        if self.in_d9_room(state, self.config.d9_triforce_room) {
            memo.d9_triforce_entered = true;
        }
        if memo.game_completed || !memo.d9_triforce_entered {
            return None;
        }
        if !prev.in_dungeon(9) || state.screen_type == ScreenType::Dungeon {
            return None;
        }
        memo.game_completed = true;
        Some(self.event(EventType::GameComplete, tick, "Left level 9 with the triforce"))
    }
}

fn rooms_adjacent(a: u16, b: u16) -> bool {
    let (ar, ac) = (a / OVERWORLD_COLUMNS, a % OVERWORLD_COLUMNS);
    let (br, bc) = (b / OVERWORLD_COLUMNS, b % OVERWORLD_COLUMNS);
    ar.abs_diff(br) + ac.abs_diff(bc) == 1
}
