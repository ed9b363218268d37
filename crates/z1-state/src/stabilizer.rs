use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::streak::StreakTracker;
use crate::types::{BItem, RawGameState, ScreenType, StableGameState};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StabilizerError {
    #[error("Stabilization threshold for `{field}` must be at least 1")]
    ZeroThreshold { field: &'static str },
}

/// Consecutive ticks each field must repeat before it is promoted.
/// Counters settle fast; screen type and heart containers need long streaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerThresholds {
    pub screen_type: u32,
    pub dungeon_level: u32,
    pub rupees: u32,
    pub keys: u32,
    pub bombs: u32,
    pub hearts_current: u32,
    pub hearts_max: u32,
    pub sword_level: u32,
    pub b_item: u32,
    pub master_key: u32,
    pub alarm: u32,
    pub reward_icon: u32,
    pub map_position: u32,
}

impl Default for StabilizerThresholds {
    fn default() -> Self {
        Self {
            screen_type: 6,
            dungeon_level: 6,
            rupees: 3,
            keys: 3,
            bombs: 3,
            hearts_current: 3,
            hearts_max: 15,
            sword_level: 6,
            b_item: 6,
            master_key: 6,
            alarm: 3,
            reward_icon: 3,
            map_position: 4,
        }
    }
}

impl StabilizerThresholds {
    /// Every threshold set to `n`
    pub fn uniform(n: u32) -> Self {
        Self {
            screen_type: n,
            dungeon_level: n,
            rupees: n,
            keys: n,
            bombs: n,
            hearts_current: n,
            hearts_max: n,
            sword_level: n,
            b_item: n,
            master_key: n,
            alarm: n,
            reward_icon: n,
            map_position: n,
        }
    }

    pub fn validate(&self) -> Result<(), StabilizerError> {
        let fields = [
            ("screen_type", self.screen_type),
            ("dungeon_level", self.dungeon_level),
            ("rupees", self.rupees),
            ("keys", self.keys),
            ("bombs", self.bombs),
            ("hearts_current", self.hearts_current),
            ("hearts_max", self.hearts_max),
            ("sword_level", self.sword_level),
            ("b_item", self.b_item),
            ("master_key", self.master_key),
            ("alarm", self.alarm),
            ("reward_icon", self.reward_icon),
            ("map_position", self.map_position),
        ];
        for (field, threshold) in fields {
            if threshold == 0 {
                return Err(StabilizerError::ZeroThreshold { field });
            }
        }
        Ok(())
    }
}

/// One tracker per stabilized field.
///
/// Heart containers and sword level can never go down during a run, so their
/// trackers are monotonic and a misread cannot lower them.
#[derive(Debug, Clone)]
pub struct StateStabilizer {
    screen_type: StreakTracker<ScreenType>,
    dungeon_level: StreakTracker<u8>,
    rupees: StreakTracker<u16>,
    keys: StreakTracker<u8>,
    bombs: StreakTracker<u8>,
    hearts_current: StreakTracker<u8>,
    hearts_max: StreakTracker<u8>,
    sword_level: StreakTracker<u8>,
    b_item: StreakTracker<Option<BItem>>,
    master_key: StreakTracker<bool>,
    alarm: StreakTracker<bool>,
    reward_icon: StreakTracker<bool>,
    map_position: StreakTracker<u16>,
    ticks: u64,
}

impl StateStabilizer {
    pub fn new(thresholds: &StabilizerThresholds) -> Result<Self, StabilizerError> {
        thresholds.validate()?;
        Ok(Self {
            screen_type: StreakTracker::new(thresholds.screen_type),
            dungeon_level: StreakTracker::new(thresholds.dungeon_level),
            rupees: StreakTracker::new(thresholds.rupees),
            keys: StreakTracker::new(thresholds.keys),
            bombs: StreakTracker::new(thresholds.bombs),
            hearts_current: StreakTracker::new(thresholds.hearts_current),
            hearts_max: StreakTracker::monotonic(thresholds.hearts_max),
            sword_level: StreakTracker::monotonic(thresholds.sword_level),
            b_item: StreakTracker::new(thresholds.b_item),
            master_key: StreakTracker::new(thresholds.master_key),
            alarm: StreakTracker::new(thresholds.alarm),
            reward_icon: StreakTracker::new(thresholds.reward_icon),
            map_position: StreakTracker::new(thresholds.map_position),
            ticks: 0,
        })
    }

    /// Feed one raw state. Returns the stable state once every event-relevant
    /// field has been promoted at least once, and on every tick after that.
    pub fn update(&mut self, raw: &RawGameState) -> Option<StableGameState> {
        self.ticks += 1;

        if self.screen_type.update(raw.screen_type) {
            debug!("screen_type -> {:?} (tick {})", raw.screen_type, self.ticks);
        }
        observe(&mut self.dungeon_level, raw.dungeon_level, "dungeon_level", self.ticks);
        observe(&mut self.rupees, raw.rupees, "rupees", self.ticks);
        observe(&mut self.keys, raw.keys, "keys", self.ticks);
        observe(&mut self.bombs, raw.bombs, "bombs", self.ticks);
        observe(&mut self.hearts_current, raw.hearts_current, "hearts_current", self.ticks);
        observe(&mut self.hearts_max, raw.hearts_max, "hearts_max", self.ticks);
        observe(&mut self.sword_level, raw.sword_level, "sword_level", self.ticks);
        observe(&mut self.b_item, raw.b_item, "b_item", self.ticks);
        observe(&mut self.master_key, raw.master_key, "master_key", self.ticks);
        observe(&mut self.alarm, raw.alarm, "alarm", self.ticks);
        observe(&mut self.reward_icon, raw.reward_icon, "reward_icon", self.ticks);
        observe(&mut self.map_position, raw.map_position, "map_position", self.ticks);

        self.snapshot(raw)
    }

    pub fn is_ready(&self) -> bool {
        self.screen_type.is_primed()
            && self.dungeon_level.is_primed()
            && self.hearts_current.is_primed()
            && self.hearts_max.is_primed()
            && self.sword_level.is_primed()
            && self.b_item.is_primed()
    }

    /// Ticks processed since construction or the last reset
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn reset(&mut self) {
        self.screen_type.reset();
        self.dungeon_level.reset();
        self.rupees.reset();
        self.keys.reset();
        self.bombs.reset();
        self.hearts_current.reset();
        self.hearts_max.reset();
        self.sword_level.reset();
        self.b_item.reset();
        self.master_key.reset();
        self.alarm.reset();
        self.reward_icon.reset();
        self.map_position.reset();
        self.ticks = 0;
    }

    fn snapshot(&self, raw: &RawGameState) -> Option<StableGameState> {
        if !self.is_ready() {
            return None;
        }
        Some(StableGameState {
            screen_type: self.screen_type.value().copied().unwrap_or_default(),
            dungeon_level: self.dungeon_level.value().copied().unwrap_or_default(),
            rupees: self.rupees.value().copied().unwrap_or_default(),
            keys: self.keys.value().copied().unwrap_or_default(),
            bombs: self.bombs.value().copied().unwrap_or_default(),
            hearts_current: self.hearts_current.value().copied().unwrap_or_default(),
            hearts_max: self.hearts_max.value().copied().unwrap_or_default(),
            sword_level: self.sword_level.value().copied().unwrap_or_default(),
            b_item: self.b_item.value().copied().flatten(),
            master_key: self.master_key.value().copied().unwrap_or_default(),
            alarm: self.alarm.value().copied().unwrap_or_default(),
            reward_icon: self.reward_icon.value().copied().unwrap_or_default(),
            map_position: self.map_position.value().copied(),
            floor_items: raw.floor_items.clone(),
        })
    }
}

/// Feed a reading into its tracker. Unobserved readings leave the streak untouched.
fn observe<T>(tracker: &mut StreakTracker<T>, reading: Option<T>, field: &str, tick: u64)
where
    T: Clone + PartialEq + std::fmt::Debug,
{
    if let Some(value) = reading {
        if tracker.update(value) {
            debug!("{} -> {:?} (tick {})", field, tracker.value(), tick);
        }
    }
}
