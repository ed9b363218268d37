use std::collections::BTreeSet;
use z1_state::StableGameState;

/// Long-lived per-racer memory of what has already happened this session.
/// Created fresh for each racer and handed to the inferencer by reference.
#[derive(Debug, Clone, Default)]
pub struct SessionMemo {
    /// Stable state of the previous tick; `None` until the first tick
    pub previous: Option<StableGameState>,
    pub visited_dungeons: BTreeSet<u8>,
    pub triforces: BTreeSet<u8>,
    pub last_death_frame: Option<u64>,
    pub last_warp_frame: Option<u64>,
    /// Last overworld room seen, used to recognise a warp back to the start
    pub last_overworld_room: Option<u16>,
    pub d9_triforce_entered: bool,
    pub ganon_fight_seen: bool,
    pub master_key_seen: bool,
    pub game_completed: bool,
}

impl SessionMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_seeded(&self) -> bool {
        self.previous.is_some()
    }

    /// Forget everything, including the previous state
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
