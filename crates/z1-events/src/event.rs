use serde::{Deserialize, Serialize};

/// Urgency hint for downstream consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Every kind of event the inferencer can emit.
/// Consumers must be ready for variants added in later versions.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    HeartContainer,
    DungeonFirstVisit,
    SwordUpgrade,
    BItemChange,
    Death,
    UpAWarp,
    TriforceInferred,
    MasterKey,
    GanonFight,
    GameComplete,
}

impl EventType {
    pub const fn priority(self) -> Priority {
        match self {
            EventType::HeartContainer => Priority::High,
            EventType::DungeonFirstVisit => Priority::Medium,
            EventType::SwordUpgrade => Priority::High,
            EventType::BItemChange => Priority::Low,
            EventType::Death => Priority::High,
            EventType::UpAWarp => Priority::Medium,
            EventType::TriforceInferred => Priority::High,
            EventType::MasterKey => Priority::Medium,
            EventType::GanonFight => Priority::High,
            EventType::GameComplete => Priority::High,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            EventType::HeartContainer => "heart_container",
            EventType::DungeonFirstVisit => "dungeon_first_visit",
            EventType::SwordUpgrade => "sword_upgrade",
            EventType::BItemChange => "b_item_change",
            EventType::Death => "death",
            EventType::UpAWarp => "up_a_warp",
            EventType::TriforceInferred => "triforce_inferred",
            EventType::MasterKey => "master_key",
            EventType::GanonFight => "ganon_fight",
            EventType::GameComplete => "game_complete",
        }
    }
}

/// Frame position of the tick that produced an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickInfo {
    pub frame_number: u64,
    /// Milliseconds since the start of the racer's stream
    pub timestamp_ms: u64,
}

/// A game event inferred from a stable state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub racer_id: String,
    pub timestamp: u64,
    pub frame_number: u64,
    pub priority: Priority,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl GameEvent {
    pub fn new(event_type: EventType, racer_id: &str, tick: TickInfo, description: impl Into<String>) -> Self {
        Self {
            event_type,
            racer_id: racer_id.to_string(),
            timestamp: tick.timestamp_ms,
            frame_number: tick.frame_number,
            priority: event_type.priority(),
            description: description.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
