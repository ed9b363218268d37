use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use z1_capture::CaptureSettings;
use z1_events::InferenceConfig;
use z1_state::StabilizerThresholds;
use z1_vision::Landmarks;

pub const DEFAULT_CONFIG_PATH: &str = "z1-tracker.json";

/// Largest accepted sub-pixel search radius (9x9 offsets per tile)
pub const MAX_SEARCH_RADIUS: u32 = 4;

/// One tracked racer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RacerConfig {
    pub id: String,
    /// Directory of recorded frames for this racer
    pub frames_dir: PathBuf,
    /// Fixed landmarks. Detected from the first usable frame when absent.
    #[serde(default)]
    pub landmarks: Option<Landmarks>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root of the template library (`templates.json` plus images)
    pub data_dir: PathBuf,
    pub frame_interval_ms: u64,
    pub acquire_timeout_ms: u64,
    pub retry_backoff_ms: u64,
    /// Sub-pixel search radius in canonical pixels; 1 gives a 3x3 grid
    pub search_radius: u32,
    pub thresholds: StabilizerThresholds,
    pub inference: InferenceConfig,
    /// Append-only JSON-lines event history
    pub event_log: Option<PathBuf>,
    pub racers: Vec<RacerConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            frame_interval_ms: 33,
            acquire_timeout_ms: 2000,
            retry_backoff_ms: 250,
            search_radius: 1,
            thresholds: StabilizerThresholds::default(),
            inference: InferenceConfig::default(),
            event_log: None,
            racers: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.racers.is_empty() {
            bail!("No racers configured");
        }
        let mut ids = HashSet::new();
        for racer in &self.racers {
            if racer.id.trim().is_empty() {
                bail!("Racer id must not be empty");
            }
            if !ids.insert(racer.id.as_str()) {
                bail!("Duplicate racer id `{}`", racer.id);
            }
        }
        if self.frame_interval_ms == 0 || self.acquire_timeout_ms == 0 {
            bail!("frame_interval_ms and acquire_timeout_ms must be positive");
        }
        if self.search_radius > MAX_SEARCH_RADIUS {
            bail!(
                "search_radius {} exceeds the maximum of {}",
                self.search_radius,
                MAX_SEARCH_RADIUS
            );
        }
        self.thresholds.validate().context("Invalid stabilizer thresholds")?;
        self.inference.validate().context("Invalid inference config")?;
        Ok(())
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}
