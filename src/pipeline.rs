use anyhow::{Context, Result};
use image::RgbaImage;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use z1_capture::{CaptureSettings, CaptureStatus, Frame, FrameSource};
use z1_events::{EventInferencer, GameEvent, InferenceConfig, SessionMemo, TickInfo};
use z1_state::{RawGameState, StabilizerThresholds, StableGameState, StateStabilizer};
use z1_vision::{calibrate, decode, detect_landmarks, Calibration, CalibrationError, CanonicalLandmarks, Landmarks, MatchingEngine};

/// What one tick published for one racer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub racer_id: String,
    pub frame_number: u64,
    pub timestamp_ms: u64,
    /// `None` until the stabilizer has primed every event-relevant field
    pub state: Option<StableGameState>,
    pub events: Vec<GameEvent>,
}

/// The per-tick chain for one racer: measure, decode, stabilize, infer.
/// Strictly sequential; the only parallelism is inside `MatchingEngine::measure`.
pub struct RacerSession {
    racer_id: String,
    engine: Arc<MatchingEngine>,
    stabilizer: StateStabilizer,
    inferencer: EventInferencer,
    memo: SessionMemo,
    last_frame: Option<u64>,
}

impl RacerSession {
    pub fn new(
        racer_id: &str,
        engine: Arc<MatchingEngine>,
        thresholds: &StabilizerThresholds,
        inference: InferenceConfig,
    ) -> Result<Self> {
        let stabilizer = StateStabilizer::new(thresholds)
            .with_context(|| format!("Racer {}: invalid stabilizer thresholds", racer_id))?;
        let inferencer = EventInferencer::new(racer_id, inference)
            .with_context(|| format!("Racer {}: invalid inference config", racer_id))?;
        Ok(Self {
            racer_id: racer_id.to_string(),
            engine,
            stabilizer,
            inferencer,
            memo: SessionMemo::new(),
            last_frame: None,
        })
    }

    pub fn racer_id(&self) -> &str {
        &self.racer_id
    }

    /// Process one frame. Frames at or before the last processed one are
    /// dropped so ticks stay in frame order.
    /// Frames whose size differs from the one the calibration was derived for
    /// are skipped.
    pub fn tick(&mut self, frame: &RgbaImage, calibration: &Calibration, tick: TickInfo) -> Option<TickReport> {
        let (w, h) = frame.dimensions();
        if !calibration.matches_frame(w, h) {
            warn!(
                "[{}] Frame {} is {}x{} but calibration is for {}x{}, skipping",
                self.racer_id, tick.frame_number, w, h, calibration.frame_width, calibration.frame_height
            );
            return None;
        }
        if let Some(last) = self.last_frame {
            if tick.frame_number <= last {
                debug!(
                    "[{}] Dropping out-of-order frame {} (last {})",
                    self.racer_id, tick.frame_number, last
                );
                return None;
            }
        }
        self.last_frame = Some(tick.frame_number);

        let measurements = self.engine.measure(frame, calibration);
        let raw = decode(&measurements);
        Some(self.advance(&raw, tick))
    }

    /// Stabilize one raw state and infer events from the result
    pub fn advance(&mut self, raw: &RawGameState, tick: TickInfo) -> TickReport {
        let state = self.stabilizer.update(raw);
        let events = match &state {
            Some(stable) => {
                if !self.memo.is_seeded() {
                    info!(
                        "[{}] First stable state at frame {} after {} tick(s)",
                        self.racer_id,
                        tick.frame_number,
                        self.stabilizer.ticks()
                    );
                }
                self.inferencer.infer(&mut self.memo, stable, tick)
            }
            None => Vec::new(),
        };
        TickReport {
            racer_id: self.racer_id.clone(),
            frame_number: tick.frame_number,
            timestamp_ms: tick.timestamp_ms,
            state,
            events,
        }
    }

    /// Start a new event session. The stabilizer keeps its streaks.
    pub fn reset_events(&mut self) {
        self.memo.reset();
    }
}

/// Read-only view of a racer's calibration for operator tooling
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationDiagnostics {
    pub current: Option<Calibration>,
    pub last_landmarks: Option<Landmarks>,
    pub last_error: Option<String>,
    pub accepted: u64,
    pub rejected: u64,
}

/// Owner of a racer's calibration. Accepted calibrations are swapped in
/// whole; a tick keeps the `Arc` it started with.
pub struct CalibrationHandle {
    canonical: CanonicalLandmarks,
    current_tx: watch::Sender<Option<Arc<Calibration>>>,
    diagnostics_tx: watch::Sender<CalibrationDiagnostics>,
}

impl CalibrationHandle {
    pub fn new(canonical: CanonicalLandmarks) -> Self {
        Self {
            canonical,
            current_tx: watch::channel(None).0,
            diagnostics_tx: watch::channel(CalibrationDiagnostics::default()).0,
        }
    }

    /// Validate landmarks and swap in the resulting calibration.
    /// On failure the previous calibration stays in effect.
    pub fn submit(&self, landmarks: Landmarks) -> Result<Arc<Calibration>, CalibrationError> {
        match calibrate(&landmarks, &self.canonical) {
            Ok(calibration) => {
                info!(
                    "Calibration accepted: scale {:.3}x{:.3}, crop ({:.1}, {:.1})",
                    calibration.scale_x, calibration.scale_y, calibration.crop_x, calibration.crop_y
                );
                let calibration = Arc::new(calibration);
                self.current_tx.send_replace(Some(calibration.clone()));
                self.diagnostics_tx.send_modify(|d| {
                    d.current = Some(*calibration);
                    d.last_landmarks = Some(landmarks);
                    d.last_error = None;
                    d.accepted += 1;
                });
                Ok(calibration)
            }
            Err(e) => {
                warn!("Calibration rejected, keeping previous: {}", e);
                self.diagnostics_tx.send_modify(|d| {
                    d.last_landmarks = Some(landmarks);
                    d.last_error = Some(e.to_string());
                    d.rejected += 1;
                });
                Err(e)
            }
        }
    }

    /// Drop the current calibration so the next frame triggers detection again
    pub fn invalidate(&self, reason: &str) {
        if self.current_tx.send_replace(None).is_some() {
            warn!("Calibration invalidated: {}", reason);
            self.diagnostics_tx.send_modify(|d| {
                d.current = None;
                d.last_error = Some(reason.to_string());
            });
        }
    }

    pub fn current(&self) -> Option<Arc<Calibration>> {
        self.current_tx.borrow().clone()
    }

    pub fn diagnostics(&self) -> CalibrationDiagnostics {
        self.diagnostics_tx.borrow().clone()
    }
}

/// Running acquisition and vision tasks for one racer
pub struct RacerPipeline {
    racer_id: String,
    stop: Arc<AtomicBool>,
    status_rx: watch::Receiver<CaptureStatus>,
    state_rx: watch::Receiver<Option<StableGameState>>,
    calibration: Arc<CalibrationHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl RacerPipeline {
    /// Spawn the acquisition loop and the vision loop. Reports for every
    /// tick that produced a stable state are sent to `report_tx`.
    pub fn start<S: FrameSource>(
        session: RacerSession,
        source: S,
        settings: CaptureSettings,
        landmarks: Option<Landmarks>,
        report_tx: mpsc::Sender<TickReport>,
    ) -> Self {
        let racer_id = session.racer_id().to_string();
        let stop = Arc::new(AtomicBool::new(false));

        let (frame_tx, frame_rx) = watch::channel::<Option<Frame>>(None);
        let (status_tx, status_rx) = watch::channel(CaptureStatus::default());
        let (state_tx, state_rx) = watch::channel::<Option<StableGameState>>(None);

        let calibration = Arc::new(CalibrationHandle::new(CanonicalLandmarks::default()));
        if let Some(landmarks) = landmarks {
            if let Err(e) = calibration.submit(landmarks) {
                warn!("[{}] Configured landmarks rejected ({}), detecting instead", racer_id, e);
            }
        }

        let stop_capture = stop.clone();
        let capture_id = racer_id.clone();
        let capture = tokio::spawn(async move {
            if let Err(e) = z1_capture::capture_loop(source, frame_tx, status_tx, settings, stop_capture).await {
                warn!("[{}] Capture loop error: {:#}", capture_id, e);
            }
        });

        let vision = tokio::spawn(vision_loop(
            session,
            frame_rx,
            calibration.clone(),
            state_tx,
            report_tx,
            stop.clone(),
        ));

        info!("[{}] Pipeline started", racer_id);
        Self {
            racer_id,
            stop,
            status_rx,
            state_rx,
            calibration,
            tasks: vec![capture, vision],
        }
    }

    pub fn racer_id(&self) -> &str {
        &self.racer_id
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        info!("[{}] Pipeline stop requested", self.racer_id);
    }

    pub fn capture_status(&self) -> CaptureStatus {
        self.status_rx.borrow().clone()
    }

    pub fn latest_state(&self) -> Option<StableGameState> {
        self.state_rx.borrow().clone()
    }

    pub fn calibration(&self) -> &CalibrationHandle {
        &self.calibration
    }

    /// Wait for both tasks to finish
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("[{}] Pipeline task failed: {}", self.racer_id, e);
            }
        }
        info!("[{}] Pipeline finished", self.racer_id);
    }
}

/// Consume frames one at a time. Frames that arrive while a tick is running
/// overwrite each other in the watch channel; only the newest is processed next.
async fn vision_loop(
    mut session: RacerSession,
    mut frame_rx: watch::Receiver<Option<Frame>>,
    calibration: Arc<CalibrationHandle>,
    state_tx: watch::Sender<Option<StableGameState>>,
    report_tx: mpsc::Sender<TickReport>,
    stop: Arc<AtomicBool>,
) {
    let racer_id = session.racer_id().to_string();
    let mut skipped = 0u64;

    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        if frame_rx.changed().await.is_err() {
            break;
        }
        let Some(frame) = frame_rx.borrow_and_update().clone() else {
            continue;
        };

        // One snapshot per tick; a swap mid-tick only affects the next one
        let (w, h) = frame.image.dimensions();
        let current = match calibration.current() {
            Some(c) if c.matches_frame(w, h) => c,
            stale => {
                if stale.is_some() {
                    calibration.invalidate(&format!("[{}] frame size changed to {}x{}", racer_id, w, h));
                }
                let image = frame.image.clone();
                let detected = tokio::task::spawn_blocking(move || detect_landmarks(&image))
                    .await
                    .ok()
                    .flatten();
                match detected.map(|l| calibration.submit(l)) {
                    Some(Ok(c)) => c,
                    _ => {
                        skipped += 1;
                        debug!("[{}] Frame {} skipped: not calibrated", racer_id, frame.number);
                        continue;
                    }
                }
            }
        };

        let tick = TickInfo {
            frame_number: frame.number,
            timestamp_ms: frame.timestamp_ms,
        };
        let result = tokio::task::spawn_blocking(move || {
            let report = session.tick(&frame.image, &current, tick);
            (session, report)
        })
        .await;

        let report = match result {
            Ok((s, report)) => {
                session = s;
                report
            }
            Err(e) => {
                warn!("[{}] Vision tick panicked, stopping racer: {}", racer_id, e);
                break;
            }
        };

        let Some(report) = report else { continue };
        if report.state.is_none() {
            continue;
        }
        state_tx.send_replace(report.state.clone());
        if report_tx.send(report).await.is_err() {
            debug!("[{}] Report receiver dropped", racer_id);
            break;
        }
    }

    info!("[{}] Vision loop stopped ({} uncalibrated frame(s))", racer_id, skipped);
}
