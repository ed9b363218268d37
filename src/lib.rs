pub mod config;
pub mod event_log;
pub mod pipeline;

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use config::AppConfig;
use event_log::EventLog;
use pipeline::{RacerPipeline, RacerSession};
use z1_capture::ImageSequenceSource;
use z1_vision::{MatchingEngine, TemplateLibrary};

const DEFAULT_LOG_FILTER: &str = "z1_tracker=info,z1_capture=info,z1_vision=info,z1_state=info,z1_events=info";

/// Load the configuration named on the command line, start one pipeline per
/// racer and record events until every source is exhausted or Ctrl-C.
pub async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_PATH));
    let config = AppConfig::load(&config_path)?;
    config.validate()?;
    info!(
        "Loaded {} with {} racer(s), data directory {}",
        config_path.display(),
        config.racers.len(),
        config.data_dir.display()
    );

    let data_dir = config.data_dir.clone();
    let library = tokio::task::spawn_blocking(move || TemplateLibrary::load(&data_dir))
        .await
        .context("Template loading task failed")??;
    if library.template_count() == 0 {
        bail!("No templates found under {}", config.data_dir.display());
    }
    let engine = Arc::new(MatchingEngine::new(Arc::new(library), config.search_radius));

    let mut event_log = match &config.event_log {
        Some(path) => Some(EventLog::open(path)?),
        None => None,
    };

    // Everything that can fail on configuration is checked before any racer starts
    let mut prepared = Vec::with_capacity(config.racers.len());
    for racer in &config.racers {
        let session = RacerSession::new(&racer.id, engine.clone(), &config.thresholds, config.inference.clone())?;
        let source = ImageSequenceSource::open(&racer.frames_dir)
            .with_context(|| format!("Racer {}: no frame source", racer.id))?;
        info!("[{}] {} recorded frame(s) in {}", racer.id, source.len(), racer.frames_dir.display());
        prepared.push((session, source, racer.landmarks));
    }

    let (report_tx, mut report_rx) = mpsc::channel(256);
    let pipelines: Vec<RacerPipeline> = prepared
        .into_iter()
        .map(|(session, source, landmarks)| {
            RacerPipeline::start(session, source, config.capture_settings(), landmarks, report_tx.clone())
        })
        .collect();
    drop(report_tx);

    let mut stopping = false;
    let mut event_count = 0u64;
    loop {
        tokio::select! {
            report = report_rx.recv() => {
                let Some(report) = report else { break };
                if let Some(state) = &report.state {
                    debug!(
                        "[{}] frame {}: {:?} level {} hearts {}/{}",
                        report.racer_id,
                        report.frame_number,
                        state.screen_type,
                        state.dungeon_level,
                        state.hearts_current,
                        state.hearts_max
                    );
                }
                for event in &report.events {
                    event_count += 1;
                    if let Some(log) = event_log.as_mut() {
                        if let Err(e) = log.append(event) {
                            warn!("Failed to write event to {}: {:#}", log.path().display(), e);
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c(), if !stopping => {
                info!("Ctrl-C received, stopping {} pipeline(s)", pipelines.len());
                stopping = true;
                for p in &pipelines {
                    p.stop();
                }
            }
        }
    }

    for p in pipelines {
        let status = p.capture_status();
        let diagnostics = p.calibration().diagnostics();
        info!(
            "[{}] {} frame(s) captured, {} calibration(s) accepted, {} rejected",
            p.racer_id(),
            status.frames_captured,
            diagnostics.accepted,
            diagnostics.rejected
        );
        if let Some(state) = p.latest_state() {
            info!(
                "[{}] Final state: {:?} level {}, hearts {}/{}, sword {}",
                p.racer_id(),
                state.screen_type,
                state.dungeon_level,
                state.hearts_current,
                state.hearts_max,
                state.sword_level
            );
        }
        p.join().await;
    }
    info!("Done: {} event(s)", event_count);
    Ok(())
}
