use anyhow::Result;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub mod sequence;

pub use sequence::ImageSequenceSource;

/// One acquired video frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position of the frame in its source, starting at 1
    pub number: u64,
    /// Stream time of the frame
    pub timestamp_ms: u64,
    pub image: Arc<RgbaImage>,
}

/// Health of one acquisition loop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStatus {
    pub is_capturing: bool,
    pub source: Option<String>,
    pub fps: f64,
    pub frames_captured: u64,
    /// Stalls and decode failures since the last good frame
    pub consecutive_failures: u32,
    pub last_capture_time: Option<u64>,
    pub resolution: Option<(u32, u32)>,
}

/// A blocking producer of frames. Runs on a dedicated blocking thread.
pub trait FrameSource: Send + 'static {
    fn describe(&self) -> String;

    /// Next frame, `Ok(None)` once the source is exhausted.
    /// An `Err` skips one frame; the loop keeps pulling.
    fn grab(&mut self) -> Result<Option<RgbaImage>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Nominal spacing of frames, used for pacing and stream timestamps
    pub frame_interval: Duration,
    /// Longest wait for the next frame before the tick is skipped
    pub acquire_timeout: Duration,
    /// Pause after a stall or a failed frame
    pub retry_backoff: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
            acquire_timeout: Duration::from_millis(2000),
            retry_backoff: Duration::from_millis(250),
        }
    }
}

type Grabbed = (u64, Result<RgbaImage>);

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Pull frames from `source` until it is exhausted or `stop` is set, and
/// publish each good frame through `frame_tx`.
///
/// The source runs on a blocking thread feeding a small bounded channel.
/// Waits are bounded by `acquire_timeout`; a stall or a failed frame is
/// skipped and followed by `retry_backoff`. Nothing partial is ever published.
pub async fn capture_loop<S: FrameSource>(
    source: S,
    frame_tx: watch::Sender<Option<Frame>>,
    status_tx: watch::Sender<CaptureStatus>,
    settings: CaptureSettings,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    let description = source.describe();
    info!("Capture loop started: {} (interval {:?})", description, settings.frame_interval);

    let (grab_tx, mut grab_rx) = mpsc::channel::<Grabbed>(2);
    let stop_grab = stop.clone();
    let grab_handle = tokio::task::spawn_blocking(move || grab_frames(source, grab_tx, stop_grab));

    let mut status = CaptureStatus {
        is_capturing: true,
        source: Some(description.clone()),
        ..Default::default()
    };
    let _ = status_tx.send(status.clone());

    let interval_ms = settings.frame_interval.as_millis() as u64;
    let mut fps_count = 0u64;
    let mut fps_timer = Instant::now();

    loop {
        if stop.load(Ordering::Relaxed) {
            info!("Capture loop stopping (stop signal received)");
            break;
        }

        let tick_start = Instant::now();
        match tokio::time::timeout(settings.acquire_timeout, grab_rx.recv()).await {
            Ok(Some((number, Ok(image)))) => {
                fps_count += 1;
                let elapsed = fps_timer.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    status.fps = fps_count as f64 / elapsed;
                }
                if elapsed > 5.0 {
                    fps_count = 0;
                    fps_timer = Instant::now();
                }

                status.frames_captured += 1;
                status.consecutive_failures = 0;
                status.last_capture_time = Some(unix_millis());
                status.resolution = Some(image.dimensions());
                let _ = status_tx.send(status.clone());

                let frame = Frame {
                    number,
                    timestamp_ms: number.saturating_sub(1) * interval_ms,
                    image: Arc::new(image),
                };
                if frame_tx.send(Some(frame)).is_err() {
                    debug!("No frame receivers left, stopping capture");
                    break;
                }

                let spent = tick_start.elapsed();
                if spent < settings.frame_interval {
                    tokio::time::sleep(settings.frame_interval - spent).await;
                }
            }
            Ok(Some((number, Err(e)))) => {
                warn!("Frame {} from {} failed: {:#}", number, description, e);
                status.consecutive_failures += 1;
                let _ = status_tx.send(status.clone());
                tokio::time::sleep(settings.retry_backoff).await;
            }
            Ok(None) => {
                info!("{} exhausted after {} frame(s)", description, status.frames_captured);
                break;
            }
            Err(_) => {
                warn!(
                    "No frame from {} within {:?}, skipping tick",
                    description, settings.acquire_timeout
                );
                status.consecutive_failures += 1;
                let _ = status_tx.send(status.clone());
                tokio::time::sleep(settings.retry_backoff).await;
            }
        }
    }

    // Unblocks a producer parked on a full channel
    drop(grab_rx);
    match grab_handle.await {
        Ok(()) => {}
        Err(e) => warn!("Frame source thread panicked: {}", e),
    }

    status.is_capturing = false;
    let _ = status_tx.send(status);
    info!("Capture loop stopped");
    Ok(())
}

/// Blocking side: number every grab and hand it to the async side
fn grab_frames<S: FrameSource>(mut source: S, tx: mpsc::Sender<Grabbed>, stop: Arc<AtomicBool>) {
    let mut number = 0u64;
    while !stop.load(Ordering::Relaxed) {
        let grabbed = match source.grab() {
            Ok(Some(image)) => Ok(image),
            Ok(None) => return,
            Err(e) => Err(e),
        };
        number += 1;
        if tx.blocking_send((number, grabbed)).is_err() {
            // Receiver dropped
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::VecDeque;

    enum Step {
        Image(u8),
        Fail,
        Stall(Duration),
    }

    struct Scripted {
        steps: VecDeque<Step>,
    }

    impl FrameSource for Scripted {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        fn grab(&mut self) -> Result<Option<RgbaImage>> {
            match self.steps.pop_front() {
                Some(Step::Image(v)) => Ok(Some(RgbaImage::from_pixel(4, 4, image::Rgba([v, v, v, 255])))),
                Some(Step::Fail) => Err(anyhow!("corrupt frame")),
                Some(Step::Stall(d)) => {
                    std::thread::sleep(d);
                    Ok(Some(RgbaImage::from_pixel(4, 4, image::Rgba([99, 99, 99, 255]))))
                }
                None => Ok(None),
            }
        }
    }

    fn settings() -> CaptureSettings {
        CaptureSettings {
            frame_interval: Duration::from_millis(1),
            acquire_timeout: Duration::from_millis(50),
            retry_backoff: Duration::from_millis(1),
        }
    }

    /// Run the loop to completion, recording every distinct published frame
    async fn run(steps: Vec<Step>) -> (Vec<(u64, u8)>, CaptureStatus) {
        let (frame_tx, mut frame_rx) = watch::channel::<Option<Frame>>(None);
        let (status_tx, status_rx) = watch::channel(CaptureStatus::default());
        let collector = tokio::spawn(async move {
            let mut seen = Vec::new();
            while frame_rx.changed().await.is_ok() {
                if let Some(frame) = frame_rx.borrow_and_update().clone() {
                    seen.push((frame.number, frame.image.get_pixel(0, 0)[0]));
                }
            }
            seen
        });

        let source = Scripted {
            steps: steps.into(),
        };
        capture_loop(source, frame_tx, status_tx, settings(), Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();
        let seen = collector.await.unwrap();
        let status = status_rx.borrow().clone();
        (seen, status)
    }

    #[tokio::test]
    async fn test_frames_published_in_order() {
        let (seen, status) = run(vec![Step::Image(1), Step::Image(2), Step::Image(3)]).await;
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(seen.last(), Some(&(3, 3)));
        assert_eq!(status.frames_captured, 3);
        assert!(!status.is_capturing);
    }

    #[tokio::test]
    async fn test_failed_frame_is_skipped() {
        let (seen, status) = run(vec![Step::Image(1), Step::Fail, Step::Image(3)]).await;
        assert!(seen.iter().all(|&(_, v)| v != 0));
        assert_eq!(seen.last(), Some(&(3, 3)));
        assert_eq!(status.frames_captured, 2);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_stall_times_out_and_recovers() {
        let (seen, status) = run(vec![
            Step::Image(1),
            Step::Stall(Duration::from_millis(200)),
            Step::Image(3),
        ])
        .await;
        assert_eq!(seen.last(), Some(&(3, 3)));
        assert_eq!(status.frames_captured, 3);
    }

    #[tokio::test]
    async fn test_stop_flag_ends_loop() {
        let (frame_tx, _frame_rx) = watch::channel::<Option<Frame>>(None);
        let (status_tx, status_rx) = watch::channel(CaptureStatus::default());
        let steps: Vec<Step> = (0..1000).map(|_| Step::Image(5)).collect();
        let stop = Arc::new(AtomicBool::new(true));
        capture_loop(
            Scripted {
                steps: steps.into(),
            },
            frame_tx,
            status_tx,
            settings(),
            stop,
        )
        .await
        .unwrap();
        assert!(!status_rx.borrow().is_capturing);
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_value(CaptureStatus::default()).unwrap();
        assert!(json.get("framesCaptured").is_some());
        assert!(json.get("consecutiveFailures").is_some());
    }
}
