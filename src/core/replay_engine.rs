use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::alerts::dispatcher::NotifyReport;
use super::coordinator::{Coordinator, CoordinatorOutput};
use super::log_io::FrameReader;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplayMode {
    /// Frames are processed back to back.
    Instant,
    /// Frames are spaced by their timestamp gaps divided by `speed`.
    Paced { speed: f64 },
}

impl ReplayMode {
    /// `None` for a speed that is not a positive finite number.
    pub fn paced(speed: f64) -> Option<Self> {
        (speed.is_finite() && speed > 0.0).then_some(Self::Paced { speed })
    }

    /// Mode for a `--speed` flag: absent means back to back.
    pub fn from_speed(speed: Option<f64>) -> Option<Self> {
        speed.map_or(Some(Self::Instant), Self::paced)
    }

    /// Wait before the next frame. Saturates at `MAX_DELAY`.
    fn delay(&self, gap: Duration) -> Duration {
        match self {
            Self::Instant => Duration::ZERO,
            Self::Paced { speed } => Duration::try_from_secs_f64(gap.as_secs_f64() / speed)
                .map_or(MAX_DELAY, |delay| delay.min(MAX_DELAY)),
        }
    }
}

/// Longest pause between two replayed frames.
pub const MAX_DELAY: Duration = Duration::from_secs(3_600);

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub frames: usize,
    pub alerts: usize,
    pub skipped_lines: usize,
    pub by_type: BTreeMap<String, usize>,
    pub notifications: NotifyReport,
}

pub struct ReplayController<R> {
    reader: FrameReader<R>,
    mode: ReplayMode,
    last_timestamp: Option<DateTime<Utc>>,
}

impl<R: BufRead> ReplayController<R> {
    pub fn new(reader: FrameReader<R>, mode: ReplayMode) -> Self {
        Self {
            reader,
            mode,
            last_timestamp: None,
        }
    }

    /// Feed every frame through the coordinator, calling `on_output` after each.
    pub async fn run<F>(&mut self, coordinator: &Coordinator, mut on_output: F) -> io::Result<ReplaySummary>
    where
        F: FnMut(&CoordinatorOutput),
    {
        let mut summary = ReplaySummary::default();

        while let Some(frame) = self.reader.next() {
            let frame = frame?;

            if let Some(previous) = self.last_timestamp {
                let gap = (frame.timestamp - previous).to_std().unwrap_or_default();
                let delay = self.mode.delay(gap);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            self.last_timestamp = Some(frame.timestamp);

            let output = coordinator.tick(&frame);
            summary.frames += 1;
            summary.alerts += output.alerts.len();
            for alert in &output.alerts {
                *summary
                    .by_type
                    .entry(alert.alert_type.as_str().to_string())
                    .or_insert(0) += 1;
            }
            on_output(&output);
        }

        summary.skipped_lines = self.reader.skipped();
        summary.notifications = coordinator.flush().await;
        log::info!(
            "Replay finished: {} frames, {} alerts, {} malformed lines",
            summary.frames,
            summary.alerts,
            summary.skipped_lines
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::notifier::SilentNotifier;
    use crate::core::config::Settings;
    use std::io::Cursor;
    use std::sync::Arc;

    fn crowd_line(second: u32) -> String {
        let detections: Vec<String> = (0..6)
            .map(|i| {
                format!(
                    r#"{{"bbox":[{x},0,{w},100],"confidence":0.9,"class_name":"person","track_id":{i}}}"#,
                    x = i * 100,
                    w = i * 100 + 40,
                    i = i
                )
            })
            .collect();
        format!(
            r#"{{"timestamp":"2025-01-01T12:00:{:02}Z","detections":[{}]}}"#,
            second,
            detections.join(",")
        )
    }

    #[test]
    fn test_paced_mode_rejects_bad_speed() {
        assert!(ReplayMode::paced(0.0).is_none());
        assert!(ReplayMode::paced(f64::NAN).is_none());
        assert_eq!(
            ReplayMode::paced(2.0).unwrap().delay(Duration::from_secs(1)),
            Duration::from_millis(500)
        );
        assert_eq!(ReplayMode::Instant.delay(Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn test_tiny_speed_saturates_delay() {
        let crawl = ReplayMode::paced(1e-300).unwrap();
        assert_eq!(crawl.delay(Duration::from_secs(1)), MAX_DELAY);
        assert_eq!(crawl.delay(Duration::ZERO), Duration::ZERO);

        let slow = ReplayMode::paced(1e-6).unwrap();
        assert_eq!(slow.delay(Duration::from_secs(86_400 * 365)), MAX_DELAY);
    }

    #[test]
    fn test_from_speed() {
        assert_eq!(ReplayMode::from_speed(None), Some(ReplayMode::Instant));
        assert_eq!(ReplayMode::from_speed(Some(4.0)), Some(ReplayMode::Paced { speed: 4.0 }));
        assert_eq!(ReplayMode::from_speed(Some(0.0)), None);
        assert_eq!(ReplayMode::from_speed(Some(-1.0)), None);
    }

    #[tokio::test]
    async fn test_replay_counts_alerts() {
        let input = [crowd_line(0), "garbage".to_string(), crowd_line(2), crowd_line(8)].join("\n");
        let mut controller = ReplayController::new(FrameReader::new(Cursor::new(input)), ReplayMode::Instant);
        let coordinator = Coordinator::from_settings(&Settings::default(), Arc::new(SilentNotifier));

        let mut seen = 0;
        let summary = controller
            .run(&coordinator, |output| seen += output.alerts.len())
            .await
            .unwrap();

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.skipped_lines, 1);
        // Crowd at 0s, suppressed at 2s, fires again at 8s
        assert_eq!(summary.by_type.get("CROWD_DETECTED"), Some(&2));
        assert_eq!(summary.alerts, seen);
        assert_eq!(summary.notifications.notified, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_replay_waits_between_frames() {
        let input = [crowd_line(0), crowd_line(4)].join("\n");
        let mut controller = ReplayController::new(
            FrameReader::new(Cursor::new(input)),
            ReplayMode::paced(2.0).unwrap(),
        );
        let coordinator = Coordinator::from_settings(&Settings::default(), Arc::new(SilentNotifier));

        let started = tokio::time::Instant::now();
        controller.run(&coordinator, |_| {}).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}
