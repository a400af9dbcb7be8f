// Alert dispatch: severity ordering, window bookkeeping and best-effort notification.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::model::AlertEvent;
use super::notifier::Notifier;
use super::window::ActiveAlertWindow;

/// Notifier calls allowed to run at once. A call that outlives its timeout
/// keeps its slot until the backend returns.
pub const MAX_IN_FLIGHT: usize = 4;

/// Outcome of one `trigger` call, known as soon as it returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub recorded: usize,
    /// Events handed to the background notification batch.
    pub queued: usize,
}

/// Notifier results, summed over the batches collected by `flush`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotifyReport {
    pub notified: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// Skipped because every slot was held by an earlier, still running call.
    pub dropped: usize,
}

impl NotifyReport {
    fn merge(&mut self, other: Self) {
        self.notified += other.notified;
        self.failed += other.failed;
        self.timed_out += other.timed_out;
        self.dropped += other.dropped;
    }
}

pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    window: Mutex<ActiveAlertWindow>,
    timeout: Duration,
    slots: Arc<Semaphore>,
    batches: Mutex<Vec<JoinHandle<NotifyReport>>>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self {
            notifier,
            window: Mutex::new(ActiveAlertWindow::new()),
            timeout,
            slots: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
            batches: Mutex::new(Vec::new()),
        }
    }

    fn window(&self) -> MutexGuard<'_, ActiveAlertWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn batches(&self) -> MutexGuard<'_, Vec<JoinHandle<NotifyReport>>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sort by severity (highest first, ties keep input order), record every
    /// event in the active window, then hand the batch to a background task
    /// that notifies for each in that order.
    ///
    /// Returns without waiting on the notifier. Outside a tokio runtime the
    /// events are still recorded but nobody is notified.
    pub fn trigger(&self, mut events: Vec<AlertEvent>) -> DispatchReport {
        let mut report = DispatchReport::default();
        if events.is_empty() {
            return report;
        }
        events.sort_by(|a, b| b.severity.cmp(&a.severity));

        {
            let mut window = self.window();
            for event in &events {
                window.push(event.clone());
            }
        }
        report.recorded = events.len();

        for event in &events {
            log::info!(
                "[{}] severity {}: {}",
                event.alert_type.display_name(),
                event.severity,
                event.description
            );
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("No async runtime, {} alerts recorded without notification", events.len());
            return report;
        };
        report.queued = events.len();

        let batch = runtime.spawn(notify_batch(
            Arc::clone(&self.notifier),
            Arc::clone(&self.slots),
            self.timeout,
            events,
        ));
        let mut batches = self.batches();
        batches.retain(|handle| !handle.is_finished());
        batches.push(batch);
        report
    }

    /// Wait for every notification batch started so far.
    pub async fn flush(&self) -> NotifyReport {
        let pending: Vec<_> = std::mem::take(&mut *self.batches());
        let mut total = NotifyReport::default();
        for batch in pending {
            match batch.await {
                Ok(report) => total.merge(report),
                Err(e) => log::warn!("Notification batch aborted: {}", e),
            }
        }
        total
    }

    pub fn recent(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<AlertEvent> {
        self.window().recent(now, max_age)
    }

    pub fn active_count(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        self.recent(now, max_age).len()
    }

    pub fn clear(&self) {
        self.window().clear();
    }
}

async fn notify_batch(
    notifier: Arc<dyn Notifier>,
    slots: Arc<Semaphore>,
    timeout: Duration,
    events: Vec<AlertEvent>,
) -> NotifyReport {
    let mut report = NotifyReport::default();

    for event in &events {
        let Ok(permit) = Arc::clone(&slots).try_acquire_owned() else {
            log::warn!(
                "Notifier {} busy, dropping notification for {}",
                notifier.name(),
                event.alert_type
            );
            report.dropped += 1;
            continue;
        };

        let backend = Arc::clone(&notifier);
        let severity = event.severity;
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            backend.notify(severity)
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(()))) => report.notified += 1,
            Ok(Ok(Err(e))) => {
                log::warn!("Notifier {} failed for {}: {}", notifier.name(), event.alert_type, e);
                report.failed += 1;
            }
            Ok(Err(e)) => {
                log::warn!("Notifier {} panicked for {}: {}", notifier.name(), event.alert_type, e);
                report.failed += 1;
            }
            Err(_) => {
                log::warn!(
                    "Notifier {} timed out after {}ms for {}",
                    notifier.name(),
                    timeout.as_millis(),
                    event.alert_type
                );
                report.timed_out += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::{AlertDetails, AlertType, Severity};
    use crate::core::alerts::notifier::NotifyError;
    use chrono::TimeZone;

    struct RecordingNotifier {
        calls: Mutex<Vec<u8>>,
    }

    impl Notifier for RecordingNotifier {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn notify(&self, severity: Severity) -> Result<(), NotifyError> {
            self.calls.lock().unwrap().push(severity.level());
            Ok(())
        }
    }

    struct FlakyNotifier;

    impl Notifier for FlakyNotifier {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn notify(&self, severity: Severity) -> Result<(), NotifyError> {
            if severity == Severity::CRITICAL {
                return Err(NotifyError::Backend("speaker unplugged".to_string()));
            }
            Ok(())
        }
    }

    struct SlowNotifier;

    impl Notifier for SlowNotifier {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn notify(&self, _severity: Severity) -> Result<(), NotifyError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn make_event(alert_type: AlertType, count: usize) -> AlertEvent {
        AlertEvent::new(alert_type, "test", t0(), AlertDetails::Occupancy { count })
    }

    #[tokio::test]
    async fn test_sorted_by_severity_stable() {
        let notifier = Arc::new(RecordingNotifier {
            calls: Mutex::new(Vec::new()),
        });
        let dispatcher = Dispatcher::new(notifier.clone(), Duration::from_secs(1));

        let events = vec![
            make_event(AlertType::Loitering, 1),
            make_event(AlertType::FallDetected, 2),
            make_event(AlertType::UnauthorizedPerson, 3),
            make_event(AlertType::CrowdDetected, 4),
        ];
        let report = dispatcher.trigger(events);
        assert_eq!(report, DispatchReport { recorded: 4, queued: 4 });
        assert_eq!(dispatcher.flush().await.notified, 4);
        assert_eq!(*notifier.calls.lock().unwrap(), vec![5, 4, 3, 3]);

        let recorded = dispatcher.recent(t0(), Duration::from_secs(10));
        let counts: Vec<_> = recorded
            .iter()
            .map(|e| match e.details {
                AlertDetails::Occupancy { count } => count,
                _ => 0,
            })
            .collect();
        // Ties (severity 3) keep their input order
        assert_eq!(counts, vec![2, 4, 1, 3]);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let dispatcher = Dispatcher::new(Arc::new(FlakyNotifier), Duration::from_secs(1));
        let events = vec![
            make_event(AlertType::SosGesture, 1),
            make_event(AlertType::Loitering, 2),
        ];
        dispatcher.trigger(events);
        let report = dispatcher.flush().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.notified, 1);
        assert_eq!(dispatcher.active_count(t0(), Duration::from_secs(10)), 2);
    }

    #[tokio::test]
    async fn test_slow_notifier_times_out_but_event_recorded() {
        let dispatcher = Dispatcher::new(Arc::new(SlowNotifier), Duration::from_millis(20));
        dispatcher.trigger(vec![make_event(AlertType::CrowdDetected, 6)]);
        assert_eq!(dispatcher.active_count(t0(), Duration::from_secs(10)), 1);

        let report = dispatcher.flush().await;
        assert_eq!(report.timed_out, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_trigger_returns_before_notifier() {
        let dispatcher = Dispatcher::new(Arc::new(SlowNotifier), Duration::from_secs(5));
        let events = (0..6).map(|i| make_event(AlertType::FallDetected, i)).collect();

        let started = std::time::Instant::now();
        let report = dispatcher.trigger(events);
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(report.recorded, 6);
        assert_eq!(dispatcher.active_count(t0(), Duration::from_secs(10)), 6);
    }

    #[tokio::test]
    async fn test_hung_backend_is_capped() {
        let dispatcher = Dispatcher::new(Arc::new(SlowNotifier), Duration::from_millis(20));
        let events = (0..MAX_IN_FLIGHT + 2)
            .map(|i| make_event(AlertType::FallDetected, i))
            .collect();
        dispatcher.trigger(events);

        // Timed-out calls still hold their slots, so the rest are dropped
        let report = dispatcher.flush().await;
        assert_eq!(report.timed_out, MAX_IN_FLIGHT);
        assert_eq!(report.dropped, 2);
        assert_eq!(dispatcher.active_count(t0(), Duration::from_secs(10)), MAX_IN_FLIGHT + 2);
    }

    #[test]
    fn test_records_without_runtime() {
        let dispatcher = Dispatcher::new(Arc::new(SlowNotifier), Duration::from_millis(20));
        let report = dispatcher.trigger(vec![make_event(AlertType::CrowdDetected, 6)]);
        assert_eq!(report, DispatchReport { recorded: 1, queued: 0 });
        assert_eq!(dispatcher.active_count(t0(), Duration::from_secs(10)), 1);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let dispatcher = Dispatcher::new(Arc::new(SlowNotifier), Duration::from_millis(20));
        assert_eq!(dispatcher.trigger(Vec::new()), DispatchReport::default());
    }
}
