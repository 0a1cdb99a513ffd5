//! Per-client admission control.
//!
//! # Responsibilities
//! - Count requests per client identity inside a fixed window
//! - Reject once the count passes the configured limit
//! - Evict records that have been idle longer than the window
//!
//! # Design Decisions
//! - One mutex over the whole map; the sweep holds it for the full scan
//! - Fixed-window counter: the count only drops when the record is evicted,
//!   so a burst straddling a window edge can see up to 2x limit
//! - Rejected requests still count
//! - A single periodic sweeper per controller, never one task per request

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::AdmissionConfig;
use crate::lifecycle::shutdown::signalled;
use crate::observability::metrics;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Rejected,
}

impl Admission {
    pub fn is_allowed(self) -> bool {
        self == Admission::Allowed
    }

    fn label(self) -> &'static str {
        match self {
            Admission::Allowed => "allowed",
            Admission::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ClientRecord {
    request_count: u64,
    last_seen: Instant,
}

/// Shared request counter keyed by client identity.
#[derive(Debug)]
pub struct AdmissionController {
    clients: Mutex<HashMap<String, ClientRecord>>,
    limit: u64,
    window: Duration,
}

impl AdmissionController {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            limit,
            window,
        }
    }

    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self::new(config.limit, Duration::from_secs(config.window_secs))
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count a request from `identity` and decide whether it may proceed.
    pub fn admit(&self, identity: &str) -> Admission {
        self.admit_at(identity, Instant::now())
    }

    /// Same as [`admit`](Self::admit) with an explicit clock reading.
    pub fn admit_at(&self, identity: &str, now: Instant) -> Admission {
        let count = {
            let mut clients = self.lock();
            match clients.get_mut(identity) {
                Some(record) => {
                    // Idle past the window: the sweeper would have dropped it.
                    if now.saturating_duration_since(record.last_seen) > self.window {
                        record.request_count = 0;
                    }
                    record.request_count = record.request_count.saturating_add(1);
                    record.last_seen = now;
                    record.request_count
                }
                None => {
                    clients.insert(
                        identity.to_string(),
                        ClientRecord {
                            request_count: 1,
                            last_seen: now,
                        },
                    );
                    1
                }
            }
        };

        let outcome = if count > self.limit {
            tracing::warn!(client = %identity, count, limit = self.limit, "Admission rejected");
            Admission::Rejected
        } else {
            Admission::Allowed
        };
        metrics::record_admission(outcome.label());
        outcome
    }

    /// Drop every record idle for longer than the window. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, record| now.saturating_duration_since(record.last_seen) <= self.window);
        let evicted = before - clients.len();
        let remaining = clients.len();
        drop(clients);

        if evicted > 0 {
            tracing::debug!(evicted, remaining, "Swept idle admission records");
            metrics::record_admission_evicted(evicted);
        }
        evicted
    }

    /// Current count for `identity`, if it has a live record.
    pub fn request_count(&self, identity: &str) -> Option<u64> {
        self.lock().get(identity).map(|r| r.request_count)
    }

    /// Number of identities with a record.
    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    /// Spawn the periodic sweeper. It exits when `shutdown` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(interval = ?interval, window = ?controller.window, "Admission sweeper starting");
            let start = match Instant::now().checked_add(interval) {
                Some(start) if !interval.is_zero() => start,
                _ => {
                    tracing::warn!(
                        interval = ?interval,
                        "Sweep interval out of range, sweeper not started"
                    );
                    return;
                }
            };
            let mut ticker = time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        controller.sweep();
                    }
                    _ = signalled(&mut shutdown) => {
                        tracing::info!("Admission sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientRecord>> {
        // Records are plain counters, a panic mid-update cannot leave them inconsistent.
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let controller = AdmissionController::new(10, WINDOW);
        let now = Instant::now();

        for i in 0..10 {
            let at = now + Duration::from_millis(i * 50);
            assert_eq!(controller.admit_at("10.0.0.1", at), Admission::Allowed);
        }
        assert_eq!(
            controller.admit_at("10.0.0.1", now + Duration::from_millis(900)),
            Admission::Rejected
        );
    }

    #[test]
    fn rejected_requests_still_count() {
        let controller = AdmissionController::new(1, WINDOW);
        let now = Instant::now();
        controller.admit_at("a", now);
        controller.admit_at("a", now);
        controller.admit_at("a", now);
        assert_eq!(controller.request_count("a"), Some(3));
    }

    #[test]
    fn idle_client_is_admitted_again_after_window() {
        let controller = AdmissionController::new(2, WINDOW);
        let now = Instant::now();
        for _ in 0..3 {
            controller.admit_at("a", now);
        }
        assert_eq!(controller.admit_at("a", now), Admission::Rejected);

        let later = now + WINDOW + Duration::from_millis(1);
        assert_eq!(controller.admit_at("a", later), Admission::Allowed);
        assert_eq!(controller.request_count("a"), Some(1));
    }

    #[test]
    fn activity_keeps_the_window_open() {
        // Count never decays while the client keeps showing up.
        let controller = AdmissionController::new(2, WINDOW);
        let start = Instant::now();
        controller.admit_at("a", start);
        controller.admit_at("a", start + Duration::from_secs(50));
        assert_eq!(
            controller.admit_at("a", start + Duration::from_secs(100)),
            Admission::Rejected
        );
    }

    #[test]
    fn sweep_evicts_only_idle_records() {
        let controller = AdmissionController::new(5, WINDOW);
        let start = Instant::now();
        controller.admit_at("old", start);
        controller.admit_at("fresh", start + Duration::from_secs(30));

        let evicted = controller.sweep_at(start + Duration::from_secs(61));
        assert_eq!(evicted, 1);
        assert_eq!(controller.request_count("old"), None);
        assert_eq!(controller.request_count("fresh"), Some(1));
        assert_eq!(controller.tracked_clients(), 1);
    }

    #[test]
    fn identities_are_isolated_under_concurrency() {
        let controller = Arc::new(AdmissionController::new(50, WINDOW));

        std::thread::scope(|scope| {
            for client in ["a", "b", "c", "d"] {
                let controller = Arc::clone(&controller);
                scope.spawn(move || {
                    for _ in 0..50 {
                        assert_eq!(controller.admit(client), Admission::Allowed);
                    }
                });
            }
        });

        for client in ["a", "b", "c", "d"] {
            assert_eq!(controller.request_count(client), Some(50));
        }
        assert_eq!(controller.admit("a"), Admission::Rejected);
        assert_eq!(controller.request_count("b"), Some(50));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_in_background_and_stops_on_shutdown() {
        let controller = Arc::new(AdmissionController::new(5, WINDOW));
        let (tx, rx) = broadcast::channel(1);
        let handle = controller.spawn_sweeper(Duration::from_secs(1), rx);

        controller.admit("a");
        assert_eq!(controller.tracked_clients(), 1);

        time::sleep(WINDOW + Duration::from_secs(2)).await;
        assert_eq!(controller.tracked_clients(), 0);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_sweep_interval_does_not_panic() {
        let controller = Arc::new(AdmissionController::new(5, WINDOW));
        let (_tx, rx) = broadcast::channel(1);
        controller.spawn_sweeper(Duration::MAX, rx).await.unwrap();

        let (_tx, rx) = broadcast::channel(1);
        controller.spawn_sweeper(Duration::ZERO, rx).await.unwrap();
    }
}
