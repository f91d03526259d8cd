//! The scheduler: check every target in turn and report transitions.
//!
//! # Cycle
//!
//! 1. Fetch the target's page, with retries
//! 2. Run the target's detection strategy on the body
//! 3. Record the signal and compare it with the previous one
//! 4. Notify when the `active` flag changed
//!
//! Targets are checked one after another with a pacing delay in between.
//! Cycles are serialized, so the manual trigger and the schedule can never run
//! two at once.

use crate::config::{Config, Timing};
use crate::detect::detect;
use crate::fetch::{PageFetch, Retrying};
use crate::models::{BaselinePolicy, Signal, Target, TargetStatus};
use crate::notify::Notify;
use crate::state::StateStore;
use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

/// Owns the targets, their state and the two outbound seams.
///
/// Shared behind an `Arc` by the scheduler loop ([`Monitor::run`]) and the
/// trigger server. Every entry point that checks pages goes through
/// [`Monitor::run_cycle`], which holds the cycle lock for its whole duration.
pub struct Monitor<F, N> {
    targets: Vec<Target>,
    timing: Timing,
    baseline: BaselinePolicy,
    fetcher: Retrying<F>,
    notifier: N,
    states: Mutex<StateStore>,
    /// Held for the whole of a cycle.
    cycle: Mutex<()>,
}

impl<F, N> Monitor<F, N>
where
    F: PageFetch + Sync,
    N: Notify + Sync,
{
    /// Build a monitor; `fetcher` is wrapped with the configured retry policy.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated targets, timing and baseline policy
    /// * `fetcher` - Single-attempt page fetcher
    /// * `notifier` - Where transition, failure and lifecycle messages go
    ///
    /// # Returns
    ///
    /// A monitor with no target checked yet.
    pub fn new(config: Config, fetcher: F, notifier: N) -> Self {
        let Config {
            baseline,
            timing,
            targets,
        } = config;
        let fetcher = Retrying::new(fetcher, timing.max_attempts, timing.retry_delay());
        let states = Mutex::new(StateStore::new(&targets));
        Self {
            targets,
            timing,
            baseline,
            fetcher,
            notifier,
            states,
            cycle: Mutex::new(()),
        }
    }

    /// Current state of every target, in configuration order.
    ///
    /// Does not wait for a running cycle; targets already checked in it show
    /// their new state.
    pub async fn snapshot(&self) -> Vec<TargetStatus> {
        self.states.lock().await.snapshot(&self.targets)
    }

    /// Check every target once.
    ///
    /// Waits for any cycle already in progress to finish first. Targets are
    /// checked in configuration order with the pacing delay between two
    /// consecutive targets, not after the last one. A target whose fetch fails
    /// is reported and skipped; the cycle itself never fails.
    #[instrument(level = "info", skip_all)]
    pub async fn run_cycle(&self) {
        let _cycle = self.cycle.lock().await;
        let t0 = Instant::now();
        info!(targets = self.targets.len(), "Cycle started");

        for (i, target) in self.targets.iter().enumerate() {
            if i > 0 {
                sleep(self.timing.pacing()).await;
            }
            self.check_target(target).await;
        }

        info!(elapsed_ms = t0.elapsed().as_millis() as u64, "Cycle finished");
    }

    #[instrument(level = "info", skip_all, fields(label = %target.label))]
    async fn check_target(&self, target: &Target) {
        let body = match self.fetcher.fetch(target).await {
            Ok(body) => body,
            Err(e) => {
                // State stays as it was; the next cycle tries again.
                self.notifier.notify(&format!("🚨 {e}")).await;
                return;
            }
        };

        let signal = detect(&body, &target.detection);
        let observation = self
            .states
            .lock()
            .await
            .record(&target.url, signal, Utc::now());

        info!(
            count = signal.count,
            threshold = ?target.threshold(),
            active = signal.active,
            ?observation,
            "Target checked"
        );

        if observation.should_notify(self.baseline) {
            self.notifier
                .notify(&transition_message(target, signal))
                .await;
        } else {
            debug!("No notification needed");
        }
    }

    /// Announce start, run one cycle right away, then keep cycling.
    ///
    /// Each cycle begins `interval` after the previous one began, or right
    /// after it ended when it overran.
    ///
    /// # Arguments
    ///
    /// * `shutdown` - The loop returns once this turns `true` or its sender
    ///   is dropped. A cycle already running is not interrupted by it.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        self.announce_start().await;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            self.run_cycle().await;
            let remaining = self.timing.interval().saturating_sub(started.elapsed());
            debug!(?remaining, "Waiting for next cycle");

            tokio::select! {
                _ = sleep(remaining) => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }
        info!("Scheduler stopped");
    }

    /// Send the startup message with the target count and interval.
    pub async fn announce_start(&self) {
        info!(
            targets = self.targets.len(),
            interval_secs = self.timing.interval_secs,
            "Monitor starting"
        );
        self.notifier
            .notify(&format!(
                "🤖 Listing monitor started: {} target(s), checked every {}s.",
                self.targets.len(),
                self.timing.interval_secs
            ))
            .await;
    }

    /// Send the stop message.
    ///
    /// Waits for a cycle in progress to finish, so nothing that cycle reports
    /// can arrive after the stop message. Stop or abort the scheduler loop
    /// first, or this may wait behind its next cycle as well.
    pub async fn announce_stop(&self) {
        let _cycle = self.cycle.lock().await;
        warn!("Monitor stopping");
        self.notifier.notify("🛑 Listing monitor stopped.").await;
    }
}

/// Message for a target whose `active` flag just took the value in `signal`.
pub fn transition_message(target: &Target, signal: Signal) -> String {
    match (target.threshold(), signal.active) {
        (Some(threshold), true) => format!(
            "🏠 {}: {} listings detected (threshold {})\n{}",
            target.label, signal.count, threshold, target.url
        ),
        (Some(threshold), false) => format!(
            "📉 {}: listings dropped to {} ({} required)\n{}",
            target.label, signal.count, threshold, target.url
        ),
        (None, true) => format!("🏠 {}: listings available\n{}", target.label, target.url),
        (None, false) => format!("📉 {}: no listings right now\n{}", target.label, target.url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::models::{DEFAULT_MARKER, Detection};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Serves canned bodies per URL; a URL mapped to `None` always fails.
    #[derive(Default)]
    struct FakePages {
        pages: StdMutex<HashMap<String, Option<String>>>,
        calls: StdMutex<Vec<String>>,
    }

    impl FakePages {
        fn set(&self, url: &str, body: Option<String>) {
            self.pages.lock().unwrap().insert(url.to_string(), body);
        }
    }

    impl PageFetch for Arc<FakePages> {
        async fn get(&self, url: &str) -> Result<String, BoxError> {
            self.calls.lock().unwrap().push(url.to_string());
            let page = self.pages.lock().unwrap().get(url).cloned().flatten();
            page.ok_or_else(|| "connection refused".into())
        }
    }

    #[derive(Default, Clone)]
    struct Outbox(Arc<StdMutex<Vec<String>>>);

    impl Outbox {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    impl Notify for Outbox {
        async fn notify(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    const A: &str = "https://example.com/a";
    const B: &str = "https://example.com/b";

    fn cards(n: usize) -> Option<String> {
        Some(format!("<div class=\"{}\"></div>", DEFAULT_MARKER).repeat(n))
    }

    fn config(baseline: BaselinePolicy) -> Config {
        let target = |url: &str, label: &str, threshold| Target {
            url: url.to_string(),
            label: label.to_string(),
            detection: Detection::MarkerCount {
                marker: DEFAULT_MARKER.to_string(),
                threshold,
            },
        };
        Config {
            baseline,
            timing: Timing {
                interval_secs: 1,
                request_timeout_secs: 1,
                max_attempts: 2,
                retry_delay_ms: 0,
                pacing_ms: 0,
            },
            targets: vec![target(A, "Alpha", 5), target(B, "Beta", 1)],
        }
    }

    fn monitor(baseline: BaselinePolicy) -> (Monitor<Arc<FakePages>, Outbox>, Arc<FakePages>, Outbox) {
        let pages = Arc::new(FakePages::default());
        let outbox = Outbox::default();
        let monitor = Monitor::new(config(baseline), pages.clone(), outbox.clone());
        (monitor, pages, outbox)
    }

    #[tokio::test]
    async fn test_silent_baseline_then_single_transition() {
        let (monitor, pages, outbox) = monitor(BaselinePolicy::Silent);
        pages.set(A, cards(0));
        pages.set(B, cards(0));

        monitor.run_cycle().await;
        assert!(outbox.take().is_empty(), "baseline must be silent");

        monitor.run_cycle().await;
        assert!(outbox.take().is_empty(), "false -> false must be silent");

        pages.set(A, cards(6));
        monitor.run_cycle().await;
        let sent = outbox.take();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Alpha"));
        assert!(sent[0].contains(A));
        assert!(sent[0].contains("6 listings"));

        monitor.run_cycle().await;
        assert!(outbox.take().is_empty());

        pages.set(A, cards(4));
        monitor.run_cycle().await;
        let sent = outbox.take();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("dropped to 4 (5 required)"));
    }

    #[tokio::test]
    async fn test_announce_baseline_reports_first_check() {
        let (monitor, pages, outbox) = monitor(BaselinePolicy::Announce);
        pages.set(A, cards(6));
        pages.set(B, cards(0));

        monitor.run_cycle().await;
        let sent = outbox.take();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].starts_with("🏠 Alpha"));
        assert!(sent[1].starts_with("📉 Beta"));

        monitor.run_cycle().await;
        assert!(outbox.take().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_reports_and_continues() {
        let (monitor, pages, outbox) = monitor(BaselinePolicy::Silent);
        pages.set(A, None);
        pages.set(B, cards(1));

        monitor.run_cycle().await;

        let sent = outbox.take();
        assert_eq!(sent, vec![format!("🚨 cannot verify Alpha after 2 attempts: {A}")]);

        let calls = pages.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![A.to_string(), A.to_string(), B.to_string()]);

        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot[0].state.last_signal, None);
        assert!(snapshot[0].state.last_checked_at.is_none());
        assert_eq!(snapshot[1].state.last_signal, Some(true));
        assert_eq!(snapshot[1].state.last_count, 1);
    }

    #[tokio::test]
    async fn test_failed_cycle_does_not_advance_state() {
        let (monitor, pages, outbox) = monitor(BaselinePolicy::Silent);
        pages.set(A, cards(0));
        pages.set(B, cards(1));
        monitor.run_cycle().await;

        pages.set(A, None);
        monitor.run_cycle().await;
        assert_eq!(outbox.take().len(), 1);

        // Still compared against the last successful check (inactive).
        pages.set(A, cards(5));
        monitor.run_cycle().await;
        let sent = outbox.take();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Alpha"));
    }

    #[tokio::test]
    async fn test_concurrent_cycles_are_serialized() {
        let (monitor, pages, _outbox) = monitor(BaselinePolicy::Silent);
        pages.set(A, cards(1));
        pages.set(B, cards(1));

        tokio::join!(monitor.run_cycle(), monitor.run_cycle());

        let calls = pages.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![A, B, A, B]);
    }

    #[tokio::test]
    async fn test_run_announces_and_stops_on_shutdown() {
        let (monitor, pages, outbox) = monitor(BaselinePolicy::Silent);
        pages.set(A, cards(0));
        pages.set(B, cards(0));
        let (tx, rx) = watch::channel(false);

        let stopper = async {
            // First cycle runs immediately, then the loop sleeps for the interval.
            sleep(Duration::from_millis(200)).await;
            tx.send(true).unwrap();
        };
        tokio::join!(monitor.run(rx), stopper);

        let sent = outbox.take();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("monitor started"));
        assert_eq!(pages.calls.lock().unwrap().len(), 2);

        monitor.announce_stop().await;
        assert_eq!(outbox.take(), vec!["🛑 Listing monitor stopped.".to_string()]);
    }

    fn paced(
        pacing_ms: u64,
        retry_delay_ms: u64,
        interval_secs: u64,
    ) -> (Monitor<Arc<FakePages>, Outbox>, Arc<FakePages>) {
        let pages = Arc::new(FakePages::default());
        let mut config = config(BaselinePolicy::Silent);
        config.timing = Timing {
            interval_secs,
            request_timeout_secs: 1,
            max_attempts: 3,
            retry_delay_ms,
            pacing_ms,
        };
        let monitor = Monitor::new(config, pages.clone(), Outbox::default());
        (monitor, pages)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_only_between_targets() {
        let (monitor, pages) = paced(2000, 0, 60);
        pages.set(A, cards(1));
        pages.set(B, cards(1));

        let t0 = Instant::now();
        monitor.run_cycle().await;
        let elapsed = t0.elapsed();

        // Two targets: one pause between them, none after Beta.
        assert!(elapsed >= Duration::from_millis(2000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(2100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_target_waits_between_attempts_then_moves_on() {
        let (monitor, pages) = paced(0, 1500, 60);
        pages.set(A, None);
        pages.set(B, cards(1));

        let t0 = Instant::now();
        monitor.run_cycle().await;
        let elapsed = t0.elapsed();

        // Three attempts on Alpha: two delays, none after the last failure.
        assert!(elapsed >= Duration::from_millis(3000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(3100), "{elapsed:?}");
        assert_eq!(pages.calls.lock().unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_starts_next_cycle_after_interval() {
        let (monitor, pages) = paced(0, 0, 60);
        pages.set(A, cards(0));
        pages.set(B, cards(0));
        let (tx, rx) = watch::channel(false);

        let observer = async {
            sleep(Duration::from_secs(59)).await;
            assert_eq!(pages.calls.lock().unwrap().len(), 2, "second cycle too early");
            sleep(Duration::from_secs(2)).await;
            assert_eq!(pages.calls.lock().unwrap().len(), 4, "second cycle missing");
            tx.send(true).unwrap();
        };
        tokio::join!(monitor.run(rx), observer);

        assert_eq!(pages.calls.lock().unwrap().len(), 4);
    }

    #[derive(Default, Clone)]
    struct SlowOutbox(Outbox);

    impl Notify for SlowOutbox {
        async fn notify(&self, message: &str) {
            sleep(Duration::from_millis(300)).await;
            self.0.notify(message).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_message_comes_after_running_cycle() {
        let pages = Arc::new(FakePages::default());
        let outbox = SlowOutbox::default();
        let monitor = Monitor::new(config(BaselinePolicy::Announce), pages.clone(), outbox.clone());
        pages.set(A, cards(6));
        pages.set(B, None);

        let stop = async {
            sleep(Duration::from_millis(10)).await;
            monitor.announce_stop().await;
        };
        tokio::join!(monitor.run_cycle(), stop);

        let sent = outbox.0.take();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].starts_with("🏠 Alpha"));
        assert!(sent[1].starts_with("🚨"));
        assert_eq!(sent[2], "🛑 Listing monitor stopped.");
    }

    #[test]
    fn test_transition_message_without_threshold() {
        let target = Target {
            url: A.to_string(),
            label: "Alpha".to_string(),
            detection: Detection::PhraseAbsence {
                phrase: "Nenhum".to_string(),
            },
        };
        let up = transition_message(&target, Signal { active: true, count: 1 });
        assert_eq!(up, format!("🏠 Alpha: listings available\n{A}"));
        let down = transition_message(&target, Signal { active: false, count: 0 });
        assert!(down.contains("no listings"));
    }
}
