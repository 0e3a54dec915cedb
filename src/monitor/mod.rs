//! Per-product monitoring.
//!
//! A `Monitor` owns one `Product` and, while running, exactly one polling
//! task (`worker`). Lifecycle transitions are guarded by an atomic running
//! flag so concurrent `start`/`stop` calls from the control path and the
//! task's own shutdown path are race-free and idempotent.

pub mod registry;
pub(crate) mod worker;

use rust_decimal::Decimal;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, Instrument};

use crate::config::MonitorConfig;
use crate::marketplace::MarketplaceApi;
use crate::observer::ProductObserver;
use crate::ops::ProductOperation;
use crate::types::{Product, ProductHandle};

pub use registry::MonitorRegistry;

// ---------------------------------------------------------------------------
// Lifecycle state
// ---------------------------------------------------------------------------

/// Monitor lifecycle state.
///
/// `Paused` is display-only: the polling task keeps running and only the
/// presented status and run-time accounting change (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Running,
    Paused,
}

impl MonitorState {
    /// Product status string set on entering this state.
    fn status_label(self) -> &'static str {
        match self {
            MonitorState::Stopped => "stopped",
            MonitorState::Running => "watching",
            MonitorState::Paused => "paused",
        }
    }

    /// Message broadcast to observers on entering this state.
    fn announcement(self) -> &'static str {
        match self {
            MonitorState::Stopped => "monitoring stopped",
            MonitorState::Running => "monitoring started",
            MonitorState::Paused => "monitoring paused",
        }
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorState::Stopped => write!(f, "Stopped"),
            MonitorState::Running => write!(f, "Running"),
            MonitorState::Paused => write!(f, "Paused"),
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Monitors one product: polls the marketplace, evaluates the price
/// condition, and drives the attached operation when it matches.
pub struct Monitor {
    product: ProductHandle,
    name: String,
    api: Arc<dyn MarketplaceApi>,

    state: Mutex<MonitorState>,
    /// Single source of truth for "should the loop continue".
    running: AtomicBool,
    stop_signal: Notify,
    task: Mutex<Option<JoinHandle<()>>>,

    operation: Mutex<Option<Arc<dyn ProductOperation>>>,
    observers: Mutex<Vec<Arc<dyn ProductObserver>>>,

    poll_interval_ms: AtomicU64,
    max_retries: AtomicU32,
    retry_delay_ms: AtomicU64,

    check_count: AtomicU64,
    error_count: AtomicU64,
    total_running_ms: AtomicU64,
    started_at: Mutex<Option<Instant>>,
}

impl Monitor {
    pub fn new(product: Product, api: Arc<dyn MarketplaceApi>, cfg: MonitorConfig) -> Self {
        let name = product.name.clone();
        Self {
            product: ProductHandle::new(product),
            name,
            api,
            state: Mutex::new(MonitorState::Stopped),
            running: AtomicBool::new(false),
            stop_signal: Notify::new(),
            task: Mutex::new(None),
            operation: Mutex::new(None),
            observers: Mutex::new(Vec::new()),
            poll_interval_ms: AtomicU64::new(cfg.poll_interval_ms),
            max_retries: AtomicU32::new(cfg.max_retries),
            retry_delay_ms: AtomicU64::new(cfg.retry_delay_ms),
            check_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            total_running_ms: AtomicU64::new(0),
            started_at: Mutex::new(None),
        }
    }

    // -- Lifecycle -------------------------------------------------------

    /// Start the polling task. A no-op if already running; the
    /// compare-and-exchange on the running flag guarantees at most one
    /// task per monitor even under concurrent calls.
    pub fn start(self: &Arc<Self>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        self.transition(MonitorState::Running);
        *self.started_at.lock().expect("started_at lock") = Some(Instant::now());

        let span = tracing::info_span!("monitor", product = %self.name);
        let handle = tokio::spawn(worker::run(Arc::clone(self)).instrument(span));
        *self.task.lock().expect("task lock") = Some(handle);
    }

    /// Request cooperative shutdown of the polling task. Idempotent; the
    /// task unwinds at its next checkpoint (in-flight marketplace calls
    /// are allowed to finish).
    pub fn stop(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        self.stop_signal.notify_waiters();
        // An operation mid-schedule must abandon its remaining attempts
        if let Some(op) = self.operation() {
            op.cancel();
        }
        // Detach; the task observes the flag and exits on its own.
        self.task.lock().expect("task lock").take();
        self.accumulate_runtime();
        self.transition(MonitorState::Stopped);
        info!(product = %self.name, "Monitoring stopped");
    }

    /// Display-only pause: updates presented state and folds the elapsed
    /// run time into the total, but polling continues.
    pub fn pause(&self) {
        if self.running.load(Ordering::SeqCst) {
            self.transition(MonitorState::Paused);
            self.accumulate_runtime();
        }
    }

    /// Equivalent to `start` when not currently running.
    pub fn resume(self: &Arc<Self>) {
        if !self.running.load(Ordering::SeqCst) {
            self.start();
        }
    }

    /// Stop, zero all counters, and return the product to its initial
    /// status. The attached operation is kept.
    pub fn reset(&self) {
        self.stop();
        self.check_count.store(0, Ordering::Relaxed);
        self.error_count.store(0, Ordering::Relaxed);
        self.total_running_ms.store(0, Ordering::Relaxed);
        self.product.set_status("initializing");
        self.notify("monitor reset");
    }

    /// Apply a lifecycle transition: one state write, one product status
    /// update, one observer broadcast.
    fn transition(&self, next: MonitorState) {
        *self.state.lock().expect("state lock") = next;
        self.product.set_status(next.status_label());
        self.notify(next.announcement());
    }

    pub(crate) fn finish_run(&self) {
        self.accumulate_runtime();
        self.transition(MonitorState::Stopped);
    }

    // -- Observers -------------------------------------------------------

    pub fn add_observer(&self, observer: Arc<dyn ProductObserver>) {
        self.observers.lock().expect("observers lock").push(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn ProductObserver>) {
        self.observers
            .lock()
            .expect("observers lock")
            .retain(|o| !Arc::ptr_eq(o, observer));
    }

    /// Broadcast a message with a fresh product snapshot to every
    /// observer. The observer list is cloned first so callbacks never run
    /// under the lock.
    pub fn notify(&self, message: &str) {
        let observers: Vec<_> = self.observers.lock().expect("observers lock").clone();
        if observers.is_empty() {
            return;
        }
        let snapshot = self.product.snapshot();
        for observer in observers {
            observer.on_status(&snapshot, message);
        }
    }

    // -- Operation -------------------------------------------------------

    /// Attach or replace the purchase operation. Does not reset any of the
    /// monitor's own counters.
    pub fn set_operation(&self, operation: Arc<dyn ProductOperation>) {
        *self.operation.lock().expect("operation lock") = Some(operation);
    }

    pub fn operation(&self) -> Option<Arc<dyn ProductOperation>> {
        self.operation.lock().expect("operation lock").clone()
    }

    // -- Live tuning -----------------------------------------------------

    pub fn set_poll_interval(&self, interval: Duration) {
        self.poll_interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
        info!(product = %self.name, interval_ms = interval.as_millis() as u64, "Poll interval updated");
    }

    pub fn set_retry_parameters(&self, max_retries: u32, retry_delay: Duration) {
        self.max_retries.store(max_retries, Ordering::Relaxed);
        self.retry_delay_ms
            .store(retry_delay.as_millis() as u64, Ordering::Relaxed);
        info!(
            product = %self.name,
            max_retries,
            retry_delay_ms = retry_delay.as_millis() as u64,
            "Retry parameters updated"
        );
    }

    /// Update the target price. Non-positive prices are ignored.
    pub fn update_target_price(&self, price: Decimal) {
        if price > Decimal::ZERO {
            self.product.set_target_price(price);
            self.notify(&format!("target price updated to {price:.2}"));
        }
    }

    // -- Accessors -------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> MonitorState {
        *self.state.lock().expect("state lock")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn product(&self) -> &ProductHandle {
        &self.product
    }

    pub(crate) fn api(&self) -> &Arc<dyn MarketplaceApi> {
        &self.api
    }

    pub fn check_count(&self) -> u64 {
        self.check_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub(crate) fn record_check(&self) {
        self.check_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.load(Ordering::Relaxed))
    }

    pub(crate) fn max_retries(&self) -> u32 {
        self.max_retries.load(Ordering::Relaxed)
    }

    pub(crate) fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms.load(Ordering::Relaxed))
    }

    /// Sleep for `dur` unless a stop request arrives first. Returns false
    /// when the loop should unwind.
    pub(crate) async fn wait_or_stop(&self, dur: Duration) -> bool {
        if !self.is_running() {
            return false;
        }
        tokio::select! {
            _ = self.stop_signal.notified() => false,
            _ = tokio::time::sleep(dur) => self.is_running(),
        }
    }

    // -- Run time accounting ---------------------------------------------

    /// Fold the elapsed run time of the current segment into the total.
    /// Safe to call from both the control path and the task's exit path:
    /// the start instant is taken exactly once.
    fn accumulate_runtime(&self) {
        if let Some(started) = self.started_at.lock().expect("started_at lock").take() {
            self.total_running_ms
                .fetch_add(started.elapsed().as_millis() as u64, Ordering::Relaxed);
        }
    }

    /// Total running time, including the live segment if running.
    pub fn running_time(&self) -> Duration {
        let mut total = self.total_running_ms.load(Ordering::Relaxed);
        if let Some(started) = *self.started_at.lock().expect("started_at lock") {
            total += started.elapsed().as_millis() as u64;
        }
        Duration::from_millis(total)
    }

    // -- Statistics ------------------------------------------------------

    pub fn stats(&self) -> MonitorStats {
        let snapshot = self.product.snapshot();
        MonitorStats {
            name: snapshot.name,
            target_price: snapshot.target_price,
            current_price: snapshot.current_price,
            status: snapshot.status,
            state: self.state(),
            checks: self.check_count(),
            errors: self.error_count(),
            running_time: self.running_time(),
        }
    }

    /// Human-readable summary of the monitor plus its operation, if any.
    pub fn summary(&self) -> String {
        let mut out = self.stats().to_string();
        if let Some(op) = self.operation() {
            out.push('\n');
            out.push_str(&op.stats().to_string());
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Read-only snapshot of a monitor's counters and derived metrics.
#[derive(Debug, Clone)]
pub struct MonitorStats {
    pub name: String,
    pub target_price: Decimal,
    pub current_price: Decimal,
    pub status: String,
    pub state: MonitorState,
    pub checks: u64,
    pub errors: u64,
    pub running_time: Duration,
}

impl MonitorStats {
    /// Errors as a percentage of checks; 0 when nothing has been checked.
    pub fn error_rate(&self) -> f64 {
        if self.checks == 0 {
            return 0.0;
        }
        self.errors as f64 * 100.0 / self.checks as f64
    }
}

fn format_running_time(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

impl fmt::Display for MonitorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: state={} target={:.2} current={:.2} status={} checks={} errors={} ({:.2}%) uptime={}",
            self.name,
            self.state,
            self.target_price,
            self.current_price,
            self.status,
            self.checks,
            self.errors,
            self.error_rate(),
            format_running_time(self.running_time),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::MockMarketplaceApi;
    use crate::observer::ChannelObserver;
    use rust_decimal_macros::dec;

    fn test_cfg() -> MonitorConfig {
        MonitorConfig {
            poll_interval_ms: 100,
            max_retries: 2,
            retry_delay_ms: 50,
        }
    }

    fn idle_monitor(name: &str) -> Arc<Monitor> {
        let api = MockMarketplaceApi::new();
        Arc::new(Monitor::new(
            Product::new(name, dec!(100)),
            Arc::new(api),
            test_cfg(),
        ))
    }

    fn polling_monitor(name: &str) -> Arc<Monitor> {
        let mut api = MockMarketplaceApi::new();
        api.expect_search().returning(|_| Ok(Vec::new()));
        Arc::new(Monitor::new(
            Product::new(name, dec!(100)),
            Arc::new(api),
            test_cfg(),
        ))
    }

    #[test]
    fn test_initial_state() {
        let m = idle_monitor("widget");
        assert_eq!(m.state(), MonitorState::Stopped);
        assert!(!m.is_running());
        assert_eq!(m.check_count(), 0);
        assert_eq!(m.error_count(), 0);
        assert_eq!(m.running_time(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let m = polling_monitor("widget");
        let (obs, mut rx) = ChannelObserver::new();
        m.add_observer(Arc::new(obs));

        m.start();
        m.start();
        tokio::task::yield_now().await;

        assert!(m.is_running());
        assert_eq!(m.state(), MonitorState::Running);

        m.stop();
        tokio::task::yield_now().await;

        let mut started = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.message == "monitoring started" {
                started += 1;
            }
        }
        assert_eq!(started, 1, "second start must not broadcast again");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let m = polling_monitor("widget");
        m.start();
        tokio::time::sleep(Duration::from_millis(250)).await;

        m.stop();
        let after_first = m.running_time();
        m.stop();
        m.stop();

        assert!(!m.is_running());
        assert_eq!(m.state(), MonitorState::Stopped);
        // Run time accumulated exactly once
        assert_eq!(m.running_time(), after_first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_equals_start_when_stopped() {
        let m = polling_monitor("widget");
        m.resume();
        assert!(m.is_running());
        m.resume(); // already running: no-op
        assert!(m.is_running());
        m.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_is_display_only() {
        let m = polling_monitor("widget");
        m.start();
        tokio::task::yield_now().await;

        m.pause();
        assert_eq!(m.state(), MonitorState::Paused);
        // The running flag never flips on pause
        assert!(m.is_running());
        assert_eq!(m.product().snapshot().status, "paused");

        m.stop();
    }

    #[test]
    fn test_pause_requires_running() {
        let m = idle_monitor("widget");
        m.pause();
        assert_eq!(m.state(), MonitorState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_zeros_counters() {
        let m = polling_monitor("widget");
        m.start();
        tokio::time::sleep(Duration::from_millis(350)).await;
        m.reset();

        assert!(!m.is_running());
        assert_eq!(m.check_count(), 0);
        assert_eq!(m.error_count(), 0);
        assert_eq!(m.running_time(), Duration::ZERO);
        assert_eq!(m.product().snapshot().status, "initializing");
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_tuning_applies_to_running_loop() {
        let m = polling_monitor("widget");
        m.start();
        tokio::time::sleep(Duration::from_millis(450)).await;
        let before = m.check_count();
        assert!(before >= 3);

        m.set_poll_interval(Duration::from_secs(3600));
        m.set_retry_parameters(7, Duration::from_millis(900));
        tokio::time::sleep(Duration::from_secs(10)).await;

        // At most the in-flight iteration lands after the interval change
        assert!(m.check_count() <= before + 2);
        assert_eq!(m.max_retries(), 7);
        assert_eq!(m.retry_delay(), Duration::from_millis(900));

        m.stop();
    }

    #[test]
    fn test_update_target_price_ignores_non_positive() {
        let m = idle_monitor("widget");
        m.update_target_price(dec!(0));
        assert_eq!(m.product().target_price(), dec!(100));
        m.update_target_price(dec!(-5));
        assert_eq!(m.product().target_price(), dec!(100));
        m.update_target_price(dec!(80));
        assert_eq!(m.product().target_price(), dec!(80));
    }

    #[test]
    fn test_observer_add_remove() {
        let m = idle_monitor("widget");
        let (obs, mut rx) = ChannelObserver::new();
        let obs: Arc<dyn ProductObserver> = Arc::new(obs);

        m.add_observer(Arc::clone(&obs));
        m.notify("hello");
        assert_eq!(rx.try_recv().unwrap().message, "hello");

        m.remove_observer(&obs);
        m.notify("gone");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_error_rate_zero_when_no_checks() {
        let m = idle_monitor("widget");
        assert_eq!(m.stats().error_rate(), 0.0);
    }

    #[test]
    fn test_error_rate_formula() {
        let stats = MonitorStats {
            name: "widget".into(),
            target_price: dec!(100),
            current_price: dec!(95),
            status: "watching".into(),
            state: MonitorState::Running,
            checks: 8,
            errors: 2,
            running_time: Duration::from_secs(3_725),
        };
        assert!((stats.error_rate() - 25.0).abs() < 1e-9);
        let rendered = stats.to_string();
        assert!(rendered.contains("checks=8"));
        assert!(rendered.contains("uptime=1h2m5s"));
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(MonitorState::Running.status_label(), "watching");
        assert_eq!(MonitorState::Stopped.announcement(), "monitoring stopped");
        assert_eq!(MonitorState::Paused.to_string(), "Paused");
    }
}
