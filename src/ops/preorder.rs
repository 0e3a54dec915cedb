//! Phased pre-order release operation.
//!
//! Instead of consuming an existing offer, publishes new pre-order
//! listings at the product's target price — once or three times depending
//! on the publish mode, with a fixed pacing delay between attempt starts.
//! Attempts are independent: one failing never shortens the schedule.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::release::{ReleasePipeline, PUBLISH_PACING};
use super::{OperationStats, ProductOperation, PublishMode};
use crate::marketplace::MarketplaceApi;
use crate::types::{MonitorError, ProductHandle};

pub struct PreOrderOperation {
    pipeline: ReleasePipeline,
    mode: PublishMode,

    /// Cleared once the configured attempt count has run; later `execute`
    /// calls are no-ops. The monitor keeps polling regardless.
    active: AtomicBool,
    /// Wakes the pacing sleep when the schedule is cancelled mid-run.
    cancelled: Notify,
    attempts: AtomicU64,
    successes: AtomicU64,
}

impl PreOrderOperation {
    pub fn new(api: Arc<dyn MarketplaceApi>, delay_hours: i64, mode: PublishMode) -> Self {
        Self {
            pipeline: ReleasePipeline::new(api, delay_hours),
            mode,
            active: AtomicBool::new(true),
            cancelled: Notify::new(),
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> PublishMode {
        self.mode
    }

    pub fn attempt_count(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn success_count(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Stop publishing early; an in-flight remote call is not interrupted.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Pacing sleep between attempts, cut short by `cancel`. Returns false
    /// when the schedule should not continue.
    async fn pace(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        debug!(
            wait_secs = PUBLISH_PACING.as_secs(),
            "Pacing before next publish attempt"
        );
        tokio::select! {
            _ = self.cancelled.notified() => false,
            _ = tokio::time::sleep(PUBLISH_PACING) => self.is_active(),
        }
    }
}

#[async_trait]
impl ProductOperation for PreOrderOperation {
    async fn execute(&self, product: &ProductHandle) -> Result<(), MonitorError> {
        if !self.is_active() {
            debug!("Release schedule already complete, skipping");
            return Ok(());
        }

        let name = product.name();
        let price = product.target_price();
        let total = self.mode.count();

        for attempt in 1..=total {
            if attempt > 1 && !self.pace().await {
                let attempted = self.attempt_count();
                warn!(attempted, total, "Release schedule cancelled");
                product.set_status(format!(
                    "publishing cancelled after {attempted}/{total} attempts"
                ));
                return Ok(());
            }

            self.attempts.fetch_add(1, Ordering::Relaxed);
            product.set_status(format!("publishing ({attempt}/{total})"));

            match self.pipeline.publish_once(&name, price).await {
                Ok(goods_id) => {
                    self.successes.fetch_add(1, Ordering::Relaxed);
                    info!(attempt, total, goods_id, "Publish attempt succeeded");
                }
                Err(e) => {
                    warn!(attempt, total, error = %e, "Publish attempt failed");
                    product.set_status(format!("publish attempt {attempt}/{total} failed: {e}"));
                }
            }
        }

        self.deactivate();
        let succeeded = self.success_count();
        product.set_status(format!("publishing complete: {succeeded}/{total} succeeded"));
        info!(succeeded, total, "Release schedule complete");
        Ok(())
    }

    fn stats(&self) -> OperationStats {
        OperationStats::Release {
            mode: self.mode,
            attempts: self.attempt_count(),
            successes: self.success_count(),
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.deactivate();
        self.cancelled.notify_waiters();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::MockMarketplaceApi;
    use crate::types::{ArchiveInfo, Offer, Product};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn archive_info() -> ArchiveInfo {
        ArchiveInfo {
            archive_id: 17,
            archive_name: "Genesis Card".into(),
            platform_id: 741,
            platform_name: "MetaShelf".into(),
            issue_time: "2026-01-15 10:00:00".into(),
            ..Default::default()
        }
    }

    /// Mock that answers the whole protocol and records when each attempt
    /// started (search is the first step of every attempt).
    fn scripted_api(attempt_starts: Arc<Mutex<Vec<Instant>>>, fail_pre_order: bool) -> MockMarketplaceApi {
        let mut api = MockMarketplaceApi::new();
        api.expect_search().returning(move |_| {
            attempt_starts.lock().unwrap().push(Instant::now());
            Ok(vec![Offer {
                price: dec!(900),
                min_price_goods_id: 1,
                archive_id: 17,
            }])
        });
        api.expect_get_archive_info().returning(|_| Ok(archive_info()));
        if fail_pre_order {
            api.expect_create_pre_order().returning(|_| {
                Err(MonitorError::Api {
                    code: 500,
                    message: "pre-order creation failed: busy".into(),
                })
            });
        } else {
            api.expect_create_pre_order()
                .returning(|_| Ok("KEY".to_string()));
        }
        api.expect_create_listing().returning(|_, _| Ok(555));
        api.expect_confirm_publication().returning(|_| Ok(()));
        api
    }

    fn product() -> ProductHandle {
        ProductHandle::new(Product::new("Genesis Card", dec!(1000)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_triple_mode_paces_three_attempts() {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let api = scripted_api(Arc::clone(&starts), false);
        let op = PreOrderOperation::new(Arc::new(api), 5, PublishMode::Triple);
        let product = product();

        op.execute(&product).await.unwrap();

        assert_eq!(op.attempt_count(), 3);
        assert_eq!(op.success_count(), 3);
        assert!(!op.is_active());

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 3);
        // First attempt unpaced; each later attempt ≥12s after the previous
        assert!(starts[1] - starts[0] >= PUBLISH_PACING);
        assert!(starts[2] - starts[1] >= PUBLISH_PACING);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_never_shorten_the_schedule() {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let api = scripted_api(Arc::clone(&starts), true);
        let op = PreOrderOperation::new(Arc::new(api), 5, PublishMode::Triple);
        let product = product();

        op.execute(&product).await.unwrap();

        assert_eq!(op.attempt_count(), 3);
        assert_eq!(op.success_count(), 0);
        assert!(!op.is_active());
        assert_eq!(
            product.snapshot().status,
            "publishing complete: 0/3 succeeded"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_mode_runs_once_then_noops() {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let api = scripted_api(Arc::clone(&starts), false);
        let op = PreOrderOperation::new(Arc::new(api), 5, PublishMode::Single);
        let product = product();

        op.execute(&product).await.unwrap();
        op.execute(&product).await.unwrap();

        // Second execute was a no-op: one attempt total
        assert_eq!(op.attempt_count(), 1);
        assert_eq!(starts.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_pacing() {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let api = scripted_api(Arc::clone(&starts), false);
        let op = Arc::new(PreOrderOperation::new(Arc::new(api), 5, PublishMode::Triple));
        let product = product();

        let runner = {
            let op = Arc::clone(&op);
            let product = product.clone();
            tokio::spawn(async move { op.execute(&product).await })
        };
        // Let the first attempt finish and the 12s pacing sleep begin
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        op.cancel();
        runner.await.unwrap().unwrap();

        // Attempts two and three were abandoned without waiting out the gap
        assert_eq!(op.attempt_count(), 1);
        assert_eq!(starts.lock().unwrap().len(), 1);
        assert!(product
            .snapshot()
            .status
            .contains("publishing cancelled after 1/3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deactivate_short_circuits() {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let api = scripted_api(Arc::clone(&starts), false);
        let op = PreOrderOperation::new(Arc::new(api), 5, PublishMode::Triple);

        op.deactivate();
        op.execute(&product()).await.unwrap();
        assert_eq!(op.attempt_count(), 0);
    }
}
