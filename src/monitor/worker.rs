//! The poll-evaluate-act loop.
//!
//! Runs as one task per started monitor. Cooperative at the granularity
//! of a full iteration: the running flag is checked at every checkpoint
//! and the inter-poll sleep is interruptible, so `stop` takes effect at
//! the next checkpoint without abandoning an in-flight call.

use tracing::{info, warn};

use super::Monitor;
use crate::types::MonitorError;

/// Task body spawned by `Monitor::start`.
pub(crate) async fn run(monitor: std::sync::Arc<Monitor>) {
    info!("Polling task started");

    while monitor.is_running() {
        match poll_once(&monitor).await {
            Ok(()) => {
                monitor.record_check();
                if !monitor.wait_or_stop(monitor.poll_interval()).await {
                    break;
                }
            }
            Err(e) => {
                monitor.record_error();
                warn!(error = %e, "Poll iteration failed");
                monitor.notify(&format!("monitor error: {e}"));
                if e.is_retryable() {
                    retry_pass(&monitor).await;
                }
                // Errors never shorten the cadence: the next regular poll
                // still waits out the full interval.
                if !monitor.wait_or_stop(monitor.poll_interval()).await {
                    break;
                }
            }
        }
    }

    monitor.finish_run();
    info!("Polling task exited");
}

/// One full search → evaluate → act pass.
///
/// An empty search result is not an error: it broadcasts "not found" and
/// yields back to the scheduler. The first candidate is authoritative;
/// tie-breaking is the marketplace's job.
async fn poll_once(monitor: &Monitor) -> Result<(), MonitorError> {
    if !monitor.is_running() {
        return Ok(());
    }

    let product = monitor.product();
    let name = product.name();

    let offers = monitor.api().search(&name).await?;
    let Some(first) = offers.first() else {
        monitor.notify("product not found");
        return Ok(());
    };

    product.record_offer(first);
    monitor.notify(&format!("current price: {:.2}", first.price));

    if product.current_price() > product.target_price() {
        product.set_status("waiting");
        return Ok(());
    }

    if let Some(op) = monitor.operation() {
        product.set_status("executing operation");
        op.execute(product).await?;
    }

    Ok(())
}

/// Bounded retry after a failed iteration: up to `max_retries` re-attempts
/// of the full pass, each preceded by a constant delay. Returns on the
/// first success; exhaustion is reported but not fatal — the outer loop
/// simply polls again on schedule.
async fn retry_pass(monitor: &Monitor) {
    let max = monitor.max_retries();
    let delay = monitor.retry_delay();
    let mut failures = 0u32;

    while failures < max && monitor.is_running() {
        if !monitor.wait_or_stop(delay).await {
            return;
        }

        monitor.notify(&format!("retry {}/{max}", failures + 1));
        match poll_once(monitor).await {
            Ok(()) => return,
            Err(e) => {
                failures += 1;
                monitor.record_error();
                warn!(attempt = failures, max, error = %e, "Retry failed");
                if !e.is_retryable() {
                    return;
                }
            }
        }
    }

    if failures >= max {
        warn!(max, "Retries exhausted, returning to normal polling");
        monitor.notify("retries exhausted");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
