//! Purchase operations.
//!
//! Defines the `ProductOperation` trait — the pluggable behavior a monitor
//! runs when its price condition is met — and provides the two
//! implementations: immediate purchase (`BuyOperation`) and phased
//! pre-order release (`PreOrderOperation`).

pub mod buy;
pub mod preorder;
pub mod release;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt;

use crate::types::{MonitorError, ProductHandle};

pub use buy::BuyOperation;
pub use preorder::PreOrderOperation;
pub use release::ReleasePipeline;

/// A purchase behavior attached to a monitor.
///
/// Implementations keep their own running statistics and may deactivate
/// themselves; the monitor tolerates a no-op operation and never
/// special-cases one.
#[async_trait]
pub trait ProductOperation: Send + Sync {
    /// Act on a product whose price condition just matched. Failures are
    /// recorded internally *and* surfaced so the caller can log them;
    /// they never oblige the monitor to stop.
    async fn execute(&self, product: &ProductHandle) -> Result<(), MonitorError>;

    /// Running statistics for display.
    fn stats(&self) -> OperationStats;

    /// Whether the operation still intends to act. Default: always.
    fn is_active(&self) -> bool {
        true
    }

    /// Abandon in-progress work at the next cancellation point. Called by
    /// the monitor on stop; the default has nothing to interrupt.
    fn cancel(&self) {}
}

// ---------------------------------------------------------------------------
// Publish mode
// ---------------------------------------------------------------------------

/// How many listings a phased release publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    Single,
    Triple,
}

impl PublishMode {
    pub fn count(self) -> u64 {
        match self {
            PublishMode::Single => 1,
            PublishMode::Triple => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PublishMode::Single => "single release",
            PublishMode::Triple => "triple release",
        }
    }
}

// ---------------------------------------------------------------------------
// Operation statistics
// ---------------------------------------------------------------------------

/// Statistics snapshot reported by an operation.
#[derive(Debug, Clone)]
pub enum OperationStats {
    Buy {
        continuous: bool,
        successes: u64,
        failures: u64,
        total_spent: Decimal,
        completed: bool,
    },
    Release {
        mode: PublishMode,
        attempts: u64,
        successes: u64,
    },
}

impl fmt::Display for OperationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStats::Buy {
                continuous,
                successes,
                failures,
                total_spent,
                completed,
            } => {
                let avg = if *successes > 0 {
                    *total_spent / Decimal::from(*successes)
                } else {
                    Decimal::ZERO
                };
                write!(
                    f,
                    "purchases: mode={} ok={} failed={} spent={:.2} avg={:.2} ({})",
                    if *continuous { "continuous" } else { "single" },
                    successes,
                    failures,
                    total_spent,
                    avg,
                    if *completed { "complete" } else { "active" },
                )
            }
            OperationStats::Release {
                mode,
                attempts,
                successes,
            } => {
                let rate = if *attempts > 0 {
                    *successes as f64 * 100.0 / *attempts as f64
                } else {
                    0.0
                };
                write!(
                    f,
                    "releases: mode={} attempts={}/{} ok={} ({rate:.1}%)",
                    mode.label(),
                    attempts,
                    mode.count(),
                    successes,
                )
            }
        }
    }
}
