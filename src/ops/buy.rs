//! Immediate purchase operation.
//!
//! Buys the first qualifying offer via the order endpoint. Single mode
//! permanently disables itself after the first recorded success;
//! continuous mode keeps buying every time the price condition matches.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::{OperationStats, ProductOperation};
use crate::marketplace::MarketplaceApi;
use crate::types::{MonitorError, ProductHandle};

pub struct BuyOperation {
    api: Arc<dyn MarketplaceApi>,
    /// Delivery address chosen by the caller. Required before any order.
    address_id: Option<u64>,
    continuous: bool,

    has_bought: AtomicBool,
    successes: AtomicU64,
    failures: AtomicU64,
    total_spent: Mutex<Decimal>,
}

impl BuyOperation {
    pub fn new(api: Arc<dyn MarketplaceApi>, continuous: bool, address_id: Option<u64>) -> Self {
        Self {
            api,
            address_id,
            continuous,
            has_bought: AtomicBool::new(false),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            total_spent: Mutex::new(Decimal::ZERO),
        }
    }

    fn mode_label(&self) -> &'static str {
        if self.continuous {
            "continuous purchase"
        } else {
            "single purchase"
        }
    }

    pub fn success_count(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn total_spent(&self) -> Decimal {
        *self.total_spent.lock().expect("total_spent lock")
    }

    pub fn has_bought(&self) -> bool {
        self.has_bought.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductOperation for BuyOperation {
    async fn execute(&self, product: &ProductHandle) -> Result<(), MonitorError> {
        // Idempotent guard: a completed single purchase never buys again.
        if !self.continuous && self.has_bought() {
            debug!("Single purchase already complete, skipping");
            return Ok(());
        }

        let snapshot = product.snapshot();

        let address_id = match self.address_id {
            Some(id) => id,
            None => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                product.set_status("purchase failed");
                return Err(MonitorError::Precondition(
                    "no delivery address selected".into(),
                ));
            }
        };

        info!(
            mode = self.mode_label(),
            price = %snapshot.current_price,
            target = %snapshot.target_price,
            goods_id = snapshot.min_price_goods_id,
            "Attempting purchase"
        );

        match self
            .api
            .create_order(snapshot.min_price_goods_id, address_id)
            .await
        {
            Ok(receipt) => {
                self.has_bought.store(true, Ordering::SeqCst);
                let successes = self.successes.fetch_add(1, Ordering::Relaxed) + 1;
                let total = {
                    let mut spent = self.total_spent.lock().expect("total_spent lock");
                    *spent += snapshot.current_price;
                    *spent
                };

                product.set_status(format!("purchase succeeded: order {}", receipt.order_no));
                info!(
                    order_no = %receipt.order_no,
                    price = %snapshot.current_price,
                    purchases = successes,
                    total_spent = %total,
                    "Purchase succeeded"
                );
                Ok(())
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                product.set_status("purchase failed");
                warn!(failures, error = %e, "Purchase failed");
                Err(e)
            }
        }
    }

    fn stats(&self) -> OperationStats {
        OperationStats::Buy {
            continuous: self.continuous,
            successes: self.success_count(),
            failures: self.failure_count(),
            total_spent: self.total_spent(),
            completed: !self.continuous && self.has_bought(),
        }
    }

    fn is_active(&self) -> bool {
        self.continuous || !self.has_bought()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
