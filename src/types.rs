//! Shared types for the dealhawk agent.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that marketplace, monitor,
//! and operation modules can depend on them without circular references.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

/// A tracked marketplace product.
///
/// One `Product` exists per monitor; the monitor owns it exclusively and
/// observers only ever see cloned snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique key within the registry.
    pub name: String,
    /// Price at or below which the attached operation fires.
    pub target_price: Decimal,
    /// Last price seen for the first search candidate.
    pub current_price: Decimal,
    /// Free-form descriptive status, overwritten on every transition
    /// and poll result.
    pub status: String,
    /// Offer id of the cheapest listing from the last search.
    pub min_price_goods_id: u64,
    /// Archive (collectible family) id from the last search.
    pub archive_id: u64,
}

impl Product {
    pub fn new(name: impl Into<String>, target_price: Decimal) -> Self {
        Self {
            name: name.into(),
            target_price,
            current_price: Decimal::ZERO,
            status: "initializing".to_string(),
            min_price_goods_id: 0,
            archive_id: 0,
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (target: {:.2} | current: {:.2} | {})",
            self.name, self.target_price, self.current_price, self.status,
        )
    }
}

/// Shared handle to a monitor's product.
///
/// The polling task and operations mutate the product through this handle;
/// the observer path only reads snapshots. Locks are never held across
/// await points.
#[derive(Clone)]
pub struct ProductHandle {
    inner: Arc<Mutex<Product>>,
}

impl ProductHandle {
    pub fn new(product: Product) -> Self {
        Self {
            inner: Arc::new(Mutex::new(product)),
        }
    }

    /// Clone the current product state.
    pub fn snapshot(&self) -> Product {
        self.inner.lock().expect("product lock poisoned").clone()
    }

    pub fn name(&self) -> String {
        self.inner.lock().expect("product lock poisoned").name.clone()
    }

    pub fn target_price(&self) -> Decimal {
        self.inner.lock().expect("product lock poisoned").target_price
    }

    pub fn current_price(&self) -> Decimal {
        self.inner.lock().expect("product lock poisoned").current_price
    }

    pub fn set_status(&self, status: impl Into<String>) {
        self.inner.lock().expect("product lock poisoned").status = status.into();
    }

    pub fn set_target_price(&self, price: Decimal) {
        self.inner.lock().expect("product lock poisoned").target_price = price;
    }

    /// Record the first search candidate's price and identifiers.
    pub fn record_offer(&self, offer: &Offer) {
        let mut p = self.inner.lock().expect("product lock poisoned");
        p.current_price = offer.price;
        p.min_price_goods_id = offer.min_price_goods_id;
        p.archive_id = offer.archive_id;
    }
}

// ---------------------------------------------------------------------------
// Marketplace wire types
// ---------------------------------------------------------------------------

/// A candidate offer from the marketplace search endpoint.
///
/// Search results come back ordered by the API (cheapest first); the
/// monitor only ever acts on the first element.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub price: Decimal,
    pub min_price_goods_id: u64,
    pub archive_id: u64,
}

/// Archive (collectible family) metadata from the marketplace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveInfo {
    pub archive_id: u64,
    pub archive_name: String,
    #[serde(default)]
    pub archive_image: Vec<String>,
    pub platform_id: u64,
    pub platform_name: String,
    /// Issue timestamp, `yyyy-MM-dd HH:mm:ss` in the marketplace's
    /// local timezone.
    pub issue_time: String,
    #[serde(default)]
    pub cooling_time: u32,
    #[serde(default)]
    pub goods_min_price: Decimal,
    #[serde(default)]
    pub is_open_auction: bool,
    #[serde(default)]
    pub selling_count: u32,
}

/// Receipt for a successful order creation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    #[serde(default)]
    pub order_no: String,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain errors for the monitoring and purchase core.
///
/// All of these are absorbed at the monitor boundary and converted into
/// observer messages and counters; none terminate a monitor.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Transport-level failure (network, 5xx, unparseable body) after the
    /// client's own retry budget is exhausted. Eligible for the monitor's
    /// bounded retry routine.
    #[error("remote call failed: {0}")]
    Remote(String),

    /// The marketplace answered with a non-success application code.
    #[error("marketplace error {code}: {message}")]
    Api { code: i64, message: String },

    /// Misconfiguration detected before any remote call (e.g. no delivery
    /// address selected). Surfaced immediately, never retried.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Malformed data from the marketplace (e.g. unparseable issue time).
    #[error("invalid marketplace data: {0}")]
    InvalidData(String),
}

impl MonitorError {
    /// Whether the failure could plausibly succeed on a blind re-attempt.
    /// Precondition errors never can.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, MonitorError::Precondition(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
