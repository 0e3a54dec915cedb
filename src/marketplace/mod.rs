//! Marketplace integration.
//!
//! Defines the `MarketplaceApi` trait — the seam between the monitoring
//! core and the remote marketplace — plus the request shapes the purchase
//! protocols send. The concrete `reqwest` client lives in `client`.

pub mod client;

use async_trait::async_trait;
use serde::Serialize;

use crate::types::{ArchiveInfo, MonitorError, Offer, OrderReceipt};

pub use client::MarketClient;

/// Abstraction over the marketplace's authenticated HTTP API.
///
/// Implementors perform their own transport-level retries; callers see
/// either a parsed response or a `MonitorError`. All methods are
/// request/response — no streaming.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// Search listings by product name. The returned order is the API's
    /// own (cheapest/best first) and is authoritative.
    async fn search(&self, query: &str) -> Result<Vec<Offer>, MonitorError>;

    /// Fetch archive metadata for a collectible family.
    async fn get_archive_info(&self, archive_id: u64) -> Result<ArchiveInfo, MonitorError>;

    /// Place an order for an existing offer, shipped to the given address.
    async fn create_order(
        &self,
        goods_id: u64,
        address_id: u64,
    ) -> Result<OrderReceipt, MonitorError>;

    /// Create a pre-order draft; returns the draft key.
    async fn create_pre_order(&self, draft: &PreOrderDraft) -> Result<String, MonitorError>;

    /// Create the sellable listing for a draft key; returns the goods id.
    async fn create_listing(
        &self,
        key: &str,
        draft: &PreOrderDraft,
    ) -> Result<u64, MonitorError>;

    /// Confirm payment/publication for a created listing.
    async fn confirm_publication(&self, goods_id: u64) -> Result<(), MonitorError>;
}

// ---------------------------------------------------------------------------
// Pre-order draft
// ---------------------------------------------------------------------------

/// Request body for pre-order creation and listing creation.
///
/// Field names and filler values mirror what the marketplace expects;
/// several are mandatory-but-null. Derived money fields are preformatted
/// to two decimals by the release pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreOrderDraft {
    pub name: String,
    pub introduce: String,
    pub platform_id: String,
    pub platform_name: String,
    pub archive_id: String,
    pub issue_date: String,
    pub presell_date: String,
    /// Epoch seconds, local timezone.
    pub auction_end_time: i64,
    pub amount: String,
    pub income_amount: String,
    pub service_charge: String,
    pub auction_expect_amount: f64,
    pub down_type: u32,
    pub deal_type: u32,
    pub goods_type: u32,
    pub imgs: Vec<String>,
    pub is_auto_extension: bool,
    pub is_pay_bond_active: bool,
    pub collection_number: Option<String>,
    pub count: Option<u32>,
    pub auction_time_set_up_id: Option<u64>,
    pub publisher: Option<String>,
    pub remark: Option<String>,
    pub technical_support: Option<String>,
    pub preferential_id: Option<u64>,
}
