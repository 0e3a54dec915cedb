//! Pre-order release pipeline.
//!
//! Publishes a new pre-order listing through the marketplace's sequential
//! protocol: archive lookup → metadata fetch → draft creation → listing
//! creation → payment confirmation. Derived money fields use a fixed 4 %
//! service charge, rounded half-away at two decimals.

use chrono::{Local, NaiveDateTime, TimeZone};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::marketplace::{MarketplaceApi, PreOrderDraft};
use crate::types::{ArchiveInfo, MonitorError};

/// Fraction of the listing price kept by the marketplace.
pub const SERVICE_CHARGE_RATE: Decimal = dec!(0.04);

/// Fixed delay between successive publish attempts.
pub const PUBLISH_PACING: Duration = Duration::from_secs(12);

const ISSUE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One publish attempt's remote protocol, reusable across attempts.
pub struct ReleasePipeline {
    api: Arc<dyn MarketplaceApi>,
    delay_hours: i64,
}

impl ReleasePipeline {
    pub fn new(api: Arc<dyn MarketplaceApi>, delay_hours: i64) -> Self {
        Self { api, delay_hours }
    }

    /// Marketplace cut for a listing price, rounded half-away at 2 dp.
    pub fn service_charge(price: Decimal) -> Decimal {
        (price * SERVICE_CHARGE_RATE)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Seller's net income after the service charge, rounded at 2 dp.
    pub fn income_amount(price: Decimal, service_charge: Decimal) -> Decimal {
        (price - service_charge)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Auction end: the archive's issue time plus the configured offset,
    /// interpreted in the local timezone, as epoch seconds.
    fn auction_end_epoch(issue_time: &str, delay_hours: i64) -> Result<i64, MonitorError> {
        let issued = NaiveDateTime::parse_from_str(issue_time, ISSUE_TIME_FORMAT)
            .map_err(|e| MonitorError::InvalidData(format!("issue time '{issue_time}': {e}")))?;
        let delayed = issued + chrono::Duration::hours(delay_hours);
        let local = Local
            .from_local_datetime(&delayed)
            .earliest()
            .ok_or_else(|| {
                MonitorError::InvalidData(format!("issue time '{issue_time}' has no local mapping"))
            })?;
        Ok(local.timestamp())
    }

    fn build_draft(&self, info: &ArchiveInfo, price: Decimal) -> Result<PreOrderDraft, MonitorError> {
        let service_charge = Self::service_charge(price);
        let income_amount = Self::income_amount(price, service_charge);
        let auction_end_time = Self::auction_end_epoch(&info.issue_time, self.delay_hours)?;

        Ok(PreOrderDraft {
            name: info.archive_name.clone(),
            introduce: "see listing".to_string(),
            platform_id: info.platform_id.to_string(),
            platform_name: info.platform_name.clone(),
            archive_id: info.archive_id.to_string(),
            issue_date: info.issue_time.clone(),
            presell_date: info.issue_time.clone(),
            auction_end_time,
            amount: price.to_string(),
            income_amount: format!("{income_amount:.2}"),
            service_charge: format!("{service_charge:.2}"),
            auction_expect_amount: 0.3,
            down_type: 8,
            deal_type: 1,
            goods_type: 1,
            imgs: info.archive_image.clone(),
            is_auto_extension: true,
            is_pay_bond_active: true,
            collection_number: None,
            count: None,
            auction_time_set_up_id: None,
            publisher: None,
            remark: None,
            technical_support: None,
            preferential_id: None,
        })
    }

    /// Run the full six-step protocol once. Any step's failure aborts only
    /// this attempt.
    pub async fn publish_once(&self, name: &str, price: Decimal) -> Result<u64, MonitorError> {
        let offers = self.api.search(name).await?;
        let first = offers.first().ok_or_else(|| {
            MonitorError::InvalidData(format!("no matching archive for '{name}'"))
        })?;

        let info = self.api.get_archive_info(first.archive_id).await?;
        let draft = self.build_draft(&info, price)?;

        let key = self.api.create_pre_order(&draft).await?;
        let goods_id = self.api.create_listing(&key, &draft).await?;
        self.api.confirm_publication(goods_id).await?;

        info!(goods_id, price = %price, "Pre-order listing published");
        Ok(goods_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
