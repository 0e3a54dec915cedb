//! Scripted marketplace for integration testing.
//!
//! Provides a deterministic `MarketplaceApi` implementation that replays
//! a programmed sequence of search results, accepts orders, and records
//! every call — all in-memory with no external dependencies.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dealhawk::marketplace::{MarketplaceApi, PreOrderDraft};
use dealhawk::types::{ArchiveInfo, MonitorError, Offer, OrderReceipt};

/// A scripted marketplace for deterministic testing.
///
/// Search results are replayed in order; the final entry repeats forever.
/// Orders and listings are accepted unconditionally unless an error is
/// forced, and every remote call is recorded for later assertions.
pub struct ScriptedMarket {
    search_results: Mutex<VecDeque<Vec<Offer>>>,
    archive: Mutex<ArchiveInfo>,
    /// If set, all operations will return this as a `Remote` error.
    force_error: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
    order_counter: AtomicU64,
    listing_counter: AtomicU64,
}

impl ScriptedMarket {
    pub fn new() -> Self {
        Self {
            search_results: Mutex::new(VecDeque::new()),
            archive: Mutex::new(ArchiveInfo {
                archive_id: 17,
                archive_name: "Genesis Card".to_string(),
                archive_image: vec!["https://img.example.test/1.png".to_string()],
                platform_id: 741,
                platform_name: "MetaShelf".to_string(),
                issue_time: "2026-01-15 10:00:00".to_string(),
                ..Default::default()
            }),
            force_error: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            order_counter: AtomicU64::new(0),
            listing_counter: AtomicU64::new(0),
        }
    }

    /// Queue one search response. Once the queue is down to its final
    /// entry, that entry repeats for every later search.
    pub fn push_search(&self, offers: Vec<Offer>) {
        self.search_results.lock().unwrap().push_back(offers);
    }

    /// Convenience: a single-offer search result at the given price.
    pub fn push_price(&self, price: Decimal) {
        self.push_search(vec![Offer {
            price,
            min_price_goods_id: 42,
            archive_id: 17,
        }]);
    }

    /// Force all subsequent operations to fail with a transport error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear any forced error.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Every remote call made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c == &name).count()
    }

    pub fn orders_placed(&self) -> u64 {
        self.order_counter.load(Ordering::SeqCst)
    }

    pub fn listings_published(&self) -> u64 {
        self.listing_counter.load(Ordering::SeqCst)
    }

    fn record(&self, call: &str) -> Result<(), MonitorError> {
        self.calls.lock().unwrap().push(call.to_string());
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(MonitorError::Remote(msg.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MarketplaceApi for ScriptedMarket {
    async fn search(&self, _name: &str) -> Result<Vec<Offer>, MonitorError> {
        self.record("search")?;
        let mut queue = self.search_results.lock().unwrap();
        match queue.len() {
            0 => Ok(Vec::new()),
            1 => Ok(queue.front().cloned().unwrap_or_default()),
            _ => Ok(queue.pop_front().unwrap_or_default()),
        }
    }

    async fn get_archive_info(&self, _archive_id: u64) -> Result<ArchiveInfo, MonitorError> {
        self.record("get_archive_info")?;
        Ok(self.archive.lock().unwrap().clone())
    }

    async fn create_order(
        &self,
        _goods_id: u64,
        _address_id: u64,
    ) -> Result<OrderReceipt, MonitorError> {
        self.record("create_order")?;
        let n = self.order_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(OrderReceipt {
            order_no: format!("ORD-{n}"),
        })
    }

    async fn create_pre_order(&self, _draft: &PreOrderDraft) -> Result<String, MonitorError> {
        self.record("create_pre_order")?;
        Ok("KEY-SCRIPTED".to_string())
    }

    async fn create_listing(
        &self,
        _key: &str,
        _draft: &PreOrderDraft,
    ) -> Result<u64, MonitorError> {
        self.record("create_listing")?;
        Ok(self.listing_counter.fetch_add(1, Ordering::SeqCst) + 1000)
    }

    async fn confirm_publication(&self, _goods_id: u64) -> Result<(), MonitorError> {
        self.record("confirm_publication")?;
        Ok(())
    }
}
