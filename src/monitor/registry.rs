//! Shared monitor registry.
//!
//! One `Monitor` per product name, created lazily and handed out as
//! shared handles. Lookup and insertion are lock-free per shard; the
//! registry is cheap to clone behind an `Arc` and safe to use from any
//! task.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use super::Monitor;
use crate::config::MonitorConfig;
use crate::marketplace::MarketplaceApi;
use crate::types::Product;

pub struct MonitorRegistry {
    monitors: DashMap<String, Arc<Monitor>>,
    api: Arc<dyn MarketplaceApi>,
    defaults: MonitorConfig,
}

impl MonitorRegistry {
    pub fn new(api: Arc<dyn MarketplaceApi>, defaults: MonitorConfig) -> Self {
        Self {
            monitors: DashMap::new(),
            api,
            defaults,
        }
    }

    /// Get or create the monitor for a product, keyed by product name.
    /// Concurrent callers racing on the same name all receive the same
    /// monitor; the losing products are dropped.
    pub fn create(&self, product: Product) -> Arc<Monitor> {
        let name = product.name.clone();
        self.monitors
            .entry(name)
            .or_insert_with(|| {
                info!(product = %product.name, "Creating monitor");
                Arc::new(Monitor::new(
                    product,
                    Arc::clone(&self.api),
                    self.defaults,
                ))
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Monitor>> {
        self.monitors.get(name).map(|m| Arc::clone(&m))
    }

    /// Stop and discard a monitor. Returns false for unknown names.
    pub fn remove(&self, name: &str) -> bool {
        match self.monitors.remove(name) {
            Some((_, monitor)) => {
                monitor.stop();
                info!(product = %name, "Monitor removed");
                true
            }
            None => false,
        }
    }

    /// Snapshot of every registered monitor, in no particular order.
    pub fn all(&self) -> Vec<Arc<Monitor>> {
        self.monitors.iter().map(|e| Arc::clone(&e)).collect()
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Stop every monitor and clear the registry.
    pub fn shutdown(&self) {
        info!(monitors = self.monitors.len(), "Shutting down all monitors");
        for entry in self.monitors.iter() {
            entry.stop();
        }
        self.monitors.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
