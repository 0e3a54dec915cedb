//! DEALHAWK — Marketplace price monitor and automated purchase agent
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the marketplace client, registers one monitor per configured
//! product, and runs until interrupted with graceful shutdown.

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::{info, warn};

use dealhawk::config::{self, ProductMode};
use dealhawk::marketplace::{MarketClient, MarketplaceApi};
use dealhawk::monitor::MonitorRegistry;
use dealhawk::observer::LogObserver;
use dealhawk::ops::{BuyOperation, PreOrderOperation, ProductOperation, PublishMode};
use dealhawk::types::Product;

const BANNER: &str = r#"
 ____  _____    _    _     _   _    ___        ___  __
|  _ \| ____|  / \  | |   | | | |  / \ \      / / |/ /
| | | |  _|   / _ \ | |   | |_| | / _ \ \ /\ / /| ' /
| |_| | |___ / ___ \| |___|  _  |/ ___ \ V  V / | . \
|____/|_____/_/   \_\_____|_| |_/_/   \_\_/\_/  |_|\_\

  Marketplace price monitor & purchase agent
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        poll_interval_ms = cfg.monitor.poll_interval_ms,
        max_retries = cfg.monitor.max_retries,
        products = cfg.products.len(),
        "DEALHAWK starting up"
    );

    if cfg.products.is_empty() {
        bail!("No products configured — nothing to monitor");
    }

    // -- Initialise components -------------------------------------------

    let token = config::AppConfig::resolve_env(&cfg.marketplace.token_env)?;
    let api: Arc<dyn MarketplaceApi> = Arc::new(MarketClient::new(&cfg.marketplace, token)?);
    let registry = MonitorRegistry::new(Arc::clone(&api), cfg.monitor);

    // -- Register monitors -----------------------------------------------

    for product_cfg in &cfg.products {
        let monitor = registry.create(Product::new(&product_cfg.name, product_cfg.target_price));
        monitor.add_observer(Arc::new(LogObserver));

        let operation: Arc<dyn ProductOperation> = match product_cfg.mode {
            ProductMode::BuySingle => Arc::new(BuyOperation::new(
                Arc::clone(&api),
                false,
                product_cfg.address_id,
            )),
            ProductMode::BuyContinuous => Arc::new(BuyOperation::new(
                Arc::clone(&api),
                true,
                product_cfg.address_id,
            )),
            ProductMode::ReleaseSingle => Arc::new(PreOrderOperation::new(
                Arc::clone(&api),
                cfg.release.delay_hours,
                PublishMode::Single,
            )),
            ProductMode::ReleaseTriple => Arc::new(PreOrderOperation::new(
                Arc::clone(&api),
                cfg.release.delay_hours,
                PublishMode::Triple,
            )),
        };

        if matches!(
            product_cfg.mode,
            ProductMode::BuySingle | ProductMode::BuyContinuous
        ) && product_cfg.address_id.is_none()
        {
            warn!(
                product = %product_cfg.name,
                "No address_id configured — purchases will fail until one is set"
            );
        }

        monitor.set_operation(operation);
        monitor.start();
        info!(
            product = %product_cfg.name,
            target = %product_cfg.target_price,
            mode = ?product_cfg.mode,
            "Monitor started"
        );
    }

    // -- Run until interrupted -------------------------------------------

    info!("Monitoring. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    let monitors = registry.all();
    registry.shutdown();
    for monitor in monitors {
        info!("{}", monitor.summary());
    }
    info!("DEALHAWK shut down cleanly.");

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dealhawk=info"));

    let json_logging = std::env::var("DEALHAWK_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
