//! Concrete marketplace client over HTTP.
//!
//! Every call is an authenticated JSON POST returning a `{code, msg, data}`
//! envelope. Transport failures, 5xx responses, and unparseable bodies are
//! retried here with a linearly increasing delay (`delay × attempt`);
//! application-level codes are *not* retried — callers decide what a
//! domain failure means.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{MarketplaceApi, PreOrderDraft};
use crate::config::MarketplaceConfig;
use crate::types::{ArchiveInfo, MonitorError, Offer, OrderReceipt};

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

const SEARCH_PATH: &str = "/h5/home/searchApp";
const ARCHIVE_PATH: &str = "/h5/home/archiveInfo";
const ORDER_PATH: &str = "/h5/order/create";
const PRE_CREATE_PATH: &str = "/h5/goods/preOrderCreate";
const CREATE_PATH: &str = "/h5/goods/create";
const UNIFIED_PAY_PATH: &str = "/h5/order/unifiedPay";

const SUCCESS_CODE: i64 = 200;

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// Every marketplace response carries this envelope; `data` is endpoint
/// specific and may be null.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Value,
}

/// Unwrap an envelope, converting a non-success application code into a
/// domain error tagged with the failed operation.
fn expect_success(env: ApiEnvelope, what: &str) -> Result<Value, MonitorError> {
    if env.code != SUCCESS_CODE {
        return Err(MonitorError::Api {
            code: env.code,
            message: format!("{what}: {}", env.msg),
        });
    }
    Ok(env.data)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Marketplace client with built-in transport retry.
pub struct MarketClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    short_name: String,
    dev_type: u32,
    platform_id: u64,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl MarketClient {
    pub fn new(cfg: &MarketplaceConfig, token: String) -> anyhow::Result<Self> {
        use anyhow::Context;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent("dealhawk/0.1.0")
            .build()
            .context("Failed to build marketplace HTTP client")?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            token,
            short_name: cfg.short_name.clone(),
            dev_type: cfg.dev_type,
            platform_id: cfg.platform_id,
            retry_attempts: cfg.http_retry_attempts.max(1),
            retry_delay: Duration::from_millis(cfg.http_retry_delay_ms),
        })
    }

    // -- Internal helpers ------------------------------------------------

    /// POST with the internal retry budget. Only transport-level failures
    /// are retried; a parsed envelope is returned regardless of its code.
    async fn post_envelope(&self, path: &str, body: &Value) -> Result<ApiEnvelope, MonitorError> {
        let mut last_err = String::new();

        for attempt in 1..=self.retry_attempts {
            match self.execute_post(path, body).await {
                Ok(env) => return Ok(env),
                Err(e) => {
                    last_err = e;
                    if attempt < self.retry_attempts {
                        // Linear backoff: delay × attempt number
                        let backoff = self.retry_delay * attempt;
                        warn!(
                            path,
                            attempt,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %last_err,
                            "Marketplace request failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        error!(
            path,
            attempts = self.retry_attempts,
            error = %last_err,
            "Marketplace request exhausted retries"
        );
        Err(MonitorError::Remote(format!(
            "{path} failed after {} attempts: {last_err}",
            self.retry_attempts
        )))
    }

    /// One request/response round trip. 5xx is treated the same as a
    /// transport failure so the retry budget covers it.
    async fn execute_post(&self, path: &str, body: &Value) -> Result<ApiEnvelope, String> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Marketplace request");

        let resp = self
            .http
            .post(&url)
            .header("Authorization", &self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("transport: {e}"))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(format!("server error: {status}"));
        }

        let env: ApiEnvelope = resp
            .json()
            .await
            .map_err(|e| format!("parse: {e}"))?;

        debug!(code = env.code, "Marketplace response");
        Ok(env)
    }

    fn search_body(&self, query: &str) -> Value {
        json!({
            "platformIds": [],
            "pageNum": 1,
            "type": "",
            "search": query,
            "isTransfer": "",
            "goodsTypeList": [2, 3],
        })
    }
}

// ---------------------------------------------------------------------------
// MarketplaceApi trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketplaceApi for MarketClient {
    async fn search(&self, query: &str) -> Result<Vec<Offer>, MonitorError> {
        let env = self.post_envelope(SEARCH_PATH, &self.search_body(query)).await?;
        let data = expect_success(env, "search failed")?;
        if data.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(data)
            .map_err(|e| MonitorError::InvalidData(format!("search payload: {e}")))
    }

    async fn get_archive_info(&self, archive_id: u64) -> Result<ArchiveInfo, MonitorError> {
        let body = json!({
            "archiveId": archive_id.to_string(),
            "platformId": self.platform_id.to_string(),
        });
        let env = self.post_envelope(ARCHIVE_PATH, &body).await?;
        let data = expect_success(env, "archive lookup failed")?;
        serde_json::from_value(data)
            .map_err(|e| MonitorError::InvalidData(format!("archive payload: {e}")))
    }

    async fn create_order(
        &self,
        goods_id: u64,
        address_id: u64,
    ) -> Result<OrderReceipt, MonitorError> {
        let body = json!({
            "addressId": address_id,
            "goodsId": goods_id,
            "shortName": self.short_name,
            "devType": self.dev_type,
        });
        let env = self.post_envelope(ORDER_PATH, &body).await?;
        let data = expect_success(env, "order failed")?;
        if data.is_null() {
            return Ok(OrderReceipt {
                order_no: "unknown".to_string(),
            });
        }
        serde_json::from_value(data)
            .map_err(|e| MonitorError::InvalidData(format!("order payload: {e}")))
    }

    async fn create_pre_order(&self, draft: &PreOrderDraft) -> Result<String, MonitorError> {
        let body = serde_json::to_value(draft)
            .map_err(|e| MonitorError::InvalidData(format!("draft encode: {e}")))?;
        let env = self.post_envelope(PRE_CREATE_PATH, &body).await?;
        let data = expect_success(env, "pre-order creation failed")?;
        data.get("key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| MonitorError::InvalidData("pre-order response missing key".into()))
    }

    async fn create_listing(
        &self,
        key: &str,
        draft: &PreOrderDraft,
    ) -> Result<u64, MonitorError> {
        let mut body = serde_json::to_value(draft)
            .map_err(|e| MonitorError::InvalidData(format!("draft encode: {e}")))?;
        body["key"] = Value::String(key.to_string());
        let env = self.post_envelope(CREATE_PATH, &body).await?;
        let data = expect_success(env, "listing creation failed")?;
        data.get("goodsId")
            .and_then(Value::as_u64)
            .ok_or_else(|| MonitorError::InvalidData("listing response missing goodsId".into()))
    }

    async fn confirm_publication(&self, goods_id: u64) -> Result<(), MonitorError> {
        let body = json!({
            "goodsId": goods_id,
            "shortName": self.short_name,
            "devType": self.dev_type,
        });
        let env = self.post_envelope(UNIFIED_PAY_PATH, &body).await?;
        expect_success(env, "payment confirmation failed")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
