use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use common::error::snippet;
use common::{
    Error, ExchangeClient, ExchangeOrder, OrderRequest, OrderStatus, OrderType, Result,
};

const ORDER_PATH: &str = "/api/v3/order";

/// REST API client for Binance spot. Used for order placement only.
pub struct BinanceClient {
    api_key: String,
    secret: String,
    base_url: String,
    http: Client,
}

impl BinanceClient {
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn timestamp_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn sign(&self, query: &str) -> Result<String> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Config(format!("Invalid exchange secret: {e}")))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn signed_post(&self, path: &str, params: &str) -> Result<String> {
        let ts = Self::timestamp_ms();
        let query = format!("{params}&timestamp={ts}");
        let signature = self.sign(&query)?;
        let body = format!("{query}&signature={signature}");
        let url = format!("{}{path}", self.base_url);

        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Exchange(format!("request to {url} failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Exchange(format!("reading {url} failed: {e}")))?;

        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {}", snippet(&text))));
        }
        Ok(text)
    }
}

/// Query string for `POST /api/v3/order`, without timestamp and signature.
fn order_params(request: &OrderRequest) -> Result<String> {
    let mut params = format!(
        "symbol={}&side={}&type={}&quantity={}&newClientOrderId={}&newOrderRespType=FULL",
        request.symbol, request.side, request.order_type, request.quantity, request.client_order_id
    );
    match (request.order_type, request.price) {
        (OrderType::Market, _) => {}
        (OrderType::Limit, Some(price)) => {
            params.push_str(&format!("&price={price}&timeInForce={}", request.time_in_force));
        }
        (OrderType::LimitMaker, Some(price)) => params.push_str(&format!("&price={price}")),
        (order_type, None) => {
            return Err(Error::Exchange(format!("{order_type} order requires a price")));
        }
    }
    Ok(params)
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn place_order(&self, request: &OrderRequest) -> Result<ExchangeOrder> {
        if request.quantity <= 0.0 {
            return Err(Error::Exchange(format!(
                "quantity must be positive, got {}",
                request.quantity
            )));
        }
        let params = order_params(request)?;

        debug!(symbol = %request.symbol, side = %request.side, "Submitting order to Binance");
        let body = self.signed_post(ORDER_PATH, &params).await?;

        let resp: OrderResponse = serde_json::from_str(&body).map_err(|e| {
            Error::Exchange(format!("unparseable order response ({e}): {}", snippet(&body)))
        })?;
        resp.into_exchange_order(request)
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    #[serde(default)]
    transact_time: Option<i64>,
    #[serde(default)]
    executed_qty: Option<String>,
    #[serde(default)]
    cummulative_quote_qty: Option<String>,
    status: String,
    #[serde(default)]
    fills: Vec<FillDetail>,
}

#[derive(Deserialize)]
struct FillDetail {
    #[serde(default)]
    commission: Option<String>,
}

fn parse_num(raw: Option<&str>) -> f64 {
    raw.and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0)
}

impl OrderResponse {
    fn into_exchange_order(self, request: &OrderRequest) -> Result<ExchangeOrder> {
        let status = OrderStatus::from_exchange(&self.status).ok_or_else(|| {
            Error::Exchange(format!("unknown order status '{}'", self.status))
        })?;
        let expired = self.status.to_ascii_uppercase().starts_with("EXPIRED");
        if status == OrderStatus::Rejected || expired {
            return Err(Error::Exchange(format!(
                "order {} {} by exchange",
                self.order_id,
                self.status.to_lowercase()
            )));
        }

        let filled_qty = parse_num(self.executed_qty.as_deref());
        let quote_qty = parse_num(self.cummulative_quote_qty.as_deref());
        let avg_price = (filled_qty > 0.0).then(|| quote_qty / filled_qty);
        let commission = self
            .fills
            .iter()
            .map(|f| parse_num(f.commission.as_deref()))
            .sum();
        let created_at = self
            .transact_time
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        Ok(ExchangeOrder {
            exchange_order_id: self.order_id.to_string(),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            price: request.price,
            filled_qty,
            avg_price,
            status,
            time_in_force: request.time_in_force,
            commission,
            created_at,
        })
    }
}
