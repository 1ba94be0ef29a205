use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use common::{
    Error, ExchangeClient, ExchangeOrder, OrderRequest, OrderSide, OrderStatus, OrderType, Result,
};

/// Simulated exchange client for paper trading.
///
/// Market orders fill immediately at the latest reference price with
/// configurable slippage. Limit orders are accepted and rest as `NEW`.
/// No real orders are ever sent anywhere.
pub struct PaperClient {
    /// Latest known price per symbol, updated via `update_price`.
    prices: Arc<RwLock<HashMap<String, f64>>>,
    /// Slippage in basis points applied to market fills.
    slippage_bps: f64,
    /// Taker fee applied to market fills, as a fraction of notional.
    fee_rate: f64,
}

impl PaperClient {
    pub fn new(slippage_bps: f64) -> Self {
        info!(slippage_bps = slippage_bps, "PaperClient initialized");
        Self {
            prices: Arc::new(RwLock::new(HashMap::new())),
            slippage_bps,
            fee_rate: 0.001,
        }
    }

    pub fn with_fee_rate(mut self, fee_rate: f64) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    /// Update the reference price for a symbol.
    pub async fn update_price(&self, symbol: &str, price: f64) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    fn next_order_id() -> String {
        format!("PAPER-{}", Uuid::new_v4().simple())
    }
}

#[async_trait]
impl ExchangeClient for PaperClient {
    async fn place_order(&self, request: &OrderRequest) -> Result<ExchangeOrder> {
        if request.quantity <= 0.0 {
            return Err(Error::Exchange(format!(
                "quantity must be positive, got {}",
                request.quantity
            )));
        }

        let (status, filled_qty, avg_price, commission) = match request.order_type {
            OrderType::Market => {
                let mid_price = self
                    .prices
                    .read()
                    .await
                    .get(&request.symbol)
                    .copied()
                    .ok_or_else(|| {
                        Error::Exchange(format!(
                            "PaperClient has no price for '{}'. Set a reference price first.",
                            request.symbol
                        ))
                    })?;

                // Apply slippage: buys pay more, sells receive less
                let fill_price = match request.side {
                    OrderSide::Buy => mid_price * (1.0 + self.slippage_bps / 10_000.0),
                    OrderSide::Sell => mid_price * (1.0 - self.slippage_bps / 10_000.0),
                };
                let fee = fill_price * request.quantity * self.fee_rate;
                (OrderStatus::Filled, request.quantity, Some(fill_price), fee)
            }
            OrderType::Limit | OrderType::LimitMaker => {
                if request.price.is_none() {
                    return Err(Error::Exchange(format!(
                        "{} order requires a price",
                        request.order_type
                    )));
                }
                (OrderStatus::New, 0.0, None, 0.0)
            }
        };

        let order = ExchangeOrder {
            exchange_order_id: Self::next_order_id(),
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
            created_at: Utc::now(),
        };

        debug!(
            exchange_order_id = %order.exchange_order_id,
            symbol = %order.symbol,
            side = %order.side,
            status = %order.status,
            fill = ?order.avg_price,
            qty = order.quantity,
            "Paper order simulated"
        );
        Ok(order)
    }
}
