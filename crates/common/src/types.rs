use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    #[serde(alias = "buy")]
    Buy,
    #[serde(alias = "sell")]
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    #[serde(alias = "market")]
    Market,
    #[serde(alias = "limit")]
    Limit,
    #[serde(alias = "limit_maker")]
    LimitMaker,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::LimitMaker => write!(f, "LIMIT_MAKER"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    #[default]
    Gtc,
    Ioc,
    Fok,
}

impl std::fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeInForce::Gtc => write!(f, "GTC"),
            TimeInForce::Ioc => write!(f, "IOC"),
            TimeInForce::Fok => write!(f, "FOK"),
        }
    }
}

/// Lifecycle of a mirrored order.
///
/// `NEW -> PARTIALLY_FILLED -> FILLED`, with `CANCELLED` reachable from either
/// open state and `REJECTED` only from `NEW`. The three closing states are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[serde(alias = "new", alias = "pending", alias = "PENDING", alias = "PENDING_NEW")]
    New,
    #[serde(alias = "partially_filled")]
    PartiallyFilled,
    #[serde(alias = "filled")]
    Filled,
    #[serde(alias = "cancelled", alias = "canceled", alias = "CANCELED")]
    Cancelled,
    #[serde(alias = "rejected")]
    Rejected,
}

impl OrderStatus {
    /// Map an exchange's spelling of an order state onto the lifecycle.
    /// Returns `None` for states with no counterpart.
    pub fn from_exchange(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "NEW" | "PENDING" | "PENDING_NEW" => Some(OrderStatus::New),
            "PARTIALLY_FILLED" => Some(OrderStatus::PartiallyFilled),
            "FILLED" => Some(OrderStatus::Filled),
            "CANCELED" | "CANCELLED" | "PARTIALLY_CANCELED" | "PENDING_CANCEL" | "EXPIRED"
            | "EXPIRED_IN_MATCH" => Some(OrderStatus::Cancelled),
            "REJECTED" => Some(OrderStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    /// Whether a record currently in `self` may be moved to `next`.
    /// Repeating `PARTIALLY_FILLED` is allowed so fill progress can be reported.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (New, PartiallyFilled | Filled | Cancelled | Rejected) => true,
            (PartiallyFilled, PartiallyFilled | Filled | Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::New => write!(f, "NEW"),
            OrderStatus::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Identifier grouping every order placed through one orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// A fresh random key, used when the caller supplies none.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier the backend assigns to a mirrored order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendOrderId(String);

impl BackendOrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BackendOrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An order to be submitted to the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Client-side id, sent to the exchange as the client order id.
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    /// Required for limit orders, ignored for market orders.
    pub price: Option<f64>,
    pub time_in_force: TimeInForce,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self {
            client_order_id: uuid::Uuid::new_v4().simple().to_string(),
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            time_in_force: TimeInForce::Gtc,
        }
    }

    pub fn limit(symbol: impl Into<String>, side: OrderSide, quantity: f64, price: f64) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Self::market(symbol, side, quantity)
        }
    }
}

/// Result of an order the exchange accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub exchange_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    pub filled_qty: f64,
    pub avg_price: Option<f64>,
    pub status: OrderStatus,
    pub time_in_force: TimeInForce,
    pub commission: f64,
    pub created_at: DateTime<Utc>,
}

/// The backend's copy of an exchange order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Assigned by the backend; absent until the record is created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<BackendOrderId>,
    pub exchange_order_id: String,
    pub session_key: SessionKey,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: f64,
    pub filled_qty: f64,
    pub avg_price: f64,
    pub status: OrderStatus,
    pub time_in_force: TimeInForce,
    pub commission: f64,
    pub pnl: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled_at: Option<DateTime<Utc>>,
}

impl OrderRecord {
    /// Build the record to mirror for an accepted exchange order.
    pub fn from_exchange(order: &ExchangeOrder, session_key: &SessionKey) -> Self {
        let now = Utc::now();
        Self {
            order_id: None,
            exchange_order_id: order.exchange_order_id.clone(),
            session_key: session_key.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            quantity: order.quantity,
            // Market orders carry no limit price; record what they filled at.
            price: order.price.or(order.avg_price).unwrap_or(0.0),
            filled_qty: order.filled_qty,
            avg_price: order.avg_price.unwrap_or(0.0),
            status: order.status,
            time_in_force: order.time_in_force,
            commission: order.commission,
            pnl: 0.0,
            created_at: order.created_at,
            updated_at: now,
            filled_at: (order.status == OrderStatus::Filled).then_some(now),
        }
    }
}

/// Partial update sent to the backend when an order's state changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled_qty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn new(status: OrderStatus) -> Self {
        Self {
            status,
            filled_qty: None,
            avg_price: None,
            commission: None,
            pnl: None,
            filled_at: None,
            updated_at: Utc::now(),
        }
    }

    /// A full fill: sets `filled_at` alongside quantity and price.
    pub fn filled(filled_qty: f64, avg_price: f64) -> Self {
        let now = Utc::now();
        Self {
            filled_qty: Some(filled_qty),
            avg_price: Some(avg_price),
            filled_at: Some(now),
            updated_at: now,
            ..Self::new(OrderStatus::Filled)
        }
    }

}

/// Whether orders hit the real exchange or a simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}
