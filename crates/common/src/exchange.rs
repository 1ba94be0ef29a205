use async_trait::async_trait;

use crate::{ExchangeOrder, OrderRequest, Result};

/// Abstraction over the exchange connection.
///
/// `BinanceClient` implements this for live trading.
/// `PaperClient` implements this for simulation.
///
/// `Ok` means the exchange accepted the order. A rejection is an
/// `Error::Exchange`, so callers never see an accepted-looking result for an
/// order that does not exist on the venue.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Submit an order and return what the exchange acknowledged.
    async fn place_order(&self, request: &OrderRequest) -> Result<ExchangeOrder>;
}
