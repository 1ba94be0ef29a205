use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use backend::CredentialCache;
use common::{
    BackendApi, BackendOrderId, Credential, Credentials, Error, ExchangeClient, ExchangeOrder,
    OrderRecord, OrderRequest, OrderSide, OrderStatus, OrderType, Result, SessionKey,
    StatusUpdate,
};

/// What a status sync did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusSync {
    Updated(BackendOrderId),
    /// The order was never mirrored, so there is nothing to update.
    NotMirrored,
}

/// A mirrored order. `status` stays locked across the transition check, the
/// backend call and the write, so updates to one order apply one at a time.
struct Mirrored {
    backend_id: BackendOrderId,
    status: Mutex<OrderStatus>,
}

/// Places orders on the exchange and mirrors each accepted one into the backend.
///
/// The exchange outcome is the only thing callers of `place_order` see.
/// Mirroring is best-effort: its failures are logged and dropped, so a backend
/// outage never blocks trading. Share one instance across tasks via `Arc`.
pub struct OrderSync {
    exchange: Arc<dyn ExchangeClient>,
    backend: Arc<dyn BackendApi>,
    credentials: CredentialCache,
    session_key: SessionKey,
    symbol: String,
    /// exchange order id -> mirrored record. Lost on restart.
    mirrored: RwLock<HashMap<String, Arc<Mirrored>>>,
}

impl OrderSync {
    /// `session_key` of `None` generates a fresh one for this instance.
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        backend: Arc<dyn BackendApi>,
        credentials: Credentials,
        symbol: impl Into<String>,
        session_key: Option<SessionKey>,
    ) -> Self {
        let session_key = session_key.unwrap_or_else(SessionKey::generate);
        let symbol = symbol.into();
        info!(session_key = %session_key, symbol = %symbol, "OrderSync initialized");

        Self {
            credentials: CredentialCache::new(backend.clone(), credentials),
            exchange,
            backend,
            session_key,
            symbol,
            mirrored: RwLock::new(HashMap::new()),
        }
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Backend id recorded for an exchange order, if mirroring succeeded.
    pub async fn backend_order_id(&self, exchange_order_id: &str) -> Option<BackendOrderId> {
        self.mirrored
            .read()
            .await
            .get(exchange_order_id)
            .map(|m| m.backend_id.clone())
    }

    /// Place an order on the exchange, then mirror it into the backend.
    ///
    /// Errors only when the exchange fails or rejects the order, in which case
    /// the backend is never contacted.
    pub async fn place_order(
        &self,
        side: OrderSide,
        quantity: f64,
        order_type: OrderType,
        price: Option<f64>,
    ) -> Result<ExchangeOrder> {
        let mut request = OrderRequest::market(self.symbol.clone(), side, quantity);
        request.order_type = order_type;
        request.price = price;
        self.submit(&request).await
    }

    /// `place_order` for a fully-built request. The request's symbol is used
    /// as given.
    pub async fn submit(&self, request: &OrderRequest) -> Result<ExchangeOrder> {
        info!(
            symbol = %request.symbol,
            side = %request.side,
            order_type = %request.order_type,
            qty = request.quantity,
            "Placing order"
        );

        let order = self.exchange.place_order(request).await?;
        if order.status == OrderStatus::Rejected {
            return Err(rejected(&order));
        }
        info!(
            exchange_order_id = %order.exchange_order_id,
            status = %order.status,
            "Order accepted by exchange"
        );

        match self.mirror(&order).await {
            Ok(backend_id) => info!(
                exchange_order_id = %order.exchange_order_id,
                backend_order_id = %backend_id,
                "Order mirrored to backend"
            ),
            Err(e) => warn!(
                exchange_order_id = %order.exchange_order_id,
                error_kind = e.kind(),
                url = e.url().unwrap_or("-"),
                http_status = e.status(),
                error = %e,
                "Failed to mirror order to backend; trading continues"
            ),
        }

        Ok(order)
    }

    /// Mirror an accepted exchange order into the backend and remember the id
    /// the backend assigned.
    ///
    /// `place_order` calls this and logs the error; it is public so the
    /// outcome can be inspected directly. Rejected orders are refused, and an
    /// order that is already mirrored returns its existing backend id.
    pub async fn mirror(&self, order: &ExchangeOrder) -> Result<BackendOrderId> {
        if order.status == OrderStatus::Rejected {
            return Err(rejected(order));
        }
        if let Some(existing) = self.backend_order_id(&order.exchange_order_id).await {
            debug!(
                exchange_order_id = %order.exchange_order_id,
                backend_order_id = %existing,
                "Order already mirrored"
            );
            return Ok(existing);
        }

        let record = OrderRecord::from_exchange(order, &self.session_key);
        let record = &record;
        let backend_id = self
            .with_token(|credential| async move {
                self.backend.create_order(record, credential.token()).await
            })
            .await?;

        // A concurrent mirror of the same order may have landed first; keep it.
        let mut mirrored = self.mirrored.write().await;
        let entry = mirrored
            .entry(order.exchange_order_id.clone())
            .or_insert_with(|| {
                Arc::new(Mirrored {
                    backend_id,
                    status: Mutex::new(order.status),
                })
            });
        Ok(entry.backend_id.clone())
    }

    /// Push a status change for a previously mirrored order. Never fails:
    /// an unknown order is a no-op and backend errors are logged.
    pub async fn update_order_status(&self, exchange_order_id: &str, update: StatusUpdate) {
        let status = update.status;
        match self.sync_status(exchange_order_id, update).await {
            Ok(StatusSync::Updated(backend_id)) => info!(
                exchange_order_id,
                backend_order_id = %backend_id,
                status = %status,
                "Order status mirrored"
            ),
            Ok(StatusSync::NotMirrored) => debug!(
                exchange_order_id,
                status = %status,
                "Order was never mirrored; skipping status update"
            ),
            Err(e) => warn!(
                exchange_order_id,
                status = %status,
                error_kind = e.kind(),
                url = e.url().unwrap_or("-"),
                http_status = e.status(),
                error = %e,
                "Failed to mirror status update"
            ),
        }
    }

    /// The fallible form of `update_order_status`.
    pub async fn sync_status(
        &self,
        exchange_order_id: &str,
        update: StatusUpdate,
    ) -> Result<StatusSync> {
        let Some(entry) = self.mirrored.read().await.get(exchange_order_id).cloned() else {
            return Ok(StatusSync::NotMirrored);
        };

        let mut status = entry.status.lock().await;
        if !status.can_transition_to(update.status) {
            return Err(Error::InvalidTransition {
                from: *status,
                to: update.status,
            });
        }

        let backend_id = &entry.backend_id;
        let update_ref = &update;
        self.with_token(|credential| async move {
            self.backend
                .update_order_status(backend_id, update_ref, credential.token())
                .await
        })
        .await?;

        *status = update.status;
        Ok(StatusSync::Updated(entry.backend_id.clone()))
    }

    /// Run a backend call with the cached token. If the backend refuses the
    /// token, log in again and retry exactly once.
    async fn with_token<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: Fn(Arc<Credential>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let credential = self.credentials.ensure_token().await?;
        match call(credential.clone()).await {
            Err(e) if e.is_auth() => {
                debug!(error = %e, "Backend refused token; re-authenticating once");
                let fresh = self.credentials.reauthenticate(&credential).await?;
                call(fresh).await
            }
            other => other,
        }
    }
}

fn rejected(order: &ExchangeOrder) -> Error {
    Error::Exchange(format!(
        "order {} rejected by exchange",
        order.exchange_order_id
    ))
}
