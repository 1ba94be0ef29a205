use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use common::error::snippet;
use common::{
    BackendApi, BackendOrderId, Credential, Credentials, Error, OrderRecord, Result, StatusUpdate,
};

pub const LOGIN_PATH: &str = "/api/v1/auth/login";
pub const ORDERS_PATH: &str = "/api/v1/orders";

/// REST client for the backend's order storage API.
///
/// Every call carries the timeout given at construction. Responses are
/// classified in two independent steps: the status code first (401/403 become
/// `Error::Auth`, any other non-2xx `Error::HttpStatus`), then the body is
/// decoded. A 2xx whose body does not decode is `Error::ResponseFormat`, never
/// a success.
pub struct BackendClient {
    base_url: String,
    http: Client,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a request and read the whole body. Only transport failures error here.
    async fn send(&self, url: &str, request: RequestBuilder) -> Result<(StatusCode, String)> {
        let resp = request
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| transport_error(url, e))?;
        debug!(url, status = status.as_u16(), body = %snippet(&body), "Backend response");
        Ok((status, body))
    }
}

#[async_trait]
impl BackendApi for BackendClient {
    async fn login(&self, credentials: &Credentials) -> Result<Credential> {
        let url = self.url(LOGIN_PATH);
        debug!(url = %url, username = %credentials.username, "Authenticating with backend");

        let body = json!({
            "username": credentials.username,
            "password": credentials.password.expose_secret(),
        });
        let (status, text) = self.send(&url, self.http.post(&url).json(&body)).await?;
        check_status(&url, status, &text)?;

        let resp: LoginResponse = decode(&url, status, &text)?;
        match resp.access_token.or(resp.token).filter(|t| !t.is_empty()) {
            Some(token) => Ok(Credential::new(token)),
            None => Err(Error::Auth {
                url,
                status: status.as_u16(),
                body: snippet(&text),
            }),
        }
    }

    async fn create_order(&self, record: &OrderRecord, token: &str) -> Result<BackendOrderId> {
        let url = self.url(ORDERS_PATH);
        debug!(
            url = %url,
            exchange_order_id = %record.exchange_order_id,
            session_key = %record.session_key,
            "Creating order record"
        );

        let request = self.http.post(&url).bearer_auth(token).json(record);
        let (status, text) = self.send(&url, request).await?;
        check_status(&url, status, &text)?;

        let resp: CreateOrderResponse = decode(&url, status, &text)?;
        if resp.success == Some(false) {
            return Err(format_error(
                &url,
                status,
                &text,
                format!(
                    "backend reported failure: {}",
                    resp.error.as_deref().unwrap_or("no error message")
                ),
            ));
        }

        resp.order_id()
            .ok_or_else(|| format_error(&url, status, &text, "no order id in response".into()))
    }

    async fn update_order_status(
        &self,
        order_id: &BackendOrderId,
        update: &StatusUpdate,
        token: &str,
    ) -> Result<()> {
        let url = self.url(&format!("{ORDERS_PATH}/{order_id}/status"));
        debug!(url = %url, status = %update.status, "Updating order status");

        let request = self.http.put(&url).bearer_auth(token).json(update);
        let (status, text) = self.send(&url, request).await?;
        check_status(&url, status, &text)?;

        if status == StatusCode::NO_CONTENT {
            return Ok(());
        }

        let resp: AckResponse = decode(&url, status, &text)?;
        if resp.success == Some(false) {
            return Err(format_error(
                &url,
                status,
                &text,
                format!(
                    "backend reported failure: {}",
                    resp.error.as_deref().unwrap_or("no error message")
                ),
            ));
        }
        Ok(())
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout {
            url: url.to_string(),
        }
    } else {
        Error::Transport {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

/// Classify the status code alone. 2xx passes; the body is judged separately.
fn check_status(url: &str, status: StatusCode, body: &str) -> Result<()> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::Auth {
            url: url.to_string(),
            status: status.as_u16(),
            body: snippet(body),
        });
    }
    if !status.is_success() {
        return Err(Error::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
            body: snippet(body),
        });
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(url: &str, status: StatusCode, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| format_error(url, status, body, e.to_string()))
}

fn format_error(url: &str, status: StatusCode, body: &str, reason: String) -> Error {
    Error::ResponseFormat {
        url: url.to_string(),
        status: status.as_u16(),
        reason,
        body: snippet(body),
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Ids arrive as strings or integers depending on the backend version.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(i64),
}

impl WireId {
    fn into_id(self) -> Option<BackendOrderId> {
        match self {
            WireId::Text(s) if s.trim().is_empty() => None,
            WireId::Text(s) => Some(BackendOrderId::new(s)),
            WireId::Number(n) => Some(BackendOrderId::new(n.to_string())),
        }
    }
}

/// Accepts `{"id": ..}`, `{"order_id": ..}` and
/// `{"success": true, "order": {"order_id": ..}}`.
#[derive(Deserialize)]
struct CreateOrderResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    id: Option<WireId>,
    #[serde(default)]
    order_id: Option<WireId>,
    #[serde(default)]
    order: Option<CreatedOrder>,
}

#[derive(Deserialize)]
struct CreatedOrder {
    #[serde(default)]
    id: Option<WireId>,
    #[serde(default)]
    order_id: Option<WireId>,
}

impl CreateOrderResponse {
    fn order_id(self) -> Option<BackendOrderId> {
        let nested = self.order.and_then(|o| o.order_id.or(o.id));
        self.order_id
            .or(self.id)
            .or(nested)
            .and_then(WireId::into_id)
    }
}

#[derive(Deserialize)]
struct AckResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}
