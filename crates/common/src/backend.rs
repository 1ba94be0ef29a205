use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

use crate::{BackendOrderId, OrderRecord, Result, StatusUpdate};

/// Username/password pair for the backend's login endpoint.
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password.into().into_boxed_str()),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// A bearer token issued by the backend.
///
/// The backend does not say when a token expires, so a credential is treated
/// as valid until a request made with it is refused.
#[derive(Debug)]
pub struct Credential {
    token: SecretString,
    pub obtained_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token.into().into_boxed_str()),
            obtained_at: Utc::now(),
        }
    }

    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }
}

/// The backend's order storage API.
///
/// `BackendClient` in `crates/backend` implements this over HTTP. None of the
/// methods retry; retry policy belongs to the caller.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Exchange credentials for a bearer token.
    async fn login(&self, credentials: &Credentials) -> Result<Credential>;

    /// Store a new order record and return the id the backend assigned.
    async fn create_order(&self, record: &OrderRecord, token: &str) -> Result<BackendOrderId>;

    /// Apply a partial status update to a stored record.
    async fn update_order_status(
        &self,
        order_id: &BackendOrderId,
        update: &StatusUpdate,
        token: &str,
    ) -> Result<()>;
}
