use std::time::Duration;

use crate::{Credentials, Error, Result, SessionKey, TradingMode};

const DEFAULT_BACKEND_URL: &str = "http://localhost:8083";
const DEFAULT_EXCHANGE_URL: &str = "https://api.binance.com";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// All configuration loaded from environment variables at startup.
#[derive(Debug)]
pub struct Config {
    // Backend
    pub backend_url: String,
    pub backend_credentials: Credentials,
    pub request_timeout: Duration,

    // Session scoping; `None` means one is generated per orchestrator.
    pub session_key: Option<SessionKey>,

    // Trading
    pub trading_mode: TradingMode,
    pub symbol: String,
    pub paper_slippage_bps: f64,

    // Exchange credentials, required in live mode only
    pub exchange_url: String,
    pub exchange_api_key: Option<String>,
    pub exchange_secret: Option<String>,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. `from_env` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let trading_mode = match env
            .optional("TRADING_MODE")
            .unwrap_or_else(|| "paper".to_string())
            .to_lowercase()
            .as_str()
        {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => {
                return Err(Error::Config(format!(
                    "TRADING_MODE must be 'paper' or 'live', got: '{other}'"
                )))
            }
        };

        let exchange_api_key = env.optional("EXCHANGE_API_KEY");
        let exchange_secret = env.optional("EXCHANGE_SECRET");
        if trading_mode == TradingMode::Live
            && (exchange_api_key.is_none() || exchange_secret.is_none())
        {
            return Err(Error::Config(
                "EXCHANGE_API_KEY and EXCHANGE_SECRET are required when TRADING_MODE=live"
                    .to_string(),
            ));
        }

        let timeout_secs = env.parsed("REQUEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(Error::Config(
                "REQUEST_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(Config {
            backend_url: env
                .optional("BACKEND_API_URL")
                .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            backend_credentials: Credentials::new(
                env.required("BACKEND_API_USERNAME")?,
                env.required("BACKEND_API_PASSWORD")?,
            ),
            request_timeout: Duration::from_secs(timeout_secs),
            session_key: env.optional("SESSION_KEY").map(SessionKey::new),
            trading_mode,
            symbol: env
                .optional("SYMBOL")
                .unwrap_or_else(|| "BTCUSDT".to_string())
                .to_uppercase(),
            paper_slippage_bps: env.parsed("PAPER_SLIPPAGE_BPS", 10.0)?,
            exchange_url: env
                .optional("EXCHANGE_API_URL")
                .unwrap_or_else(|| DEFAULT_EXCHANGE_URL.to_string()),
            exchange_api_key,
            exchange_secret,
        })
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn required(&self, key: &str) -> Result<String> {
        self.optional(key).ok_or_else(|| {
            Error::Config(format!(
                "Required environment variable '{key}' is not set. Check your .env file."
            ))
        })
    }

    /// Unset and blank values are both treated as absent.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("{key} has an invalid value: '{raw}'"))),
        }
    }
}
