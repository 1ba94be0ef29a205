pub mod backend;
pub mod config;
pub mod error;
pub mod exchange;
pub mod types;

pub use backend::{BackendApi, Credential, Credentials};
pub use config::Config;
pub use error::{Error, Result};
pub use exchange::ExchangeClient;
pub use types::*;
