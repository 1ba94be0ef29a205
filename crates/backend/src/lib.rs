pub mod client;
pub mod credentials;

pub use client::BackendClient;
pub use credentials::CredentialCache;
