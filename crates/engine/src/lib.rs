pub mod binance;
pub mod sync;

pub use binance::BinanceClient;
pub use sync::{OrderSync, StatusSync};
