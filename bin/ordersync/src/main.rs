use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use backend::BackendClient;
use common::{
    Config, ExchangeClient, OrderSide, OrderStatus, OrderType, StatusUpdate, TradingMode,
};
use engine::{BinanceClient, OrderSync};
use paper::PaperClient;

#[derive(Parser)]
#[command(name = "ordersync", about = "Place exchange orders and mirror them to the backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Place one order on the configured exchange and mirror it.
    Place(PlaceArgs),
}

#[derive(Args)]
struct PlaceArgs {
    #[arg(long, value_enum)]
    side: Side,
    #[arg(long)]
    quantity: f64,
    #[arg(long, value_enum, default_value_t = Kind::Market)]
    order_type: Kind,
    /// Limit price. Required for limit orders.
    #[arg(long)]
    price: Option<f64>,
    /// Price the paper exchange fills market orders against.
    #[arg(long)]
    reference_price: Option<f64>,
    /// Paper mode only: report the order as filled afterwards.
    #[arg(long)]
    fill: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Side {
    Buy,
    Sell,
}

impl From<Side> for OrderSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => OrderSide::Buy,
            Side::Sell => OrderSide::Sell,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    Market,
    Limit,
    LimitMaker,
}

impl From<Kind> for OrderType {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Market => OrderType::Market,
            Kind::Limit => OrderType::Limit,
            Kind::LimitMaker => OrderType::LimitMaker,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("failed to load configuration")?;
    info!(mode = %cfg.trading_mode, symbol = %cfg.symbol, "ordersync starting");

    match cli.command {
        Command::Place(args) => place(cfg, args).await,
    }
}

async fn place(cfg: Config, args: PlaceArgs) -> anyhow::Result<()> {
    if args.fill && cfg.trading_mode != TradingMode::Paper {
        bail!("--fill is only available with TRADING_MODE=paper");
    }
    if args.order_type != Kind::Market && args.price.is_none() {
        bail!("--price is required for limit orders");
    }

    // ── Exchange client (injected based on TRADING_MODE) ──────────────────────
    let exchange: Arc<dyn ExchangeClient> = match cfg.trading_mode {
        TradingMode::Live => {
            let (Some(key), Some(secret)) = (&cfg.exchange_api_key, &cfg.exchange_secret) else {
                bail!("EXCHANGE_API_KEY and EXCHANGE_SECRET are required in live mode");
            };
            info!(url = %cfg.exchange_url, "Live trading mode, using BinanceClient");
            Arc::new(
                BinanceClient::new(
                    key.as_str(),
                    secret.as_str(),
                    &cfg.exchange_url,
                    cfg.request_timeout,
                )
                .context("failed to build exchange client")?,
            )
        }
        TradingMode::Paper => {
            info!(slippage_bps = cfg.paper_slippage_bps, "Paper trading mode, using PaperClient");
            let client = PaperClient::new(cfg.paper_slippage_bps);
            if let Some(price) = args.reference_price.or(args.price) {
                client.update_price(&cfg.symbol, price).await;
            }
            Arc::new(client)
        }
    };

    // ── Backend mirror ────────────────────────────────────────────────────────
    let backend = BackendClient::new(&cfg.backend_url, cfg.request_timeout)
        .context("failed to build backend client")?;
    let sync = OrderSync::new(
        exchange,
        Arc::new(backend),
        cfg.backend_credentials,
        cfg.symbol,
        cfg.session_key,
    );

    let order = sync
        .place_order(
            args.side.into(),
            args.quantity,
            args.order_type.into(),
            args.price,
        )
        .await
        .context("order placement failed")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&order).context("failed to render order")?
    );

    match sync.backend_order_id(&order.exchange_order_id).await {
        Some(id) => info!(backend_order_id = %id, "Order mirrored"),
        None => warn!(
            exchange_order_id = %order.exchange_order_id,
            "Order placed but not mirrored"
        ),
    }

    if args.fill {
        if order.status == OrderStatus::Filled {
            info!("Order already filled on placement; no status update needed");
        } else {
            let fill_price = order.price.or(args.reference_price).unwrap_or_default();
            sync.update_order_status(
                &order.exchange_order_id,
                StatusUpdate::filled(order.quantity, fill_price),
            )
            .await;
        }
    }

    Ok(())
}
