use std::net::SocketAddr;

use anyhow::Context;
use book_publisher::generator::GeneratorConfig;
use book_publisher::{serve, PublisherConfig};
use clap::Parser;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "book-publisher")]
#[command(about = "Stream a synthetic order book to one subscriber over TCP")]
struct Args {
    /// Listen address
    #[arg(long, env = "BOOK_PUBLISHER_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Symbol stamped on every message
    #[arg(long, env = "BOOK_SYMBOL", default_value = "BTC/USD")]
    symbol: String,

    /// Target delta rate (updates/sec)
    #[arg(long, env = "BOOK_PUBLISHER_RATE", default_value_t = 10)]
    rate: u32,

    /// Mid price the synthetic book is centered on
    #[arg(long, env = "BOOK_MID_PRICE", default_value = "10000")]
    mid_price: Decimal,

    /// Levels per side
    #[arg(long, env = "BOOK_DEPTH", default_value_t = 50)]
    depth: usize,

    /// RNG seed (random if omitted)
    #[arg(long, env = "BOOK_PUBLISHER_SEED")]
    seed: Option<u64>,
}

impl Args {
    fn into_config(self) -> PublisherConfig {
        PublisherConfig {
            listen_addr: self.listen,
            symbol: self.symbol,
            rate: self.rate,
            generator: GeneratorConfig {
                mid_price: self.mid_price,
                depth: self.depth,
                ..GeneratorConfig::default()
            },
            seed: self.seed,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Args::parse().into_config();
    tracing::info!(
        symbol = %config.symbol,
        rate = config.rate,
        "Starting order book publisher"
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                let _ = cancel_tx.send(true);
            }
            Err(err) => {
                // Dropping the sender would cancel the session
                tracing::warn!(error = %err, "Ctrl-C handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    });

    let summary = serve(config, cancel_rx)
        .await
        .context("publisher session failed")?;

    tracing::info!(
        full_books_sent = summary.full_books_sent,
        deltas_sent = summary.deltas_sent,
        stop = ?summary.stop,
        "Publisher stopped"
    );
    Ok(())
}
