//! Wagermill core service
//!
//! Wires the oracle feed, house-edge engine, and revenue ledger together and
//! exposes them over a WebSocket surface.
//!
//! # Usage
//!
//! ```bash
//! cargo run
//! ```

use std::sync::Arc;

use tracing::{info, warn};

use wagermill::{
    run_server, EconomicsConfig, FeedEvent, HouseEdgeEngine, OracleConfig, PriceOracleFeed,
    RevenueLedger,
};

/// WebSocket server address (0.0.0.0 for Docker/production).
fn server_addr() -> String {
    std::env::var("WAGERMILL_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8085".to_string())
}

/// How often the revenue summary is logged.
const STATS_LOG_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    info!("Starting wagermill core service");

    let oracle_config = OracleConfig::from_env();
    let economics = EconomicsConfig::from_env();
    info!(
        "Economics: house edge {:.0}%, platform fee {:.0}%",
        economics.house_edge * 100.0,
        economics.platform_fee_rate * 100.0
    );

    // Explicitly constructed service instances, shared from the composition
    // root rather than through lazily-initialized globals.
    let engine = HouseEdgeEngine::new(&economics);
    let ledger = Arc::new(RevenueLedger::new(engine, &economics));
    let feed = Arc::new(PriceOracleFeed::new(oracle_config));

    let mut feed_events = feed.subscribe();
    feed.start();

    // WebSocket surface for subscribers, settlement callers, and dashboards
    let addr = server_addr();
    let server_feed = feed.clone();
    let server_ledger = ledger.clone();
    tokio::spawn(async move {
        run_server(&addr, server_feed, server_ledger).await;
    });

    // Periodic revenue summary
    let stats_ledger = ledger.clone();
    let stats_feed = feed.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATS_LOG_INTERVAL);
        loop {
            interval.tick().await;

            let stats = stats_ledger.revenue_stats();
            info!(
                "Revenue (daily): {} bets, ${:.2} volume, ${:.2} realized | source: {}",
                stats.daily.total_bets,
                stats.daily.total_volume,
                stats.daily.total_revenue,
                stats_feed.active_source()
            );
        }
    });

    // Log connectivity transitions and meaningful price moves
    let log_feed = feed.clone();
    let feed_log_task = tokio::spawn(async move {
        let mut last_logged: Option<f64> = None;

        loop {
            match feed_events.recv().await {
                Ok(FeedEvent::Connectivity { connected, source }) => {
                    if connected {
                        info!("Oracle connected ({})", source);
                    } else {
                        warn!("Oracle disconnected ({})", source);
                    }
                }
                Ok(FeedEvent::Fallback { source }) => {
                    warn!("Oracle permanently on {} source", source);
                }
                Ok(FeedEvent::Price { price, .. }) => {
                    // Avoid spamming on every tick: log moves over 0.1%.
                    let should_log = match last_logged {
                        Some(last) => ((price - last) / last).abs() > 0.001,
                        None => true,
                    };
                    if should_log {
                        info!(
                            "Price: ${:.4} (volatility {:.4})",
                            price,
                            log_feed.volatility()
                        );
                        last_logged = Some(price);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    feed.stop();
    feed_log_task.abort();

    Ok(())
}
