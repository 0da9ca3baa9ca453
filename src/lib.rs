//! Wagermill core services
//!
//! Core subsystems of a price-prediction betting platform:
//!
//! - **Price oracle feed** — one authoritative current price with a short
//!   look-back history, sourced from live upstreams with automatic
//!   reconnect and a permanent synthetic fallback
//! - **House-edge engine** — pure multiplier/fee/EV calculations
//! - **Revenue ledger** — append-only settled-bet economics with cached
//!   time-windowed statistics
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wagermill::{
//!     EconomicsConfig, FeedEvent, HouseEdgeEngine, OracleConfig, PriceOracleFeed, RevenueLedger,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let econ = EconomicsConfig::default();
//!     let ledger = Arc::new(RevenueLedger::new(HouseEdgeEngine::new(&econ), &econ));
//!     let feed = Arc::new(PriceOracleFeed::new(OracleConfig::default()));
//!
//!     let mut events = feed.subscribe();
//!     feed.start();
//!
//!     ledger
//!         .record_bet_revenue("bet-1", "user-1", 10.0, 2.45, true, None)
//!         .unwrap();
//!
//!     while let Ok(event) = events.recv().await {
//!         if let FeedEvent::Price { price, .. } = event {
//!             println!("${:.4}", price);
//!         }
//!     }
//! }
//! ```

pub mod config;
pub mod edge;
pub mod feed;
pub mod history;
pub mod ledger;
pub mod server;
pub mod synthetic;
pub mod types;
pub mod upstream;

pub use config::{EconomicsConfig, OracleConfig, SyntheticConfig};
pub use edge::HouseEdgeEngine;
pub use feed::PriceOracleFeed;
pub use history::PriceHistoryBuffer;
pub use ledger::{LedgerError, RevenueLedger};
pub use server::run_server;
pub use synthetic::SyntheticGenerator;
pub use types::{
    ClientRequest, EdgeCheck, EdgeQuote, FeeBreakdown, FeedEvent, FeedState, OracleSource,
    OracleStatus, PeriodStats, PricePoint, RevenueEvent, RevenueEventKind, RevenueProjection,
    RevenueStats, ServerReply, UserRevenue,
};
