//! Shared data types for the oracle feed and revenue ledger.

use serde::{Deserialize, Serialize};

/// A single recorded price sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Price in USD (f64 for simplicity; production may use fixed-point)
    pub price: f64,

    /// Unix timestamp in milliseconds when this price was recorded
    pub timestamp_ms: i64,
}

/// Which upstream the oracle feed is currently driven by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleSource {
    /// Streaming live feed (requires an API credential)
    Primary,

    /// Polling live feed (requires its own credential)
    Secondary,

    /// Self-contained random-walk generator; always available, never fails
    Synthetic,
}

impl std::fmt::Display for OracleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleSource::Primary => write!(f, "primary"),
            OracleSource::Secondary => write!(f, "secondary"),
            OracleSource::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Lifecycle state of the oracle feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
}

/// Snapshot of the oracle's externally visible state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleStatus {
    pub connected: bool,

    /// Most recent price, if any tick has been recorded
    pub current_price: Option<f64>,

    /// Unix timestamp in milliseconds of the last recorded tick
    pub last_update_ms: Option<i64>,

    pub active_source: OracleSource,

    pub state: FeedState,
}

/// Events emitted by the oracle feed to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// A new price tick was recorded
    Price { price: f64, timestamp: i64 },

    /// Upstream connectivity changed
    Connectivity {
        connected: bool,
        source: OracleSource,
    },

    /// All live sources exhausted; permanently on the synthetic generator
    Fallback { source: OracleSource },
}

/// Kind of a revenue ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenueEventKind {
    /// Theoretical expected house revenue for a bet (recorded win or lose)
    HouseEdge,

    /// Fee taken from the winnings of a won bet
    PlatformFee,

    /// Full stake kept by the house on a lost bet
    LossRevenue,
}

/// One immutable entry in the revenue ledger. Each settled bet produces two:
/// a `HouseEdge` entry plus a `PlatformFee` or `LossRevenue` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueEvent {
    pub id: u64,

    /// Unix timestamp in milliseconds when the bet settled
    pub timestamp_ms: i64,

    pub kind: RevenueEventKind,

    /// Revenue amount for this entry (meaning depends on `kind`)
    pub amount: f64,

    pub bet_id: String,

    pub user_id: String,

    /// Stake the user wagered
    pub bet_amount: f64,

    /// Displayed payout multiplier the bet was placed at
    pub multiplier: f64,

    pub won: bool,
}

/// Aggregated revenue statistics over one time window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
    /// Total wagered volume, counted once per unique bet
    pub total_volume: f64,

    pub total_bets: usize,

    pub total_wins: usize,

    pub total_losses: usize,

    /// Sum of theoretical house-edge figures (analytics lens, not cash)
    pub house_edge_revenue: f64,

    pub platform_fee_revenue: f64,

    pub loss_revenue: f64,

    /// Realized cash revenue: platform fees + loss revenue
    pub total_revenue: f64,

    pub win_rate: f64,

    /// Realized revenue as a fraction of wagered volume
    pub effective_edge: f64,

    pub average_bet_size: f64,

    pub average_multiplier: f64,
}

/// Revenue statistics across the standard reporting windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueStats {
    pub daily: PeriodStats,
    pub weekly: PeriodStats,
    pub monthly: PeriodStats,
    pub all_time: PeriodStats,
}

/// Realized revenue attributed to a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRevenue {
    pub user_id: String,

    /// Realized revenue (platform fees + loss revenue) from this user
    pub revenue: f64,

    /// Number of distinct settled bets
    pub bets: usize,
}

/// Multiplier quote for a bet at a stated win probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeQuote {
    /// Probability after clamping to the supported range
    pub probability: f64,

    /// Break-even multiplier with zero house advantage (1/p)
    pub fair_multiplier: f64,

    /// Multiplier shown to the user: fair reduced by the house edge
    pub display_multiplier: f64,

    /// Expected house take on this bet
    pub expected_house_revenue: f64,
}

/// Result of checking a displayed multiplier against the configured edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeCheck {
    pub fair_multiplier: f64,
    pub actual_edge: f64,
    pub valid: bool,
}

/// Payout breakdown for a won bet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub gross_payout: f64,

    /// Payout above the returned principal; the fee applies only here
    pub winnings: f64,

    pub platform_fee: f64,

    pub net_payout: f64,
}

/// Dashboard revenue projection from an assumed daily volume. An estimate,
/// not a guarantee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueProjection {
    pub daily_volume: f64,
    pub assumed_win_rate: f64,
    pub assumed_multiplier: f64,
    pub projected_payouts: f64,
    pub fee_revenue: f64,
    pub loss_revenue: f64,
    pub daily_revenue: f64,
    pub weekly_revenue: f64,
    pub monthly_revenue: f64,
    pub yearly_revenue: f64,
    pub effective_edge: f64,
}

/// Requests clients may send over the WebSocket surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Record the economics of a settled bet
    Settle {
        bet_id: String,
        user_id: String,
        bet_amount: f64,
        multiplier: f64,
        won: bool,
        /// Stated win probability; defaults to 0.5 when unknown
        true_probability: Option<f64>,
    },

    /// Windowed revenue statistics
    Stats,

    /// Most recent revenue events, newest first
    Recent { limit: Option<usize> },

    /// Per-user revenue rollup, highest revenue first
    TopUsers { limit: Option<usize> },

    /// Retained price history
    History,

    /// Multiplier quote for a bet amount and win probability
    Quote { bet_amount: f64, probability: f64 },

    /// Revenue projection from an assumed daily volume
    Project { daily_volume: f64 },

    /// Oracle connectivity and current price
    Status,
}

/// Replies to [`ClientRequest`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerReply {
    Settled { bet_id: String },
    Stats(RevenueStats),
    Events { events: Vec<RevenueEvent> },
    Users { users: Vec<UserRevenue> },
    History { points: Vec<PricePoint> },
    Quote(EdgeQuote),
    Projection(RevenueProjection),
    Status(OracleStatus),
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_event_wire_shape() {
        let event = FeedEvent::Price {
            price: 152.3312,
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "price");
        assert_eq!(json["price"], 152.3312);
        assert_eq!(json["timestamp"], 1_700_000_000_000i64);
    }

    #[test]
    fn settle_request_parses() {
        let raw = r#"{
            "type": "settle",
            "bet_id": "bet-1",
            "user_id": "u-9",
            "bet_amount": 10.0,
            "multiplier": 2.45,
            "won": true
        }"#;
        let req: ClientRequest = serde_json::from_str(raw).unwrap();
        match req {
            ClientRequest::Settle {
                bet_id,
                true_probability,
                ..
            } => {
                assert_eq!(bet_id, "bet-1");
                assert!(true_probability.is_none());
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn source_display() {
        assert_eq!(OracleSource::Synthetic.to_string(), "synthetic");
    }
}
