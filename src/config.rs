//! Configuration for the oracle feed and revenue economics.
//!
//! Everything has a documented default and can be overridden through the
//! environment, so deployments tune behavior without code changes.

use std::time::Duration;

use tracing::warn;

/// Default price history retention (10 minutes).
pub const DEFAULT_RETENTION_MS: i64 = 10 * 60 * 1000;

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default number of consecutive failures before the permanent synthetic
/// fallback.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default house edge applied to the fair multiplier (20%).
pub const DEFAULT_HOUSE_EDGE: f64 = 0.20;

/// Default platform fee taken from winnings (5%).
pub const DEFAULT_PLATFORM_FEE_RATE: f64 = 0.05;

/// Default statistics cache TTL (5 seconds).
pub const DEFAULT_STATS_CACHE_TTL_MS: i64 = 5_000;

/// Oracle feed configuration.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Streaming endpoint for the primary live feed
    pub primary_url: String,

    /// Credential for the primary feed; if absent the source is skipped
    pub primary_api_key: Option<String>,

    /// Snapshot endpoint for the secondary polling feed
    pub secondary_url: String,

    /// Credential for the secondary feed; if absent the source is skipped
    pub secondary_api_key: Option<String>,

    /// How often the secondary feed polls its snapshot endpoint
    pub poll_interval: Duration,

    /// Price history retention window in milliseconds
    pub retention_ms: i64,

    /// Delay before each reconnect attempt
    pub reconnect_delay: Duration,

    /// Consecutive failures tolerated before falling back to synthetic
    pub max_reconnect_attempts: u32,

    /// Parameters for the synthetic random walk
    pub synthetic: SyntheticConfig,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            primary_url: "https://quotes.example.com/v1/stream".to_string(),
            primary_api_key: None,
            secondary_url: "https://backup-quotes.example.com/v1/snapshot".to_string(),
            secondary_api_key: None,
            poll_interval: Duration::from_secs(2),
            retention_ms: DEFAULT_RETENTION_MS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            synthetic: SyntheticConfig::default(),
        }
    }
}

impl OracleConfig {
    /// Build the config from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            primary_url: env_string("PRIMARY_FEED_URL", defaults.primary_url),
            primary_api_key: non_empty(std::env::var("PRIMARY_API_KEY").ok()),
            secondary_url: env_string("SECONDARY_FEED_URL", defaults.secondary_url),
            secondary_api_key: non_empty(std::env::var("SECONDARY_API_KEY").ok()),
            poll_interval: defaults.poll_interval,
            retention_ms: env_i64_non_negative("PRICE_RETENTION_MS", defaults.retention_ms),
            reconnect_delay: Duration::from_millis(env_i64_non_negative(
                "RECONNECT_DELAY_MS",
                defaults.reconnect_delay.as_millis() as i64,
            ) as u64),
            max_reconnect_attempts: env_i64_non_negative(
                "MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts as i64,
            ) as u32,
            synthetic: SyntheticConfig::default(),
        }
    }
}

/// Parameters of the synthetic random-walk generator.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Starting price for the walk
    pub base_price: f64,

    /// Price the walk mean-reverts toward
    pub center_price: f64,

    /// Per-tick volatility as a fraction of the current price
    pub volatility: f64,

    /// Probability per tick of redrawing the persistent trend bias
    pub trend_redraw_prob: f64,

    /// Probability per tick of a single larger impulse
    pub big_move_prob: f64,

    /// Fraction of the deviation from center pulled back each tick
    pub mean_reversion: f64,

    /// Hard floor for the generated price
    pub min_price: f64,

    /// Hard ceiling for the generated price
    pub max_price: f64,

    /// Interval between generated ticks
    pub tick_interval: Duration,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            base_price: 150.0,
            center_price: 150.0,
            volatility: 0.002,
            trend_redraw_prob: 0.06,
            big_move_prob: 0.05,
            mean_reversion: 0.01,
            min_price: 50.0,
            max_price: 500.0,
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Betting economics configuration.
#[derive(Debug, Clone)]
pub struct EconomicsConfig {
    /// Fractional reduction applied to the fair multiplier
    pub house_edge: f64,

    /// Fraction of winnings taken as platform fee
    pub platform_fee_rate: f64,

    /// Revenue statistics cache TTL in milliseconds
    pub stats_cache_ttl_ms: i64,
}

impl Default for EconomicsConfig {
    fn default() -> Self {
        Self {
            house_edge: DEFAULT_HOUSE_EDGE,
            platform_fee_rate: DEFAULT_PLATFORM_FEE_RATE,
            stats_cache_ttl_ms: DEFAULT_STATS_CACHE_TTL_MS,
        }
    }
}

impl EconomicsConfig {
    /// Build the config from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            house_edge: env_f64("HOUSE_EDGE", defaults.house_edge),
            platform_fee_rate: env_f64("PLATFORM_FEE_RATE", defaults.platform_fee_rate),
            stats_cache_ttl_ms: env_i64_non_negative(
                "STATS_CACHE_TTL_MS",
                defaults.stats_cache_ttl_ms,
            ),
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    non_empty(std::env::var(key).ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring unparseable {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// Like [`env_i64`], but negative values are rejected before they can wrap
/// through an unsigned cast downstream.
fn env_i64_non_negative(key: &str, default: i64) -> i64 {
    let value = env_i64(key, default);
    if value < 0 {
        warn!("Ignoring negative {}={}", key, value);
        default
    } else {
        value
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring unparseable {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
