//! Revenue ledger.
//!
//! Append-only, in-process record of settled-bet economics. Each settlement
//! appends two events under one critical section: a `HouseEdge` entry
//! tracking the theoretical edge, plus a `PlatformFee` (win) or
//! `LossRevenue` (loss) entry tracking realized cash. The two lenses are
//! deliberately double-counted; dashboards rely on both.
//!
//! Windowed statistics are recomputed from the event log and held in a
//! short-lived cache that every append invalidates.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::EconomicsConfig;
use crate::edge::{round2, round4, HouseEdgeEngine};
use crate::types::{PeriodStats, RevenueEvent, RevenueEventKind, RevenueStats, UserRevenue};

/// One day in milliseconds.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

const WEEK_MS: i64 = 7 * DAY_MS;
const MONTH_MS: i64 = 30 * DAY_MS;

/// Contract violations rejected before they can corrupt the aggregates.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("bet id must not be empty")]
    EmptyBetId,

    #[error("user id must not be empty")]
    EmptyUserId,

    #[error("bet amount must be a positive finite number, got {0}")]
    InvalidBetAmount(f64),

    #[error("multiplier must be finite and >= 1, got {0}")]
    InvalidMultiplier(f64),
}

struct StatsCache {
    computed_at_ms: i64,
    stats: RevenueStats,
}

struct LedgerInner {
    events: Vec<RevenueEvent>,
    next_id: u64,
    cache: Option<StatsCache>,
}

/// Append-only revenue event log with cached windowed statistics.
///
/// Writers (`record_bet_revenue`) and readers (`revenue_stats`) may be called
/// concurrently; the interior mutex keeps every settlement atomic, so readers
/// never observe a `HouseEdge` entry without its paired realized-revenue
/// entry.
pub struct RevenueLedger {
    engine: HouseEdgeEngine,
    cache_ttl_ms: i64,
    inner: Mutex<LedgerInner>,
}

impl RevenueLedger {
    pub fn new(engine: HouseEdgeEngine, config: &EconomicsConfig) -> Self {
        Self {
            engine,
            cache_ttl_ms: config.stats_cache_ttl_ms,
            inner: Mutex::new(LedgerInner {
                events: Vec::new(),
                next_id: 1,
                cache: None,
            }),
        }
    }

    /// The engine this ledger prices settlements with.
    pub fn engine(&self) -> &HouseEdgeEngine {
        &self.engine
    }

    /// Record the economics of a settled bet.
    ///
    /// `true_probability` defaults to 0.5 when the caller does not know it.
    pub fn record_bet_revenue(
        &self,
        bet_id: &str,
        user_id: &str,
        bet_amount: f64,
        multiplier: f64,
        won: bool,
        true_probability: Option<f64>,
    ) -> Result<(), LedgerError> {
        self.record_bet_revenue_at(
            bet_id,
            user_id,
            bet_amount,
            multiplier,
            won,
            true_probability,
            Utc::now().timestamp_millis(),
        )
    }

    /// Clock-explicit variant of [`record_bet_revenue`](Self::record_bet_revenue).
    pub fn record_bet_revenue_at(
        &self,
        bet_id: &str,
        user_id: &str,
        bet_amount: f64,
        multiplier: f64,
        won: bool,
        true_probability: Option<f64>,
        now_ms: i64,
    ) -> Result<(), LedgerError> {
        if bet_id.is_empty() {
            return Err(LedgerError::EmptyBetId);
        }
        if user_id.is_empty() {
            return Err(LedgerError::EmptyUserId);
        }
        if !bet_amount.is_finite() || bet_amount <= 0.0 {
            return Err(LedgerError::InvalidBetAmount(bet_amount));
        }
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(LedgerError::InvalidMultiplier(multiplier));
        }

        let probability = true_probability.unwrap_or(0.5);
        let quote = self.engine.quote(bet_amount, probability);

        let realized = if won {
            (
                RevenueEventKind::PlatformFee,
                self.engine.platform_fee(bet_amount, multiplier).platform_fee,
            )
        } else {
            // The house keeps the entire stake.
            (RevenueEventKind::LossRevenue, bet_amount)
        };

        // Both entries plus the cache invalidation happen inside one critical
        // section so concurrent readers never see a half-written settlement.
        let mut inner = self.inner.lock();
        for (kind, amount) in [
            (RevenueEventKind::HouseEdge, quote.expected_house_revenue),
            realized,
        ] {
            let id = inner.next_id;
            inner.next_id += 1;
            inner.events.push(RevenueEvent {
                id,
                timestamp_ms: now_ms,
                kind,
                amount,
                bet_id: bet_id.to_string(),
                user_id: user_id.to_string(),
                bet_amount,
                multiplier,
                won,
            });
        }
        inner.cache = None;

        debug!(
            "Recorded settlement {}: user={} amount=${:.2} x{:.2} won={}",
            bet_id, user_id, bet_amount, multiplier, won
        );

        Ok(())
    }

    /// Windowed revenue statistics, served from cache while fresh.
    pub fn revenue_stats(&self) -> RevenueStats {
        self.revenue_stats_at(Utc::now().timestamp_millis())
    }

    /// Clock-explicit variant of [`revenue_stats`](Self::revenue_stats).
    pub fn revenue_stats_at(&self, now_ms: i64) -> RevenueStats {
        let mut inner = self.inner.lock();

        if let Some(cache) = &inner.cache {
            if now_ms - cache.computed_at_ms < self.cache_ttl_ms {
                return cache.stats.clone();
            }
        }

        let stats = RevenueStats {
            daily: compute_period(&inner.events, Some(now_ms - DAY_MS)),
            weekly: compute_period(&inner.events, Some(now_ms - WEEK_MS)),
            monthly: compute_period(&inner.events, Some(now_ms - MONTH_MS)),
            all_time: compute_period(&inner.events, None),
        };

        inner.cache = Some(StatsCache {
            computed_at_ms: now_ms,
            stats: stats.clone(),
        });

        stats
    }

    /// Most recent revenue events, newest first.
    pub fn recent_events(&self, limit: usize) -> Vec<RevenueEvent> {
        let inner = self.inner.lock();
        inner.events.iter().rev().take(limit).cloned().collect()
    }

    /// Realized revenue and distinct bet count per user, highest revenue
    /// first, truncated to `limit`.
    pub fn revenue_by_user(&self, limit: usize) -> Vec<UserRevenue> {
        struct UserAgg {
            revenue: f64,
            bet_ids: HashSet<String>,
        }

        let inner = self.inner.lock();

        let mut users: HashMap<&str, UserAgg> = HashMap::new();
        for event in &inner.events {
            if event.kind == RevenueEventKind::HouseEdge {
                continue;
            }
            let agg = users.entry(event.user_id.as_str()).or_insert(UserAgg {
                revenue: 0.0,
                bet_ids: HashSet::new(),
            });
            agg.revenue += event.amount;
            agg.bet_ids.insert(event.bet_id.clone());
        }

        let mut rollup: Vec<UserRevenue> = users
            .into_iter()
            .map(|(user_id, agg)| UserRevenue {
                user_id: user_id.to_string(),
                revenue: round2(agg.revenue),
                bets: agg.bet_ids.len(),
            })
            .collect();

        rollup.sort_by(|a, b| {
            b.revenue
                .partial_cmp(&a.revenue)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        rollup.truncate(limit);
        rollup
    }

    /// Number of events in the log.
    pub fn event_count(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// Administrative reset: empties the event log and the cache.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.events.len();
        inner.events.clear();
        inner.cache = None;
        info!("Cleared revenue ledger ({} events dropped)", dropped);
    }
}

/// Aggregate events newer than `cutoff_ms` (all events when None) into one
/// period's statistics. Pure function of the event log.
fn compute_period(events: &[RevenueEvent], cutoff_ms: Option<i64>) -> PeriodStats {
    struct BetAgg {
        bet_amount: f64,
        multiplier: f64,
    }

    let mut stats = PeriodStats::default();
    let mut bets: HashMap<&str, BetAgg> = HashMap::new();

    for event in events {
        if let Some(cutoff) = cutoff_ms {
            if event.timestamp_ms < cutoff {
                continue;
            }
        }

        match event.kind {
            RevenueEventKind::HouseEdge => stats.house_edge_revenue += event.amount,
            RevenueEventKind::PlatformFee => {
                stats.platform_fee_revenue += event.amount;
                stats.total_wins += 1;
            }
            RevenueEventKind::LossRevenue => {
                stats.loss_revenue += event.amount;
                stats.total_losses += 1;
            }
        }

        // Volume and multiplier are per-bet figures shared by both of a
        // bet's events; take them once.
        bets.entry(event.bet_id.as_str()).or_insert(BetAgg {
            bet_amount: event.bet_amount,
            multiplier: event.multiplier,
        });
    }

    stats.total_bets = bets.len();
    stats.total_volume = bets.values().map(|b| b.bet_amount).sum();
    stats.total_revenue = stats.platform_fee_revenue + stats.loss_revenue;

    if stats.total_bets > 0 {
        stats.win_rate = round4(stats.total_wins as f64 / stats.total_bets as f64);
        stats.average_bet_size = round2(stats.total_volume / stats.total_bets as f64);
        stats.average_multiplier = round2(
            bets.values().map(|b| b.multiplier).sum::<f64>() / stats.total_bets as f64,
        );
    }
    if stats.total_volume > 0.0 {
        stats.effective_edge = round4(stats.total_revenue / stats.total_volume);
    }

    stats.total_volume = round2(stats.total_volume);
    stats.house_edge_revenue = round2(stats.house_edge_revenue);
    stats.platform_fee_revenue = round2(stats.platform_fee_revenue);
    stats.loss_revenue = round2(stats.loss_revenue);
    stats.total_revenue = round2(stats.total_revenue);

    stats
}
