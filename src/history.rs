//! Bounded, time-ordered price history.
//!
//! Keeps the last few minutes of ticks for volatility and high/low queries.
//! The buffer is bounded by time, not by count: every insert purges points
//! older than the retention window measured from the caller's clock.

use std::collections::VecDeque;

use crate::types::PricePoint;

/// How many of the newest points volatility is computed over.
const VOLATILITY_WINDOW: usize = 60;

/// Time-bounded buffer of price samples, ordered by timestamp.
#[derive(Debug)]
pub struct PriceHistoryBuffer {
    points: VecDeque<PricePoint>,

    /// Retention window in milliseconds
    retention_ms: i64,
}

impl PriceHistoryBuffer {
    pub fn new(retention_ms: i64) -> Self {
        Self {
            points: VecDeque::new(),
            retention_ms,
        }
    }

    /// Record a price at `now_ms` and purge anything past retention.
    ///
    /// Points are recorded with the caller's clock, which keeps the buffer
    /// monotonically non-decreasing in timestamp.
    pub fn record(&mut self, price: f64, now_ms: i64) {
        self.points.push_back(PricePoint {
            price,
            timestamp_ms: now_ms,
        });
        self.purge(now_ms);
    }

    /// Drop every point older than `now_ms - retention`.
    ///
    /// Filters by the wall-clock cutoff rather than popping from the front,
    /// so a source emitting backdated timestamps cannot keep stale points
    /// alive past retention.
    pub fn purge(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.retention_ms;
        self.points.retain(|p| p.timestamp_ms >= cutoff);
    }

    /// Most recently recorded point.
    pub fn latest(&self) -> Option<PricePoint> {
        self.points.back().copied()
    }

    /// Copy of the retained history, oldest first.
    pub fn snapshot(&self) -> Vec<PricePoint> {
        self.points.iter().copied().collect()
    }

    /// Closest point at or before `timestamp_ms`, if any.
    pub fn price_at(&self, timestamp_ms: i64) -> Option<PricePoint> {
        self.points
            .iter()
            .rev()
            .find(|p| p.timestamp_ms <= timestamp_ms)
            .copied()
    }

    /// Population standard deviation over the last 60 retained points
    /// (or fewer). Returns 0 for fewer than 2 points.
    pub fn volatility(&self) -> f64 {
        let len = self.points.len();
        if len < 2 {
            return 0.0;
        }

        let start = len.saturating_sub(VOLATILITY_WINDOW);
        let window: Vec<f64> = self.points.iter().skip(start).map(|p| p.price).collect();

        let mean = window.iter().sum::<f64>() / window.len() as f64;
        let variance =
            window.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / window.len() as f64;

        variance.sqrt()
    }

    /// Highest and lowest price over the retained history; None if empty.
    pub fn high_low(&self) -> Option<(f64, f64)> {
        if self.points.is_empty() {
            return None;
        }

        let mut high = f64::MIN;
        let mut low = f64::MAX;
        for p in &self.points {
            high = high.max(p.price);
            low = low.min(p.price);
        }

        Some((high, low))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
