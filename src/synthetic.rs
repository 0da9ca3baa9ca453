//! Synthetic price generator.
//!
//! A mean-reverting random walk with a persistent trend bias and occasional
//! larger impulses. The output is autocorrelated and visually smooth rather
//! than white noise, which betting odds need to look believable. Used as the
//! last-resort oracle source when no live upstream is available.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SyntheticConfig;

/// Stateful random-walk price generator.
#[derive(Debug)]
pub struct SyntheticGenerator {
    config: SyntheticConfig,
    rng: StdRng,

    /// Current price of the walk
    base_price: f64,

    /// Persistent per-tick drift, redrawn with small probability each tick
    trend: f64,
}

impl SyntheticGenerator {
    pub fn new(config: SyntheticConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Seeded constructor for deterministic tests.
    pub fn with_seed(config: SyntheticConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: SyntheticConfig, rng: StdRng) -> Self {
        let base_price = config.base_price;
        Self {
            config,
            rng,
            base_price,
            trend: 0.0,
        }
    }

    /// Advance the walk one tick and return the new price.
    pub fn next_price(&mut self) -> f64 {
        let cfg = &self.config;

        let random_change = self.rng.gen_range(-1.0..1.0) * cfg.volatility * self.base_price;

        // Occasionally redraw the trend bias; it then applies every tick
        // until the next redraw.
        if self.rng.gen::<f64>() < cfg.trend_redraw_prob {
            self.trend = self.rng.gen_range(-1.0..1.0) * cfg.volatility * 0.5;
        }

        // Rare larger impulse on top of the regular step.
        let big_move = if self.rng.gen::<f64>() < cfg.big_move_prob {
            self.rng.gen_range(-1.0..1.0) * cfg.volatility * 8.0 * self.base_price
        } else {
            0.0
        };

        let reversion = (cfg.center_price - self.base_price) * cfg.mean_reversion;

        let next = self.base_price
            + random_change
            + self.trend * self.base_price
            + big_move
            + reversion;

        self.base_price = round4(next.clamp(cfg.min_price, cfg.max_price));
        self.base_price
    }

    /// Current price without advancing the walk.
    pub fn current_price(&self) -> f64 {
        self.base_price
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> SyntheticConfig {
        SyntheticConfig {
            base_price: 150.0,
            center_price: 150.0,
            volatility: 0.002,
            trend_redraw_prob: 0.06,
            big_move_prob: 0.05,
            mean_reversion: 0.01,
            min_price: 50.0,
            max_price: 500.0,
            tick_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn stays_within_clamp_band() {
        let mut gen = SyntheticGenerator::with_seed(test_config(), 7);
        for _ in 0..10_000 {
            let price = gen.next_price();
            assert!((50.0..=500.0).contains(&price), "price escaped: {}", price);
        }
    }

    #[test]
    fn rounds_to_four_decimals() {
        let mut gen = SyntheticGenerator::with_seed(test_config(), 11);
        for _ in 0..500 {
            let price = gen.next_price();
            let scaled = price * 10_000.0;
            assert!((scaled - scaled.round()).abs() < 1e-6);
        }
    }

    #[test]
    fn deterministic_under_seed() {
        let mut a = SyntheticGenerator::with_seed(test_config(), 99);
        let mut b = SyntheticGenerator::with_seed(test_config(), 99);
        for _ in 0..200 {
            assert_eq!(a.next_price(), b.next_price());
        }
    }

    #[test]
    fn reverts_toward_center() {
        let mut config = test_config();
        config.base_price = 400.0;
        config.volatility = 0.0005;

        let mut gen = SyntheticGenerator::with_seed(config, 3);
        let mut price = 400.0;
        for _ in 0..2_000 {
            price = gen.next_price();
        }

        // With weak noise and 1% reversion per tick the walk settles near
        // the center long before 2000 ticks.
        assert!((price - 150.0).abs() < 75.0, "no reversion, price={}", price);
    }

    #[test]
    fn steps_are_small_relative_to_price() {
        let mut gen = SyntheticGenerator::with_seed(test_config(), 21);
        let mut prev = gen.current_price();
        for _ in 0..1_000 {
            let next = gen.next_price();
            // Regular step + trend + big move + reversion stays well under
            // 5% per tick at the default parameters.
            assert!((next - prev).abs() / prev < 0.05);
            prev = next;
        }
    }
}
