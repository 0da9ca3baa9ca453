//! House-edge and fee economics.
//!
//! Pure calculations over a stated win probability: the fair multiplier, the
//! displayed multiplier with the house edge baked in, the platform fee taken
//! from winnings, and expected values. Out-of-range probabilities are clamped
//! rather than rejected; this is a display/odds calculator, availability wins
//! over strict validation.

use crate::config::EconomicsConfig;
use crate::types::{EdgeCheck, EdgeQuote, FeeBreakdown, RevenueProjection};

/// Lowest win probability a quote will be computed at.
pub const MIN_PROBABILITY: f64 = 0.001;

/// Highest win probability a quote will be computed at.
pub const MAX_PROBABILITY: f64 = 0.95;

/// Assumed average win rate for revenue projections.
pub const ASSUMED_WIN_RATE: f64 = 0.45;

/// Assumed average multiplier for revenue projections.
pub const ASSUMED_MULTIPLIER: f64 = 2.0;

/// Stateless calculator for bet economics.
#[derive(Debug, Clone)]
pub struct HouseEdgeEngine {
    house_edge: f64,
    platform_fee_rate: f64,
}

impl HouseEdgeEngine {
    pub fn new(config: &EconomicsConfig) -> Self {
        Self {
            house_edge: config.house_edge,
            platform_fee_rate: config.platform_fee_rate,
        }
    }

    /// Configured house edge fraction.
    pub fn house_edge(&self) -> f64 {
        self.house_edge
    }

    /// Configured platform fee fraction.
    pub fn platform_fee_rate(&self) -> f64 {
        self.platform_fee_rate
    }

    /// Quote the multipliers and expected house take for a bet.
    ///
    /// `fair = 1/p`, `display = fair * (1 - edge)`. Because
    /// `p * fair = 1`, the expected house revenue reduces to
    /// `bet_amount * edge`.
    pub fn quote(&self, bet_amount: f64, true_probability: f64) -> EdgeQuote {
        let probability = true_probability.clamp(MIN_PROBABILITY, MAX_PROBABILITY);

        let fair_multiplier = 1.0 / probability;
        let display_multiplier = fair_multiplier * (1.0 - self.house_edge);
        let expected_house_revenue = bet_amount * self.house_edge;

        EdgeQuote {
            probability,
            fair_multiplier: round2(fair_multiplier),
            display_multiplier: round2(display_multiplier),
            expected_house_revenue: round2(expected_house_revenue),
        }
    }

    /// Check whether a displayed multiplier embeds the configured edge.
    pub fn verify(&self, display_multiplier: f64, true_probability: f64) -> EdgeCheck {
        let probability = true_probability.clamp(MIN_PROBABILITY, MAX_PROBABILITY);

        let fair_multiplier = 1.0 / probability;
        let actual_edge = 1.0 - display_multiplier / fair_multiplier;
        let valid = (actual_edge - self.house_edge).abs() < 0.01;

        EdgeCheck {
            fair_multiplier: round2(fair_multiplier),
            actual_edge: round4(actual_edge),
            valid,
        }
    }

    /// Fee breakdown for a won bet. The fee applies to winnings only, never
    /// to the returned principal.
    pub fn platform_fee(&self, bet_amount: f64, multiplier: f64) -> FeeBreakdown {
        let gross_payout = bet_amount * multiplier;
        let winnings = gross_payout - bet_amount;
        let platform_fee = winnings * self.platform_fee_rate;
        let net_payout = gross_payout - platform_fee;

        FeeBreakdown {
            gross_payout: round2(gross_payout),
            winnings: round2(winnings),
            platform_fee: round2(platform_fee),
            net_payout: round2(net_payout),
        }
    }

    /// Expected value of the bet for the user. Negative in the steady state;
    /// that is the design, not a defect.
    pub fn user_ev(&self, bet_amount: f64, multiplier: f64, true_probability: f64) -> f64 {
        let probability = true_probability.clamp(MIN_PROBABILITY, MAX_PROBABILITY);
        let fee = self.platform_fee(bet_amount, multiplier);

        let net_win = fee.net_payout - bet_amount;
        round2(probability * net_win - (1.0 - probability) * bet_amount)
    }

    /// Expected value of the bet for the house.
    pub fn house_ev(&self, bet_amount: f64, multiplier: f64, true_probability: f64) -> f64 {
        round2(-self.user_ev(bet_amount, multiplier, true_probability))
    }

    /// Dashboard revenue estimate from an assumed daily volume, using fixed
    /// assumed win rate and average multiplier.
    pub fn project_revenue(&self, daily_volume: f64) -> RevenueProjection {
        let winners_volume = daily_volume * ASSUMED_WIN_RATE;
        let projected_payouts = winners_volume * ASSUMED_MULTIPLIER;

        let fee_revenue = (projected_payouts - winners_volume) * self.platform_fee_rate;
        let loss_revenue = daily_volume * (1.0 - ASSUMED_WIN_RATE);
        let daily_revenue = fee_revenue + loss_revenue;

        let effective_edge = if daily_volume > 0.0 {
            daily_revenue / daily_volume
        } else {
            0.0
        };

        RevenueProjection {
            daily_volume: round2(daily_volume),
            assumed_win_rate: ASSUMED_WIN_RATE,
            assumed_multiplier: ASSUMED_MULTIPLIER,
            projected_payouts: round2(projected_payouts),
            fee_revenue: round2(fee_revenue),
            loss_revenue: round2(loss_revenue),
            daily_revenue: round2(daily_revenue),
            weekly_revenue: round2(daily_revenue * 7.0),
            monthly_revenue: round2(daily_revenue * 30.0),
            yearly_revenue: round2(daily_revenue * 365.0),
            effective_edge: round4(effective_edge),
        }
    }
}

impl Default for HouseEdgeEngine {
    fn default() -> Self {
        Self::new(&EconomicsConfig::default())
    }
}

/// Round to 2 decimal places, half away from zero.
///
/// The value is first rounded at two extra digits to suppress binary
/// representation noise, so e.g. `0.725` (stored as `0.72499999...`) rounds
/// up to `0.73` the way the decimal value would.
pub(crate) fn round2(value: f64) -> f64 {
    round_dp(value, 2)
}

/// Round to 4 decimal places, half away from zero.
pub(crate) fn round4(value: f64) -> f64 {
    round_dp(value, 4)
}

fn round_dp(value: f64, dp: i32) -> f64 {
    let scale = 10f64.powi(dp);
    let denoised = (value * scale * 100.0).round() / 100.0;
    denoised.round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_is_decimal_half_away_from_zero() {
        assert_eq!(round2(0.725), 0.73);
        assert_eq!(round2(23.775), 23.78);
        assert_eq!(round2(-0.725), -0.73);
        assert_eq!(round2(1.0), 1.0);
        assert_eq!(round4(0.123456), 0.1235);
    }

    #[test]
    fn quote_embeds_configured_edge() {
        let engine = HouseEdgeEngine::default();
        let quote = engine.quote(100.0, 0.5);

        assert_eq!(quote.probability, 0.5);
        assert_eq!(quote.fair_multiplier, 2.0);
        assert_eq!(quote.display_multiplier, 1.6);
        assert_eq!(quote.expected_house_revenue, 20.0);
    }

    #[test]
    fn quote_clamps_probability() {
        let engine = HouseEdgeEngine::default();

        assert_eq!(engine.quote(10.0, 0.0).probability, MIN_PROBABILITY);
        assert_eq!(engine.quote(10.0, -3.0).probability, MIN_PROBABILITY);
        assert_eq!(engine.quote(10.0, 0.999).probability, MAX_PROBABILITY);
    }

    #[test]
    fn edge_invariant_holds_across_probability_range() {
        let engine = HouseEdgeEngine::default();

        let mut p = 0.002;
        while p < MAX_PROBABILITY {
            let quote = engine.quote(25.0, p);
            let check = engine.verify(quote.display_multiplier, p);
            assert!(check.valid, "edge check failed at p={}", p);
            p += 0.0037;
        }
    }

    #[test]
    fn verify_rejects_wrong_multiplier() {
        let engine = HouseEdgeEngine::default();

        // Fair multiplier with no edge at all.
        let check = engine.verify(2.0, 0.5);
        assert!(!check.valid);
        assert_eq!(check.actual_edge, 0.0);
    }

    #[test]
    fn platform_fee_worked_example() {
        let engine = HouseEdgeEngine::default();
        let fee = engine.platform_fee(10.0, 2.45);

        assert_eq!(fee.gross_payout, 24.5);
        assert_eq!(fee.winnings, 14.5);
        assert_eq!(fee.platform_fee, 0.73);
        assert_eq!(fee.net_payout, 23.78);
    }

    #[test]
    fn fee_never_touches_principal() {
        let engine = HouseEdgeEngine::default();
        let fee = engine.platform_fee(50.0, 1.0);

        assert_eq!(fee.winnings, 0.0);
        assert_eq!(fee.platform_fee, 0.0);
        assert_eq!(fee.net_payout, 50.0);
    }

    #[test]
    fn user_ev_is_negative_at_displayed_odds() {
        let engine = HouseEdgeEngine::default();

        let quote = engine.quote(10.0, 0.5);
        let ev = engine.user_ev(10.0, quote.display_multiplier, 0.5);

        assert!(ev < 0.0, "user EV should be negative, got {}", ev);
        assert_eq!(engine.house_ev(10.0, quote.display_multiplier, 0.5), -ev);
    }

    #[test]
    fn projection_scales_with_period() {
        let engine = HouseEdgeEngine::default();
        let projection = engine.project_revenue(10_000.0);

        // 45% winners at 2.0x: payouts 9000, fee on 4500 of winnings at 5%,
        // losers forfeit 5500.
        assert_eq!(projection.projected_payouts, 9_000.0);
        assert_eq!(projection.fee_revenue, 225.0);
        assert_eq!(projection.loss_revenue, 5_500.0);
        assert_eq!(projection.daily_revenue, 5_725.0);
        assert_eq!(projection.weekly_revenue, 5_725.0 * 7.0);
        assert_eq!(projection.yearly_revenue, 5_725.0 * 365.0);
        assert_eq!(projection.effective_edge, 0.5725);
    }

    #[test]
    fn projection_of_zero_volume_is_zeroed() {
        let engine = HouseEdgeEngine::default();
        let projection = engine.project_revenue(0.0);

        assert_eq!(projection.daily_revenue, 0.0);
        assert_eq!(projection.effective_edge, 0.0);
    }
}
