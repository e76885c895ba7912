//! Reward Mapping
//!
//! Maps realized P&L to a bounded reward in [-1, 1] through a saturating
//! scale. Action-type adjustments are explicit configured multipliers,
//! not hidden logic.

use rust_decimal::Decimal;

use crate::config::RewardConfig;
use crate::domain::TradeLabel;

/// Converts realized outcomes into bounded rewards
#[derive(Debug, Clone, Default)]
pub struct RewardMapper {
    config: RewardConfig,
}

impl RewardMapper {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    /// Bounded reward for an action's realized P&L fraction.
    ///
    /// `clamp(pnl_fraction * k, -1, 1)`, with decisive actions on material
    /// P&L scaled by the configured multiplier and a hold that realized
    /// near-zero P&L rewarded slightly to reinforce correct inaction.
    pub fn map(&self, action: TradeLabel, pnl_fraction: Decimal) -> f32 {
        let pnl = decimal_to_f32(pnl_fraction);
        let flat = pnl.abs() <= self.config.flat_pnl_epsilon;
        let raw = pnl * self.config.scale_k;

        let scaled = match action {
            TradeLabel::Hold if flat => self.config.hold_inaction_reward,
            TradeLabel::Hold => raw,
            _ if flat => raw,
            _ => raw * self.config.decisive_multiplier,
        };

        scaled.clamp(-1.0, 1.0)
    }

    /// Direction the market actually moved, derived from the P&L sign
    /// relative to the action taken.
    ///
    /// A profitable directional action confirms its own label; a losing
    /// one confirms the opposite. A hold carries no exposure, so the P&L
    /// fraction is read as the raw market move.
    pub fn realized_direction(&self, action: TradeLabel, pnl_fraction: Decimal) -> TradeLabel {
        let pnl = decimal_to_f32(pnl_fraction);
        if pnl.abs() <= self.config.flat_pnl_epsilon {
            return TradeLabel::Hold;
        }
        match action {
            TradeLabel::Hold => {
                if pnl > 0.0 {
                    TradeLabel::Buy
                } else {
                    TradeLabel::Sell
                }
            }
            directional => {
                if pnl > 0.0 {
                    directional
                } else {
                    directional.opposite()
                }
            }
        }
    }
}

fn decimal_to_f32(d: Decimal) -> f32 {
    d.to_string().parse().unwrap_or(0.0)
}
