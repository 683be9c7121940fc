//! Tier table and tier-crossing pricing.
//!
//! Thresholds are cumulative token totals (base units); rates are whole
//! tokens per whole currency unit. With both sides at 18 decimals,
//! `tokens = currency * rate` holds exactly inside a tier.
//!
//! A purchase that crosses a threshold is split: the currency needed to reach
//! the threshold is priced at the current tier, the remainder flows into the
//! next tier, and so on until the currency or the cap runs out.

use crate::error::SaleError;
use crate::types::{units, Balance};

pub const TIER_COUNT: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tier {
    /// Cumulative tokens sold at which this tier is exhausted.
    pub threshold: Balance,
    /// Tokens per currency unit.
    pub rate: u128,
}

/// Currency consumed and tokens issued in one tier of a purchase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TierFill {
    /// 1-based tier number.
    pub tier: usize,
    /// Currency consumed. A fill that completes the tier is `ceil(room / rate)`,
    /// so `spent * rate - tokens` (always `< rate` base units of token) is paid
    /// but not issued; see [`TierFill::rounding`].
    pub spent: Balance,
    pub tokens: Balance,
}

impl TierFill {
    /// Token base units paid for but not issued because the fill stopped at
    /// the tier threshold. Zero for partial fills and exact divisions.
    pub fn rounding(&self, rate: u128) -> Balance {
        self.spent.saturating_mul(rate).saturating_sub(self.tokens)
    }
}

/// Result of pricing a currency amount against the table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Quote {
    pub tokens: Balance,
    /// Currency actually consumed (<= the amount offered).
    pub spent: Balance,
    pub fills: Vec<TierFill>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TierTable {
    tiers: [Tier; TIER_COUNT],
}

impl Default for TierTable {
    /// 12.5M tokens per tier at 5000 / 4000 / 3000 / 2000 tokens per unit.
    fn default() -> Self {
        Self {
            tiers: [
                Tier { threshold: units(12_500_000), rate: 5000 },
                Tier { threshold: units(25_000_000), rate: 4000 },
                Tier { threshold: units(37_500_000), rate: 3000 },
                Tier { threshold: units(50_000_000), rate: 2000 },
            ],
        }
    }
}

impl TierTable {
    pub fn new(tiers: [Tier; TIER_COUNT]) -> Result<Self, SaleError> {
        let mut prev = 0;
        for t in &tiers {
            if t.threshold <= prev {
                return Err(SaleError::InvalidConfig("tier thresholds must be strictly increasing".into()));
            }
            if t.rate == 0 {
                return Err(SaleError::InvalidConfig("tier rates must be > 0".into()));
            }
            prev = t.threshold;
        }
        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[Tier; TIER_COUNT] {
        &self.tiers
    }

    /// Threshold of the last tier: nothing can be sold past it.
    pub fn ceiling(&self) -> Balance {
        self.tiers[TIER_COUNT - 1].threshold
    }

    /// Rate of tier `n` (1-based).
    pub fn rate_for_tier(&self, n: usize) -> Result<u128, SaleError> {
        n.checked_sub(1)
            .and_then(|i| self.tiers.get(i))
            .map(|t| t.rate)
            .ok_or(SaleError::InvalidTier(n))
    }

    /// Replace every rate, keeping thresholds.
    pub fn set_rates(&mut self, rates: [u128; TIER_COUNT]) -> Result<(), SaleError> {
        if rates.iter().any(|r| *r == 0) {
            return Err(SaleError::InvalidConfig("tier rates must be > 0".into()));
        }
        for (t, r) in self.tiers.iter_mut().zip(rates) {
            t.rate = r;
        }
        Ok(())
    }

    /// 1-based tier that prices the next token after `raised`, if any remain.
    pub fn active_tier(&self, raised: Balance) -> Option<usize> {
        self.tiers.iter().position(|t| raised < t.threshold).map(|i| i + 1)
    }

    /// Price `amount` of currency starting from `raised` tokens sold, never
    /// issuing past `cap`. Unspent currency is `amount - quote.spent`.
    pub fn quote(&self, raised: Balance, cap: Balance, amount: Balance) -> Result<Quote, SaleError> {
        let mut q = Quote::default();
        let mut cursor = raised;
        let mut remaining = amount;

        for (i, tier) in self.tiers.iter().enumerate() {
            if remaining == 0 || cursor >= cap {
                break;
            }
            let limit = tier.threshold.min(cap);
            if cursor >= limit {
                continue;
            }
            let room = limit - cursor;
            // Smallest payment that fills the tier. With an inexact division the
            // buyer pays up to `rate - 1` token base units more than issued.
            let to_fill = room.div_ceil(tier.rate);

            let (spent, tokens) = if remaining >= to_fill {
                (to_fill, room)
            } else {
                let tokens = remaining.checked_mul(tier.rate).ok_or(SaleError::MathOverflow)?;
                (remaining, tokens)
            };

            q.fills.push(TierFill { tier: i + 1, spent, tokens });
            q.tokens = q.tokens.checked_add(tokens).ok_or(SaleError::MathOverflow)?;
            q.spent += spent;
            cursor += tokens;
            remaining -= spent;
        }

        Ok(q)
    }
}
