//! tiered-sale
//!
//! Token sale ledger selling a fixed supply in four price tiers:
//! - Cumulative thresholds with a per-tier rate; purchases that straddle a
//!   threshold are priced at both rates
//! - Per-call min/max, optional per-buyer lifetime limit and a hard cap, with
//!   the excess handed back instead of rejected
//! - Funds held in a refund escrow: forwarded to the wallet when the goal is
//!   reached, refundable (and tokens burned) when it is missed
//! - Owner pause switch, rate setup before the first sale, presale distribution
//!
//! Layers: `tiers` (pricing), `token` (balances), `escrow` (deposits), `access`
//! (owner/pause), composed by [`TieredSale`]. `config` and `telemetry` carry
//! the settings loader and logging bootstrap for hosting processes.

#![forbid(unsafe_code)]

pub mod access;
pub mod backend;
pub mod config;
pub mod error;
pub mod escrow;
pub mod sale;
pub mod telemetry;
pub mod tiers;
pub mod token;
pub mod types;

pub use backend::FundsBackend;
pub use error::{BackendError, SaleError};
pub use escrow::EscrowState;
pub use sale::{Clamp, Purchase, Resolution, SaleConfig, SaleEvent, SaleSnapshot, TieredSale};
pub use tiers::{Quote, Tier, TierFill, TierTable, TIER_COUNT};
pub use types::{parse_units, units, Address, Balance, Timestamp, DECIMALS, UNIT};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::mock::MockBackend;

    const START: Timestamp = 1_700_000_000;
    const END: Timestamp = START + 7 * 24 * 3600;

    fn addr(x: u8) -> Address {
        Address([x; 20])
    }

    fn deploy() -> (Arc<MockBackend>, TieredSale<MockBackend>) {
        let cfg = SaleConfig {
            owner: addr(1),
            wallet: addr(0xEE),
            start_time: START,
            end_time: END,
            ..SaleConfig::default()
        };
        let be = Arc::new(MockBackend::new());
        let sale = TieredSale::new(cfg, be.clone()).unwrap();
        (be, sale)
    }

    #[test]
    fn walk_through_first_two_tiers() {
        let (_, sale) = deploy();
        let (a, b) = (addr(2), addr(3));

        // 2000 units at 5000 tokens each.
        let p = sale.buy_tokens(a, units(2000), START).unwrap();
        assert_eq!(p.tokens, units(10_000_000));
        assert_eq!(sale.tokens_raised(), units(10_000_000));

        // 500 units finish tier 1, the other 500 are priced at tier 2.
        let p = sale.buy_tokens(b, units(1000), START + 1).unwrap();
        assert_eq!(p.tokens, units(4_500_000));
        assert_eq!(p.fills.len(), 2);
        assert_eq!(p.fills[0], TierFill { tier: 1, spent: units(500), tokens: units(2_500_000) });
        assert_eq!(p.fills[1], TierFill { tier: 2, spent: units(500), tokens: units(2_000_000) });
        assert_eq!(sale.tokens_raised(), units(14_500_000));

        // Oversized call keeps 2000 and hands 1000 back, all at tier 2.
        let p = sale.buy_tokens(a, units(3000), START + 2).unwrap();
        assert_eq!(p.accepted, units(2000));
        assert_eq!(p.returned, units(1000));
        assert_eq!(p.tokens, units(8_000_000));
        assert_eq!(sale.tokens_raised(), units(22_500_000));

        assert_eq!(sale.buy_tokens(b, parse_units("0.001").unwrap(), START + 3), Err(SaleError::BelowMinimum));
        assert_eq!(sale.tokens_raised(), units(22_500_000));
    }

    #[test]
    fn sells_out_exactly_at_cap() {
        let (_, sale) = deploy();
        let mut i = 10u8;
        let mut last = None;
        while sale.tokens_raised() < sale.config().cap {
            last = Some(sale.buy_tokens(addr(i), units(2000), START).unwrap());
            i += 1;
        }
        assert_eq!(sale.tokens_raised(), units(50_000_000));
        let last = last.unwrap();
        assert_eq!(last.limited_by, Some(Clamp::GlobalCap));
        assert_eq!(last.accepted + last.returned, units(2000));
        assert!(sale.has_ended(START));
        assert_eq!(sale.buy_tokens(addr(9), units(1), START), Err(SaleError::NotActive));

        assert!(matches!(sale.check_sale_completion(START), Ok(Resolution::Closed { .. })));
        assert_eq!(sale.snapshot().escrow, EscrowState::Closed);
    }

    #[test]
    fn missed_goal_refund_flow() {
        let (be, sale) = deploy();
        let buyers = [addr(2), addr(3), addr(4)];
        for (n, b) in buyers.iter().enumerate() {
            be.fund(*b, units(1000));
            let p = sale.buy_tokens(*b, units(100 * (n as u128 + 1)), START).unwrap();
            be.debit(*b, p.accepted);
        }
        assert!(!sale.goal_reached());
        assert_eq!(sale.check_sale_completion(END + 1), Ok(Resolution::Refunding));

        for b in buyers {
            sale.claim_refund(b).unwrap();
            assert_eq!(be.balance(b), units(1000));
            assert_eq!(sale.balance_of(b), 0);
        }
        assert_eq!(sale.total_supply(), units(40_000_000));
        assert_eq!(sale.snapshot().escrow_held, 0);
    }

    #[tokio::test]
    async fn events_follow_the_lifecycle() {
        let (_, sale) = deploy();
        let mut rx = sale.subscribe();

        sale.pause(addr(1)).unwrap();
        sale.unpause(addr(1)).unwrap();
        sale.buy_tokens(addr(2), units(2000), START).unwrap();
        sale.check_sale_completion(END + 1).unwrap();

        assert_eq!(rx.recv().await.unwrap(), SaleEvent::Paused { by: addr(1) });
        assert_eq!(rx.recv().await.unwrap(), SaleEvent::Unpaused { by: addr(1) });
        assert_eq!(
            rx.recv().await.unwrap(),
            SaleEvent::TokensPurchased {
                buyer: addr(2),
                accepted: units(2000),
                returned: 0,
                tokens: units(10_000_000),
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            SaleEvent::EscrowClosed { wallet: addr(0xEE), forwarded: units(2000) }
        );
    }
}
