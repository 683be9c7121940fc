//! Tiered sale engine.
//!
//! - Four-tier pricing with split-rate purchases across thresholds
//! - Clamp-and-return on max purchase, per-buyer lifetime cap and global cap
//! - Refund escrow resolved once after the sale ends (goal met or missed)
//! - Owner-only rate setup, pause switch and presale distribution
//! - Concurrency: parking_lot execution mutex + state RwLock (single writer)
//! - Events: tokio::broadcast
//!
//! Time is supplied by the caller; funds leaving the escrow go through
//! [`FundsBackend`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::access::AccessGuard;
use crate::backend::FundsBackend;
use crate::error::SaleError;
use crate::escrow::{EscrowState, RefundEscrow};
use crate::tiers::{TierFill, TierTable, TIER_COUNT};
use crate::token::TokenLedger;
use crate::types::{units, Address, Balance, Timestamp, UNIT};

// ---------- Config ----------

#[derive(Clone, Debug)]
pub struct SaleConfig {
    pub owner: Address,
    /// Beneficiary of the escrow when the goal is met.
    pub wallet: Address,
    pub tiers: TierTable,
    /// Max tokens sold publicly; equals the last tier threshold.
    pub cap: Balance,
    /// Tokens that must be sold for the sale to succeed.
    pub goal: Balance,
    /// Per-call bounds in currency.
    pub min_purchase: Balance,
    pub max_purchase: Balance,
    /// Lifetime contribution limit per buyer (currency), off when `None`.
    pub max_per_buyer: Option<Balance>,
    pub start_time: Timestamp,
    /// 0 keeps the sale open until the cap sells out.
    pub end_time: Timestamp,
    /// Minted to the owner at deployment.
    pub owner_reserve: Balance,
    /// Ceiling for presale distributions.
    pub presale_allocation: Balance,
    pub event_capacity: usize,
}

impl Default for SaleConfig {
    fn default() -> Self {
        Self {
            owner: Address::ZERO,
            wallet: Address::ZERO,
            tiers: TierTable::default(),
            cap: units(50_000_000),
            goal: units(7_500_000),
            min_purchase: UNIT / 10,
            max_purchase: units(2000),
            max_per_buyer: None,
            start_time: 0,
            end_time: 0,
            owner_reserve: units(40_000_000),
            presale_allocation: units(10_000_000),
            event_capacity: 1024,
        }
    }
}

impl SaleConfig {
    pub fn validate(&self) -> Result<(), SaleError> {
        let invalid = |m: &str| -> Result<(), SaleError> { Err(SaleError::InvalidConfig(m.into())) };
        if self.owner.is_zero() || self.wallet.is_zero() {
            return invalid("owner and wallet must be set");
        }
        if self.cap == 0 || self.tiers.ceiling() != self.cap {
            return invalid("cap must be > 0 and equal the last tier threshold");
        }
        if self.goal > self.cap {
            return invalid("goal > cap");
        }
        if self.max_purchase == 0 || self.min_purchase > self.max_purchase {
            return invalid("purchase bounds must satisfy 0 < min <= max");
        }
        if self.max_per_buyer == Some(0) {
            return invalid("max_per_buyer must be > 0 when set");
        }
        if self.end_time != 0 && self.end_time <= self.start_time {
            return invalid("end_time <= start_time");
        }
        if self.event_capacity == 0 {
            return invalid("event_capacity must be > 0");
        }
        self.owner_reserve
            .checked_add(self.cap)
            .and_then(|s| s.checked_add(self.presale_allocation))
            .ok_or(SaleError::MathOverflow)?;
        Ok(())
    }
}

// ---------- Results and events ----------

/// Which bound reduced the accepted amount of a purchase.
/// Reported with precedence cap, then buyer allowance, then max purchase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Clamp {
    GlobalCap,
    BuyerAllowance,
    MaxPurchase,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Purchase {
    pub tokens: Balance,
    /// Currency kept and deposited in the escrow. When a fill completes a
    /// tier this is rounded up to the next base unit; per-tier detail is in
    /// [`TierFill::rounding`].
    pub accepted: Balance,
    /// Currency handed back to the caller (`sent - accepted`).
    pub returned: Balance,
    pub limited_by: Option<Clamp>,
    pub fills: Vec<TierFill>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    Closed { forwarded: Balance },
    Refunding,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaleEvent {
    TokensPurchased { buyer: Address, accepted: Balance, returned: Balance, tokens: Balance },
    RatesUpdated { rates: [u128; TIER_COUNT] },
    Paused { by: Address },
    Unpaused { by: Address },
    OwnershipTransferred { from: Address, to: Address },
    PresaleDistributed { to: Address, amount: Balance },
    EscrowClosed { wallet: Address, forwarded: Balance },
    RefundsEnabled { tokens_raised: Balance },
    Refunded { to: Address, amount: Balance, burned: Balance },
    Transfer { from: Address, to: Address, amount: Balance },
    Approval { owner: Address, spender: Address, amount: Balance },
}

/// Read-only view of the sale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleSnapshot {
    pub tokens_raised: Balance,
    pub goal_reached: bool,
    pub paused: bool,
    pub escrow: EscrowState,
    pub escrow_held: Balance,
    pub total_supply: Balance,
    pub presale_distributed: Balance,
    pub buyers: usize,
    pub rates: [u128; TIER_COUNT],
}

// ---------- Engine ----------

struct SaleState {
    access: AccessGuard,
    tiers: TierTable,
    token: TokenLedger,
    escrow: RefundEscrow,
    tokens_raised: Balance,
    presale_distributed: Balance,
    contributions: HashMap<Address, Balance>,
}

pub struct TieredSale<B: FundsBackend> {
    cfg: SaleConfig,
    backend: Arc<B>,
    exec: Mutex<()>,
    state: RwLock<SaleState>,
    events_tx: broadcast::Sender<SaleEvent>,
}

impl<B: FundsBackend> fmt::Debug for TieredSale<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.read();
        f.debug_struct("TieredSale")
            .field("owner", &st.access.owner())
            .field("tokens_raised", &st.tokens_raised)
            .field("escrow", &st.escrow.state())
            .finish()
    }
}

impl<B: FundsBackend> TieredSale<B> {
    pub fn new(cfg: SaleConfig, backend: Arc<B>) -> Result<Self, SaleError> {
        cfg.validate()?;
        let mut token = TokenLedger::new();
        if cfg.owner_reserve > 0 {
            token.mint(cfg.owner, cfg.owner_reserve)?;
        }
        let st = SaleState {
            access: AccessGuard::new(cfg.owner),
            tiers: cfg.tiers.clone(),
            token,
            escrow: RefundEscrow::new(cfg.wallet),
            tokens_raised: 0,
            presale_distributed: 0,
            contributions: HashMap::new(),
        };
        let (tx, _) = broadcast::channel(cfg.event_capacity);
        info!(owner = %cfg.owner, wallet = %cfg.wallet, cap = cfg.cap, goal = cfg.goal, "sale deployed");
        Ok(Self {
            cfg,
            backend,
            exec: Mutex::new(()),
            state: RwLock::new(st),
            events_tx: tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SaleEvent> {
        self.events_tx.subscribe()
    }

    /// Deployment settings with the current rate table.
    pub fn config(&self) -> SaleConfig {
        let mut cfg = self.cfg.clone();
        cfg.tiers = self.state.read().tiers.clone();
        cfg
    }

    fn emit(&self, ev: SaleEvent) {
        let _ = self.events_tx.send(ev);
    }

    fn in_window(&self, now: Timestamp) -> bool {
        now >= self.cfg.start_time && (self.cfg.end_time == 0 || now <= self.cfg.end_time)
    }

    fn ended_locked(&self, st: &SaleState, now: Timestamp) -> bool {
        (self.cfg.end_time != 0 && now > self.cfg.end_time) || st.tokens_raised >= self.cfg.cap
    }

    /// Checks, clamps and tier pricing shared by purchases and previews.
    fn price(&self, st: &SaleState, buyer: &Address, amount_sent: Balance, now: Timestamp) -> Result<Purchase, SaleError> {
        if !self.in_window(now) || st.tokens_raised >= self.cfg.cap {
            return Err(SaleError::NotActive);
        }
        st.access.ensure_not_paused()?;
        if st.escrow.state() != EscrowState::Active {
            return Err(SaleError::AlreadyFinalized);
        }
        if amount_sent == 0 || amount_sent < self.cfg.min_purchase {
            return Err(SaleError::BelowMinimum);
        }

        let mut offered = amount_sent.min(self.cfg.max_purchase);
        let mut buyer_bound = false;
        if let Some(limit) = self.cfg.max_per_buyer {
            let contributed = st.contributions.get(buyer).copied().unwrap_or(0);
            let left = limit.saturating_sub(contributed);
            if left == 0 {
                return Err(SaleError::InsufficientAllowance);
            }
            if left < amount_sent && left <= offered {
                offered = left;
                buyer_bound = true;
            }
        }

        let quote = st.tiers.quote(st.tokens_raised, self.cfg.cap, offered)?;
        debug!(buyer = %buyer, offered, fills = ?quote.fills, "priced purchase");

        let limited_by = if quote.spent < offered {
            Some(Clamp::GlobalCap)
        } else if buyer_bound {
            Some(Clamp::BuyerAllowance)
        } else if amount_sent > self.cfg.max_purchase {
            Some(Clamp::MaxPurchase)
        } else {
            None
        };

        Ok(Purchase {
            tokens: quote.tokens,
            accepted: quote.spent,
            returned: amount_sent - quote.spent,
            limited_by,
            fills: quote.fills,
        })
    }

    /// Price a purchase against the live sale without executing it. Fails
    /// exactly where [`TieredSale::buy_tokens`] would at the same instant.
    pub fn preview_purchase(&self, buyer: Address, amount_sent: Balance, now: Timestamp) -> Result<Purchase, SaleError> {
        let st = self.state.read();
        self.price(&st, &buyer, amount_sent, now)
    }

    /// Buy tokens with `amount_sent` of currency at time `now`.
    ///
    /// The accepted amount may be smaller than the amount sent (max purchase,
    /// buyer allowance, sold-out cap); the difference is reported in
    /// [`Purchase::returned`].
    pub fn buy_tokens(&self, buyer: Address, amount_sent: Balance, now: Timestamp) -> Result<Purchase, SaleError> {
        let _ex = self.exec.lock();
        let mut st = self.state.write();
        let purchase = self.price(&st, &buyer, amount_sent, now)?;

        let contributed = st.contributions.get(&buyer).copied().unwrap_or(0);
        let raised = st.tokens_raised.checked_add(purchase.tokens).ok_or(SaleError::MathOverflow)?;
        let contribution = contributed.checked_add(purchase.accepted).ok_or(SaleError::MathOverflow)?;
        st.escrow.deposit(buyer, purchase.accepted)?;
        st.token.mint_locked(buyer, purchase.tokens)?;
        st.tokens_raised = raised;
        st.contributions.insert(buyer, contribution);

        info!(
            buyer = %buyer,
            tokens = purchase.tokens,
            accepted = purchase.accepted,
            returned = purchase.returned,
            tokens_raised = raised,
            "tokens purchased"
        );
        self.emit(SaleEvent::TokensPurchased {
            buyer,
            accepted: purchase.accepted,
            returned: purchase.returned,
            tokens: purchase.tokens,
        });
        Ok(purchase)
    }

    /// Owner-only; allowed until the first purchase is accepted.
    pub fn set_tier_rates(&self, caller: Address, rates: [u128; TIER_COUNT]) -> Result<(), SaleError> {
        let _ex = self.exec.lock();
        let mut st = self.state.write();
        st.access.ensure_owner(&caller)?;
        if st.tokens_raised > 0 || st.escrow.state() != EscrowState::Active {
            return Err(SaleError::AlreadyFinalized);
        }
        st.tiers.set_rates(rates)?;
        info!(?rates, "tier rates updated");
        self.emit(SaleEvent::RatesUpdated { rates });
        Ok(())
    }

    pub fn pause(&self, caller: Address) -> Result<(), SaleError> {
        self.set_paused(caller, true)
    }

    pub fn unpause(&self, caller: Address) -> Result<(), SaleError> {
        self.set_paused(caller, false)
    }

    fn set_paused(&self, caller: Address, paused: bool) -> Result<(), SaleError> {
        let _ex = self.exec.lock();
        let mut st = self.state.write();
        if !st.access.set_paused(&caller, paused)? {
            return Ok(());
        }
        info!(paused, by = %caller, "pause switch changed");
        self.emit(if paused {
            SaleEvent::Paused { by: caller }
        } else {
            SaleEvent::Unpaused { by: caller }
        });
        Ok(())
    }

    pub fn transfer_ownership(&self, caller: Address, new_owner: Address) -> Result<(), SaleError> {
        let _ex = self.exec.lock();
        let mut st = self.state.write();
        st.access.transfer_ownership(&caller, new_owner)?;
        info!(from = %caller, to = %new_owner, "ownership transferred");
        self.emit(SaleEvent::OwnershipTransferred { from: caller, to: new_owner });
        Ok(())
    }

    /// Owner-only credit outside the public sale; `tokens_raised` is untouched.
    pub fn distribute_presale_tokens(&self, caller: Address, recipient: Address, amount: Balance) -> Result<(), SaleError> {
        let _ex = self.exec.lock();
        let mut st = self.state.write();
        st.access.ensure_owner(&caller)?;
        if amount == 0 {
            return Err(SaleError::InvalidConfig("presale amount must be > 0".into()));
        }
        let distributed = st
            .presale_distributed
            .checked_add(amount)
            .filter(|d| *d <= self.cfg.presale_allocation)
            .ok_or(SaleError::PresaleAllocationExceeded)?;
        st.token.mint(recipient, amount)?;
        st.presale_distributed = distributed;
        info!(to = %recipient, amount, distributed, "presale tokens distributed");
        self.emit(SaleEvent::PresaleDistributed { to: recipient, amount });
        Ok(())
    }

    /// Resolve the escrow once the sale has ended: forward everything to the
    /// wallet if the goal was reached, otherwise open refunds. A failed
    /// forward leaves the escrow active so the call can be retried.
    ///
    /// The state lock is released during the payout; the execution lock keeps
    /// other mutations out until the escrow is resolved.
    pub fn check_sale_completion(&self, now: Timestamp) -> Result<Resolution, SaleError> {
        let _ex = self.exec.lock();
        let (goal_met, held) = {
            let st = self.state.read();
            st.access.ensure_not_paused()?;
            if st.escrow.state() != EscrowState::Active {
                return Err(SaleError::AlreadyFinalized);
            }
            if !self.ended_locked(&st, now) {
                return Err(SaleError::SaleNotEnded);
            }
            (st.tokens_raised >= self.cfg.goal, st.escrow.held())
        };

        if !goal_met {
            let mut st = self.state.write();
            st.escrow.enable_refunds()?;
            info!(tokens_raised = st.tokens_raised, goal = self.cfg.goal, "goal missed, refunds enabled");
            self.emit(SaleEvent::RefundsEnabled { tokens_raised: st.tokens_raised });
            return Ok(Resolution::Refunding);
        }

        if held > 0 {
            if let Err(e) = self.backend.transfer(self.cfg.wallet, held) {
                warn!(wallet = %self.cfg.wallet, held, error = %e, "forwarding escrow failed");
                return Err(e.into());
            }
        }

        let mut st = self.state.write();
        let forwarded = st.escrow.close()?;
        st.token.release_locks();
        info!(wallet = %self.cfg.wallet, forwarded, tokens_raised = st.tokens_raised, "goal reached, escrow closed");
        self.emit(SaleEvent::EscrowClosed { wallet: self.cfg.wallet, forwarded });
        Ok(Resolution::Closed { forwarded })
    }

    /// Pay back a contributor's deposit and burn the tokens they bought.
    /// Everything is restored if the payout fails.
    pub fn claim_refund(&self, contributor: Address) -> Result<Balance, SaleError> {
        let _ex = self.exec.lock();
        let (amount, burned, contributed) = {
            let mut st = self.state.write();
            st.access.ensure_not_paused()?;
            let amount = st.escrow.take_refund(&contributor)?;
            let burned = st.token.burn_locked(&contributor);
            let contributed = st.contributions.insert(contributor, 0).unwrap_or(0);
            (amount, burned, contributed)
        };

        if let Err(e) = self.backend.transfer(contributor, amount) {
            warn!(to = %contributor, amount, error = %e, "refund payout failed, state restored");
            let mut st = self.state.write();
            st.escrow.restore_refund(contributor, amount);
            st.token.mint_locked(contributor, burned)?;
            st.contributions.insert(contributor, contributed);
            return Err(e.into());
        }

        info!(to = %contributor, amount, burned, "refund paid");
        self.emit(SaleEvent::Refunded { to: contributor, amount, burned });
        Ok(amount)
    }

    // ---------- Token surface ----------

    pub fn transfer(&self, from: Address, to: Address, amount: Balance) -> Result<(), SaleError> {
        let _ex = self.exec.lock();
        let mut st = self.state.write();
        st.access.ensure_not_paused()?;
        st.token.transfer(from, to, amount)?;
        self.emit(SaleEvent::Transfer { from, to, amount });
        Ok(())
    }

    pub fn approve(&self, owner: Address, spender: Address, amount: Balance) -> Result<(), SaleError> {
        let _ex = self.exec.lock();
        let mut st = self.state.write();
        st.access.ensure_not_paused()?;
        st.token.approve(owner, spender, amount);
        self.emit(SaleEvent::Approval { owner, spender, amount });
        Ok(())
    }

    pub fn transfer_from(&self, spender: Address, from: Address, to: Address, amount: Balance) -> Result<(), SaleError> {
        let _ex = self.exec.lock();
        let mut st = self.state.write();
        st.access.ensure_not_paused()?;
        st.token.transfer_from(spender, from, to, amount)?;
        self.emit(SaleEvent::Transfer { from, to, amount });
        Ok(())
    }

    // ---------- Queries ----------

    pub fn tokens_raised(&self) -> Balance {
        self.state.read().tokens_raised
    }

    pub fn has_ended(&self, now: Timestamp) -> bool {
        self.ended_locked(&self.state.read(), now)
    }

    pub fn goal_reached(&self) -> bool {
        self.state.read().tokens_raised >= self.cfg.goal
    }

    pub fn balance_of(&self, who: Address) -> Balance {
        self.state.read().token.balance_of(&who)
    }

    pub fn locked_balance_of(&self, who: Address) -> Balance {
        self.state.read().token.locked_of(&who)
    }

    pub fn total_supply(&self) -> Balance {
        self.state.read().token.total_supply()
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> Balance {
        self.state.read().token.allowance(&owner, &spender)
    }

    /// Rate of tier `n` (1-based).
    pub fn rate_for_tier(&self, n: usize) -> Result<u128, SaleError> {
        self.state.read().tiers.rate_for_tier(n)
    }

    pub fn escrow_state(&self) -> EscrowState {
        self.state.read().escrow.state()
    }

    pub fn deposit_of(&self, who: Address) -> Balance {
        self.state.read().escrow.deposit_of(&who)
    }

    pub fn contribution_of(&self, who: Address) -> Balance {
        self.state.read().contributions.get(&who).copied().unwrap_or(0)
    }

    pub fn owner(&self) -> Address {
        self.state.read().access.owner()
    }

    pub fn is_paused(&self) -> bool {
        self.state.read().access.is_paused()
    }

    pub fn snapshot(&self) -> SaleSnapshot {
        let st = self.state.read();
        let mut rates = [0u128; TIER_COUNT];
        for (r, t) in rates.iter_mut().zip(st.tiers.tiers()) {
            *r = t.rate;
        }
        SaleSnapshot {
            tokens_raised: st.tokens_raised,
            goal_reached: st.tokens_raised >= self.cfg.goal,
            paused: st.access.is_paused(),
            escrow: st.escrow.state(),
            escrow_held: st.escrow.held(),
            total_supply: st.token.total_supply(),
            presale_distributed: st.presale_distributed,
            buyers: st.contributions.len(),
            rates,
        }
    }
}

// ---------- Tests ----------
