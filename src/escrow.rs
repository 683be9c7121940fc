//! Refund escrow: holds contributions until the sale resolves.
//!
//! `Active -> Closed` (goal met, everything forwarded to the beneficiary) or
//! `Active -> Refunding` (goal missed, contributors withdraw their deposits).
//! Both transitions are terminal.

use std::collections::HashMap;

use crate::error::SaleError;
use crate::types::{Address, Balance};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscrowState {
    Active,
    Closed,
    Refunding,
}

#[derive(Clone, Debug)]
pub struct RefundEscrow {
    beneficiary: Address,
    state: EscrowState,
    deposits: HashMap<Address, Balance>,
    held: Balance,
}

impl RefundEscrow {
    pub fn new(beneficiary: Address) -> Self {
        Self {
            beneficiary,
            state: EscrowState::Active,
            deposits: HashMap::new(),
            held: 0,
        }
    }

    pub fn state(&self) -> EscrowState {
        self.state
    }

    pub fn beneficiary(&self) -> Address {
        self.beneficiary
    }

    pub fn deposit_of(&self, who: &Address) -> Balance {
        self.deposits.get(who).copied().unwrap_or(0)
    }

    /// Currency currently held on behalf of contributors.
    pub fn held(&self) -> Balance {
        self.held
    }

    pub fn deposit(&mut self, contributor: Address, amount: Balance) -> Result<(), SaleError> {
        if self.state != EscrowState::Active {
            return Err(SaleError::AlreadyFinalized);
        }
        let held = self.held.checked_add(amount).ok_or(SaleError::MathOverflow)?;
        let entry = self.deposits.entry(contributor).or_default();
        *entry = entry.checked_add(amount).ok_or(SaleError::MathOverflow)?;
        self.held = held;
        Ok(())
    }

    /// Transition to `Closed`, returning the amount released to the beneficiary.
    /// Call only once the transfer to the beneficiary has succeeded.
    pub fn close(&mut self) -> Result<Balance, SaleError> {
        if self.state != EscrowState::Active {
            return Err(SaleError::AlreadyFinalized);
        }
        self.state = EscrowState::Closed;
        Ok(std::mem::take(&mut self.held))
    }

    pub fn enable_refunds(&mut self) -> Result<(), SaleError> {
        if self.state != EscrowState::Active {
            return Err(SaleError::AlreadyFinalized);
        }
        self.state = EscrowState::Refunding;
        Ok(())
    }

    /// Zero the contributor's deposit and return it for payout.
    pub fn take_refund(&mut self, contributor: &Address) -> Result<Balance, SaleError> {
        if self.state != EscrowState::Refunding {
            return Err(SaleError::NotRefunding);
        }
        let amount = match self.deposits.get_mut(contributor) {
            Some(d) if *d > 0 => std::mem::take(d),
            _ => return Err(SaleError::NothingToRefund),
        };
        self.held -= amount;
        Ok(amount)
    }

    /// Undo [`take_refund`](Self::take_refund) after a failed payout.
    pub fn restore_refund(&mut self, contributor: Address, amount: Balance) {
        *self.deposits.entry(contributor).or_default() += amount;
        self.held += amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(x: u8) -> Address {
        Address([x; 20])
    }

    #[test]
    fn deposits_accumulate_and_close_releases_all() {
        let mut e = RefundEscrow::new(addr(0xFE));
        e.deposit(addr(1), 10).unwrap();
        e.deposit(addr(1), 5).unwrap();
        e.deposit(addr(2), 7).unwrap();
        assert_eq!(e.deposit_of(&addr(1)), 15);
        assert_eq!(e.held(), 22);

        assert_eq!(e.close().unwrap(), 22);
        assert_eq!(e.state(), EscrowState::Closed);
        assert_eq!(e.held(), 0);
        assert_eq!(e.deposit(addr(3), 1), Err(SaleError::AlreadyFinalized));
        assert_eq!(e.enable_refunds(), Err(SaleError::AlreadyFinalized));
        assert_eq!(e.take_refund(&addr(1)), Err(SaleError::NotRefunding));
    }

    #[test]
    fn refunds_pay_each_depositor_once() {
        let mut e = RefundEscrow::new(addr(0xFE));
        e.deposit(addr(1), 10).unwrap();
        assert_eq!(e.take_refund(&addr(1)), Err(SaleError::NotRefunding));

        e.enable_refunds().unwrap();
        assert_eq!(e.close(), Err(SaleError::AlreadyFinalized));
        assert_eq!(e.take_refund(&addr(1)).unwrap(), 10);
        assert_eq!(e.take_refund(&addr(1)), Err(SaleError::NothingToRefund));
        assert_eq!(e.take_refund(&addr(2)), Err(SaleError::NothingToRefund));
        assert_eq!(e.held(), 0);
    }

    #[test]
    fn restore_after_failed_payout() {
        let mut e = RefundEscrow::new(addr(0xFE));
        e.deposit(addr(1), 10).unwrap();
        e.enable_refunds().unwrap();
        let amt = e.take_refund(&addr(1)).unwrap();
        e.restore_refund(addr(1), amt);
        assert_eq!(e.deposit_of(&addr(1)), 10);
        assert_eq!(e.held(), 10);
        assert_eq!(e.take_refund(&addr(1)).unwrap(), 10);
    }
}
