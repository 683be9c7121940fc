//! Value-transfer boundary.
//!
//! The sale never holds real funds itself: currency arrives with a purchase
//! call and is only booked in the escrow. Anything that leaves the escrow
//! (forwarding to the beneficiary wallet, refund payouts) goes through this
//! trait, which the host runtime implements against its ledger.

use crate::error::BackendError;
use crate::types::{Address, Balance};

pub trait FundsBackend: Send + Sync + 'static {
    /// Move `amount` of the payment currency from the escrow to `to`.
    fn transfer(&self, to: Address, amount: Balance) -> Result<(), BackendError>;
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::RwLock;

    use super::*;

    /// In-memory currency balances with switchable transfer failure.
    #[derive(Default)]
    pub(crate) struct MockBackend {
        balances: RwLock<HashMap<Address, Balance>>,
        failing: AtomicBool,
    }

    impl MockBackend {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn fund(&self, who: Address, amount: Balance) {
            *self.balances.write().entry(who).or_default() += amount;
        }

        /// Take the accepted part of a purchase out of the buyer's wallet.
        pub(crate) fn debit(&self, who: Address, amount: Balance) {
            let mut m = self.balances.write();
            let b = m.entry(who).or_default();
            assert!(*b >= amount, "mock wallet overdrawn");
            *b -= amount;
        }

        pub(crate) fn balance(&self, who: Address) -> Balance {
            *self.balances.read().get(&who).unwrap_or(&0)
        }

        pub(crate) fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    impl FundsBackend for MockBackend {
        fn transfer(&self, to: Address, amount: Balance) -> Result<(), BackendError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(BackendError::Other("injected failure".into()));
            }
            *self.balances.write().entry(to).or_default() += amount;
            Ok(())
        }
    }
}
