//! ERC20-style token balances owned by the sale.
//!
//! Supply is minted on demand: the owner reserve at deployment, public
//! purchases, and presale distributions. Tokens bought in the public sale are
//! additionally recorded as locked until the escrow closes successfully, so a
//! buyer who is later refunded cannot have moved them elsewhere.

use std::collections::HashMap;

use crate::error::SaleError;
use crate::types::{Address, Balance};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenAccount {
    pub balance: Balance,
    /// Part of `balance` bought in the sale and not yet released.
    pub locked: Balance,
}

#[derive(Clone, Debug, Default)]
pub struct TokenLedger {
    accounts: HashMap<Address, TokenAccount>,
    allowances: HashMap<(Address, Address), Balance>,
    total_supply: Balance,
    locks_released: bool,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_supply(&self) -> Balance {
        self.total_supply
    }

    pub fn balance_of(&self, who: &Address) -> Balance {
        self.accounts.get(who).map(|a| a.balance).unwrap_or(0)
    }

    pub fn locked_of(&self, who: &Address) -> Balance {
        if self.locks_released {
            return 0;
        }
        self.accounts.get(who).map(|a| a.locked).unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Balance {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    fn spendable(&self, who: &Address) -> Balance {
        self.balance_of(who).saturating_sub(self.locked_of(who))
    }

    /// Credit freely transferable tokens.
    pub fn mint(&mut self, to: Address, amount: Balance) -> Result<(), SaleError> {
        let supply = self.total_supply.checked_add(amount).ok_or(SaleError::MathOverflow)?;
        let acct = self.accounts.entry(to).or_default();
        acct.balance = acct.balance.checked_add(amount).ok_or(SaleError::MathOverflow)?;
        self.total_supply = supply;
        Ok(())
    }

    /// Credit tokens that stay locked until [`release_locks`](Self::release_locks).
    pub fn mint_locked(&mut self, to: Address, amount: Balance) -> Result<(), SaleError> {
        self.mint(to, amount)?;
        if !self.locks_released {
            let acct = self.accounts.entry(to).or_default();
            acct.locked += amount;
        }
        Ok(())
    }

    /// Burn the whole locked portion of `from`, returning the burned amount.
    pub fn burn_locked(&mut self, from: &Address) -> Balance {
        if self.locks_released {
            return 0;
        }
        let Some(acct) = self.accounts.get_mut(from) else {
            return 0;
        };
        let burned = acct.locked;
        acct.balance -= burned;
        acct.locked = 0;
        self.total_supply -= burned;
        burned
    }

    /// Make every purchased token transferable. Irreversible.
    pub fn release_locks(&mut self) {
        self.locks_released = true;
        for acct in self.accounts.values_mut() {
            acct.locked = 0;
        }
    }

    pub fn transfer(&mut self, from: Address, to: Address, amount: Balance) -> Result<(), SaleError> {
        if self.spendable(&from) < amount {
            return Err(SaleError::InsufficientBalance);
        }
        if from == to {
            return Ok(());
        }
        let to_balance = self.balance_of(&to).checked_add(amount).ok_or(SaleError::MathOverflow)?;
        if let Some(src) = self.accounts.get_mut(&from) {
            src.balance -= amount;
        }
        self.accounts.entry(to).or_default().balance = to_balance;
        Ok(())
    }

    pub fn approve(&mut self, owner: Address, spender: Address, amount: Balance) {
        self.allowances.insert((owner, spender), amount);
    }

    pub fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Balance,
    ) -> Result<(), SaleError> {
        let allowed = self.allowance(&from, &spender);
        if allowed < amount {
            return Err(SaleError::AllowanceExceeded);
        }
        self.transfer(from, to, amount)?;
        self.allowances.insert((from, spender), allowed - amount);
        Ok(())
    }
}
