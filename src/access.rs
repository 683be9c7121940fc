//! Owner check and pause switch.

use crate::error::SaleError;
use crate::types::Address;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessGuard {
    owner: Address,
    paused: bool,
}

impl AccessGuard {
    pub fn new(owner: Address) -> Self {
        Self { owner, paused: false }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn ensure_owner(&self, caller: &Address) -> Result<(), SaleError> {
        if *caller != self.owner {
            return Err(SaleError::Unauthorized);
        }
        Ok(())
    }

    pub fn ensure_not_paused(&self) -> Result<(), SaleError> {
        if self.paused {
            return Err(SaleError::Paused);
        }
        Ok(())
    }

    /// Owner-only. Returns whether the flag actually changed; setting the
    /// current value again is a no-op.
    pub fn set_paused(&mut self, caller: &Address, paused: bool) -> Result<bool, SaleError> {
        self.ensure_owner(caller)?;
        if self.paused == paused {
            return Ok(false);
        }
        self.paused = paused;
        Ok(true)
    }

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> Result<(), SaleError> {
        self.ensure_owner(caller)?;
        if new_owner.is_zero() {
            return Err(SaleError::InvalidConfig("new owner is the zero address".into()));
        }
        self.owner = new_owner;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(x: u8) -> Address {
        Address([x; 20])
    }

    #[test]
    fn only_owner_toggles_pause() {
        let mut g = AccessGuard::new(addr(1));
        assert_eq!(g.set_paused(&addr(2), true), Err(SaleError::Unauthorized));
        assert!(!g.is_paused());

        assert_eq!(g.set_paused(&addr(1), true), Ok(true));
        assert_eq!(g.ensure_not_paused(), Err(SaleError::Paused));
        assert_eq!(g.set_paused(&addr(1), true), Ok(false));
        assert_eq!(g.set_paused(&addr(2), false), Err(SaleError::Unauthorized));
        assert_eq!(g.set_paused(&addr(1), false), Ok(true));
        assert!(g.ensure_not_paused().is_ok());
    }

    #[test]
    fn ownership_moves() {
        let mut g = AccessGuard::new(addr(1));
        assert!(g.transfer_ownership(&addr(1), Address::ZERO).is_err());
        g.transfer_ownership(&addr(1), addr(2)).unwrap();
        assert_eq!(g.ensure_owner(&addr(1)), Err(SaleError::Unauthorized));
        assert!(g.ensure_owner(&addr(2)).is_ok());
    }
}
