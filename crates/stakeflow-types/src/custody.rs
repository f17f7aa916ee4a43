//! The custody primitive: an opaque value ledger offering balance queries
//! and transfers.
//!
//! Ledgers never hold value themselves. They receive a `&mut impl Custody`
//! on every call that moves value, so a failed transfer aborts the call
//! before any ledger state is committed.

use rust_decimal::Decimal;

use crate::{AccountId, Result};

/// Value-movement substrate shared by every ledger.
pub trait Custody {
    /// Current balance of `account`. Unknown accounts hold zero.
    fn balance_of(&self, account: &AccountId) -> Decimal;

    /// Move `amount` from `from` to `to`.
    ///
    /// # Errors
    /// `CustodyTransferFailed` or `InsufficientBalance` when the transfer
    /// cannot be made; balances are unchanged in that case.
    fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: Decimal) -> Result<()>;
}

#[cfg(any(test, feature = "test-helpers"))]
pub use memory::MemoryCustody;

#[cfg(any(test, feature = "test-helpers"))]
mod memory {
    use std::collections::HashMap;

    use rust_decimal::Decimal;

    use super::Custody;
    use crate::{AccountId, Result, StakeflowError};

    /// In-memory custody with minting and failure injection.
    #[derive(Debug, Default, Clone)]
    pub struct MemoryCustody {
        balances: HashMap<AccountId, Decimal>,
        fail_transfers: bool,
        transfers: u64,
    }

    impl MemoryCustody {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Create value out of thin air (user funding, simulated rewards).
        pub fn mint(&mut self, account: &AccountId, amount: Decimal) {
            *self.balances.entry(*account).or_default() += amount;
        }

        /// Make every subsequent transfer fail until cleared.
        pub fn set_fail_transfers(&mut self, fail: bool) {
            self.fail_transfers = fail;
        }

        /// Number of successful transfers so far.
        #[must_use]
        pub fn transfer_count(&self) -> u64 {
            self.transfers
        }

        /// Sum of every balance.
        #[must_use]
        pub fn total(&self) -> Decimal {
            self.balances.values().copied().sum()
        }
    }

    impl Custody for MemoryCustody {
        fn balance_of(&self, account: &AccountId) -> Decimal {
            self.balances.get(account).copied().unwrap_or_default()
        }

        fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: Decimal) -> Result<()> {
            if self.fail_transfers {
                return Err(StakeflowError::CustodyTransferFailed {
                    reason: "injected failure".into(),
                });
            }
            if amount < Decimal::ZERO {
                return Err(StakeflowError::CustodyTransferFailed {
                    reason: format!("negative amount {amount}"),
                });
            }
            let available = self.balance_of(from);
            if available < amount {
                return Err(StakeflowError::InsufficientBalance {
                    needed: amount,
                    available,
                });
            }
            *self.balances.entry(*from).or_default() -= amount;
            *self.balances.entry(*to).or_default() += amount;
            self.transfers += 1;
            Ok(())
        }
    }
}
