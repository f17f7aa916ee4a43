//! Insertion-ordered set of staker accounts with index lookup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::AccountId;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StakerSet {
    accounts: Vec<AccountId>,
    positions: HashMap<AccountId, usize>,
}

impl StakerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the account was not already present.
    pub fn insert(&mut self, account: AccountId) -> bool {
        if self.positions.contains_key(&account) {
            return false;
        }
        self.positions.insert(account, self.accounts.len());
        self.accounts.push(account);
        true
    }

    /// Remove by swapping the last account into the vacated slot.
    pub fn remove(&mut self, account: &AccountId) -> bool {
        let Some(index) = self.positions.remove(account) else {
            return false;
        };
        self.accounts.swap_remove(index);
        if let Some(moved) = self.accounts.get(index) {
            self.positions.insert(*moved, index);
        }
        true
    }

    #[must_use]
    pub fn contains(&self, account: &AccountId) -> bool {
        self.positions.contains_key(account)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<AccountId> {
        self.accounts.get(index).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccountId> {
        self.accounts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let mut set = StakerSet::new();
        let a = AccountId::new();
        assert!(set.insert(a));
        assert!(!set.insert(a));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_keeps_indices_consistent() {
        let mut set = StakerSet::new();
        let (a, b, c) = (AccountId::new(), AccountId::new(), AccountId::new());
        set.insert(a);
        set.insert(b);
        set.insert(c);

        assert!(set.remove(&a));
        assert_eq!(set.get(0), Some(c));
        assert_eq!(set.get(1), Some(b));
        assert!(!set.contains(&a));

        // c moved to slot 0; removing it must not disturb b
        assert!(set.remove(&c));
        assert_eq!(set.get(0), Some(b));
        assert_eq!(set.len(), 1);
        assert!(!set.remove(&c));
    }
}
