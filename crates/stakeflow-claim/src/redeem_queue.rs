//! FIFO redemption queue stored as an arena with a head cursor.
//!
//! Entries are appended at the tail and consumed whole from the head.
//! Consumed slots are released immediately; the arena is compacted once
//! the cursor has passed half of its length, so consumption is O(1)
//! amortised and arrival order is never disturbed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stakeflow_types::RedeemEntry;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedeemQueue {
    slots: Vec<Option<RedeemEntry>>,
    head: usize,
    /// Sum of live entry amounts.
    total: Decimal,
}

impl RedeemQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: RedeemEntry) {
        self.total += entry.amount;
        self.slots.push(Some(entry));
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.head
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn total(&self) -> Decimal {
        self.total
    }

    #[must_use]
    pub fn front(&self) -> Option<&RedeemEntry> {
        self.slots.get(self.head).and_then(Option::as_ref)
    }

    /// Live entries, head first.
    pub fn iter(&self) -> impl Iterator<Item = &RedeemEntry> {
        self.slots[self.head..].iter().filter_map(Option::as_ref)
    }

    #[must_use]
    pub fn page(&self, offset: usize, limit: usize) -> Vec<RedeemEntry> {
        self.iter().skip(offset).take(limit).cloned().collect()
    }

    /// Longest head prefix whose sum does not exceed `limit`, as
    /// `(entry count, sum)`.
    #[must_use]
    pub fn prefix_within(&self, limit: Decimal) -> (usize, Decimal) {
        let mut count = 0;
        let mut sum = Decimal::ZERO;
        for entry in self.iter() {
            let next = sum + entry.amount;
            if next > limit {
                break;
            }
            sum = next;
            count += 1;
        }
        (count, sum)
    }

    /// Consume the head entry.
    pub fn pop_front(&mut self) -> Option<RedeemEntry> {
        let entry = self.slots.get_mut(self.head)?.take()?;
        self.head += 1;
        self.total -= entry.amount;
        if self.head * 2 >= self.slots.len() {
            self.compact();
        }
        Some(entry)
    }

    /// Arena capacity, including released slots not yet compacted.
    #[must_use]
    pub fn arena_len(&self) -> usize {
        self.slots.len()
    }

    fn compact(&mut self) {
        self.slots.drain(..self.head);
        self.head = 0;
    }
}
