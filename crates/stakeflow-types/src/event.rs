//! Structured ledger events.
//!
//! Every mutating ledger call appends a [`LedgerEvent`] to the ledger's
//! [`EventJournal`] and logs it. Events carry a SHA-256 hash over their
//! JSON body so off-engine monitors can detect tampering or loss.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{AccountId, constants};

/// Which ledger emitted an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerKind {
    Pool,
    Claim,
    Controller,
}

impl std::fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pool => write!(f, "POOL"),
            Self::Claim => write!(f, "CLAIM"),
            Self::Controller => write!(f, "CONTROLLER"),
        }
    }
}

/// The mutating operation an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    // Pool
    Register,
    Stake,
    Unstake,
    WithdrawStake,
    ClaimInterest,
    WithdrawOperatorInterest,
    SetPoolName,
    SetLockPeriod,
    SetUnlockPeriod,
    SetUserShareRatio,
    WhitelistAdd,
    WhitelistRemove,
    SetBridge,
    LockForVotePower,
    CastVote,
    // Claim
    Deposit,
    Redeem,
    HandleRedeem,
    Withdraw,
    Transfer,
    AddAssets,
    DeductAssets,
    // Controller
    PullCustody,
    WithdrawReservedInterest,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Register => "REGISTER",
            Self::Stake => "STAKE",
            Self::Unstake => "UNSTAKE",
            Self::WithdrawStake => "WITHDRAW_STAKE",
            Self::ClaimInterest => "CLAIM_INTEREST",
            Self::WithdrawOperatorInterest => "WITHDRAW_OPERATOR_INTEREST",
            Self::SetPoolName => "SET_POOL_NAME",
            Self::SetLockPeriod => "SET_LOCK_PERIOD",
            Self::SetUnlockPeriod => "SET_UNLOCK_PERIOD",
            Self::SetUserShareRatio => "SET_USER_SHARE_RATIO",
            Self::WhitelistAdd => "WHITELIST_ADD",
            Self::WhitelistRemove => "WHITELIST_REMOVE",
            Self::SetBridge => "SET_BRIDGE",
            Self::LockForVotePower => "LOCK_FOR_VOTE_POWER",
            Self::CastVote => "CAST_VOTE",
            Self::Deposit => "DEPOSIT",
            Self::Redeem => "REDEEM",
            Self::HandleRedeem => "HANDLE_REDEEM",
            Self::Withdraw => "WITHDRAW",
            Self::Transfer => "TRANSFER",
            Self::AddAssets => "ADD_ASSETS",
            Self::DeductAssets => "DEDUCT_ASSETS",
            Self::PullCustody => "PULL_CUSTODY",
            Self::WithdrawReservedInterest => "WITHDRAW_RESERVED_INTEREST",
        };
        write!(f, "{name}")
    }
}

/// Named amounts attached to an event, e.g. `{"votes": 2, "value": 2000}`.
pub type EventFields = BTreeMap<String, Decimal>;

/// Build [`EventFields`] from `(name, value)` pairs.
#[must_use]
pub fn fields<const N: usize>(pairs: [(&str, Decimal); N]) -> EventFields {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// One record in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Monotonic per-journal sequence number, starting at 1.
    pub sequence: u64,
    pub ledger: LedgerKind,
    pub operation: Operation,
    pub actor: AccountId,
    /// Amounts supplied to or produced by the operation.
    pub amounts: EventFields,
    /// Resulting summary fields after the operation committed.
    pub summary: EventFields,
    /// SHA-256 over the JSON encoding of the fields above.
    pub payload_hash: [u8; 32],
    pub emitted_at: DateTime<Utc>,
}

impl LedgerEvent {
    /// Recompute the payload hash and compare.
    #[must_use]
    pub fn verify_hash(&self) -> bool {
        payload_hash(
            self.sequence,
            self.ledger,
            self.operation,
            self.actor,
            &self.amounts,
            &self.summary,
        ) == self.payload_hash
    }

    #[must_use]
    pub fn payload_hash_hex(&self) -> String {
        hex::encode(self.payload_hash)
    }
}

fn payload_hash(
    sequence: u64,
    ledger: LedgerKind,
    operation: Operation,
    actor: AccountId,
    amounts: &EventFields,
    summary: &EventFields,
) -> [u8; 32] {
    let body = serde_json::json!({
        "sequence": sequence,
        "ledger": ledger,
        "operation": operation,
        "actor": actor,
        "amounts": amounts,
        "summary": summary,
    });
    let mut hasher = Sha256::new();
    hasher.update(b"stakeflow:event:v1:");
    hasher.update(body.to_string().as_bytes());
    hasher.finalize().into()
}

/// Bounded, append-only event log owned by one ledger.
#[derive(Debug, Clone)]
pub struct EventJournal {
    ledger: LedgerKind,
    next_sequence: u64,
    capacity: usize,
    events: VecDeque<LedgerEvent>,
}

impl EventJournal {
    #[must_use]
    pub fn new(ledger: LedgerKind) -> Self {
        Self::with_capacity(ledger, constants::EVENT_JOURNAL_CAPACITY)
    }

    /// Journal that keeps at most `capacity` events, dropping the oldest.
    #[must_use]
    pub fn with_capacity(ledger: LedgerKind, capacity: usize) -> Self {
        Self {
            ledger,
            next_sequence: 1,
            capacity: capacity.max(1),
            events: VecDeque::new(),
        }
    }

    /// Append an event and log it at `info`.
    pub fn record(
        &mut self,
        operation: Operation,
        actor: AccountId,
        amounts: EventFields,
        summary: EventFields,
    ) -> &LedgerEvent {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let payload_hash =
            payload_hash(sequence, self.ledger, operation, actor, &amounts, &summary);
        let event = LedgerEvent {
            sequence,
            ledger: self.ledger,
            operation,
            actor,
            amounts,
            summary,
            payload_hash,
            emitted_at: Utc::now(),
        };

        tracing::info!(
            ledger = %event.ledger,
            operation = %event.operation,
            actor = %event.actor,
            sequence = event.sequence,
            amounts = ?event.amounts,
            summary = ?event.summary,
            "ledger event"
        );

        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
        // Just pushed, so the deque is non-empty.
        &self.events[self.events.len() - 1]
    }

    /// Events still held, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &LedgerEvent> {
        self.events.iter()
    }

    #[must_use]
    pub fn last(&self) -> Option<&LedgerEvent> {
        self.events.back()
    }

    /// Number of events ever recorded, including pruned ones.
    #[must_use]
    pub fn total_recorded(&self) -> u64 {
        self.next_sequence - 1
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events of one operation kind, oldest first.
    pub fn of(&self, operation: Operation) -> impl Iterator<Item = &LedgerEvent> {
        self.events.iter().filter(move |e| e.operation == operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn journal_with(n: usize, capacity: usize) -> EventJournal {
        let mut journal = EventJournal::with_capacity(LedgerKind::Pool, capacity);
        let actor = AccountId::derived("tester");
        for i in 0..n {
            journal.record(
                Operation::Stake,
                actor,
                fields([("votes", Decimal::from(i))]),
                fields([("available", Decimal::from(i + 1))]),
            );
        }
        journal
    }

    #[test]
    fn sequences_are_monotonic() {
        let journal = journal_with(3, 10);
        let seqs: Vec<u64> = journal.events().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(journal.total_recorded(), 3);
    }

    #[test]
    fn hash_verifies_and_detects_tamper() {
        let journal = journal_with(1, 10);
        let mut event = journal.last().unwrap().clone();
        assert!(event.verify_hash());
        assert_eq!(event.payload_hash_hex().len(), 64);

        event.amounts.insert("votes".into(), Decimal::from(99));
        assert!(!event.verify_hash());
    }

    #[test]
    fn capacity_prunes_oldest() {
        let journal = journal_with(5, 2);
        assert_eq!(journal.len(), 2);
        assert_eq!(journal.events().next().unwrap().sequence, 4);
        assert_eq!(journal.total_recorded(), 5);
    }

    #[test]
    fn filter_by_operation() {
        let mut journal = journal_with(2, 10);
        journal.record(
            Operation::Unstake,
            AccountId::new(),
            EventFields::new(),
            EventFields::new(),
        );
        assert_eq!(journal.of(Operation::Stake).count(), 2);
        assert_eq!(journal.of(Operation::Unstake).count(), 1);
    }

    #[test]
    fn operation_display() {
        assert_eq!(format!("{}", Operation::HandleRedeem), "HANDLE_REDEEM");
        assert_eq!(format!("{}", LedgerKind::Claim), "CLAIM");
    }
}
