//! Identifiers used throughout stakeflow.
//!
//! Accounts use UUIDv7 for time-ordered sorting. The pool's identity on the
//! external stake registry is the raw 32-byte key the registry knows it by.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Block height on the chain hosting the ledgers.
pub type BlockNumber = u64;

/// Governance round number used by the vote relay.
pub type Round = u64;

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// An account on the custody substrate: a user, a ledger's own address,
/// the staking vault, or the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AccountId(pub Uuid);

impl AccountId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Deterministic account derived from a label, for well-known system
    /// accounts (vaults, mapped addresses) that must be stable across restarts.
    #[must_use]
    pub fn derived(label: &str) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(b"stakeflow:account:v1:");
        hasher.update(label.as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PosIdentity
// ---------------------------------------------------------------------------

/// The pool's identity on the external proof-of-stake registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PosIdentity(pub [u8; 32]);

impl PosIdentity {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for PosIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pos:0x{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_uniqueness() {
        let a = AccountId::new();
        let b = AccountId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn derived_accounts_are_stable() {
        assert_eq!(AccountId::derived("vault"), AccountId::derived("vault"));
        assert_ne!(AccountId::derived("vault"), AccountId::derived("mapped"));
    }

    #[test]
    fn pos_identity_display() {
        let id = PosIdentity([0xab; 32]);
        assert_eq!(id.short(), "abababab");
        assert!(format!("{id}").starts_with("pos:0xabab"));
    }

    #[test]
    fn account_id_serde_roundtrip() {
        let id = AccountId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
