//! # stakeflow-pool
//!
//! The **Pool Ledger** of the stakeflow settlement engine: the pool's
//! relationship with the external proof-of-stake registry.
//!
//! - [`PoolLedger`]: vote accounting, lock/unlock pipelines, reward accrual
//! - [`VotePowerQueue`]: per-user and pool-wide lock / unlock queues
//! - [`apy`]: best-effort yield analytics
//!
//! ## Vote lifecycle
//!
//! ```text
//!  stake ──▶ locking ──(lock period)──▶ locked ──unstake──▶ unlocking
//!                                                              │
//!              withdraw_stake ◀──── unlocked ◀──(unlock period)┘
//! ```

pub mod apy;
pub mod ledger;
pub mod queue;

pub use apy::{ApyTracker, RewardSection};
pub use ledger::PoolLedger;
pub use queue::VotePowerQueue;
