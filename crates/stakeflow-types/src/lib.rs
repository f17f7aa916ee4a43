//! # stakeflow-types
//!
//! Shared types, errors, and configuration for the **stakeflow** liquid-staking
//! settlement engine.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`AccountId`], [`PosIdentity`], [`BlockNumber`], [`Round`]
//! - **Vote accounting**: [`PoolSummary`], [`UserSummary`], [`UserShot`], [`PoolShot`], [`QueueEntry`]
//! - **Redemption**: [`RedeemEntry`]
//! - **Staker sets**: [`StakerSet`]
//! - **Audit trail**: [`LedgerEvent`], [`EventJournal`], [`Operation`]
//! - **External adapters**: [`Custody`], [`StakeRegistry`], [`VoteEscrow`] (plus
//!   `MemoryCustody`, `MemoryRegistry` and `MemoryVoteEscrow` behind `test-helpers`)
//! - **Configuration**: [`EngineConfig`], [`PoolConfig`], [`ClaimConfig`], [`ControllerConfig`]
//! - **Errors**: [`StakeflowError`] with `SF_ERR_` prefix codes
//! - **Value arithmetic**: [`value`] helpers truncating at ledger precision
//! - **Constants**: system-wide limits and defaults

pub mod config;
pub mod constants;
pub mod custody;
pub mod error;
pub mod escrow;
pub mod event;
pub mod ids;
pub mod registry;
pub mod stakers;
pub mod summary;
pub mod value;

pub use config::*;
pub use custody::*;
pub use error::*;
pub use escrow::*;
pub use event::*;
pub use ids::*;
pub use registry::*;
pub use stakers::*;
pub use summary::*;

// Constants and value helpers are accessed via their module paths
// (`stakeflow_types::constants::CFX_PER_VOTE`, `stakeflow_types::value::mul_div`).
