//! # stakeflow-reconcile
//!
//! The **Reconciliation Controller** of the stakeflow settlement engine: a
//! periodic, idempotent loop that reads the Pool Ledger, the Claim Token
//! Ledger and the stake registry, and applies the minimal corrective calls.
//!
//! - [`Controller`]: the tick steps and the operator's reserved interest
//! - [`Engine`]: both ledgers plus adapters, with the controller as bridge
//! - [`SharedEngine`]: non-overlapping ticks on a tokio interval
//! - [`telemetry`]: subscriber bootstrap
//!
//! A tick run twice with no external change in between applies nothing the
//! second time: every step re-derives its precondition from ledger state.

pub mod controller;
pub mod engine;
pub mod report;
pub mod scheduler;
pub mod state;
pub mod telemetry;

pub use controller::{Controller, Ledgers};
pub use engine::Engine;
pub use report::{Action, Step, StepFailure, TickReport};
pub use scheduler::{SchedulerHandle, SchedulerStats, SharedEngine};
pub use state::{LockParams, ReconciliationState};
