//! # stakeflow-claim
//!
//! The **Claim Token Ledger** of the stakeflow settlement engine.
//!
//! - [`ClaimLedger`]: floating-rate claim token, deposits, redemptions,
//!   bridge-driven settlement and withdrawals
//! - [`RedeemQueue`]: strict FIFO arena + cursor queue of [`RedeemEntry`]
//!
//! ## Redemption flow
//!
//! ```text
//!  redeem(tokens) ──▶ RedeemQueue ──handle_redeem(prefix sum)──▶ withdrawable ──withdraw──▶ user
//!        burns              (total_claimed)        (bridge pays in)
//! ```
//!
//! [`RedeemEntry`]: stakeflow_types::RedeemEntry

pub mod ledger;
pub mod redeem_queue;

pub use ledger::ClaimLedger;
pub use redeem_queue::RedeemQueue;
