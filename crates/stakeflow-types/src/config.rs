//! Configuration types for the pool, claim token and controller.

use serde::{Deserialize, Serialize};

use crate::{Result, StakeflowError, constants};

/// Pool Ledger parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Display name of the pool.
    pub name: String,
    /// Blocks a staked vote spends in the in-queue before it is locked.
    pub lock_period: u64,
    /// Blocks an unstaked vote spends in the out-queue before it is withdrawable.
    pub unlock_period: u64,
    /// User share of rewards in `RATIO_BASE` units.
    pub user_share_ratio: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: constants::DEFAULT_POOL_NAME.to_string(),
            lock_period: constants::DEFAULT_LOCK_PERIOD,
            unlock_period: constants::DEFAULT_UNLOCK_PERIOD,
            user_share_ratio: constants::DEFAULT_USER_SHARE_RATIO,
        }
    }
}

impl PoolConfig {
    /// Check ranges.
    ///
    /// # Errors
    /// `Configuration` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.user_share_ratio == 0 || self.user_share_ratio > constants::RATIO_BASE {
            return Err(StakeflowError::Configuration(format!(
                "pool.user_share_ratio {} out of range (0, {}]",
                self.user_share_ratio,
                constants::RATIO_BASE
            )));
        }
        if self.name.is_empty() {
            return Err(StakeflowError::Configuration(
                "pool.name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Claim Token Ledger parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimConfig {
    pub name: String,
    pub symbol: String,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            name: constants::CLAIM_TOKEN_NAME.to_string(),
            symbol: constants::CLAIM_TOKEN_SYMBOL.to_string(),
        }
    }
}

impl ClaimConfig {
    /// # Errors
    /// `Configuration` if the symbol is empty.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() {
            return Err(StakeflowError::Configuration(
                "claim.symbol must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Reconciliation Controller parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Operator share of claimed interest in `BRIDGE_RATIO_BASE` units.
    pub pool_share_ratio: u64,
    /// Upper bound on redeem entries settled per `handle_redeem` call.
    pub max_redeem_per_call: usize,
    /// Seconds between scheduled ticks.
    pub tick_interval_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            pool_share_ratio: constants::DEFAULT_POOL_SHARE_RATIO,
            max_redeem_per_call: constants::DEFAULT_MAX_REDEEM_PER_CALL,
            tick_interval_secs: constants::DEFAULT_TICK_INTERVAL_SECS,
        }
    }
}

impl ControllerConfig {
    /// # Errors
    /// `Configuration` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.pool_share_ratio > constants::BRIDGE_RATIO_BASE {
            return Err(StakeflowError::Configuration(format!(
                "controller.pool_share_ratio {} exceeds {}",
                self.pool_share_ratio,
                constants::BRIDGE_RATIO_BASE
            )));
        }
        if self.max_redeem_per_call == 0 {
            return Err(StakeflowError::Configuration(
                "controller.max_redeem_per_call must be at least 1".into(),
            ));
        }
        if self.tick_interval_secs == 0 {
            return Err(StakeflowError::Configuration(
                "controller.tick_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pool: PoolConfig,
    pub claim: ClaimConfig,
    pub controller: ControllerConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    ///
    /// # Errors
    /// `Serialization` for malformed JSON, `Configuration` for bad values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    ///
    /// # Errors
    /// The first section's `Configuration` error.
    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.claim.validate()?;
        self.controller.validate()
    }
}
