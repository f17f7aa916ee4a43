//! System-wide constants for the stakeflow settlement engine.

/// Value units exchanged for one vote on the stake registry.
pub const CFX_PER_VOTE: u64 = 1000;

/// Decimal places kept on every value amount and reward index.
pub const VALUE_PRECISION: u32 = 18;

/// Denominator for the pool's user share ratio (9900 = 99%).
pub const RATIO_BASE: u64 = 10_000;

/// Default share of rewards paid to stakers; the rest goes to the operator.
pub const DEFAULT_USER_SHARE_RATIO: u64 = 9_900;

/// Denominator for controller-side ratios (fee split, reward rates).
pub const BRIDGE_RATIO_BASE: u64 = 1_000_000_000;

/// Default operator share of interest claimed by the controller (10%).
pub const DEFAULT_POOL_SHARE_RATIO: u64 = 100_000_000;

/// Blocks produced per day (two blocks per second).
pub const ONE_DAY_BLOCK_COUNT: u64 = 2 * 3600 * 24;

/// Blocks produced per year.
pub const ONE_YEAR_BLOCK_COUNT: u64 = ONE_DAY_BLOCK_COUNT * 365;

/// Default lock period for newly staked votes.
pub const DEFAULT_LOCK_PERIOD: u64 = ONE_DAY_BLOCK_COUNT * 13 + 3600;

/// Default unlock period for unstaked votes.
pub const DEFAULT_UNLOCK_PERIOD: u64 = ONE_DAY_BLOCK_COUNT + 3600;

/// Reward sections older than this are dropped from the APY window.
pub const APY_WINDOW_BLOCKS: u64 = ONE_DAY_BLOCK_COUNT * 7;

/// Number of registry epochs averaged by the period reward rate.
pub const APR_PERIOD_COUNT: u64 = 48;

/// Maximum redeem entries settled by a single `handle_redeem` call.
pub const DEFAULT_MAX_REDEEM_PER_CALL: usize = 30;

/// Number of governance topics relayed per round.
pub const VOTE_TOPIC_COUNT: usize = 3;

/// Options per governance topic (reject, approve, abstain).
pub const VOTE_OPTION_COUNT: usize = 3;

/// Default reconciliation tick interval in seconds.
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;

/// Ledger events kept in memory before the oldest are pruned.
pub const EVENT_JOURNAL_CAPACITY: usize = 100_000;

/// Default pool name.
pub const DEFAULT_POOL_NAME: &str = "Stakeflow PoS Pool";

/// Claim token name and symbol.
pub const CLAIM_TOKEN_NAME: &str = "Stakeflow Staked CFX";
pub const CLAIM_TOKEN_SYMBOL: &str = "sfCFX";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
