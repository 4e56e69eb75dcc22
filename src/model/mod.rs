pub mod bonus;
pub mod commission;
pub mod node;
pub mod order;
pub mod period;
pub mod plan;
pub mod wallet;

pub use bonus::{BonusAward, BonusEligibility, BonusProgram, PoolBonusDistribution};
pub use commission::{BinaryMatch, Commission, CommissionStatus, CommissionType};
pub use node::{LegPosition, NetworkNode, NetworkType, Placement, PlacementStrategy, UserId};
pub use order::Order;
pub use period::{Cadence, Period};
pub use plan::{CompensationPlan, PlatformConfig, Rank};
pub use wallet::{WalletBalance, WalletTransaction, Withdrawal, WithdrawalSettings};

/// Apply a fractional rate to a minor-unit or volume base, rounding half
/// away from zero. All money math in the engine funnels through here so
/// recomputation reproduces amounts bit for bit.
pub fn apply_rate(base: i64, rate: f64) -> i64 {
    (base as f64 * rate).round() as i64
}
