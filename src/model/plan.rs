use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::bonus::BonusProgram;
use super::node::{LegPosition, NetworkType, UserId};
use super::period::Cadence;
use super::wallet::WithdrawalSettings;

// ── Platform configuration ──────────────────────────────────────────

/// Everything a platform needs to run its compensation engine: the plan,
/// the rank ladder, bonus programs, and withdrawal policy. Loaded from a
/// JSON file and validated before any period run touches the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlatformConfig {
    /// Platform identifier, e.g. "iacelera". Scopes locks and ledger rows.
    pub platform: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub plan: CompensationPlan,
    /// Rank ladder. `level` orders it; ids must be unique.
    pub ranks: Vec<Rank>,
    #[serde(default)]
    pub programs: Vec<BonusProgram>,
    pub withdrawal: WithdrawalSettings,
}

impl PlatformConfig {
    pub fn rank(&self, id: &str) -> Option<&Rank> {
        self.ranks.iter().find(|r| r.id == id)
    }

    pub fn rank_level(&self, id: &str) -> u32 {
        self.rank(id).map(|r| r.level).unwrap_or(0)
    }

    /// Ranks from highest level down, the order promotion checks run in.
    pub fn ranks_descending(&self) -> Vec<&Rank> {
        let mut ranks: Vec<&Rank> = self.ranks.iter().collect();
        ranks.sort_by(|a, b| b.level.cmp(&a.level));
        ranks
    }
}

/// The compensation plan proper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompensationPlan {
    pub network_type: NetworkType,
    /// Unilevel payout depth cap. `None` = pay as deep as `levels` goes.
    /// Ignored by binary/trinity matching, which spans the whole leg.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_levels: Option<u32>,
    /// Per-level unilevel rates, level 1 (direct referrals) first.
    #[serde(default)]
    pub levels: Vec<LevelRate>,
    /// Paid to the referrer on each completed order, e.g. 0.10.
    pub direct_sales_rate: f64,
    /// Rate applied to matched leg volume (binary/trinity).
    #[serde(default)]
    pub binary_match_rate: f64,
    /// Per-period cap on one member's match commission, minor units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_cap: Option<i64>,
    /// Leg the `power_leg` placement strategy always fills.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_leg: Option<LegPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_start: Option<FastStart>,
    pub schedule: PaymentSchedule,
}

impl CompensationPlan {
    /// Unilevel rate for a 1-based ancestor depth, honoring `max_levels`.
    pub fn level_rate(&self, level: u32) -> Option<f64> {
        if let Some(max) = self.max_levels {
            if level > max {
                return None;
            }
        }
        self.levels.iter().find(|l| l.level == level).map(|l| l.rate)
    }

    /// Deepest compensated level.
    pub fn payout_depth(&self) -> u32 {
        let configured = self.levels.iter().map(|l| l.level).max().unwrap_or(0);
        match self.max_levels {
            Some(max) => configured.min(max),
            None => configured,
        }
    }
}

/// One unilevel payout tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LevelRate {
    /// 1-based ancestor depth.
    pub level: u32,
    /// Fraction of commissionable volume, e.g. 0.15.
    pub rate: f64,
}

/// Extra rate on a recruit's orders inside the enrollment window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FastStart {
    pub rate: f64,
    /// Window length in days from the recruit's join date.
    pub window_days: u32,
}

/// When each stage of the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PaymentSchedule {
    pub calculation: Cadence,
    pub payout: Cadence,
    pub rank_calculation: Cadence,
}

// ── Ranks ───────────────────────────────────────────────────────────

/// One rung of the rank ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Rank {
    pub id: String,
    pub name: String,
    /// Ladder position; higher outranks lower. Unranked members sit at 0.
    pub level: u32,
    pub requirements: RankRequirements,
    #[serde(default)]
    pub benefits: RankBenefits,
    /// Whether a failed re-qualification can demote the holder.
    #[serde(default = "default_true")]
    pub can_downgrade: bool,
    /// Meritorious ranks are held for life once achieved.
    #[serde(default)]
    pub is_meritorious: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Thresholds a member must meet simultaneously to hold a rank.
/// Absent fields are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RankRequirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_volume: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_volume: Option<i64>,
    /// Minor units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_sales: Option<i64>,
    /// Minor units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_sales: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_referrals: Option<u32>,
    /// Loyalty points earned in the period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<i64>,
    /// Direct referrals holding at least the named rank: rank id -> count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank_referrals: Option<BTreeMap<String, u32>>,
}

/// What holding a rank confers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RankBenefits {
    /// Overrides the plan's match rate for this holder (binary/trinity).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission_rate: Option<f64>,
    /// Multiplier on fixed program awards, e.g. 1.25.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonus_rate: Option<f64>,
    /// Program ids this rank unlocks regardless of other requirements.
    #[serde(default)]
    pub unlocked_bonuses: Vec<String>,
}

/// Append-only record of a rank change. `maintained_until` is set on the
/// superseded entry when the next change lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankHistoryEntry {
    pub user_id: UserId,
    pub rank_id: String,
    pub rank_level: u32,
    pub achieved_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintained_until: Option<DateTime<Utc>>,
    pub is_meritorious: bool,
}
