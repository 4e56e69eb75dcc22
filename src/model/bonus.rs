use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::node::UserId;
use super::period::{Cadence, Period};

// ── Program configuration ───────────────────────────────────────────

/// Flavor of a bonus program. Purely descriptive except for `Pool`, which
/// the distributor treats as a shared-pot split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BonusType {
    FastStart,
    Leadership,
    RankAdvancement,
    Car,
    Travel,
    Pool,
    Matching,
    Performance,
    Special,
}

impl BonusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BonusType::FastStart => "fast_start",
            BonusType::Leadership => "leadership",
            BonusType::RankAdvancement => "rank_advancement",
            BonusType::Car => "car",
            BonusType::Travel => "travel",
            BonusType::Pool => "pool",
            BonusType::Matching => "matching",
            BonusType::Performance => "performance",
            BonusType::Special => "special",
        }
    }
}

/// What a single program requirement measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    /// Hold at least the rank named by the requirement id's `minimum_value`
    /// as a ladder level.
    Rank,
    /// Personal volume at or above `minimum_value`.
    Volume,
    /// Team volume at or above `minimum_value`.
    TeamVolume,
    /// Personal sales (minor units) at or above `minimum_value`.
    Sales,
    /// Active direct referrals at or above `minimum_value`.
    Referrals,
    /// Total downline size at or above `minimum_value`.
    TeamSize,
    /// Platform-specific hook. Not evaluatable here; configs carrying one
    /// are rejected at validation rather than silently passed.
    Custom,
}

impl RequirementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementKind::Rank => "rank",
            RequirementKind::Volume => "volume",
            RequirementKind::TeamVolume => "team_volume",
            RequirementKind::Sales => "sales",
            RequirementKind::Referrals => "referrals",
            RequirementKind::TeamSize => "team_size",
            RequirementKind::Custom => "custom",
        }
    }
}

/// Window a requirement is measured over. Snapshot figures are per-period,
/// so every timeframe evaluates against the current period's aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    CurrentPeriod,
    Lifetime,
}

/// One threshold inside a bonus program. All requirements of a program
/// must hold for eligibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BonusRequirement {
    pub id: String,
    pub kind: RequirementKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Threshold; meaning depends on `kind`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<Timeframe>,
}

/// How often a program pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BonusFrequency {
    OneTime,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
}

impl BonusFrequency {
    /// Whether the program is due in the given period. Quarterly fires on
    /// the first month of each quarter, annual in January; one-time fires
    /// in the period containing the program's start date.
    pub fn due(&self, period: &Period, start_date: Option<DateTime<Utc>>) -> bool {
        use chrono::Datelike;
        match self {
            BonusFrequency::Daily => period.cadence == Cadence::Daily,
            BonusFrequency::Weekly => period.cadence == Cadence::Weekly,
            BonusFrequency::Monthly => period.cadence == Cadence::Monthly,
            BonusFrequency::Quarterly => {
                period.cadence == Cadence::Monthly && period.start.month() % 3 == 1
            }
            BonusFrequency::Annual => {
                period.cadence == Cadence::Monthly && period.start.month() == 1
            }
            BonusFrequency::OneTime => match start_date {
                Some(at) => period.contains(at),
                None => false,
            },
        }
    }
}

/// How a pool splits among qualifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PoolDistribution {
    /// Same share for every qualifier.
    Equal,
    /// Shares proportional to rank ladder level.
    Ranked,
    /// Shares proportional to the qualification metric (team volume).
    VolumeWeighted,
}

impl PoolDistribution {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolDistribution::Equal => "equal",
            PoolDistribution::Ranked => "ranked",
            PoolDistribution::VolumeWeighted => "volume_weighted",
        }
    }
}

/// One bonus program. Fixed programs pay `reward_amount` to every
/// qualifier; pool programs split a pot computed from company volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BonusProgram {
    pub id: String,
    pub name: String,
    pub bonus_type: BonusType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub frequency: BonusFrequency,
    #[serde(default)]
    pub requirements: Vec<BonusRequirement>,
    /// Rank id gate applied before requirements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_rank: Option<String>,
    /// Fixed award per qualifier, minor units. Ignored for pools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_amount: Option<i64>,
    #[serde(default)]
    pub is_pool: bool,
    /// Fraction of company volume (in minor units) funding the pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_distribution: Option<PoolDistribution>,
    /// Qualifier cap per period; extras are cut in deterministic order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_winners_per_period: Option<u32>,
    /// Cap on one member's share, minor units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payout_per_person: Option<i64>,
}

fn default_true() -> bool {
    true
}

impl BonusProgram {
    /// Whether the program should run at all for this period: active flag,
    /// date fences, and frequency cadence.
    pub fn runs_in(&self, period: &Period) -> bool {
        if !self.is_active {
            return false;
        }
        if let Some(start) = self.start_date {
            if period.end <= start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if period.start >= end {
                return false;
            }
        }
        self.frequency.due(period, self.start_date)
    }
}

// ── Evaluation output ───────────────────────────────────────────────

/// Recomputable snapshot of one member against one program. Derived data,
/// never stored as source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusEligibility {
    pub user_id: UserId,
    pub program_id: String,
    pub is_eligible: bool,
    /// Per-requirement verdicts, keyed by requirement id.
    pub requirements_met: BTreeMap<String, bool>,
    /// Requirement ids that failed, for support tooling.
    pub missing: Vec<String>,
    /// Metric used for pool weighting (team volume at evaluation time).
    pub qualification_metric: i64,
    pub evaluated_at: DateTime<Utc>,
}

/// One member's slice of a distributed pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolParticipant {
    pub user_id: UserId,
    pub rank: String,
    pub qualification_metric: i64,
    /// Fraction of the distributed amount, for reporting.
    pub share_percentage: f64,
    /// Minor units.
    pub bonus_amount: i64,
}

/// Outcome of splitting one pool for one period.
/// `distributed_amount` is exactly the sum of participant shares and never
/// exceeds `total_pool`; rounding dust stays in the pot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolBonusDistribution {
    pub program_id: String,
    pub period: String,
    /// Funded pot, minor units.
    pub total_pool: i64,
    pub total_qualified: u32,
    pub distributed_amount: i64,
    pub participants: Vec<PoolParticipant>,
    pub calculated_at: DateTime<Utc>,
}

/// A fixed (non-pool) program award for one qualifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusAward {
    pub user_id: UserId,
    pub program_id: String,
    pub bonus_type: BonusType,
    /// Minor units, after any rank bonus multiplier.
    pub amount: i64,
    pub period: String,
    pub calculated_at: DateTime<Utc>,
}

impl BonusAward {
    /// Natural ledger key: one award per member per program per period.
    pub fn source_id(&self) -> String {
        format!("{}:{}:{}", self.program_id, self.period, self.user_id)
    }
}

impl PoolParticipant {
    /// Natural ledger key for a pool share.
    pub fn source_id(&self, program_id: &str, period: &str) -> String {
        format!("{program_id}:{period}:{}", self.user_id)
    }
}
