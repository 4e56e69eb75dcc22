use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A unique identifier for a member within a platform network.
pub type UserId = String;

// ── Plan structure enums ────────────────────────────────────────────

/// Compensation structure a platform runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Two placement slots per node, volume matched across legs.
    Binary,
    /// Three placement slots per node, matched like binary.
    Trinity,
    /// Unlimited width, percentage cascade by ancestor depth.
    Unilevel,
}

impl NetworkType {
    /// Child slots per node. `None` for unlimited width.
    pub fn slots(&self) -> Option<usize> {
        match self {
            NetworkType::Binary => Some(2),
            NetworkType::Trinity => Some(3),
            NetworkType::Unilevel => None,
        }
    }

    /// Whether the plan pays by matching leg volumes.
    pub fn is_matched(&self) -> bool {
        matches!(self, NetworkType::Binary | NetworkType::Trinity)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Binary => "binary",
            NetworkType::Trinity => "trinity",
            NetworkType::Unilevel => "unilevel",
        }
    }
}

impl std::fmt::Display for NetworkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A child slot under a placement parent (binary/trinity plans).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LegPosition {
    Left,
    Right,
    /// Third slot, trinity only.
    Center,
}

impl LegPosition {
    /// All slots available under the given plan, in fill order.
    pub fn slots_for(network_type: NetworkType) -> &'static [LegPosition] {
        match network_type {
            NetworkType::Binary => &[LegPosition::Left, LegPosition::Right],
            NetworkType::Trinity => &[LegPosition::Left, LegPosition::Right, LegPosition::Center],
            NetworkType::Unilevel => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LegPosition::Left => "left",
            LegPosition::Right => "right",
            LegPosition::Center => "center",
        }
    }
}

impl std::fmt::Display for LegPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Per-leg volumes ─────────────────────────────────────────────────

/// Subtree volume rolled up per leg. Unused legs stay zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LegVolumes {
    pub left: i64,
    pub right: i64,
    pub center: i64,
}

impl LegVolumes {
    pub fn get(&self, position: LegPosition) -> i64 {
        match position {
            LegPosition::Left => self.left,
            LegPosition::Right => self.right,
            LegPosition::Center => self.center,
        }
    }

    pub fn set(&mut self, position: LegPosition, volume: i64) {
        match position {
            LegPosition::Left => self.left = volume,
            LegPosition::Right => self.right = volume,
            LegPosition::Center => self.center = volume,
        }
    }

    pub fn total(&self) -> i64 {
        self.left + self.right + self.center
    }
}

// ── Network node ────────────────────────────────────────────────────

/// One member's slot in the placement forest.
///
/// `parent_id` edges form the placement forest: every node has at most one
/// parent and no cycles. `sponsor_id` records referral attribution and is
/// independent of placement; a sponsor's recruit may be placed anywhere in
/// the sponsor's subtree. Nodes are never deleted; members who leave are
/// deactivated via `is_active` and keep their slot.
///
/// Per-period figures (volumes, sales, counts) are owned by the volume
/// aggregator, which assigns them fresh on every period run. Nothing else
/// writes them, and nothing accumulates across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NetworkNode {
    pub user_id: UserId,
    /// Placement parent. `None` for a tree root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<UserId>,
    /// Referral attribution, independent of placement. `None` for a root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sponsor_id: Option<UserId>,
    /// Slot under the placement parent (binary/trinity only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<LegPosition>,
    /// Depth from the tree root (root = 0).
    #[serde(default)]
    pub level: u32,

    /// Volume from the member's own orders this period.
    #[serde(default)]
    pub personal_volume: i64,
    /// Volume from the placement subtree, excluding own orders.
    #[serde(default)]
    pub team_volume: i64,
    #[serde(default)]
    pub leg_volumes: LegVolumes,
    /// Cash value of own completed orders, minor units.
    #[serde(default)]
    pub personal_sales: i64,
    /// Cash value of subtree orders excluding own, minor units.
    #[serde(default)]
    pub team_sales: i64,
    /// Loyalty points from own orders this period.
    #[serde(default)]
    pub personal_points: i64,

    /// Members this user sponsored (referral edges, not placement).
    #[serde(default)]
    pub direct_referrals: u32,
    /// Sponsored members active this period.
    #[serde(default)]
    pub active_referrals: u32,
    /// Placement subtree size, excluding self.
    #[serde(default)]
    pub total_downline: u32,
    #[serde(default)]
    pub active_downline: u32,

    /// Current rank id; `"none"` when unranked.
    #[serde(default = "default_rank")]
    pub rank: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
}

fn default_rank() -> String {
    "none".to_string()
}

fn default_true() -> bool {
    true
}

impl NetworkNode {
    /// Fresh node with zeroed figures. Parent/position/level are filled in
    /// by the graph during placement.
    pub fn new(
        user_id: impl Into<UserId>,
        sponsor_id: Option<UserId>,
        joined_at: DateTime<Utc>,
    ) -> Self {
        NetworkNode {
            user_id: user_id.into(),
            parent_id: None,
            sponsor_id,
            position: None,
            level: 0,
            personal_volume: 0,
            team_volume: 0,
            leg_volumes: LegVolumes::default(),
            personal_sales: 0,
            team_sales: 0,
            personal_points: 0,
            direct_referrals: 0,
            active_referrals: 0,
            total_downline: 0,
            active_downline: 0,
            rank: default_rank(),
            is_active: true,
            joined_at,
        }
    }

    /// Zero everything the aggregator recomputes each period.
    pub fn reset_period_figures(&mut self) {
        self.personal_volume = 0;
        self.team_volume = 0;
        self.leg_volumes = LegVolumes::default();
        self.personal_sales = 0;
        self.team_sales = 0;
        self.personal_points = 0;
        self.active_referrals = 0;
        self.active_downline = 0;
    }
}

// ── Placement instruction ───────────────────────────────────────────

/// Tie-break rule for automatic slot selection in binary/trinity trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    /// Shallowest open slot in the left leg (spillover).
    LeftFill,
    /// Shallowest open slot in the right leg.
    RightFill,
    /// Leg with fewer nodes first, then shallowest open slot.
    Balanced,
    /// Always the plan-configured leg, regardless of balance.
    PowerLeg,
}

impl PlacementStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementStrategy::LeftFill => "left_fill",
            PlacementStrategy::RightFill => "right_fill",
            PlacementStrategy::Balanced => "balanced",
            PlacementStrategy::PowerLeg => "power_leg",
        }
    }
}

/// Instruction describing how a new member attaches to the forest.
/// Consumed once by the graph; re-issuing an identical placement is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Placement {
    pub user_id: UserId,
    pub sponsor_id: UserId,
    /// Explicit placement parent. Defaults to the sponsor when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<UserId>,
    /// Requested slot. Required for manual binary/trinity placement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<LegPosition>,
    /// When set, the graph picks the slot via `strategy`.
    #[serde(default)]
    pub auto_placement: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<PlacementStrategy>,
    pub joined_at: DateTime<Utc>,
}

impl Placement {
    /// Automatic placement under the sponsor's subtree.
    pub fn auto(
        user_id: impl Into<UserId>,
        sponsor_id: impl Into<UserId>,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Placement {
            user_id: user_id.into(),
            sponsor_id: sponsor_id.into(),
            parent_id: None,
            position: None,
            auto_placement: true,
            strategy: None,
            joined_at,
        }
    }

    /// Manual placement into a named slot of an explicit parent.
    pub fn manual(
        user_id: impl Into<UserId>,
        sponsor_id: impl Into<UserId>,
        parent_id: impl Into<UserId>,
        position: LegPosition,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Placement {
            user_id: user_id.into(),
            sponsor_id: sponsor_id.into(),
            parent_id: Some(parent_id.into()),
            position: Some(position),
            auto_placement: false,
            strategy: None,
            joined_at,
        }
    }

    pub fn with_strategy(mut self, strategy: PlacementStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}
