use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::UserId;
use super::period::Period;

// ── Commission records ──────────────────────────────────────────────

/// What earned the commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionType {
    /// Referrer's cut of one order.
    DirectSale,
    /// Extra rate on orders inside a recruit's fast-start window.
    FastStart,
    /// Per-level cascade share of one order.
    Unilevel,
    /// Matched leg volume for the period (binary/trinity).
    BinaryMatch,
}

impl CommissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionType::DirectSale => "direct_sale",
            CommissionType::FastStart => "fast_start",
            CommissionType::Unilevel => "unilevel",
            CommissionType::BinaryMatch => "binary_match",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct_sale" => Some(CommissionType::DirectSale),
            "fast_start" => Some(CommissionType::FastStart),
            "unilevel" => Some(CommissionType::Unilevel),
            "binary_match" => Some(CommissionType::BinaryMatch),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a commission row. Recalculation may replace `Pending` rows
/// or cancel them; `Approved` and `Paid` rows are never altered by a rerun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    Pending,
    Approved,
    Paid,
    Cancelled,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::Approved => "approved",
            CommissionStatus::Paid => "paid",
            CommissionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CommissionStatus::Pending),
            "approved" => Some(CommissionStatus::Approved),
            "paid" => Some(CommissionStatus::Paid),
            "cancelled" => Some(CommissionStatus::Cancelled),
            _ => None,
        }
    }
}

/// One earned commission. The natural key (`key()`) is deterministic, so
/// recomputing a period reproduces the same rows and the store can diff
/// instead of duplicating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commission {
    /// The earner.
    pub user_id: UserId,
    pub commission_type: CommissionType,
    /// Minor units.
    pub amount: i64,
    /// Unilevel ancestor depth, 1-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    /// Rate that produced `amount`.
    pub percentage: f64,
    /// Volume or sales base the rate applied to.
    pub volume: i64,
    /// Source order for per-order types. Absent for period-scoped matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_order_id: Option<String>,
    /// Whose activity generated the earning. Absent for period-scoped matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_user_id: Option<UserId>,
    pub status: CommissionStatus,
    pub period: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub calculated_at: DateTime<Utc>,
}

impl Commission {
    /// Natural idempotency key. Per-order types key on the order (plus level
    /// for unilevel); the binary match keys on the period, one row per
    /// member per period.
    pub fn key(&self) -> String {
        match self.commission_type {
            CommissionType::BinaryMatch => {
                format!("{}:binary_match:{}", self.user_id, self.period)
            }
            CommissionType::Unilevel => format!(
                "{}:unilevel:{}:{}",
                self.user_id,
                self.source_order_id.as_deref().unwrap_or(&self.period),
                self.level.unwrap_or(0),
            ),
            CommissionType::DirectSale => format!(
                "{}:direct_sale:{}",
                self.user_id,
                self.source_order_id.as_deref().unwrap_or(&self.period),
            ),
            CommissionType::FastStart => format!(
                "{}:fast_start:{}",
                self.user_id,
                self.source_order_id.as_deref().unwrap_or(&self.period),
            ),
        }
    }
}

/// Builder used by the calculators. Everything period-scoped is stamped in
/// one place so all rows of a run agree.
pub struct CommissionDraft<'a> {
    period: &'a Period,
    calculated_at: DateTime<Utc>,
}

impl<'a> CommissionDraft<'a> {
    pub fn new(period: &'a Period, calculated_at: DateTime<Utc>) -> Self {
        CommissionDraft {
            period,
            calculated_at,
        }
    }

    pub fn build(
        &self,
        user_id: impl Into<UserId>,
        commission_type: CommissionType,
        amount: i64,
        percentage: f64,
        volume: i64,
    ) -> Commission {
        Commission {
            user_id: user_id.into(),
            commission_type,
            amount,
            level: None,
            percentage,
            volume,
            source_order_id: None,
            source_user_id: None,
            status: CommissionStatus::Pending,
            period: self.period.key.clone(),
            period_start: self.period.start,
            period_end: self.period.end,
            calculated_at: self.calculated_at,
        }
    }
}

// ── Binary / trinity match ──────────────────────────────────────────

/// One member's leg match for a period. Leg volumes include carry-in from
/// the previous period, so `matched_volume <= min` over the populated legs
/// holds by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryMatch {
    pub user_id: UserId,
    pub period: String,
    /// Left leg volume for the period plus carried-in remainder.
    pub left_volume: i64,
    pub right_volume: i64,
    /// Trinity only; stays zero under binary.
    pub center_volume: i64,
    /// Volume paid on: the weakest populated leg.
    pub matched_volume: i64,
    /// Unmatched remainder carried into the next period, per leg.
    pub carry_left: i64,
    pub carry_right: i64,
    pub carry_center: i64,
    /// Match rate actually applied (plan rate or rank override).
    pub rate: f64,
    /// Commission in minor units, after any cap.
    pub amount: i64,
    pub calculated_at: DateTime<Utc>,
}
