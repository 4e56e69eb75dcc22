use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::node::UserId;

// ── Wallet ledger ───────────────────────────────────────────────────

/// Direction of a wallet entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxDirection {
    Credit,
    Debit,
}

impl TxDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxDirection::Credit => "credit",
            TxDirection::Debit => "debit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(TxDirection::Credit),
            "debit" => Some(TxDirection::Debit),
            _ => None,
        }
    }
}

/// What produced a wallet entry. Together with `source_id` this forms the
/// exactly-once key: the same source never posts twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxSource {
    Commission,
    Bonus,
    PoolBonus,
    Withdrawal,
    Refund,
    Adjustment,
}

impl TxSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxSource::Commission => "commission",
            TxSource::Bonus => "bonus",
            TxSource::PoolBonus => "pool_bonus",
            TxSource::Withdrawal => "withdrawal",
            TxSource::Refund => "refund",
            TxSource::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "commission" => Some(TxSource::Commission),
            "bonus" => Some(TxSource::Bonus),
            "pool_bonus" => Some(TxSource::PoolBonus),
            "withdrawal" => Some(TxSource::Withdrawal),
            "refund" => Some(TxSource::Refund),
            "adjustment" => Some(TxSource::Adjustment),
            _ => None,
        }
    }
}

/// One append-only wallet entry. Balances-before/after are captured at
/// posting time so the log replays to the cached balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: String,
    pub user_id: UserId,
    pub direction: TxDirection,
    /// Minor units, always positive; `direction` carries the sign.
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub source_type: TxSource,
    /// Natural key of the posted record within its source type.
    pub source_id: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Cached wallet balance, derivable by folding the transaction log.
/// `reconcile` recomputes it from scratch and reports drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub user_id: UserId,
    /// Spendable, minor units.
    pub available: i64,
    /// Held by in-flight withdrawals.
    pub pending: i64,
    pub total_earned: i64,
    pub total_withdrawn: i64,
    pub updated_at: DateTime<Utc>,
}

impl WalletBalance {
    pub fn empty(user_id: impl Into<UserId>, at: DateTime<Utc>) -> Self {
        WalletBalance {
            user_id: user_id.into(),
            available: 0,
            pending: 0,
            total_earned: 0,
            total_withdrawn: 0,
            updated_at: at,
        }
    }
}

// ── Withdrawals ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Requested,
    Approved,
    Processing,
    Completed,
    Rejected,
    Cancelled,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Requested => "requested",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Rejected => "rejected",
            WithdrawalStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(WithdrawalStatus::Requested),
            "approved" => Some(WithdrawalStatus::Approved),
            "processing" => Some(WithdrawalStatus::Processing),
            "completed" => Some(WithdrawalStatus::Completed),
            "rejected" => Some(WithdrawalStatus::Rejected),
            "cancelled" => Some(WithdrawalStatus::Cancelled),
            _ => None,
        }
    }

    /// States a request can still move out of.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            WithdrawalStatus::Requested | WithdrawalStatus::Approved | WithdrawalStatus::Processing
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    Stripe,
    Crypto,
    BankTransfer,
    InternalWallet,
}

impl PayoutMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutMethod::Stripe => "stripe",
            PayoutMethod::Crypto => "crypto",
            PayoutMethod::BankTransfer => "bank_transfer",
            PayoutMethod::InternalWallet => "internal_wallet",
        }
    }
}

/// Where a withdrawal pays out to. Opaque to the engine; handed to the
/// payment gateway as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalDestination {
    pub method: PayoutMethod,
    /// IBAN, wallet address, or provider account id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
    /// Crypto network, e.g. "polygon".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

/// One payout request. The requested amount is held in `pending` until the
/// request completes or unwinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: String,
    pub user_id: UserId,
    /// Gross amount debited from available, minor units.
    pub amount: i64,
    /// Platform fee, minor units.
    pub fee: i64,
    /// What the gateway actually pays: `amount - fee`.
    pub net_amount: i64,
    pub currency: String,
    pub destination: WithdrawalDestination,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    /// Operator id, or "auto" for auto-approved requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Gateway reference once submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<String>,
}

/// Platform withdrawal policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WithdrawalSettings {
    /// Minor units.
    pub minimum_amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_amount: Option<i64>,
    /// Fraction of the gross amount, e.g. 0.02.
    #[serde(default)]
    pub fee_percentage: f64,
    /// Flat fee on top, minor units.
    #[serde(default)]
    pub fee_fixed: i64,
    /// SLA hint surfaced to members, not enforced here.
    #[serde(default)]
    pub processing_days: u32,
    #[serde(default)]
    pub methods: Vec<PayoutMethod>,
    /// When false, every request is approved on submission.
    pub requires_approval: bool,
    /// Requests strictly under this skip manual review even when
    /// `requires_approval` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_approve_under: Option<i64>,
}

impl WithdrawalSettings {
    /// Fee for a gross amount: percentage plus flat, never exceeding the
    /// amount itself.
    pub fn fee_for(&self, amount: i64) -> i64 {
        let pct = (amount as f64 * self.fee_percentage).round() as i64;
        (pct + self.fee_fixed).min(amount)
    }
}
