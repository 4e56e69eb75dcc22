use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::UserId;

/// A completed order pulled from the external sales ledger. The engine
/// never sees carts or refund flows, only orders that finished inside the
/// period window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    /// The purchasing member.
    pub user_id: UserId,
    /// Who gets the direct-sale commission. Usually the sponsor; absent for
    /// root members and unattributed retail orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer_id: Option<UserId>,
    /// Cash total in minor units.
    pub total: i64,
    /// Business volume awarded by the catalog.
    pub bv: i64,
    /// Commissionable volume. Catalogs that don't split the two set cv = bv.
    pub cv: i64,
    /// Loyalty points granted by the catalog. Carried through for rewards
    /// tooling; no commission rule reads them.
    #[serde(default)]
    pub points: i64,
    pub completed_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        order_id: impl Into<String>,
        user_id: impl Into<UserId>,
        total: i64,
        bv: i64,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Order {
            order_id: order_id.into(),
            user_id: user_id.into(),
            referrer_id: None,
            total,
            bv,
            cv: bv,
            points: 0,
            completed_at,
        }
    }

    pub fn with_referrer(mut self, referrer_id: impl Into<UserId>) -> Self {
        self.referrer_id = Some(referrer_id.into());
        self
    }
}
