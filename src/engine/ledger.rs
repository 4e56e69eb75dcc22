//! Posts approved earnings to member wallets.
//!
//! Everything here is a replay-safe pass over already-persisted or
//! already-computed records. The store's `(source_type, source_id)` key
//! does the deduplication; this module just chooses descriptions and
//! counts what happened.

use chrono::{DateTime, Utc};

use crate::engine::bonus::BonusOutcome;
use crate::model::commission::{CommissionStatus, CommissionType};
use crate::model::wallet::TxSource;
use crate::store::ledger::PostOutcome;
use crate::store::{Store, StoreError};

/// Tally of one posting pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostingReport {
    pub posted: u32,
    pub duplicates: u32,
    /// Newly credited minor units; duplicates contribute nothing.
    pub credited: i64,
}

impl PostingReport {
    pub fn absorb(&mut self, other: PostingReport) {
        self.posted += other.posted;
        self.duplicates += other.duplicates;
        self.credited += other.credited;
    }

    fn count(&mut self, outcome: PostOutcome, amount: i64) {
        match outcome {
            PostOutcome::Posted => {
                self.posted += 1;
                self.credited += amount;
            }
            PostOutcome::Duplicate => self.duplicates += 1,
        }
    }
}

/// Credit every approved commission of the period and mark it paid.
/// Approved rows left over from an interrupted earlier run are picked up
/// here too.
pub fn post_commissions(
    store: &mut Store,
    platform: &str,
    period: &str,
    now: DateTime<Utc>,
) -> Result<PostingReport, StoreError> {
    let rows = store.commissions_for_period(platform, period, Some(CommissionStatus::Approved))?;
    let mut report = PostingReport::default();
    for c in &rows {
        if c.amount == 0 {
            continue;
        }
        let key = c.key();
        let description = match c.commission_type {
            CommissionType::Unilevel => {
                format!("unilevel level {} commission, {period}", c.level.unwrap_or(0))
            }
            other => format!("{} commission, {period}", other.as_str()),
        };
        let outcome = store.post_credit(
            platform,
            &c.user_id,
            c.amount,
            TxSource::Commission,
            &key,
            &description,
            Some(&key),
            now,
        )?;
        report.count(outcome, c.amount);
    }
    Ok(report)
}

/// Credit fixed awards and pool shares. These carry their own natural
/// keys, so a rerun of the same period re-posts nothing.
pub fn post_bonuses(
    store: &mut Store,
    platform: &str,
    outcome: &BonusOutcome,
    now: DateTime<Utc>,
) -> Result<PostingReport, StoreError> {
    let mut report = PostingReport::default();

    for award in &outcome.awards {
        if award.amount == 0 {
            continue;
        }
        let result = store.post_credit(
            platform,
            &award.user_id,
            award.amount,
            TxSource::Bonus,
            &award.source_id(),
            &format!("{} bonus {}, {}", award.bonus_type.as_str(), award.program_id, award.period),
            None,
            now,
        )?;
        report.count(result, award.amount);
    }

    for pool in &outcome.pools {
        for share in &pool.participants {
            if share.bonus_amount == 0 {
                continue;
            }
            let result = store.post_credit(
                platform,
                &share.user_id,
                share.bonus_amount,
                TxSource::PoolBonus,
                &share.source_id(&pool.program_id, &pool.period),
                &format!("pool share {}, {}", pool.program_id, pool.period),
                None,
                now,
            )?;
            report.count(result, share.bonus_amount);
        }
    }

    Ok(report)
}
