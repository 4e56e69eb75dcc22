//! Wallet ledger: append-only transaction log plus cached balances.
//!
//! Every posting runs in one sqlite transaction that appends the log row,
//! moves the cached balance, and flips the source record's status, so a
//! crash leaves either all of it or none of it. The `(platform,
//! source_type, source_id)` unique key is what makes reposting a no-op.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use super::{Store, StoreError, parse_ts};
use crate::model::node::UserId;
use crate::model::wallet::{
    TxDirection, TxSource, WalletBalance, WalletTransaction, Withdrawal, WithdrawalDestination,
    WithdrawalStatus,
};

/// What a posting attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    Posted,
    /// The source was already in the log; nothing was written.
    Duplicate,
}

/// Cached balance disagreeing with what the log and open holds derive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceDrift {
    pub user_id: UserId,
    pub field: &'static str,
    pub cached: i64,
    pub derived: i64,
}

#[derive(Default, Clone, Copy)]
struct DerivedBalance {
    available: i64,
    pending: i64,
    earned: i64,
    withdrawn: i64,
}

impl Store {
    // ── Posting ─────────────────────────────────────────────────────

    /// Credit a member's wallet exactly once per `(source, source_id)`.
    /// When `commission_key` is given, the matching approved commission
    /// row is marked paid in the same transaction.
    pub fn post_credit(
        &mut self,
        platform: &str,
        user_id: &str,
        amount: i64,
        source: TxSource,
        source_id: &str,
        description: &str,
        commission_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<PostOutcome, StoreError> {
        let tx = self.conn().transaction()?;
        let duplicate = already_posted(&tx, platform, source, source_id)?;
        if !duplicate {
            let mut bal = read_balance(&tx, platform, user_id)?;
            let before = bal.available;
            bal.available += amount;
            if matches!(
                source,
                TxSource::Commission | TxSource::Bonus | TxSource::PoolBonus
            ) {
                bal.earned += amount;
            }
            append_tx(
                &tx,
                platform,
                user_id,
                TxDirection::Credit,
                amount,
                before,
                bal.available,
                source,
                source_id,
                description,
                now,
            )?;
            write_balance(&tx, platform, user_id, bal, now)?;
        }
        // Runs on duplicates too: an approved row whose credit already
        // landed still has to converge to paid.
        if let Some(key) = commission_key {
            tx.execute(
                "UPDATE commissions SET status = 'paid' WHERE key = ?1 AND status = 'approved'",
                params![key],
            )?;
        }
        tx.commit()?;
        Ok(if duplicate {
            PostOutcome::Duplicate
        } else {
            PostOutcome::Posted
        })
    }

    // ── Withdrawals ─────────────────────────────────────────────────

    /// Record a new request and hold its gross amount: available drops,
    /// pending rises, and a debit lands in the log under the request id.
    pub fn request_withdrawal(
        &mut self,
        platform: &str,
        w: &Withdrawal,
    ) -> Result<(), StoreError> {
        let tx = self.conn().transaction()?;
        let mut bal = read_balance(&tx, platform, &w.user_id)?;
        let before = bal.available;
        bal.available -= w.amount;
        bal.pending += w.amount;
        append_tx(
            &tx,
            platform,
            &w.user_id,
            TxDirection::Debit,
            w.amount,
            before,
            bal.available,
            TxSource::Withdrawal,
            &w.id,
            "withdrawal hold",
            w.requested_at,
        )?;
        write_balance(&tx, platform, &w.user_id, bal, w.requested_at)?;
        insert_withdrawal_row(&tx, platform, w)?;
        tx.commit()?;
        Ok(())
    }

    /// Persist decision fields without moving money (approve, processing).
    pub fn update_withdrawal(&self, platform: &str, w: &Withdrawal) -> Result<(), StoreError> {
        update_withdrawal_row(self.conn_ref(), platform, w)?;
        Ok(())
    }

    /// Unwind a rejected or cancelled request: the held amount returns to
    /// available via a refund credit keyed on the request id.
    pub fn unwind_withdrawal(
        &mut self,
        platform: &str,
        w: &Withdrawal,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let tx = self.conn().transaction()?;
        if !already_posted(&tx, platform, TxSource::Refund, &w.id)? {
            let mut bal = read_balance(&tx, platform, &w.user_id)?;
            let before = bal.available;
            bal.available += w.amount;
            bal.pending -= w.amount;
            append_tx(
                &tx,
                platform,
                &w.user_id,
                TxDirection::Credit,
                w.amount,
                before,
                bal.available,
                TxSource::Refund,
                &w.id,
                "withdrawal hold released",
                now,
            )?;
            write_balance(&tx, platform, &w.user_id, bal, now)?;
        }
        update_withdrawal_row(&tx, platform, w)?;
        tx.commit()?;
        Ok(())
    }

    /// Finalize a paid-out request: the hold leaves pending for good and
    /// total_withdrawn grows. Available already moved at request time.
    pub fn complete_withdrawal(
        &mut self,
        platform: &str,
        w: &Withdrawal,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let tx = self.conn().transaction()?;
        let mut bal = read_balance(&tx, platform, &w.user_id)?;
        bal.pending -= w.amount;
        bal.withdrawn += w.amount;
        write_balance(&tx, platform, &w.user_id, bal, now)?;
        update_withdrawal_row(&tx, platform, w)?;
        tx.commit()?;
        Ok(())
    }

    pub fn withdrawal(
        &self,
        platform: &str,
        id: &str,
    ) -> Result<Option<Withdrawal>, StoreError> {
        let row = self
            .conn_ref()
            .query_row(
                "SELECT id, user_id, amount, fee, net_amount, currency, destination, status,
                        requested_at, decided_at, decided_by, rejected_reason, completed_at,
                        provider_ref
                 FROM withdrawals WHERE platform = ?1 AND id = ?2",
                params![platform, id],
                map_withdrawal,
            )
            .optional()?;
        Ok(row)
    }

    pub fn withdrawals_for(
        &self,
        platform: &str,
        user_id: Option<&str>,
        open_only: bool,
    ) -> Result<Vec<Withdrawal>, StoreError> {
        let mut sql = String::from(
            "SELECT id, user_id, amount, fee, net_amount, currency, destination, status,
                    requested_at, decided_at, decided_by, rejected_reason, completed_at,
                    provider_ref
             FROM withdrawals WHERE platform = ?1",
        );
        if user_id.is_some() {
            sql.push_str(" AND user_id = ?2");
        }
        if open_only {
            sql.push_str(" AND status IN ('requested', 'approved', 'processing')");
        }
        sql.push_str(" ORDER BY requested_at, id");

        let mut stmt = self.conn_ref().prepare(&sql)?;
        let rows = match user_id {
            Some(user) => stmt
                .query_map(params![platform, user], map_withdrawal)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map(params![platform], map_withdrawal)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(rows)
    }

    // ── Balances and history ────────────────────────────────────────

    pub fn balance_for(
        &self,
        platform: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<WalletBalance, StoreError> {
        let row = self
            .conn_ref()
            .query_row(
                "SELECT available, pending, total_earned, total_withdrawn, updated_at
                 FROM wallet_balances WHERE platform = ?1 AND user_id = ?2",
                params![platform, user_id],
                |row| {
                    Ok(WalletBalance {
                        user_id: user_id.to_string(),
                        available: row.get(0)?,
                        pending: row.get(1)?,
                        total_earned: row.get(2)?,
                        total_withdrawn: row.get(3)?,
                        updated_at: parse_ts(&row.get::<_, String>(4)?),
                    })
                },
            )
            .optional()?;
        Ok(row.unwrap_or_else(|| WalletBalance::empty(user_id, now)))
    }

    pub fn transactions_for(
        &self,
        platform: &str,
        user_id: &str,
    ) -> Result<Vec<WalletTransaction>, StoreError> {
        let mut stmt = self.conn_ref().prepare(
            "SELECT id, direction, amount, balance_before, balance_after, source_type,
                    source_id, description, created_at
             FROM wallet_transactions
             WHERE platform = ?1 AND user_id = ?2 ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map(params![platform, user_id], |row| {
                Ok(WalletTransaction {
                    id: row.get(0)?,
                    user_id: user_id.to_string(),
                    direction: TxDirection::parse(&row.get::<_, String>(1)?)
                        .unwrap_or(TxDirection::Credit),
                    amount: row.get(2)?,
                    balance_before: row.get(3)?,
                    balance_after: row.get(4)?,
                    source_type: TxSource::parse(&row.get::<_, String>(5)?)
                        .unwrap_or(TxSource::Adjustment),
                    source_id: row.get(6)?,
                    description: row.get(7)?,
                    created_at: parse_ts(&row.get::<_, String>(8)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Refold the log and open holds per member and compare against the
    /// cached balances. Returns one row per disagreeing field, sorted.
    pub fn reconcile_balances(&self, platform: &str) -> Result<Vec<BalanceDrift>, StoreError> {
        let mut derived: BTreeMap<UserId, DerivedBalance> = BTreeMap::new();

        {
            let mut stmt = self.conn_ref().prepare(
                "SELECT user_id, direction, source_type, COALESCE(SUM(amount), 0)
                 FROM wallet_transactions WHERE platform = ?1
                 GROUP BY user_id, direction, source_type",
            )?;
            let rows = stmt.query_map(params![platform], |row| {
                Ok((
                    row.get::<_, UserId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?;
            for row in rows {
                let (user, direction, source, sum) = row?;
                let entry = derived.entry(user).or_default();
                match direction.as_str() {
                    "credit" => {
                        entry.available += sum;
                        if matches!(source.as_str(), "commission" | "bonus" | "pool_bonus") {
                            entry.earned += sum;
                        }
                    }
                    _ => entry.available -= sum,
                }
            }
        }
        {
            let mut stmt = self.conn_ref().prepare(
                "SELECT user_id, status, COALESCE(SUM(amount), 0)
                 FROM withdrawals WHERE platform = ?1 GROUP BY user_id, status",
            )?;
            let rows = stmt.query_map(params![platform], |row| {
                Ok((
                    row.get::<_, UserId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;
            for row in rows {
                let (user, status, sum) = row?;
                let entry = derived.entry(user).or_default();
                match WithdrawalStatus::parse(&status) {
                    Some(s) if s.is_open() => entry.pending += sum,
                    Some(WithdrawalStatus::Completed) => entry.withdrawn += sum,
                    _ => {}
                }
            }
        }

        let mut cached: HashMap<UserId, DerivedBalance> = HashMap::new();
        {
            let mut stmt = self.conn_ref().prepare(
                "SELECT user_id, available, pending, total_earned, total_withdrawn
                 FROM wallet_balances WHERE platform = ?1",
            )?;
            let rows = stmt.query_map(params![platform], |row| {
                Ok((
                    row.get::<_, UserId>(0)?,
                    DerivedBalance {
                        available: row.get(1)?,
                        pending: row.get(2)?,
                        earned: row.get(3)?,
                        withdrawn: row.get(4)?,
                    },
                ))
            })?;
            for row in rows {
                let (user, bal) = row?;
                derived.entry(user.clone()).or_default();
                cached.insert(user, bal);
            }
        }

        let mut drifts = Vec::new();
        for (user, want) in &derived {
            let have = cached.get(user).copied().unwrap_or_default();
            let checks = [
                ("available", have.available, want.available),
                ("pending", have.pending, want.pending),
                ("total_earned", have.earned, want.earned),
                ("total_withdrawn", have.withdrawn, want.withdrawn),
            ];
            for (field, cached_value, derived_value) in checks {
                if cached_value != derived_value {
                    drifts.push(BalanceDrift {
                        user_id: user.clone(),
                        field,
                        cached: cached_value,
                        derived: derived_value,
                    });
                }
            }
        }
        Ok(drifts)
    }
}

// ── Row helpers ─────────────────────────────────────────────────────

fn already_posted(
    conn: &Connection,
    platform: &str,
    source: TxSource,
    source_id: &str,
) -> rusqlite::Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM wallet_transactions
             WHERE platform = ?1 AND source_type = ?2 AND source_id = ?3",
            params![platform, source.as_str(), source_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

#[allow(clippy::too_many_arguments)]
fn append_tx(
    conn: &Connection,
    platform: &str,
    user_id: &str,
    direction: TxDirection,
    amount: i64,
    before: i64,
    after: i64,
    source: TxSource,
    source_id: &str,
    description: &str,
    at: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO wallet_transactions
         (id, platform, user_id, direction, amount, balance_before, balance_after,
          source_type, source_id, description, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            Uuid::new_v4().to_string(),
            platform,
            user_id,
            direction.as_str(),
            amount,
            before,
            after,
            source.as_str(),
            source_id,
            description,
            at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn read_balance(
    conn: &Connection,
    platform: &str,
    user_id: &str,
) -> rusqlite::Result<DerivedBalance> {
    let row = conn
        .query_row(
            "SELECT available, pending, total_earned, total_withdrawn
             FROM wallet_balances WHERE platform = ?1 AND user_id = ?2",
            params![platform, user_id],
            |row| {
                Ok(DerivedBalance {
                    available: row.get(0)?,
                    pending: row.get(1)?,
                    earned: row.get(2)?,
                    withdrawn: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row.unwrap_or_default())
}

fn write_balance(
    conn: &Connection,
    platform: &str,
    user_id: &str,
    bal: DerivedBalance,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO wallet_balances
         (platform, user_id, available, pending, total_earned, total_withdrawn, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(platform, user_id) DO UPDATE
         SET available = ?3, pending = ?4, total_earned = ?5, total_withdrawn = ?6,
             updated_at = ?7",
        params![
            platform,
            user_id,
            bal.available,
            bal.pending,
            bal.earned,
            bal.withdrawn,
            now.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn insert_withdrawal_row(
    conn: &Connection,
    platform: &str,
    w: &Withdrawal,
) -> Result<(), StoreError> {
    let destination = serde_json::to_string(&w.destination)?;
    conn.execute(
        "INSERT INTO withdrawals
         (id, platform, user_id, amount, fee, net_amount, currency, destination, status,
          requested_at, decided_at, decided_by, rejected_reason, completed_at, provider_ref)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            w.id,
            platform,
            w.user_id,
            w.amount,
            w.fee,
            w.net_amount,
            w.currency,
            destination,
            w.status.as_str(),
            w.requested_at.to_rfc3339(),
            w.decided_at.map(|t| t.to_rfc3339()),
            w.decided_by,
            w.rejected_reason,
            w.completed_at.map(|t| t.to_rfc3339()),
            w.provider_ref,
        ],
    )?;
    Ok(())
}

fn update_withdrawal_row(
    conn: &Connection,
    platform: &str,
    w: &Withdrawal,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE withdrawals
         SET status = ?3, decided_at = ?4, decided_by = ?5, rejected_reason = ?6,
             completed_at = ?7, provider_ref = ?8
         WHERE platform = ?1 AND id = ?2",
        params![
            platform,
            w.id,
            w.status.as_str(),
            w.decided_at.map(|t| t.to_rfc3339()),
            w.decided_by,
            w.rejected_reason,
            w.completed_at.map(|t| t.to_rfc3339()),
            w.provider_ref,
        ],
    )?;
    Ok(())
}

fn map_withdrawal(row: &rusqlite::Row<'_>) -> rusqlite::Result<Withdrawal> {
    let destination: String = row.get(6)?;
    let destination: WithdrawalDestination =
        serde_json::from_str(&destination).unwrap_or(WithdrawalDestination {
            method: crate::model::wallet::PayoutMethod::InternalWallet,
            account: None,
            holder: None,
            network: None,
        });
    Ok(Withdrawal {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        fee: row.get(3)?,
        net_amount: row.get(4)?,
        currency: row.get(5)?,
        destination,
        status: WithdrawalStatus::parse(&row.get::<_, String>(7)?)
            .unwrap_or(WithdrawalStatus::Cancelled),
        requested_at: parse_ts(&row.get::<_, String>(8)?),
        decided_at: row.get::<_, Option<String>>(9)?.map(|s| parse_ts(&s)),
        decided_by: row.get(10)?,
        rejected_reason: row.get(11)?,
        completed_at: row.get::<_, Option<String>>(12)?.map(|s| parse_ts(&s)),
        provider_ref: row.get(13)?,
    })
}
