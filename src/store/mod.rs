//! SQLite persistence.
//!
//! Single-writer by design: the engine opens one connection per process
//! and serializes through it. Money-bearing writes happen inside explicit
//! transactions; everything period-scoped keys on `(platform, period)` so
//! reruns diff against prior state instead of appending blindly.

pub mod ledger;

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use thiserror::Error;

use crate::model::commission::{BinaryMatch, Commission, CommissionStatus, CommissionType};
use crate::model::node::{LegVolumes, UserId};
use crate::model::plan::RankHistoryEntry;

/// Failures the engine branches on; everything else wraps through anyhow
/// at the call site.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another run holds the advisory lock for this platform and period.
    #[error("period {period} on {platform} is already being calculated")]
    PeriodLocked { platform: String, period: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    /// Withdrawal destinations are stored as JSON blobs.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// How a period run ended, as recorded in the lock table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunRecord {
    pub platform: String,
    pub period: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Outcome of a recompute-and-diff commission sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub inserted: u32,
    pub updated: u32,
    pub cancelled: u32,
    pub unchanged: u32,
    /// Approved or paid rows the diff refused to touch.
    pub protected: u32,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("creating db directory")?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening sqlite at {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        migrate(&conn)?;
        Ok(Store { conn })
    }

    /// In-memory store for tests and simulations.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory sqlite")?;
        migrate(&conn)?;
        Ok(Store { conn })
    }

    // ── Advisory period lock ────────────────────────────────────────

    /// Take the run lock for `(platform, period)`. A concurrent run holding
    /// it is rejected, not queued; a finished or failed run is superseded.
    pub fn try_begin_run(
        &mut self,
        platform: &str,
        period: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM period_runs WHERE platform = ?1 AND period = ?2",
                params![platform, period],
                |row| row.get(0),
            )
            .ok();
        if current.as_deref() == Some("running") {
            return Err(StoreError::PeriodLocked {
                platform: platform.to_string(),
                period: period.to_string(),
            });
        }
        tx.execute(
            "INSERT INTO period_runs (platform, period, status, started_at, finished_at, error)
             VALUES (?1, ?2, 'running', ?3, NULL, NULL)
             ON CONFLICT(platform, period) DO UPDATE
             SET status = 'running', started_at = ?3, finished_at = NULL, error = NULL",
            params![platform, period, now.to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn finish_run(
        &self,
        platform: &str,
        period: &str,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let status = if error.is_some() { "failed" } else { "completed" };
        self.conn.execute(
            "UPDATE period_runs SET status = ?3, finished_at = ?4, error = ?5
             WHERE platform = ?1 AND period = ?2",
            params![platform, period, status, now.to_rfc3339(), error],
        )?;
        Ok(())
    }

    pub fn run_record(&self, platform: &str, period: &str) -> Result<Option<RunRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                "SELECT status, started_at, finished_at, error FROM period_runs
                 WHERE platform = ?1 AND period = ?2",
                params![platform, period],
                |row| {
                    Ok(RunRecord {
                        platform: platform.to_string(),
                        period: period.to_string(),
                        status: RunStatus::parse(&row.get::<_, String>(0)?)
                            .unwrap_or(RunStatus::Failed),
                        started_at: parse_ts(&row.get::<_, String>(1)?),
                        finished_at: row.get::<_, Option<String>>(2)?.map(|s| parse_ts(&s)),
                        error: row.get(3)?,
                    })
                },
            )
            .ok();
        Ok(record)
    }

    // ── Commissions ─────────────────────────────────────────────────

    /// Reconcile freshly computed rows against what the period already
    /// has. Pending rows are updated or cancelled to match; approved and
    /// paid rows are never altered, only counted.
    pub fn sync_commissions(
        &mut self,
        platform: &str,
        period: &str,
        rows: &[Commission],
    ) -> Result<SyncReport, StoreError> {
        let mut report = SyncReport::default();
        let tx = self.conn.transaction()?;

        let mut existing: HashMap<String, (i64, String)> = HashMap::new();
        {
            let mut stmt = tx.prepare(
                "SELECT key, amount, status FROM commissions
                 WHERE platform = ?1 AND period = ?2",
            )?;
            let found = stmt.query_map(params![platform, period], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    (row.get::<_, i64>(1)?, row.get::<_, String>(2)?),
                ))
            })?;
            for item in found {
                let (key, value) = item?;
                existing.insert(key, value);
            }
        }

        let mut seen: Vec<String> = Vec::with_capacity(rows.len());
        for row in rows {
            let key = row.key();
            seen.push(key.clone());
            match existing.get(&key) {
                None => {
                    tx.execute(
                        "INSERT INTO commissions
                         (key, platform, user_id, commission_type, amount, level, percentage,
                          volume, source_order_id, source_user_id, status, period,
                          period_start, period_end, calculated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'pending', ?11, ?12, ?13, ?14)",
                        params![
                            key,
                            platform,
                            row.user_id,
                            row.commission_type.as_str(),
                            row.amount,
                            row.level,
                            row.percentage,
                            row.volume,
                            row.source_order_id,
                            row.source_user_id,
                            row.period,
                            row.period_start.to_rfc3339(),
                            row.period_end.to_rfc3339(),
                            row.calculated_at.to_rfc3339(),
                        ],
                    )?;
                    report.inserted += 1;
                }
                Some((amount, status)) if status == "pending" || status == "cancelled" => {
                    if *amount == row.amount && status == "pending" {
                        report.unchanged += 1;
                    } else {
                        tx.execute(
                            "UPDATE commissions
                             SET amount = ?2, level = ?3, percentage = ?4, volume = ?5,
                                 source_order_id = ?6, source_user_id = ?7,
                                 status = 'pending', calculated_at = ?8
                             WHERE key = ?1",
                            params![
                                key,
                                row.amount,
                                row.level,
                                row.percentage,
                                row.volume,
                                row.source_order_id,
                                row.source_user_id,
                                row.calculated_at.to_rfc3339(),
                            ],
                        )?;
                        report.updated += 1;
                    }
                }
                Some(_) => report.protected += 1,
            }
        }

        // Pending rows the recompute no longer produces are cancelled.
        for (key, (_, status)) in &existing {
            if seen.contains(key) {
                continue;
            }
            match status.as_str() {
                "pending" => {
                    tx.execute(
                        "UPDATE commissions SET status = 'cancelled' WHERE key = ?1",
                        params![key],
                    )?;
                    report.cancelled += 1;
                }
                "cancelled" => {}
                _ => report.protected += 1,
            }
        }

        tx.commit()?;
        Ok(report)
    }

    /// Promote every pending row of the period. Runs only after the whole
    /// calculation pass succeeded.
    pub fn approve_pending(&self, platform: &str, period: &str) -> Result<u32, StoreError> {
        let n = self.conn.execute(
            "UPDATE commissions SET status = 'approved'
             WHERE platform = ?1 AND period = ?2 AND status = 'pending'",
            params![platform, period],
        )?;
        Ok(n as u32)
    }

    pub fn commissions_for_period(
        &self,
        platform: &str,
        period: &str,
        status: Option<CommissionStatus>,
    ) -> Result<Vec<Commission>, StoreError> {
        let mut sql = String::from(
            "SELECT user_id, commission_type, amount, level, percentage, volume,
                    source_order_id, source_user_id, status, period, period_start,
                    period_end, calculated_at
             FROM commissions WHERE platform = ?1 AND period = ?2",
        );
        if status.is_some() {
            sql.push_str(" AND status = ?3");
        }
        sql.push_str(" ORDER BY key");

        let mut stmt = self.conn.prepare(&sql)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<Commission> {
            Ok(Commission {
                user_id: row.get(0)?,
                commission_type: CommissionType::parse(&row.get::<_, String>(1)?)
                    .unwrap_or(CommissionType::DirectSale),
                amount: row.get(2)?,
                level: row.get(3)?,
                percentage: row.get(4)?,
                volume: row.get(5)?,
                source_order_id: row.get(6)?,
                source_user_id: row.get(7)?,
                status: CommissionStatus::parse(&row.get::<_, String>(8)?)
                    .unwrap_or(CommissionStatus::Pending),
                period: row.get(9)?,
                period_start: parse_ts(&row.get::<_, String>(10)?),
                period_end: parse_ts(&row.get::<_, String>(11)?),
                calculated_at: parse_ts(&row.get::<_, String>(12)?),
            })
        };
        let rows = match status {
            Some(status) => stmt
                .query_map(params![platform, period, status.as_str()], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map(params![platform, period], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(rows)
    }

    // ── Leg matches ─────────────────────────────────────────────────

    /// Replace the period's match rows wholesale; they are pure outputs of
    /// the calculation and carry no lifecycle.
    pub fn save_matches(
        &mut self,
        platform: &str,
        rows: &[BinaryMatch],
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        for row in rows {
            tx.execute(
                "INSERT OR REPLACE INTO binary_matches
                 (platform, user_id, period, left_volume, right_volume, center_volume,
                  matched_volume, carry_left, carry_right, carry_center, rate, amount,
                  calculated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    platform,
                    row.user_id,
                    row.period,
                    row.left_volume,
                    row.right_volume,
                    row.center_volume,
                    row.matched_volume,
                    row.carry_left,
                    row.carry_right,
                    row.carry_center,
                    row.rate,
                    row.amount,
                    row.calculated_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Carry-over volumes recorded by the named period, keyed by member.
    pub fn carry_for(
        &self,
        platform: &str,
        period: &str,
    ) -> Result<HashMap<UserId, LegVolumes>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, carry_left, carry_right, carry_center
             FROM binary_matches WHERE platform = ?1 AND period = ?2",
        )?;
        let rows = stmt.query_map(params![platform, period], |row| {
            Ok((
                row.get::<_, UserId>(0)?,
                LegVolumes {
                    left: row.get(1)?,
                    right: row.get(2)?,
                    center: row.get(3)?,
                },
            ))
        })?;
        let mut out = HashMap::new();
        for row in rows {
            let (user_id, carry) = row?;
            if carry.total() != 0 {
                out.insert(user_id, carry);
            }
        }
        Ok(out)
    }

    pub fn matches_for_period(
        &self,
        platform: &str,
        period: &str,
    ) -> Result<Vec<BinaryMatch>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, left_volume, right_volume, center_volume, matched_volume,
                    carry_left, carry_right, carry_center, rate, amount, calculated_at
             FROM binary_matches WHERE platform = ?1 AND period = ?2 ORDER BY user_id",
        )?;
        let rows = stmt
            .query_map(params![platform, period], |row| {
                Ok(BinaryMatch {
                    user_id: row.get(0)?,
                    period: period.to_string(),
                    left_volume: row.get(1)?,
                    right_volume: row.get(2)?,
                    center_volume: row.get(3)?,
                    matched_volume: row.get(4)?,
                    carry_left: row.get(5)?,
                    carry_right: row.get(6)?,
                    carry_center: row.get(7)?,
                    rate: row.get(8)?,
                    amount: row.get(9)?,
                    calculated_at: parse_ts(&row.get::<_, String>(10)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Rank history ────────────────────────────────────────────────

    /// Append rank changes, closing each member's previous open entry.
    pub fn append_rank_history(
        &mut self,
        platform: &str,
        entries: &[RankHistoryEntry],
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        for entry in entries {
            tx.execute(
                "UPDATE rank_history SET maintained_until = ?3
                 WHERE platform = ?1 AND user_id = ?2 AND maintained_until IS NULL",
                params![platform, entry.user_id, entry.achieved_at.to_rfc3339()],
            )?;
            tx.execute(
                "INSERT INTO rank_history
                 (platform, user_id, rank_id, rank_level, achieved_at, maintained_until,
                  is_meritorious)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)",
                params![
                    platform,
                    entry.user_id,
                    entry.rank_id,
                    entry.rank_level,
                    entry.achieved_at.to_rfc3339(),
                    entry.is_meritorious,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn rank_history_for(
        &self,
        platform: &str,
        user_id: &str,
    ) -> Result<Vec<RankHistoryEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT rank_id, rank_level, achieved_at, maintained_until, is_meritorious
             FROM rank_history WHERE platform = ?1 AND user_id = ?2 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![platform, user_id], |row| {
                Ok(RankHistoryEntry {
                    user_id: user_id.to_string(),
                    rank_id: row.get(0)?,
                    rank_level: row.get(1)?,
                    achieved_at: parse_ts(&row.get::<_, String>(2)?),
                    maintained_until: row.get::<_, Option<String>>(3)?.map(|s| parse_ts(&s)),
                    is_meritorious: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub(crate) fn conn(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub(crate) fn conn_ref(&self) -> &Connection {
        &self.conn
    }
}

/// Timestamps are written by us in RFC 3339; a row that fails to parse
/// maps to the epoch rather than poisoning a whole query.
fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS period_runs (
            platform     TEXT NOT NULL,
            period       TEXT NOT NULL,
            status       TEXT NOT NULL,
            started_at   TEXT NOT NULL,
            finished_at  TEXT,
            error        TEXT,
            PRIMARY KEY (platform, period)
        );

        CREATE TABLE IF NOT EXISTS commissions (
            key             TEXT PRIMARY KEY,
            platform        TEXT NOT NULL,
            user_id         TEXT NOT NULL,
            commission_type TEXT NOT NULL,
            amount          INTEGER NOT NULL,
            level           INTEGER,
            percentage      REAL NOT NULL,
            volume          INTEGER NOT NULL,
            source_order_id TEXT,
            source_user_id  TEXT,
            status          TEXT NOT NULL,
            period          TEXT NOT NULL,
            period_start    TEXT NOT NULL,
            period_end      TEXT NOT NULL,
            calculated_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_commissions_period
            ON commissions(platform, period, status);
        CREATE INDEX IF NOT EXISTS idx_commissions_user
            ON commissions(platform, user_id, period);

        CREATE TABLE IF NOT EXISTS binary_matches (
            platform       TEXT NOT NULL,
            user_id        TEXT NOT NULL,
            period         TEXT NOT NULL,
            left_volume    INTEGER NOT NULL,
            right_volume   INTEGER NOT NULL,
            center_volume  INTEGER NOT NULL,
            matched_volume INTEGER NOT NULL,
            carry_left     INTEGER NOT NULL,
            carry_right    INTEGER NOT NULL,
            carry_center   INTEGER NOT NULL,
            rate           REAL NOT NULL,
            amount         INTEGER NOT NULL,
            calculated_at  TEXT NOT NULL,
            PRIMARY KEY (platform, user_id, period)
        );
        CREATE INDEX IF NOT EXISTS idx_matches_period
            ON binary_matches(platform, period);

        CREATE TABLE IF NOT EXISTS rank_history (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            platform         TEXT NOT NULL,
            user_id          TEXT NOT NULL,
            rank_id          TEXT NOT NULL,
            rank_level       INTEGER NOT NULL,
            achieved_at      TEXT NOT NULL,
            maintained_until TEXT,
            is_meritorious   INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_rank_history_user
            ON rank_history(platform, user_id);

        CREATE TABLE IF NOT EXISTS wallet_transactions (
            id             TEXT PRIMARY KEY,
            platform       TEXT NOT NULL,
            user_id        TEXT NOT NULL,
            direction      TEXT NOT NULL,
            amount         INTEGER NOT NULL,
            balance_before INTEGER NOT NULL,
            balance_after  INTEGER NOT NULL,
            source_type    TEXT NOT NULL,
            source_id      TEXT NOT NULL,
            description    TEXT NOT NULL,
            created_at     TEXT NOT NULL,
            UNIQUE (platform, source_type, source_id)
        );
        CREATE INDEX IF NOT EXISTS idx_wallet_tx_user
            ON wallet_transactions(platform, user_id, created_at);

        CREATE TABLE IF NOT EXISTS wallet_balances (
            platform        TEXT NOT NULL,
            user_id         TEXT NOT NULL,
            available       INTEGER NOT NULL,
            pending         INTEGER NOT NULL,
            total_earned    INTEGER NOT NULL,
            total_withdrawn INTEGER NOT NULL,
            updated_at      TEXT NOT NULL,
            PRIMARY KEY (platform, user_id)
        );

        CREATE TABLE IF NOT EXISTS withdrawals (
            id              TEXT PRIMARY KEY,
            platform        TEXT NOT NULL,
            user_id         TEXT NOT NULL,
            amount          INTEGER NOT NULL,
            fee             INTEGER NOT NULL,
            net_amount      INTEGER NOT NULL,
            currency        TEXT NOT NULL,
            destination     TEXT NOT NULL,
            status          TEXT NOT NULL,
            requested_at    TEXT NOT NULL,
            decided_at      TEXT,
            decided_by      TEXT,
            rejected_reason TEXT,
            completed_at    TEXT,
            provider_ref    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_withdrawals_user
            ON withdrawals(platform, user_id, status);
        ",
    )?;
    Ok(())
}
