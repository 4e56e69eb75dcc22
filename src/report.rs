//! Run summaries and network statistics.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::engine::aggregate::AggregateSummary;
use crate::engine::ledger::PostingReport;
use crate::graph::NetworkGraph;
use crate::model::commission::{Commission, CommissionType};
use crate::store::{Store, SyncReport};

// ── Commission summary ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeTotal {
    pub count: u32,
    pub amount: i64,
}

/// Totals over one period's commission rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommissionSummary {
    pub by_type: BTreeMap<&'static str, TypeTotal>,
    /// Unilevel rows broken down by ancestor depth.
    pub by_level: BTreeMap<u32, TypeTotal>,
    pub total_count: u32,
    pub total_amount: i64,
}

pub fn summarize(commissions: &[Commission]) -> CommissionSummary {
    let mut summary = CommissionSummary::default();
    for c in commissions {
        let slot = summary.by_type.entry(c.commission_type.as_str()).or_default();
        slot.count += 1;
        slot.amount += c.amount;
        if c.commission_type == CommissionType::Unilevel {
            if let Some(level) = c.level {
                let slot = summary.by_level.entry(level).or_default();
                slot.count += 1;
                slot.amount += c.amount;
            }
        }
        summary.total_count += 1;
        summary.total_amount += c.amount;
    }
    summary
}

// ── Network statistics ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkStats {
    pub total_members: u32,
    pub active_members: u32,
    pub roots: u32,
    /// Deepest placement level.
    pub max_depth: u32,
    /// Sum of personal volume across the graph.
    pub total_volume: i64,
    pub total_sales: i64,
    pub by_rank: BTreeMap<String, u32>,
}

pub fn network_stats(graph: &NetworkGraph) -> NetworkStats {
    let mut stats = NetworkStats {
        roots: graph.roots().len() as u32,
        ..NetworkStats::default()
    };
    for node in graph.iter() {
        stats.total_members += 1;
        if node.is_active {
            stats.active_members += 1;
        }
        stats.max_depth = stats.max_depth.max(node.level);
        stats.total_volume += node.personal_volume;
        stats.total_sales += node.personal_sales;
        *stats.by_rank.entry(node.rank.clone()).or_default() += 1;
    }
    stats
}

impl NetworkStats {
    pub fn print(&self) {
        println!("  members : {} total, {} active, {} roots", self.total_members, self.active_members, self.roots);
        println!("  depth   : {}", self.max_depth);
        println!("  volume  : {} BV, {} sales", self.total_volume, self.total_sales);
        for (rank, count) in &self.by_rank {
            println!("    {rank:<14} {count:>6}");
        }
    }
}

// ── Period report ───────────────────────────────────────────────────

/// Everything one period run did, for operators and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodReport {
    pub platform: String,
    pub period: String,
    pub orders: AggregateSummary,
    pub commissions: CommissionSummary,
    /// Members with leg activity this period.
    pub matches: u32,
    /// Members carrying unmatched volume into the next period.
    pub carrying: u32,
    pub promotions: u32,
    pub downgrades: u32,
    pub rank_holds: u32,
    pub bonus_awards: u32,
    pub pools_run: u32,
    pub pool_distributed: i64,
    pub sync: SyncReport,
    pub approved: u32,
    pub posting: PostingReport,
    pub calculated_at: DateTime<Utc>,
}

impl PeriodReport {
    pub fn print(&self) {
        println!();
        println!("── {} period {} ──", self.platform, self.period);
        println!(
            "  orders  : {} credited, {} orphaned, {} outside window",
            self.orders.credited_orders, self.orders.orphan_orders, self.orders.out_of_window
        );
        println!(
            "  volume  : {} BV, {} sales company-wide",
            self.orders.company_volume, self.orders.company_sales
        );
        println!(
            "  earned  : {} rows, {} minor units",
            self.commissions.total_count, self.commissions.total_amount
        );
        for (name, t) in &self.commissions.by_type {
            println!("    {name:<14} {:>5} x {:>12}", t.count, t.amount);
        }
        println!(
            "  matches : {} members, {} carrying volume forward",
            self.matches, self.carrying
        );
        println!(
            "  ranks   : {} promoted, {} downgraded, {} held",
            self.promotions, self.downgrades, self.rank_holds
        );
        println!(
            "  bonuses : {} awards, {} pools, {} distributed",
            self.bonus_awards, self.pools_run, self.pool_distributed
        );
        println!(
            "  sync    : {} new, {} updated, {} cancelled, {} unchanged, {} protected",
            self.sync.inserted,
            self.sync.updated,
            self.sync.cancelled,
            self.sync.unchanged,
            self.sync.protected
        );
        println!(
            "  ledger  : {} approved, {} posted, {} duplicates, {} credited",
            self.approved, self.posting.posted, self.posting.duplicates, self.posting.credited
        );
    }
}

// ── CLI entries ─────────────────────────────────────────────────────

/// The `stats` subcommand: shape of a stored network file.
pub fn run_stats(network_path: &Path) -> anyhow::Result<()> {
    let graph = NetworkGraph::load(network_path)?;
    println!("── {} network ──", graph.network_type());
    network_stats(&graph).print();
    Ok(())
}

/// The `summary` subcommand: stored commission rows for one period.
pub fn run_summary(db_path: &Path, platform: &str, period: &str) -> anyhow::Result<()> {
    let store = Store::open(db_path)?;
    let commissions = store.commissions_for_period(platform, period, None)?;
    if commissions.is_empty() {
        println!("No commissions stored for {platform} period {period}.");
        return Ok(());
    }

    let summary = summarize(&commissions);
    let mut by_status: BTreeMap<&'static str, u32> = BTreeMap::new();
    for c in &commissions {
        *by_status.entry(c.status.as_str()).or_default() += 1;
    }

    println!("── {platform} period {period} ──");
    println!(
        "  earned  : {} rows, {} minor units",
        summary.total_count, summary.total_amount
    );
    for (name, t) in &summary.by_type {
        println!("    {name:<14} {:>5} x {:>12}", t.count, t.amount);
    }
    if !summary.by_level.is_empty() {
        println!("  levels  :");
        for (level, t) in &summary.by_level {
            println!("    level {level:<8} {:>5} x {:>12}", t.count, t.amount);
        }
    }
    let statuses = by_status
        .iter()
        .map(|(status, count)| format!("{count} {status}"))
        .collect::<Vec<_>>()
        .join(", ");
    println!("  status  : {statuses}");
    Ok(())
}

/// The `reconcile` subcommand: recompute wallet balances from the ledger
/// and flag cached figures that drifted.
pub fn run_reconcile(db_path: &Path, platform: &str) -> anyhow::Result<()> {
    let store = Store::open(db_path)?;
    let drifts = store.reconcile_balances(platform)?;
    if drifts.is_empty() {
        println!("[ledger] {platform} balances reconcile clean");
        return Ok(());
    }
    for drift in &drifts {
        eprintln!(
            "[ledger] {} {}: cached {} != derived {}",
            drift.user_id, drift.field, drift.cached, drift.derived
        );
    }
    anyhow::bail!("{} balance field(s) drifted on {platform}", drifts.len())
}
