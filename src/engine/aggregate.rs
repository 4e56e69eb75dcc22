//! Period volume aggregation.
//!
//! One bottom-up pass per tree turns raw orders into per-node figures:
//! personal and team volume, per-leg volume, sales, and activity counts.
//! Everything here is assignment, never accumulation, so running the pass
//! twice over the same orders yields identical figures.

use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

use crate::graph::NetworkGraph;
use crate::model::node::{LegVolumes, UserId};
use crate::model::order::Order;
use crate::model::period::Period;

/// Company-wide totals for the period, used for pool funding and reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateSummary {
    /// Orders inside the period window credited to a known member.
    pub credited_orders: u32,
    /// Orders whose buyer is not in the graph. Skipped, never dropped
    /// silently.
    pub orphan_orders: u32,
    /// Orders outside the period window (source overfetch), skipped.
    pub out_of_window: u32,
    /// Sum of credited business volume.
    pub company_volume: i64,
    /// Sum of credited cash totals, minor units.
    pub company_sales: i64,
    pub active_members: u32,
    pub total_members: u32,
}

/// Per-node figures produced by one tree rollup.
struct Rollup {
    user_id: UserId,
    team_volume: i64,
    team_sales: i64,
    leg_volumes: LegVolumes,
    total_downline: u32,
    active_downline: u32,
}

/// Aggregate one period of orders onto the graph. Figures start from zero
/// on every call; inactive members accrue volume like anyone else and their
/// volume flows upward regardless.
pub fn aggregate(graph: &mut NetworkGraph, orders: &[Order], period: &Period) -> AggregateSummary {
    let mut summary = AggregateSummary::default();

    for node in graph.iter_mut() {
        node.reset_period_figures();
    }

    for order in orders {
        if !period.contains(order.completed_at) {
            summary.out_of_window += 1;
            continue;
        }
        match graph.get_mut(&order.user_id) {
            Some(node) => {
                node.personal_volume += order.bv;
                node.personal_sales += order.total;
                node.personal_points += order.points;
                summary.credited_orders += 1;
                summary.company_volume += order.bv;
                summary.company_sales += order.total;
            }
            None => summary.orphan_orders += 1,
        }
    }

    // Trees are disjoint, so each rolls up independently.
    let trees = graph.trees();
    let rollups: Vec<Vec<Rollup>> = trees
        .par_iter()
        .map(|ids| rollup_tree(graph, ids))
        .collect();

    for rollup in rollups.into_iter().flatten() {
        if let Some(node) = graph.get_mut(&rollup.user_id) {
            node.team_volume = rollup.team_volume;
            node.team_sales = rollup.team_sales;
            node.leg_volumes = rollup.leg_volumes;
            node.total_downline = rollup.total_downline;
            node.active_downline = rollup.active_downline;
        }
    }

    refresh_referral_counts(graph);

    summary.total_members = graph.len() as u32;
    summary.active_members = graph.iter().filter(|n| n.is_active).count() as u32;
    summary
}

/// Children-before-parents accumulation over one tree. `ids` comes in BFS
/// order, so the reverse walk sees every child before its parent.
fn rollup_tree(graph: &NetworkGraph, ids: &[UserId]) -> Vec<Rollup> {
    struct Subtree {
        volume: i64,
        sales: i64,
        size: u32,
        active: u32,
    }
    let mut subtotals: HashMap<&str, Subtree> = HashMap::with_capacity(ids.len());
    let mut out = Vec::with_capacity(ids.len());

    for id in ids.iter().rev() {
        let Some(node) = graph.get(id) else { continue };
        let mut team_volume = 0;
        let mut team_sales = 0;
        let mut size = 0;
        let mut active = 0;
        let mut leg_volumes = LegVolumes::default();

        for child in graph.children_of(id) {
            let Some(sub) = subtotals.get(child.as_str()) else { continue };
            team_volume += sub.volume;
            team_sales += sub.sales;
            size += sub.size;
            active += sub.active;
            if let Some(position) = graph.get(child).and_then(|c| c.position) {
                leg_volumes.set(position, leg_volumes.get(position) + sub.volume);
            }
        }

        subtotals.insert(
            id.as_str(),
            Subtree {
                volume: team_volume + node.personal_volume,
                sales: team_sales + node.personal_sales,
                size: size + 1,
                active: active + u32::from(node.is_active),
            },
        );
        out.push(Rollup {
            user_id: id.clone(),
            team_volume,
            team_sales,
            leg_volumes,
            total_downline: size,
            active_downline: active,
        });
    }
    out
}

/// Direct and active referral counts from the sponsorship index.
fn refresh_referral_counts(graph: &mut NetworkGraph) {
    let counts: Vec<(UserId, u32, u32)> = graph
        .iter()
        .map(|node| {
            let sponsored = graph.sponsored_by(&node.user_id);
            let active = sponsored
                .iter()
                .filter(|s| graph.get(s).map(|n| n.is_active).unwrap_or(false))
                .count() as u32;
            (node.user_id.clone(), sponsored.len() as u32, active)
        })
        .collect();
    for (user_id, direct, active) in counts {
        if let Some(node) = graph.get_mut(&user_id) {
            node.direct_referrals = direct;
            node.active_referrals = active;
        }
    }
}
