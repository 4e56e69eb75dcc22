//! Commission calculation.
//!
//! Pure over the aggregated snapshot: a second run on the same inputs
//! yields byte-identical rows. Per-order earnings (direct sale, fast
//! start, unilevel cascade) walk the order list; leg matching runs once
//! per member per period.

use std::collections::HashMap;

use chrono::{DateTime, Days, Utc};
use rayon::prelude::*;

use crate::graph::NetworkGraph;
use crate::model::apply_rate;
use crate::model::commission::{BinaryMatch, Commission, CommissionDraft, CommissionType};
use crate::model::node::{LegPosition, LegVolumes, NetworkNode, UserId};
use crate::model::order::Order;
use crate::model::period::Period;
use crate::model::plan::{CompensationPlan, PlatformConfig};

/// Everything one calculation pass produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommissionOutcome {
    /// Sorted by natural key.
    pub commissions: Vec<Commission>,
    /// One row per member with leg activity this period, sorted by user.
    pub matches: Vec<BinaryMatch>,
}

/// Run the full pass for one period snapshot. `carry_in` holds the
/// previous period's unmatched leg remainders.
pub fn calculate(
    graph: &NetworkGraph,
    config: &PlatformConfig,
    period: &Period,
    orders: &[Order],
    carry_in: &HashMap<UserId, LegVolumes>,
    now: DateTime<Utc>,
) -> CommissionOutcome {
    let mut commissions = order_commissions(graph, &config.plan, period, orders, now);

    let mut matches = Vec::new();
    if config.plan.network_type.is_matched() {
        let (rows, match_commissions) = leg_matches(graph, config, period, carry_in, now);
        matches = rows;
        commissions.extend(match_commissions);
    }

    commissions.sort_by_key(Commission::key);
    CommissionOutcome {
        commissions,
        matches,
    }
}

// ── Per-order earnings ──────────────────────────────────────────────

fn order_commissions(
    graph: &NetworkGraph,
    plan: &CompensationPlan,
    period: &Period,
    orders: &[Order],
    now: DateTime<Utc>,
) -> Vec<Commission> {
    let draft = CommissionDraft::new(period, now);
    let mut out = Vec::new();

    for order in orders {
        if !period.contains(order.completed_at) {
            continue;
        }
        let Some(buyer) = graph.get(&order.user_id) else {
            continue;
        };
        // Referral attribution: explicit referrer wins, sponsor is the
        // fallback for orders the storefront didn't tag.
        let referrer = order
            .referrer_id
            .as_deref()
            .or(buyer.sponsor_id.as_deref())
            .and_then(|id| graph.get(id));

        if let Some(referrer) = referrer {
            if referrer.is_active {
                direct_sale(plan, &draft, order, referrer, &mut out);
                fast_start(plan, &draft, order, buyer, referrer, &mut out);
            }
        }
        if plan.network_type == crate::model::node::NetworkType::Unilevel {
            cascade(graph, plan, &draft, order, &mut out);
        }
    }
    out
}

fn direct_sale(
    plan: &CompensationPlan,
    draft: &CommissionDraft,
    order: &Order,
    referrer: &NetworkNode,
    out: &mut Vec<Commission>,
) {
    if plan.direct_sales_rate <= 0.0 {
        return;
    }
    let amount = apply_rate(order.total, plan.direct_sales_rate);
    if amount == 0 {
        return;
    }
    let mut commission = draft.build(
        referrer.user_id.clone(),
        CommissionType::DirectSale,
        amount,
        plan.direct_sales_rate,
        order.total,
    );
    commission.source_order_id = Some(order.order_id.clone());
    commission.source_user_id = Some(order.user_id.clone());
    out.push(commission);
}

/// Extra rate on a recruit's orders inside the enrollment window, paid to
/// the same referrer as the direct sale.
fn fast_start(
    plan: &CompensationPlan,
    draft: &CommissionDraft,
    order: &Order,
    buyer: &NetworkNode,
    referrer: &NetworkNode,
    out: &mut Vec<Commission>,
) {
    let Some(fs) = &plan.fast_start else { return };
    if fs.rate <= 0.0 {
        return;
    }
    let window_end = buyer.joined_at + Days::new(u64::from(fs.window_days));
    if order.completed_at >= window_end {
        return;
    }
    let amount = apply_rate(order.total, fs.rate);
    if amount == 0 {
        return;
    }
    let mut commission = draft.build(
        referrer.user_id.clone(),
        CommissionType::FastStart,
        amount,
        fs.rate,
        order.total,
    );
    commission.source_order_id = Some(order.order_id.clone());
    commission.source_user_id = Some(order.user_id.clone());
    out.push(commission);
}

/// Unilevel cascade with compression: the level counter advances only on
/// active ancestors, so an inactive upline is skipped without consuming
/// the slot meant for the next active one.
fn cascade(
    graph: &NetworkGraph,
    plan: &CompensationPlan,
    draft: &CommissionDraft,
    order: &Order,
    out: &mut Vec<Commission>,
) {
    let depth = plan.payout_depth();
    if depth == 0 {
        return;
    }
    let mut level = 1u32;
    for ancestor in graph.ancestors_of(&order.user_id) {
        if level > depth {
            break;
        }
        if !ancestor.is_active {
            continue;
        }
        let Some(rate) = plan.level_rate(level) else {
            break;
        };
        let amount = apply_rate(order.cv, rate);
        if amount != 0 {
            let mut commission = draft.build(
                ancestor.user_id.clone(),
                CommissionType::Unilevel,
                amount,
                rate,
                order.cv,
            );
            commission.level = Some(level);
            commission.source_order_id = Some(order.order_id.clone());
            commission.source_user_id = Some(order.user_id.clone());
            out.push(commission);
        }
        level += 1;
    }
}

// ── Leg matching ────────────────────────────────────────────────────

/// Per-member leg match. Totals are leg volume plus carry-in; the weakest
/// populated leg is fully consumed and every other leg carries its
/// remainder forward. Inactive members accrue: their totals roll into
/// carry untouched and no match is paid.
fn leg_matches(
    graph: &NetworkGraph,
    config: &PlatformConfig,
    period: &Period,
    carry_in: &HashMap<UserId, LegVolumes>,
    now: DateTime<Utc>,
) -> (Vec<BinaryMatch>, Vec<Commission>) {
    let plan = &config.plan;
    let legs = LegPosition::slots_for(plan.network_type);
    let draft = CommissionDraft::new(period, now);

    let nodes: Vec<&NetworkNode> = graph.iter().collect();
    let mut rows: Vec<(BinaryMatch, Option<Commission>)> = nodes
        .par_iter()
        .filter_map(|node| {
            let carry = carry_in.get(&node.user_id).copied().unwrap_or_default();
            let mut totals = LegVolumes::default();
            for &leg in legs {
                totals.set(leg, node.leg_volumes.get(leg) + carry.get(leg));
            }
            if legs.iter().all(|&leg| totals.get(leg) == 0) {
                return None;
            }

            let rate = config
                .rank(&node.rank)
                .and_then(|r| r.benefits.commission_rate)
                .unwrap_or(plan.binary_match_rate);

            let (matched, amount, carry_out) = if node.is_active {
                let matched = legs
                    .iter()
                    .map(|&leg| totals.get(leg))
                    .min()
                    .unwrap_or(0)
                    .max(0);
                let mut amount = apply_rate(matched, rate);
                if let Some(cap) = plan.match_cap {
                    amount = amount.min(cap);
                }
                let mut carry_out = LegVolumes::default();
                for &leg in legs {
                    carry_out.set(leg, totals.get(leg) - matched);
                }
                (matched, amount, carry_out)
            } else {
                (0, 0, totals)
            };

            let row = BinaryMatch {
                user_id: node.user_id.clone(),
                period: period.key.clone(),
                left_volume: totals.left,
                right_volume: totals.right,
                center_volume: totals.center,
                matched_volume: matched,
                carry_left: carry_out.left,
                carry_right: carry_out.right,
                carry_center: carry_out.center,
                rate,
                amount,
                calculated_at: now,
            };
            let commission = (amount > 0).then(|| {
                draft.build(
                    node.user_id.clone(),
                    CommissionType::BinaryMatch,
                    amount,
                    rate,
                    matched,
                )
            });
            Some((row, commission))
        })
        .collect();

    rows.sort_by(|a, b| a.0.user_id.cmp(&b.0.user_id));
    let mut matches = Vec::with_capacity(rows.len());
    let mut commissions = Vec::new();
    for (row, commission) in rows {
        matches.push(row);
        commissions.extend(commission);
    }
    (matches, commissions)
}
