//! Bonus program evaluation and pool splitting.
//!
//! Fixed programs credit `reward_amount` to every qualifier. Pool programs
//! split a pot funded from company revenue. All splits satisfy
//! `sum(shares) == distributed_amount <= total_pool` by construction;
//! rounding dust stays in the pot rather than being invented or lost.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::BTreeMap;

use crate::graph::NetworkGraph;
use crate::model::apply_rate;
use crate::model::bonus::{
    BonusAward, BonusEligibility, BonusProgram, BonusRequirement, PoolBonusDistribution,
    PoolDistribution, PoolParticipant, RequirementKind,
};
use crate::model::node::NetworkNode;
use crate::model::period::Period;
use crate::model::plan::PlatformConfig;

/// Everything one distribution pass produces. Eligibilities cover every
/// member for every program that ran, eligible or not, so support tooling
/// can show who missed what.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BonusOutcome {
    pub eligibilities: Vec<BonusEligibility>,
    /// Fixed-program awards, sorted by (program, user).
    pub awards: Vec<BonusAward>,
    /// One record per pool program that ran, qualified or not.
    pub pools: Vec<PoolBonusDistribution>,
}

/// Run every program due in the period. `company_sales` funds pool pots.
pub fn distribute(
    graph: &NetworkGraph,
    config: &PlatformConfig,
    period: &Period,
    company_sales: i64,
    now: DateTime<Utc>,
) -> BonusOutcome {
    let mut outcome = BonusOutcome::default();

    for program in &config.programs {
        if !program.runs_in(period) {
            continue;
        }
        let mut eligibilities = evaluate_program(graph, config, program, now);
        eligibilities.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        let mut qualified: Vec<&BonusEligibility> =
            eligibilities.iter().filter(|e| e.is_eligible).collect();
        cap_winners(&mut qualified, program.max_winners_per_period);

        if program.is_pool {
            outcome.pools.push(split_pool(
                graph,
                config,
                program,
                period,
                company_sales,
                &qualified,
                now,
            ));
        } else if let Some(reward) = program.reward_amount {
            for eligibility in &qualified {
                let multiplier = config
                    .rank(rank_of(graph, &eligibility.user_id))
                    .and_then(|r| r.benefits.bonus_rate);
                let mut amount = match multiplier {
                    Some(rate) => apply_rate(reward, rate),
                    None => reward,
                };
                if let Some(cap) = program.max_payout_per_person {
                    amount = amount.min(cap);
                }
                if amount > 0 {
                    outcome.awards.push(BonusAward {
                        user_id: eligibility.user_id.clone(),
                        program_id: program.id.clone(),
                        bonus_type: program.bonus_type,
                        amount,
                        period: period.key.clone(),
                        calculated_at: now,
                    });
                }
            }
        }
        outcome.eligibilities.extend(eligibilities);
    }

    outcome
        .awards
        .sort_by(|a, b| (&a.program_id, &a.user_id).cmp(&(&b.program_id, &b.user_id)));
    outcome
}

fn rank_of<'a>(graph: &'a NetworkGraph, user_id: &str) -> &'a str {
    graph.get(user_id).map(|n| n.rank.as_str()).unwrap_or("none")
}

/// Keep the strongest qualifiers when a program caps winners: highest
/// qualification metric first, user id as the stable tiebreak.
fn cap_winners(qualified: &mut Vec<&BonusEligibility>, cap: Option<u32>) {
    let Some(cap) = cap else { return };
    qualified.sort_by(|a, b| {
        b.qualification_metric
            .cmp(&a.qualification_metric)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    qualified.truncate(cap as usize);
    qualified.sort_by(|a, b| a.user_id.cmp(&b.user_id));
}

// ── Eligibility ─────────────────────────────────────────────────────

fn evaluate_program(
    graph: &NetworkGraph,
    config: &PlatformConfig,
    program: &BonusProgram,
    now: DateTime<Utc>,
) -> Vec<BonusEligibility> {
    let nodes: Vec<&NetworkNode> = graph.iter().collect();
    nodes
        .par_iter()
        .map(|node| evaluate_member(config, program, node, now))
        .collect()
}

/// AND semantics across the program's requirements, behind the minimum
/// rank gate. A rank whose benefits unlock the program short-circuits to
/// eligible. Inactive members are never eligible.
fn evaluate_member(
    config: &PlatformConfig,
    program: &BonusProgram,
    node: &NetworkNode,
    now: DateTime<Utc>,
) -> BonusEligibility {
    let mut requirements_met = BTreeMap::new();
    let mut missing = Vec::new();

    let unlocked = config
        .rank(&node.rank)
        .map(|r| r.benefits.unlocked_bonuses.iter().any(|b| b == &program.id))
        .unwrap_or(false);

    let mut eligible = node.is_active;
    if !node.is_active {
        missing.push("active".to_string());
    }

    if eligible && !unlocked {
        if let Some(min_rank) = &program.minimum_rank {
            if config.rank_level(&node.rank) < config.rank_level(min_rank) {
                eligible = false;
                missing.push(format!("rank>={min_rank}"));
            }
        }
        for requirement in &program.requirements {
            let met = requirement_met(config, requirement, node);
            requirements_met.insert(requirement.id.clone(), met);
            if !met {
                eligible = false;
                missing.push(requirement.id.clone());
            }
        }
    }

    BonusEligibility {
        user_id: node.user_id.clone(),
        program_id: program.id.clone(),
        is_eligible: eligible,
        requirements_met,
        missing,
        qualification_metric: node.team_volume.max(0),
        evaluated_at: now,
    }
}

/// One requirement against the snapshot figures. Timeframes resolve to the
/// current period's aggregates, which is what the snapshot holds. An
/// absent threshold or a `custom` kind fails closed; validation rejects
/// both before a run gets here.
fn requirement_met(
    config: &PlatformConfig,
    requirement: &BonusRequirement,
    node: &NetworkNode,
) -> bool {
    let Some(min) = requirement.minimum_value else {
        return false;
    };
    match requirement.kind {
        RequirementKind::Rank => i64::from(config.rank_level(&node.rank)) >= min,
        RequirementKind::Volume => node.personal_volume >= min,
        RequirementKind::TeamVolume => node.team_volume >= min,
        RequirementKind::Sales => node.personal_sales >= min,
        RequirementKind::Referrals => i64::from(node.active_referrals) >= min,
        RequirementKind::TeamSize => i64::from(node.total_downline) >= min,
        RequirementKind::Custom => false,
    }
}

// ── Pool splitting ──────────────────────────────────────────────────

fn split_pool(
    graph: &NetworkGraph,
    config: &PlatformConfig,
    program: &BonusProgram,
    period: &Period,
    company_sales: i64,
    qualified: &[&BonusEligibility],
    now: DateTime<Utc>,
) -> PoolBonusDistribution {
    let total_pool = apply_rate(company_sales, program.pool_percentage.unwrap_or(0.0)).max(0);
    let strategy = program.pool_distribution.unwrap_or(PoolDistribution::Equal);

    let mut participants = match strategy {
        PoolDistribution::Equal => split_equal(graph, total_pool, qualified),
        PoolDistribution::Ranked => split_weighted(graph, total_pool, qualified, |e| {
            i64::from(config.rank_level(rank_of(graph, &e.user_id)))
        }),
        PoolDistribution::VolumeWeighted => {
            split_weighted(graph, total_pool, qualified, |e| e.qualification_metric.max(0))
        }
    };

    if let Some(cap) = program.max_payout_per_person {
        for participant in &mut participants {
            participant.bonus_amount = participant.bonus_amount.min(cap);
        }
    }
    participants.retain(|p| p.bonus_amount > 0);

    let distributed_amount: i64 = participants.iter().map(|p| p.bonus_amount).sum();
    for participant in &mut participants {
        participant.share_percentage = if distributed_amount > 0 {
            participant.bonus_amount as f64 / distributed_amount as f64
        } else {
            0.0
        };
    }

    PoolBonusDistribution {
        program_id: program.id.clone(),
        period: period.key.clone(),
        total_pool,
        total_qualified: qualified.len() as u32,
        distributed_amount,
        participants,
        calculated_at: now,
    }
}

/// `total / n` each, remainder to the first participants in ascending
/// user id order so reruns reproduce the split to the cent.
fn split_equal(
    graph: &NetworkGraph,
    total_pool: i64,
    qualified: &[&BonusEligibility],
) -> Vec<PoolParticipant> {
    let n = qualified.len() as i64;
    if n == 0 || total_pool <= 0 {
        return Vec::new();
    }
    let share = total_pool / n;
    let remainder = total_pool - share * n;
    qualified
        .iter()
        .enumerate()
        .map(|(i, e)| PoolParticipant {
            user_id: e.user_id.clone(),
            rank: rank_of(graph, &e.user_id).to_string(),
            qualification_metric: e.qualification_metric,
            share_percentage: 0.0,
            bonus_amount: share + i64::from((i as i64) < remainder),
        })
        .collect()
}

/// Floor of `pool * weight / total_weight` per participant; dust stays in
/// the pot. Zero total weight distributes nothing.
fn split_weighted(
    graph: &NetworkGraph,
    total_pool: i64,
    qualified: &[&BonusEligibility],
    weight: impl Fn(&BonusEligibility) -> i64,
) -> Vec<PoolParticipant> {
    if qualified.is_empty() || total_pool <= 0 {
        return Vec::new();
    }
    let weights: Vec<i64> = qualified.iter().map(|e| weight(e).max(0)).collect();
    let total_weight: i64 = weights.iter().sum();
    if total_weight == 0 {
        return Vec::new();
    }
    qualified
        .iter()
        .zip(weights)
        .map(|(e, w)| PoolParticipant {
            user_id: e.user_id.clone(),
            rank: rank_of(graph, &e.user_id).to_string(),
            qualification_metric: e.qualification_metric,
            share_percentage: 0.0,
            bonus_amount: ((total_pool as i128 * w as i128) / total_weight as i128) as i64,
        })
        .collect()
}
