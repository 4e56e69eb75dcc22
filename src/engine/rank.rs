//! Rank evaluation.
//!
//! Runs after aggregation over the same snapshot, so the figures a rank
//! decision reads are exactly the figures commissions were paid on. Every
//! member is evaluated independently against the ladder as it stood
//! entering the period; promotions landed in this pass never feed other
//! members' requirements until the next run.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::graph::NetworkGraph;
use crate::model::node::{NetworkNode, UserId};
use crate::model::plan::{PlatformConfig, Rank, RankHistoryEntry, RankRequirements};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankDirection {
    Promoted,
    Downgraded,
}

/// One applied rank change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankChange {
    pub user_id: UserId,
    pub from: String,
    pub from_level: u32,
    pub to: String,
    pub to_level: u32,
    pub direction: RankDirection,
    pub at: DateTime<Utc>,
}

/// Everything one evaluation pass produces. `changes` and `history` line
/// up one to one; `holds` counts downgrades suppressed by meritorious or
/// no-downgrade ranks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankOutcome {
    pub changes: Vec<RankChange>,
    pub history: Vec<RankHistoryEntry>,
    pub holds: u32,
}

/// Evaluate the whole graph. Read-only; the caller applies `changes` to
/// the live graph and appends `history` to the store.
pub fn evaluate(graph: &NetworkGraph, config: &PlatformConfig, now: DateTime<Utc>) -> RankOutcome {
    let ladder = config.ranks_descending();
    let nodes: Vec<&NetworkNode> = graph.iter().collect();

    let mut verdicts: Vec<(UserId, Verdict)> = nodes
        .par_iter()
        .map(|node| (node.user_id.clone(), judge(graph, config, &ladder, node, now)))
        .collect();
    verdicts.sort_by(|a, b| a.0.cmp(&b.0));

    let mut outcome = RankOutcome::default();
    for (_, verdict) in verdicts {
        match verdict {
            Verdict::Unchanged => {}
            Verdict::Held => outcome.holds += 1,
            Verdict::Change(change) => {
                outcome.history.push(RankHistoryEntry {
                    user_id: change.user_id.clone(),
                    rank_id: change.to.clone(),
                    rank_level: change.to_level,
                    achieved_at: now,
                    maintained_until: None,
                    is_meritorious: config
                        .rank(&change.to)
                        .map(|r| r.is_meritorious)
                        .unwrap_or(false),
                });
                outcome.changes.push(change);
            }
        }
    }
    outcome
}

enum Verdict {
    Unchanged,
    /// Downgrade suppressed by a meritorious or no-downgrade rank.
    Held,
    Change(RankChange),
}

/// Highest rank whose full requirement set the member meets, compared to
/// the rank currently held.
fn judge(
    graph: &NetworkGraph,
    config: &PlatformConfig,
    ladder: &[&Rank],
    node: &NetworkNode,
    now: DateTime<Utc>,
) -> Verdict {
    let candidate = ladder
        .iter()
        .find(|rank| meets(graph, config, &rank.requirements, node));
    let (candidate_id, candidate_level) = match candidate {
        Some(rank) => (rank.id.as_str(), rank.level),
        None => ("none", 0),
    };

    let current = config.rank(&node.rank);
    let current_level = current.map(|r| r.level).unwrap_or(0);

    if candidate_level > current_level {
        return Verdict::Change(RankChange {
            user_id: node.user_id.clone(),
            from: node.rank.clone(),
            from_level: current_level,
            to: candidate_id.to_string(),
            to_level: candidate_level,
            direction: RankDirection::Promoted,
            at: now,
        });
    }
    if candidate_level < current_level {
        let protected = current
            .map(|r| r.is_meritorious || !r.can_downgrade)
            .unwrap_or(false);
        if protected {
            return Verdict::Held;
        }
        return Verdict::Change(RankChange {
            user_id: node.user_id.clone(),
            from: node.rank.clone(),
            from_level: current_level,
            to: candidate_id.to_string(),
            to_level: candidate_level,
            direction: RankDirection::Downgraded,
            at: now,
        });
    }
    Verdict::Unchanged
}

/// Every present requirement field is an AND condition.
fn meets(
    graph: &NetworkGraph,
    config: &PlatformConfig,
    req: &RankRequirements,
    node: &NetworkNode,
) -> bool {
    if let Some(min) = req.personal_volume {
        if node.personal_volume < min {
            return false;
        }
    }
    if let Some(min) = req.team_volume {
        if node.team_volume < min {
            return false;
        }
    }
    if let Some(min) = req.personal_sales {
        if node.personal_sales < min {
            return false;
        }
    }
    if let Some(min) = req.team_sales {
        if node.team_sales < min {
            return false;
        }
    }
    if let Some(min) = req.active_referrals {
        if node.active_referrals < min {
            return false;
        }
    }
    if let Some(min) = req.points {
        if node.personal_points < min {
            return false;
        }
    }
    if let Some(rank_referrals) = &req.rank_referrals {
        for (rank_id, needed) in rank_referrals {
            let floor = config.rank_level(rank_id);
            let holders = graph
                .sponsored_by(&node.user_id)
                .iter()
                .filter(|s| {
                    graph
                        .get(s)
                        .map(|n| config.rank_level(&n.rank) >= floor)
                        .unwrap_or(false)
                })
                .count() as u32;
            if holders < *needed {
                return false;
            }
        }
    }
    true
}
