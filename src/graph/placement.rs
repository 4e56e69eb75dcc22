//! Automatic slot selection for binary/trinity trees.
//!
//! Every strategy scans breadth-first, so spillover lands in the shallowest
//! open slot of the chosen region. Depth ties break on slot preference
//! order and then on insertion order, which keeps placement deterministic
//! for a given graph and placement sequence.

use std::collections::VecDeque;

use crate::model::node::{LegPosition, PlacementStrategy, UserId};

use super::{GraphError, NetworkGraph};

const PREFER_LEFT: [LegPosition; 3] = [LegPosition::Left, LegPosition::Right, LegPosition::Center];
const PREFER_RIGHT: [LegPosition; 3] = [LegPosition::Right, LegPosition::Left, LegPosition::Center];

/// Resolve `(parent, slot)` for an auto placement under `scan_root`.
pub(crate) fn find_slot(
    graph: &NetworkGraph,
    scan_root: &UserId,
    strategy: PlacementStrategy,
    power_leg: Option<LegPosition>,
) -> Result<(UserId, LegPosition), GraphError> {
    let slots = LegPosition::slots_for(graph.network_type());
    match strategy {
        PlacementStrategy::LeftFill => {
            let order = prefer(&PREFER_LEFT, slots);
            Ok(fill_leg(graph, scan_root, LegPosition::Left, &order))
        }
        PlacementStrategy::RightFill => {
            let order = prefer(&PREFER_RIGHT, slots);
            Ok(fill_leg(graph, scan_root, LegPosition::Right, &order))
        }
        PlacementStrategy::Balanced => Ok(balanced(graph, scan_root, slots)),
        PlacementStrategy::PowerLeg => {
            let leg = power_leg.unwrap_or(LegPosition::Left);
            if !slots.contains(&leg) {
                return Err(GraphError::InvalidPosition {
                    network_type: graph.network_type(),
                    position: leg,
                });
            }
            Ok(power_chain(graph, scan_root, leg))
        }
    }
}

/// Preference order restricted to the slots the plan actually has.
fn prefer(order: &[LegPosition], slots: &[LegPosition]) -> Vec<LegPosition> {
    order.iter().copied().filter(|p| slots.contains(p)).collect()
}

/// Fill into one leg of the scan root: the leg slot itself if open,
/// otherwise the shallowest open slot anywhere in that leg's subtree.
fn fill_leg(
    graph: &NetworkGraph,
    scan_root: &UserId,
    leg: LegPosition,
    order: &[LegPosition],
) -> (UserId, LegPosition) {
    match graph.child_in_slot(scan_root, leg) {
        None => (scan_root.clone(), leg),
        Some(child) => bfs_open_slot(graph, &child.to_string(), order),
    }
}

/// Leg with fewer nodes first (ties break in fill order), then the
/// shallowest open slot inside it.
fn balanced(
    graph: &NetworkGraph,
    scan_root: &UserId,
    slots: &[LegPosition],
) -> (UserId, LegPosition) {
    let mut best: Option<(usize, LegPosition)> = None;
    for &slot in slots {
        let count = match graph.child_in_slot(scan_root, slot) {
            None => 0,
            Some(child) => graph.subtree_of(child).len(),
        };
        if best.map(|(n, _)| count < n).unwrap_or(true) {
            best = Some((count, slot));
        }
    }
    match best {
        // An empty leg is an open slot on the root itself.
        Some((0, slot)) => (scan_root.clone(), slot),
        Some((_, slot)) => {
            let child = graph
                .child_in_slot(scan_root, slot)
                .map(str::to_string)
                .unwrap_or_else(|| scan_root.clone());
            bfs_open_slot(graph, &child, slots)
        }
        None => (scan_root.clone(), LegPosition::Left),
    }
}

/// Walk straight down the power leg until its slot is open.
fn power_chain(
    graph: &NetworkGraph,
    scan_root: &UserId,
    leg: LegPosition,
) -> (UserId, LegPosition) {
    let mut current = scan_root.clone();
    while let Some(child) = graph.child_in_slot(&current, leg) {
        current = child.to_string();
    }
    (current, leg)
}

/// Breadth-first scan for the first open slot from `start`, trying slots in
/// preference order at each node. Terminates because the frontier of a
/// finite tree always has open slots.
fn bfs_open_slot(
    graph: &NetworkGraph,
    start: &UserId,
    order: &[LegPosition],
) -> (UserId, LegPosition) {
    let mut queue = VecDeque::from([start.clone()]);
    while let Some(id) = queue.pop_front() {
        for &slot in order {
            if graph.child_in_slot(&id, slot).is_none() {
                return (id, slot);
            }
        }
        for child in graph.children_of(&id) {
            queue.push_back(child.clone());
        }
    }
    (
        start.clone(),
        order.first().copied().unwrap_or(LegPosition::Left),
    )
}
