//! The placement forest.
//!
//! Nodes live in an id-keyed arena; parent/child and sponsor edges are kept
//! as separate indexes over ids. All traversal is by id lookup, so the graph
//! clones cheaply into the per-run snapshot the calculators read.

pub mod placement;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;

use anyhow::Context;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::node::{LegPosition, NetworkNode, NetworkType, Placement, UserId};
use crate::model::plan::CompensationPlan;

// ── Errors ──────────────────────────────────────────────────────────

/// Structural placement failures. All of them leave the graph unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("sponsor '{0}' is not in the network")]
    UnknownSponsor(UserId),
    #[error("placement parent '{0}' is not in the network")]
    UnknownParent(UserId),
    #[error("user '{user}' is already placed with a different sponsor '{sponsor}'")]
    SponsorConflict { user: UserId, sponsor: UserId },
    #[error("slot {position} under '{parent}' is occupied by '{occupant}'")]
    SlotOccupied {
        parent: UserId,
        position: LegPosition,
        occupant: UserId,
    },
    #[error("placing '{user}' under '{parent}' would make it its own ancestor")]
    CycleDetected { user: UserId, parent: UserId },
    #[error("manual placement for '{0}' requires a leg position")]
    PositionRequired(UserId),
    #[error("position {position} is not a {network_type} slot")]
    InvalidPosition {
        network_type: NetworkType,
        position: LegPosition,
    },
    #[error("node '{0}' appears more than once")]
    DuplicateNode(UserId),
}

// ── Graph ───────────────────────────────────────────────────────────

/// Serialized form of the forest.
#[derive(Debug, Serialize, Deserialize)]
struct GraphFile {
    network_type: NetworkType,
    nodes: Vec<NetworkNode>,
}

/// The placement forest for one platform.
#[derive(Debug, Clone)]
pub struct NetworkGraph {
    network_type: NetworkType,
    nodes: HashMap<UserId, NetworkNode>,
    /// Placement children in insertion order.
    children: HashMap<UserId, Vec<UserId>>,
    /// Referral edges: sponsor -> sponsored members.
    sponsored: HashMap<UserId, Vec<UserId>>,
    roots: Vec<UserId>,
}

impl NetworkGraph {
    pub fn new(network_type: NetworkType) -> Self {
        NetworkGraph {
            network_type,
            nodes: HashMap::new(),
            children: HashMap::new(),
            sponsored: HashMap::new(),
            roots: Vec::new(),
        }
    }

    /// Rebuild a graph from stored nodes, validating the forest shape:
    /// unique ids, parents that exist, one occupant per slot, and no
    /// directed cycles through parent edges.
    pub fn from_nodes(
        network_type: NetworkType,
        nodes: Vec<NetworkNode>,
    ) -> Result<Self, Vec<GraphError>> {
        let mut errors = Vec::new();
        let mut graph = NetworkGraph::new(network_type);

        for node in nodes {
            if graph.nodes.contains_key(&node.user_id) {
                errors.push(GraphError::DuplicateNode(node.user_id.clone()));
                continue;
            }
            graph.nodes.insert(node.user_id.clone(), node);
        }

        // Index edges, checking endpoints as we go.
        let ids: Vec<UserId> = graph.nodes.keys().cloned().collect();
        for id in &ids {
            let (parent_id, sponsor_id, position) = {
                let node = &graph.nodes[id];
                (node.parent_id.clone(), node.sponsor_id.clone(), node.position)
            };
            match parent_id {
                Some(parent) => {
                    if !graph.nodes.contains_key(&parent) {
                        errors.push(GraphError::UnknownParent(parent));
                        continue;
                    }
                    if let Some(position) = position {
                        if let Some(occupant) = graph.child_in_slot(&parent, position) {
                            errors.push(GraphError::SlotOccupied {
                                parent: parent.clone(),
                                position,
                                occupant: occupant.to_string(),
                            });
                            continue;
                        }
                    }
                    graph.children.entry(parent).or_default().push(id.clone());
                }
                None => graph.roots.push(id.clone()),
            }
            if let Some(sponsor) = sponsor_id {
                if !graph.nodes.contains_key(&sponsor) {
                    errors.push(GraphError::UnknownSponsor(sponsor));
                } else {
                    graph.sponsored.entry(sponsor).or_default().push(id.clone());
                }
            }
        }

        // Parent edges must form a forest. petgraph spots any cycle the
        // index walk above couldn't (e.g. two nodes parenting each other).
        let mut digraph: DiGraph<&str, ()> = DiGraph::new();
        let mut indices = HashMap::new();
        for id in graph.nodes.keys() {
            indices.insert(id.clone(), digraph.add_node(id.as_str()));
        }
        for (id, node) in &graph.nodes {
            if let Some(parent) = &node.parent_id {
                if let (Some(&from), Some(&to)) = (indices.get(parent), indices.get(id)) {
                    digraph.add_edge(from, to, ());
                }
            }
        }
        if is_cyclic_directed(&digraph) {
            for (id, node) in &graph.nodes {
                if let Some(parent) = &node.parent_id {
                    if graph.is_ancestor(id, parent) {
                        errors.push(GraphError::CycleDetected {
                            user: id.clone(),
                            parent: parent.clone(),
                        });
                    }
                }
            }
        }

        if !errors.is_empty() {
            errors.sort_by_key(|e| e.to_string());
            return Err(errors);
        }

        graph.roots.sort();
        graph.recompute_levels();
        Ok(graph)
    }

    pub fn network_type(&self) -> NetworkType {
        self.network_type
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, user_id: &str) -> Option<&NetworkNode> {
        self.nodes.get(user_id)
    }

    pub fn get_mut(&mut self, user_id: &str) -> Option<&mut NetworkNode> {
        self.nodes.get_mut(user_id)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.nodes.contains_key(user_id)
    }

    pub fn roots(&self) -> &[UserId] {
        &self.roots
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkNode> {
        self.nodes.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut NetworkNode> {
        self.nodes.values_mut()
    }

    /// Placement children in insertion order.
    pub fn children_of(&self, user_id: &str) -> &[UserId] {
        self.children.get(user_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Members this user sponsored, in insertion order.
    pub fn sponsored_by(&self, user_id: &str) -> &[UserId] {
        self.sponsored.get(user_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Occupant of a named slot, if any.
    pub fn child_in_slot(&self, parent_id: &str, position: LegPosition) -> Option<&str> {
        self.children_of(parent_id)
            .iter()
            .find(|c| self.nodes.get(*c).and_then(|n| n.position) == Some(position))
            .map(String::as_str)
    }

    // ── Placement ───────────────────────────────────────────────────

    /// Attach a new member, or re-apply an existing placement.
    ///
    /// Re-issuing a placement that matches the node's current edges is a
    /// no-op. A re-issue naming a different explicit parent or slot is a
    /// relocation: the subtree moves if the target slot is free and the
    /// move would not make the node its own ancestor. A re-issue naming a
    /// different sponsor is always an error, sponsorship never changes.
    ///
    /// All failure paths leave the graph untouched.
    pub fn place(
        &mut self,
        placement: &Placement,
        plan: &CompensationPlan,
    ) -> Result<&NetworkNode, GraphError> {
        if let Some(position) = placement.position {
            if !LegPosition::slots_for(self.network_type).contains(&position) {
                return Err(GraphError::InvalidPosition {
                    network_type: self.network_type,
                    position,
                });
            }
        }

        if self.nodes.contains_key(&placement.user_id) {
            return self.replace_existing(placement);
        }

        if !self.nodes.contains_key(&placement.sponsor_id) {
            // An empty graph admits its first member as a root.
            if self.nodes.is_empty() && placement.sponsor_id == placement.user_id {
                return Ok(self.insert_root(placement));
            }
            return Err(GraphError::UnknownSponsor(placement.sponsor_id.clone()));
        }

        let (parent_id, position) = self.resolve_slot(placement, plan)?;

        let mut node = NetworkNode::new(
            placement.user_id.clone(),
            Some(placement.sponsor_id.clone()),
            placement.joined_at,
        );
        node.parent_id = Some(parent_id.clone());
        node.position = position;
        node.level = self.nodes[&parent_id].level + 1;

        self.nodes.insert(placement.user_id.clone(), node);
        self.children
            .entry(parent_id.clone())
            .or_default()
            .push(placement.user_id.clone());
        self.sponsored
            .entry(placement.sponsor_id.clone())
            .or_default()
            .push(placement.user_id.clone());

        if let Some(sponsor) = self.nodes.get_mut(&placement.sponsor_id) {
            sponsor.direct_referrals += 1;
        }
        let ancestors: Vec<UserId> = self
            .ancestors_of(&placement.user_id)
            .into_iter()
            .map(|n| n.user_id.clone())
            .collect();
        for id in ancestors {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.total_downline += 1;
            }
        }

        Ok(&self.nodes[&placement.user_id])
    }

    /// First member of an empty graph: self-sponsored root.
    fn insert_root(&mut self, placement: &Placement) -> &NetworkNode {
        let node = NetworkNode::new(placement.user_id.clone(), None, placement.joined_at);
        self.nodes.insert(placement.user_id.clone(), node);
        self.roots.push(placement.user_id.clone());
        &self.nodes[&placement.user_id]
    }

    fn resolve_slot(
        &self,
        placement: &Placement,
        plan: &CompensationPlan,
    ) -> Result<(UserId, Option<LegPosition>), GraphError> {
        let scan_root = match &placement.parent_id {
            Some(parent) => {
                if !self.nodes.contains_key(parent) {
                    return Err(GraphError::UnknownParent(parent.clone()));
                }
                parent.clone()
            }
            None => placement.sponsor_id.clone(),
        };

        if self.network_type == NetworkType::Unilevel {
            // Unlimited width: the resolved parent is the slot.
            return Ok((scan_root, None));
        }

        if placement.auto_placement {
            let strategy = placement
                .strategy
                .unwrap_or(crate::model::node::PlacementStrategy::Balanced);
            let (parent, position) =
                placement::find_slot(self, &scan_root, strategy, plan.power_leg)?;
            return Ok((parent, Some(position)));
        }

        let position = placement
            .position
            .ok_or_else(|| GraphError::PositionRequired(placement.user_id.clone()))?;
        if let Some(occupant) = self.child_in_slot(&scan_root, position) {
            return Err(GraphError::SlotOccupied {
                parent: scan_root.clone(),
                position,
                occupant: occupant.to_string(),
            });
        }
        Ok((scan_root, Some(position)))
    }

    /// Idempotent re-issue or guarded relocation of an existing node.
    fn replace_existing(&mut self, placement: &Placement) -> Result<&NetworkNode, GraphError> {
        let node = &self.nodes[&placement.user_id];
        if node.sponsor_id.as_deref() != Some(placement.sponsor_id.as_str())
            && !(node.sponsor_id.is_none() && placement.sponsor_id == placement.user_id)
        {
            return Err(GraphError::SponsorConflict {
                user: placement.user_id.clone(),
                sponsor: node.sponsor_id.clone().unwrap_or_default(),
            });
        }

        // Auto re-issues and matching explicit ones change nothing.
        let same_parent = match &placement.parent_id {
            Some(parent) => node.parent_id.as_deref() == Some(parent.as_str()),
            None => true,
        };
        let same_position = match placement.position {
            Some(position) => node.position == Some(position),
            None => true,
        };
        if placement.auto_placement || (same_parent && same_position) {
            return Ok(&self.nodes[&placement.user_id]);
        }

        let new_parent = placement
            .parent_id
            .clone()
            .unwrap_or_else(|| placement.sponsor_id.clone());
        let position = match self.network_type {
            NetworkType::Unilevel => None,
            _ => Some(
                placement
                    .position
                    .ok_or_else(|| GraphError::PositionRequired(placement.user_id.clone()))?,
            ),
        };
        self.relocate(&placement.user_id, &new_parent, position)?;
        Ok(&self.nodes[&placement.user_id])
    }

    /// Move a node (and its whole subtree) under a new parent. Checks run
    /// before any mutation.
    pub fn relocate(
        &mut self,
        user_id: &str,
        new_parent: &str,
        position: Option<LegPosition>,
    ) -> Result<(), GraphError> {
        if !self.nodes.contains_key(user_id) {
            return Err(GraphError::UnknownParent(user_id.to_string()));
        }
        if !self.nodes.contains_key(new_parent) {
            return Err(GraphError::UnknownParent(new_parent.to_string()));
        }
        if user_id == new_parent || self.is_ancestor(user_id, new_parent) {
            return Err(GraphError::CycleDetected {
                user: user_id.to_string(),
                parent: new_parent.to_string(),
            });
        }
        if let Some(position) = position {
            if let Some(occupant) = self.child_in_slot(new_parent, position) {
                if occupant != user_id {
                    return Err(GraphError::SlotOccupied {
                        parent: new_parent.to_string(),
                        position,
                        occupant: occupant.to_string(),
                    });
                }
            }
        }

        let subtree: Vec<UserId> = self.subtree_of(user_id);
        let moved = subtree.len() as u32;

        // Detach.
        let old_parent = self.nodes[user_id].parent_id.clone();
        if let Some(old_parent) = &old_parent {
            if let Some(siblings) = self.children.get_mut(old_parent) {
                siblings.retain(|c| c != user_id);
            }
            let old_ancestors: Vec<UserId> = self
                .ancestors_of(user_id)
                .into_iter()
                .map(|n| n.user_id.clone())
                .collect();
            for id in old_ancestors {
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.total_downline -= moved;
                }
            }
        } else {
            self.roots.retain(|r| r != user_id);
        }

        // Attach.
        if let Some(node) = self.nodes.get_mut(user_id) {
            node.parent_id = Some(new_parent.to_string());
            node.position = position;
        }
        self.children
            .entry(new_parent.to_string())
            .or_default()
            .push(user_id.to_string());
        let new_ancestors: Vec<UserId> = self
            .ancestors_of(user_id)
            .into_iter()
            .map(|n| n.user_id.clone())
            .collect();
        for id in new_ancestors {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.total_downline += moved;
            }
        }

        // Depths shift wholesale by the parent delta.
        let base = self.nodes[new_parent].level + 1;
        let delta = base as i64 - self.nodes[user_id].level as i64;
        for id in &subtree {
            if let Some(node) = self.nodes.get_mut(id) {
                node.level = (node.level as i64 + delta) as u32;
            }
        }
        Ok(())
    }

    // ── Traversal ───────────────────────────────────────────────────

    /// Placement ancestors, nearest first. The visited guard makes this
    /// total even on a corrupted parent chain.
    pub fn ancestors_of(&self, user_id: &str) -> Vec<&NetworkNode> {
        let mut ancestors = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.nodes.get(user_id).and_then(|n| n.parent_id.as_deref());
        while let Some(id) = current {
            if !seen.insert(id) {
                break;
            }
            match self.nodes.get(id) {
                Some(node) => {
                    ancestors.push(node);
                    current = node.parent_id.as_deref();
                }
                None => break,
            }
        }
        ancestors
    }

    /// Which of `ancestor`'s legs contains `user`: the slot of the child
    /// of `ancestor` on the path down to `user`. `None` when `ancestor`
    /// isn't actually upstream.
    pub fn leg_of(&self, user_id: &str, ancestor_id: &str) -> Option<LegPosition> {
        let mut child = user_id;
        let mut seen = HashSet::new();
        loop {
            let node = self.nodes.get(child)?;
            let parent = node.parent_id.as_deref()?;
            if !seen.insert(child) {
                return None;
            }
            if parent == ancestor_id {
                return node.position;
            }
            child = parent;
        }
    }

    pub fn is_ancestor(&self, ancestor_id: &str, user_id: &str) -> bool {
        self.ancestors_of(user_id)
            .iter()
            .any(|n| n.user_id == ancestor_id)
    }

    /// Breadth-first subtree ids, the root included, children in insertion
    /// order.
    pub fn subtree_of(&self, user_id: &str) -> Vec<UserId> {
        let mut out = Vec::new();
        if !self.nodes.contains_key(user_id) {
            return out;
        }
        let mut queue = VecDeque::from([user_id.to_string()]);
        let mut seen = HashSet::new();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            for child in self.children_of(&id) {
                queue.push_back(child.clone());
            }
            out.push(id);
        }
        out
    }

    /// Node ids grouped per root, for tree-parallel aggregation.
    pub fn trees(&self) -> Vec<Vec<UserId>> {
        self.roots.iter().map(|r| self.subtree_of(r)).collect()
    }

    fn recompute_levels(&mut self) {
        let roots = self.roots.clone();
        for root in roots {
            for id in self.subtree_of(&root) {
                let level = self
                    .nodes
                    .get(&id)
                    .and_then(|n| n.parent_id.as_deref())
                    .and_then(|p| self.nodes.get(p))
                    .map(|p| p.level + 1)
                    .unwrap_or(0);
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.level = level;
                }
            }
        }
    }

    // ── Persistence ─────────────────────────────────────────────────

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading network file {}", path.display()))?;
        let file: GraphFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing network file {}", path.display()))?;
        NetworkGraph::from_nodes(file.network_type, file.nodes).map_err(|errors| {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            anyhow::anyhow!("invalid network file {}: {joined}", path.display())
        })
    }

    /// Atomic write: serialize to a sibling tmp file, then rename over.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let mut nodes: Vec<NetworkNode> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        let file = GraphFile {
            network_type: self.network_type,
            nodes,
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("writing network file {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("renaming network file into {}", path.display()))?;
        Ok(())
    }
}
