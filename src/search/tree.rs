//! Arena of search nodes indexed by content-addressed ids.
//!
//! Parents reference children by id, never by pointer, so that two workers
//! independently expanding the same parent produce identical child ids and
//! their trees can be merged by id equality alone.

use std::collections::HashMap;
use std::error;
use std::fmt;
use std::hash::Hash;

use crate::game::ScoreVec;

pub type NodeId = u32;

/// The root's id. The root is never shipped over the wire.
pub const ROOT_ID: NodeId = 0;

/// Derive a child id from its parent id and the wire encoding of the action
/// leading to it: the first four bytes of `md5(parent_le_bytes ‖ action)`.
///
/// 32 bits is knowingly undersized; collisions inside one search tree are
/// rare enough to accept, and a collision across distinct parents fails the
/// walk instead of corrupting the tree.
pub fn derive_child_id(parent: NodeId, encoded_action: &str) -> NodeId {
    let mut input = Vec::with_capacity(4 + encoded_action.len());
    input.extend_from_slice(&parent.to_le_bytes());
    input.extend_from_slice(encoded_action.as_bytes());
    let digest = md5::compute(&input);
    NodeId::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// A node is a sequence of actions from the root, not a gamestate: two
/// distinct action paths reaching equal gamestates stay distinct nodes.
#[derive(Clone, Debug)]
pub struct Node<P> {
    pub id: NodeId,
    /// None for the root only.
    pub parent: Option<NodeId>,
    pub visits: u64,
    /// Per-player score summed across all visits.
    pub score: ScoreVec<P>,
    /// Pre-visit weight `(numerator, denominator)` seeded at expansion when
    /// a heuristic is configured. Nodes merged from peers carry none until
    /// a local expansion backfills it.
    pub heuristic_seed: Option<(f64, u32)>,
    /// Whether the local engine has run expansion on this node. Peers can
    /// pre-create edge entries, so edge presence alone cannot tell.
    pub expanded: bool,
}

impl<P: Copy + Eq + Hash> Node<P> {
    pub fn new(id: NodeId, parent: Option<NodeId>, players: &[P]) -> Self {
        Node {
            id,
            parent,
            visits: 0,
            score: players.iter().map(|&p| (p, 0.0)).collect(),
            heuristic_seed: None,
            expanded: false,
        }
    }

    /// Mean score for `player`. Only meaningful once visited.
    pub fn mean_score(&self, player: P) -> f64 {
        debug_assert!(self.visits > 0);
        self.score.get(&player).copied().unwrap_or(0.0) / self.visits as f64
    }
}

impl<P: Eq + Hash> PartialEq for Node<P> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.parent == other.parent
            && self.visits == other.visits
            && self.score == other.score
            && self.heuristic_seed == other.heuristic_seed
            && self.expanded == other.expanded
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeError {
    /// An id already in the tree was re-inserted under a different parent:
    /// either a 32-bit hash collision or a corrupt peer stream.
    ParentMismatch {
        id: NodeId,
        existing_parent: Option<NodeId>,
        new_parent: Option<NodeId>,
    },
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TreeError::ParentMismatch {
                id,
                existing_parent,
                new_parent,
            } => write!(
                f,
                "node {} already exists under parent {:?}, refusing re-insert under {:?}",
                id, existing_parent, new_parent
            ),
        }
    }
}

impl error::Error for TreeError {}

/// Node storage plus the parent → children adjacency.
///
/// `edges` has no entry for a node never selected for expansion (and never
/// touched by a peer merge); an empty entry marks a terminal node.
#[derive(Clone, Debug)]
pub struct Tree<A, P> {
    nodes: HashMap<NodeId, Node<P>>,
    edges: HashMap<NodeId, Vec<(NodeId, A)>>,
}

impl<A: PartialEq, P: Eq + Hash> PartialEq for Tree<A, P> {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.edges == other.edges
    }
}

impl<A: Clone + PartialEq, P: Copy + Eq + Hash> Tree<A, P> {
    pub fn new(players: &[P]) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_ID, Node::new(ROOT_ID, None, players));
        Tree {
            nodes,
            edges: HashMap::new(),
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&Node<P>> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node<P>> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Insert a node. Re-inserting an id under the same parent is an
    /// idempotent no-op (`Ok(false)`), which is what makes peer walk-log
    /// replay commutative; the same id under a different parent is an
    /// error.
    pub fn insert_node(&mut self, node: Node<P>) -> Result<bool, TreeError> {
        match self.nodes.get(&node.id) {
            Some(existing) if existing.parent == node.parent => Ok(false),
            Some(existing) => Err(TreeError::ParentMismatch {
                id: node.id,
                existing_parent: existing.parent,
                new_parent: node.parent,
            }),
            None => {
                self.nodes.insert(node.id, node);
                Ok(true)
            }
        }
    }

    pub fn children(&self, id: NodeId) -> Option<&[(NodeId, A)]> {
        self.edges.get(&id).map(Vec::as_slice)
    }

    /// Create the (possibly empty) edge entry for `id` if absent.
    pub fn ensure_edges(&mut self, id: NodeId) {
        self.edges.entry(id).or_default();
    }

    pub fn append_edge(&mut self, parent: NodeId, child: NodeId, action: A) {
        self.edges.entry(parent).or_default().push((child, action));
    }

    pub fn has_edge(&self, parent: NodeId, child: NodeId) -> bool {
        self.edges
            .get(&parent)
            .map(|children| children.iter().any(|(id, _)| *id == child))
            .unwrap_or(false)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node<P>> {
        self.nodes.values()
    }

    /// Check the structural invariants that must hold between walks.
    pub fn validate(&self) -> Result<(), String> {
        let root = self
            .nodes
            .get(&ROOT_ID)
            .ok_or_else(|| "root missing from tree".to_string())?;
        if root.parent.is_some() {
            return Err("root has a parent".to_string());
        }
        for node in self.nodes.values() {
            if node.id == ROOT_ID {
                continue;
            }
            let parent = match node.parent {
                Some(parent) => parent,
                None => return Err(format!("non-root node {} has no parent", node.id)),
            };
            if !self.nodes.contains_key(&parent) {
                return Err(format!(
                    "node {} references unknown parent {}",
                    node.id, parent
                ));
            }
            if !self.has_edge(parent, node.id) {
                return Err(format!(
                    "node {} missing from edges of parent {}",
                    node.id, parent
                ));
            }
        }
        for (parent, children) in &self.edges {
            if !self.nodes.contains_key(parent) {
                return Err(format!("edge entry for unknown node {}", parent));
            }
            for (child, _) in children {
                if !self.nodes.contains_key(child) {
                    return Err(format!(
                        "edge {} -> {} references unknown child",
                        parent, child
                    ));
                }
            }
        }
        for node in self.nodes.values() {
            for (_, value) in &node.score {
                if *value < 0.0 || *value > node.visits as f64 + 1e-9 {
                    return Err(format!(
                        "node {} has score component {} outside [0, visits={}]",
                        node.id, value, node.visits
                    ));
                }
            }
        }
        Ok(())
    }
}
