//! One selection → expansion → rollout → backup iteration.
//!
//! A walk mutates a working copy of the root gamestate and emits a log of
//! its tree effects. The log is what travels to peers: replaying its
//! `new-node` entries on another worker's tree reproduces this walk's
//! expansions there.

use std::error;
use std::fmt;
use std::hash::Hash;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

use crate::game::{Game, Mover, Outcome, ScoreVec};
use crate::search::policy::{self, HeuristicKind};
use crate::search::tree::{derive_child_id, Node, NodeId, Tree, TreeError, ROOT_ID};
use crate::search::{MctsSetting, RestoreMode};

/// Upper bound on any walk-internal loop. Exceeding it means the game
/// rules do not terminate and is treated as fatal.
pub const MAX_STEPS: usize = 10_000;

#[derive(Clone, Debug)]
pub enum WalkEntry<A, P> {
    /// A rules mutation applied during selection or simulation. Local
    /// bookkeeping only, used to restore the working gamestate; never
    /// broadcast.
    TakeAction { action: A },
    /// Emitted once per node creation.
    NewNode {
        id: NodeId,
        parent: NodeId,
        action: A,
    },
    /// Emitted once per walk, after backup.
    WalkResult { score: ScoreVec<P> },
}

impl<A: PartialEq, P: Eq + Hash> PartialEq for WalkEntry<A, P> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                WalkEntry::TakeAction { action: a },
                WalkEntry::TakeAction { action: b },
            ) => a == b,
            (
                WalkEntry::NewNode {
                    id: id_a,
                    parent: parent_a,
                    action: action_a,
                },
                WalkEntry::NewNode {
                    id: id_b,
                    parent: parent_b,
                    action: action_b,
                },
            ) => id_a == id_b && parent_a == parent_b && action_a == action_b,
            (
                WalkEntry::WalkResult { score: score_a },
                WalkEntry::WalkResult { score: score_b },
            ) => score_a == score_b,
            _ => false,
        }
    }
}

pub type WalkLog<A, P> = Vec<WalkEntry<A, P>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalkError {
    /// A freshly derived child id already exists under a different parent.
    IdCollision {
        id: NodeId,
        existing_parent: Option<NodeId>,
        new_parent: Option<NodeId>,
    },
}

impl fmt::Display for WalkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WalkError::IdCollision {
                id,
                existing_parent,
                new_parent,
            } => write!(
                f,
                "node id collision: {} exists under parent {:?}, re-derived under {:?}",
                id, existing_parent, new_parent
            ),
        }
    }
}

impl error::Error for WalkError {}

impl From<TreeError> for WalkError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::ParentMismatch {
                id,
                existing_parent,
                new_parent,
            } => WalkError::IdCollision {
                id,
                existing_parent,
                new_parent,
            },
        }
    }
}

/// Run one walk. On success the tree has absorbed the walk's statistics
/// and `working` equals `root_state` again.
pub(crate) fn run_walk<G: Game>(
    tree: &mut Tree<G::Action, G::Player>,
    root_state: &G::State,
    working: &mut G::State,
    players: &[G::Player],
    settings: &MctsSetting<G>,
    rng: &mut SmallRng,
) -> Result<WalkLog<G::Action, G::Player>, WalkError> {
    let mut log = Vec::new();

    let leaf = select::<G>(tree, working, players, settings, rng, &mut log)?;

    let score = rollout::<G>(working, players, settings, rng, &mut log);
    validate_score_vec(&score, players);

    backup(tree, leaf, &score);
    log.push(WalkEntry::WalkResult { score });

    restore::<G>(root_state, working, settings, &log);
    debug_assert!(
        *working == *root_state,
        "working gamestate differs from root after restoration"
    );

    Ok(log)
}

/// Tree policy: descend from the root until reaching a node to roll out
/// from. Expands the first node the local engine has not expanded yet.
fn select<G: Game>(
    tree: &mut Tree<G::Action, G::Player>,
    working: &mut G::State,
    players: &[G::Player],
    settings: &MctsSetting<G>,
    rng: &mut SmallRng,
    log: &mut WalkLog<G::Action, G::Player>,
) -> Result<NodeId, WalkError> {
    let mut node_id = ROOT_ID;
    for _ in 0..MAX_STEPS {
        let expanded = tree
            .get(node_id)
            .unwrap_or_else(|| panic!("selection reached node {} missing from tree", node_id))
            .expanded;

        if !expanded {
            let created = expand::<G>(tree, node_id, working, players, settings, log)?;
            // Peers may have created every child already; fall back to the
            // full child list, which has the same distribution.
            let pool = if created.is_empty() {
                tree.children(node_id)
                    .map(|children| children.to_vec())
                    .unwrap_or_default()
            } else {
                created
            };
            let (child_id, action) = match pool.choose(rng) {
                Some(chosen) => chosen.clone(),
                None => return Ok(node_id), // terminal, or no legal actions
            };
            apply_action::<G>(working, &action, log);
            return Ok(child_id);
        }

        let children = match tree.children(node_id) {
            Some([]) => return Ok(node_id), // known terminal
            Some(children) => children,
            None => panic!("expanded node {} has no edge entry", node_id),
        };

        let (child_id, action) = match G::mover(working) {
            // Stochastic moves are sampled uniformly, not scored.
            Mover::Environment => children
                .choose(rng)
                .cloned()
                .unwrap_or_else(|| unreachable!("children checked non-empty")),
            Mover::Player(perspective) => {
                let parent = tree
                    .get(node_id)
                    .unwrap_or_else(|| panic!("node {} missing from tree", node_id));
                let n_siblings = children.len() - 1;
                let mut best: Option<(NodeId, &G::Action)> = None;
                let mut best_score = f64::NEG_INFINITY;
                for (child_id, action) in children {
                    let child = tree.get(*child_id).unwrap_or_else(|| {
                        panic!("edge references node {} missing from tree", child_id)
                    });
                    let score = policy::ucb(
                        settings.heuristic_kind,
                        settings.exploration,
                        parent,
                        child,
                        n_siblings,
                        perspective,
                    );
                    // Strict comparison keeps the first maximum: ties break
                    // in insertion order.
                    if score > best_score {
                        best_score = score;
                        best = Some((*child_id, action));
                    }
                }
                let (child_id, action) =
                    best.unwrap_or_else(|| unreachable!("children checked non-empty"));
                (child_id, action.clone())
            }
        };

        apply_action::<G>(working, &action, log);
        node_id = child_id;
    }
    panic!(
        "selection exceeded {} steps; the game rules are likely non-terminating",
        MAX_STEPS
    )
}

/// Create children for every legal action of `node_id`. Children a peer
/// already merged are kept (their heuristic seed is backfilled, since the
/// wire does not carry seeds). Returns the locally created children.
fn expand<G: Game>(
    tree: &mut Tree<G::Action, G::Player>,
    node_id: NodeId,
    working: &G::State,
    players: &[G::Player],
    settings: &MctsSetting<G>,
    log: &mut WalkLog<G::Action, G::Player>,
) -> Result<Vec<(NodeId, G::Action)>, WalkError> {
    {
        let node = tree
            .get_mut(node_id)
            .unwrap_or_else(|| panic!("expanding node {} missing from tree", node_id));
        debug_assert!(!node.expanded, "node {} expanded twice", node_id);
        node.expanded = true;
    }
    tree.ensure_edges(node_id);

    if G::outcome(working).is_some() {
        // Stays childless; recognised as terminal on the next visit.
        return Ok(Vec::new());
    }

    // The heuristic sees the parent state, so every child of this node gets
    // the same seed.
    let seed = match settings.heuristic_kind {
        HeuristicKind::None => None,
        HeuristicKind::PreVisit | HeuristicKind::Simple => {
            settings.heuristic.map(|h| (5.0 * h(working), 5))
        }
    };

    let mut created = Vec::new();
    for action in G::legal_actions(working) {
        let encoded = G::encode_action(&action);
        let child_id = derive_child_id(node_id, &encoded);
        let mut node = Node::new(child_id, Some(node_id), players);
        node.heuristic_seed = seed;
        match tree.insert_node(node) {
            Ok(true) => {
                tree.append_edge(node_id, child_id, action.clone());
                log.push(WalkEntry::NewNode {
                    id: child_id,
                    parent: node_id,
                    action: action.clone(),
                });
                created.push((child_id, action));
            }
            Ok(false) => {
                if let Some(existing) = tree.get_mut(child_id) {
                    if existing.heuristic_seed.is_none() {
                        existing.heuristic_seed = seed;
                    }
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(created)
}

fn apply_action<G: Game>(
    working: &mut G::State,
    action: &G::Action,
    log: &mut WalkLog<G::Action, G::Player>,
) {
    let applied = G::take_action(working, action);
    assert!(
        applied,
        "action {:?} from legal_actions was rejected by the rules",
        action
    );
    log.push(WalkEntry::TakeAction {
        action: action.clone(),
    });
}

fn rollout<G: Game>(
    working: &mut G::State,
    players: &[G::Player],
    settings: &MctsSetting<G>,
    rng: &mut SmallRng,
    log: &mut WalkLog<G::Action, G::Player>,
) -> ScoreVec<G::Player> {
    if let Some(rollout_policy) = settings.rollout_policy {
        return rollout_policy(working, rng);
    }
    simulate::<G>(working, players, rng, log)
}

/// Uniformly random playout to a terminal state.
fn simulate<G: Game>(
    working: &mut G::State,
    players: &[G::Player],
    rng: &mut SmallRng,
    log: &mut WalkLog<G::Action, G::Player>,
) -> ScoreVec<G::Player> {
    for _ in 0..MAX_STEPS {
        match G::outcome(working) {
            Some(outcome) => return terminal_score::<G>(working, players, outcome),
            None => {
                let action = G::random_action(working, rng).unwrap_or_else(|| {
                    panic!("no random action available on a non-terminal state")
                });
                apply_action::<G>(working, &action, log);
            }
        }
    }
    panic!(
        "simulation exceeded {} steps; the game rules are likely non-terminating",
        MAX_STEPS
    )
}

fn terminal_score<G: Game>(
    working: &G::State,
    players: &[G::Player],
    outcome: Outcome<G::Player>,
) -> ScoreVec<G::Player> {
    match G::final_score(working) {
        Some(score) => score,
        None => outcome.score_vec(players),
    }
}

/// Add the walk's score to every node from the leaf up to the root.
fn backup<A: Clone + PartialEq, P: Copy + Eq + Hash>(
    tree: &mut Tree<A, P>,
    leaf: NodeId,
    delta: &ScoreVec<P>,
) {
    let mut current = Some(leaf);
    let mut steps = 0;
    while let Some(id) = current {
        steps += 1;
        assert!(
            steps <= MAX_STEPS,
            "backup exceeded {} steps; parent links form a cycle",
            MAX_STEPS
        );
        let node = tree
            .get_mut(id)
            .unwrap_or_else(|| panic!("backup reached node {} missing from tree", id));
        node.visits += 1;
        for (player, value) in delta {
            *node.score.entry(*player).or_insert(0.0) += value;
        }
        current = node.parent;
    }
}

fn validate_score_vec<P: Copy + Eq + Hash + fmt::Debug>(score: &ScoreVec<P>, players: &[P]) {
    assert_eq!(
        score.len(),
        players.len(),
        "score vector key count {} does not match player set size {}",
        score.len(),
        players.len()
    );
    for player in players {
        let value = score
            .get(player)
            .unwrap_or_else(|| panic!("score vector missing player {:?}", player));
        assert!(
            (0.0..=1.0).contains(value),
            "score {} for player {:?} outside [0, 1]",
            value,
            player
        );
    }
}

fn restore<G: Game>(
    root_state: &G::State,
    working: &mut G::State,
    settings: &MctsSetting<G>,
    log: &WalkLog<G::Action, G::Player>,
) {
    match settings.restore {
        RestoreMode::Copy => working.clone_from(root_state),
        RestoreMode::Undo => {
            for entry in log.iter().rev() {
                if let WalkEntry::TakeAction { action } = entry {
                    G::undo_action(working, action);
                }
            }
        }
    }
}
