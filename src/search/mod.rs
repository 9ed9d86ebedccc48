//! Monte Carlo Tree Search over a generic game.
//!
//! This module contains the public-facing convenience API for the search.
//! The tree itself lives in [`tree`], the selection scoring in [`policy`]
//! and the walk procedure in [`walk`].

use std::error;
use std::fmt;
use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::game::{DecodeError, Game, Mover, ScoreVec};
use crate::wire::WalkEvent;

pub mod policy;
pub mod tree;
pub mod walk;

pub use policy::{HeuristicKind, DEFAULT_EXPLORATION};
pub use tree::{Node, NodeId, Tree, ROOT_ID};
pub use walk::{WalkEntry, WalkError, WalkLog, MAX_STEPS};

use tree::derive_child_id;

/// How the working gamestate is restored to the root after each walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RestoreMode {
    /// Re-copy the root gamestate. Always available.
    #[default]
    Copy,
    /// Replay the walk's actions in reverse through the game's undo.
    /// Cheaper when the rules provide it.
    Undo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchBudget {
    Walks(u64),
    Time(Duration),
}

/// Search configuration. Optional game capabilities (heuristic, rollout
/// policy) travel here as plain function pointers, next to the knobs that
/// shape how they are used.
pub struct MctsSetting<G: Game> {
    pub(crate) heuristic_kind: HeuristicKind,
    pub(crate) heuristic: Option<fn(&G::State) -> f64>,
    pub(crate) rollout_policy: Option<fn(&G::State, &mut SmallRng) -> ScoreVec<G::Player>>,
    pub(crate) restore: RestoreMode,
    pub(crate) exploration: f64,
    pub(crate) budget: SearchBudget,
}

impl<G: Game> Default for MctsSetting<G> {
    fn default() -> Self {
        MctsSetting {
            heuristic_kind: HeuristicKind::None,
            heuristic: None,
            rollout_policy: None,
            restore: RestoreMode::Copy,
            exploration: DEFAULT_EXPLORATION,
            budget: SearchBudget::Walks(1000),
        }
    }
}

impl<G: Game> Clone for MctsSetting<G> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<G: Game> Copy for MctsSetting<G> {}

impl<G: Game> MctsSetting<G> {
    pub fn add_heuristic(mut self, kind: HeuristicKind, heuristic: fn(&G::State) -> f64) -> Self {
        self.heuristic_kind = kind;
        self.heuristic = Some(heuristic);
        self
    }

    pub fn add_rollout_policy(
        mut self,
        rollout_policy: fn(&G::State, &mut SmallRng) -> ScoreVec<G::Player>,
    ) -> Self {
        self.rollout_policy = Some(rollout_policy);
        self
    }

    /// Restore the working gamestate by undoing moves instead of copying.
    pub fn add_undo(mut self) -> Self {
        self.restore = RestoreMode::Undo;
        self
    }

    pub fn add_exploration_constant(mut self, c: f64) -> Self {
        self.exploration = c;
        self
    }

    pub fn add_budget(mut self, budget: SearchBudget) -> Self {
        self.budget = budget;
        self
    }
}

/// Failure to absorb a peer's walk-log entry into the local tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyError {
    BadAction(DecodeError),
    /// The entry references a parent this tree has never seen.
    UnknownParent { id: NodeId, parent: NodeId },
    /// The id exists locally under a different parent: hash collision or
    /// corrupt stream.
    ParentMismatch {
        id: NodeId,
        existing_parent: Option<NodeId>,
        wire_parent: NodeId,
    },
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApplyError::BadAction(err) => write!(f, "bad action in peer entry: {}", err),
            ApplyError::UnknownParent { id, parent } => {
                write!(f, "peer node {} references unknown parent {}", id, parent)
            }
            ApplyError::ParentMismatch {
                id,
                existing_parent,
                wire_parent,
            } => write!(
                f,
                "peer node {} claims parent {}, but it exists locally under {:?}",
                id, wire_parent, existing_parent
            ),
        }
    }
}

impl error::Error for ApplyError {}

/// Holds the root gamestate and the search tree; runs walks and picks the
/// final action. One engine serves exactly one gamestate.
pub struct Engine<G: Game> {
    root_state: G::State,
    working: G::State,
    tree: Tree<G::Action, G::Player>,
    players: Vec<G::Player>,
    settings: MctsSetting<G>,
    rng: SmallRng,
    walks: u64,
}

impl<G: Game> Engine<G> {
    pub fn new(root_state: G::State, settings: MctsSetting<G>) -> Self {
        Self::from_rng(root_state, settings, SmallRng::from_entropy())
    }

    /// Deterministic construction for reproducible searches.
    pub fn from_seed(root_state: G::State, settings: MctsSetting<G>, seed: u64) -> Self {
        Self::from_rng(root_state, settings, SmallRng::seed_from_u64(seed))
    }

    fn from_rng(root_state: G::State, settings: MctsSetting<G>, rng: SmallRng) -> Self {
        assert!(
            settings.heuristic_kind == HeuristicKind::None || settings.heuristic.is_some(),
            "heuristic kind {:?} configured without a heuristic function",
            settings.heuristic_kind
        );
        assert!(
            settings.restore == RestoreMode::Copy || G::SUPPORTS_UNDO,
            "undo restoration configured, but {} does not support undo",
            G::NAME
        );
        let players = G::players();
        let tree = Tree::new(&players);
        let working = root_state.clone();
        Engine {
            root_state,
            working,
            tree,
            players,
            settings,
            rng,
            walks: 0,
        }
    }

    /// Run one walk, returning its log.
    pub fn run_walk(&mut self) -> Result<WalkLog<G::Action, G::Player>, WalkError> {
        match walk::run_walk::<G>(
            &mut self.tree,
            &self.root_state,
            &mut self.working,
            &self.players,
            &self.settings,
            &mut self.rng,
        ) {
            Ok(log) => {
                self.walks += 1;
                Ok(log)
            }
            Err(err) => {
                // The walk aborted mid-descent; put the working state back
                // before the caller decides what to do with the engine.
                self.working.clone_from(&self.root_state);
                Err(err)
            }
        }
    }

    /// Run a batch of walks, returning one log per walk.
    pub fn run_walks(&mut self, n: usize) -> Result<Vec<WalkLog<G::Action, G::Player>>, WalkError> {
        let mut logs = Vec::with_capacity(n);
        for _ in 0..n {
            logs.push(self.run_walk()?);
        }
        Ok(logs)
    }

    /// Exhaust the configured budget, then pick the final action.
    pub fn ponder(&mut self) -> Result<Option<G::Action>, WalkError> {
        match self.settings.budget {
            SearchBudget::Walks(n) => {
                for _ in 0..n {
                    self.run_walk()?;
                }
            }
            SearchBudget::Time(duration) => {
                let start = Instant::now();
                while start.elapsed() < duration {
                    self.run_walk()?;
                }
            }
        }
        Ok(self.best_action())
    }

    /// The action below the root with the best mean score for the root
    /// mover, among visited children. Ties break in insertion order.
    pub fn best_action(&self) -> Option<G::Action> {
        let root_mover = match G::mover(&self.root_state) {
            Mover::Player(player) => player,
            Mover::Environment => return None,
        };
        let children = self.tree.children(ROOT_ID)?;
        let mut best: Option<&G::Action> = None;
        let mut best_score = f64::NEG_INFINITY;
        for (child_id, action) in children {
            let child = self
                .tree
                .get(*child_id)
                .unwrap_or_else(|| panic!("edge references node {} missing from tree", child_id));
            if child.visits == 0 {
                continue;
            }
            let mean = child.mean_score(root_mover);
            if mean > best_score {
                best_score = mean;
                best = Some(action);
            }
        }
        best.cloned()
    }

    /// Merge one entry of a peer's walk log into the local tree.
    ///
    /// `new-node` is idempotent by id; `walk-result` is read but not
    /// applied (remote visit counts are not merged in the current design).
    pub fn apply_remote(&mut self, event: &WalkEvent) -> Result<(), ApplyError> {
        match event {
            WalkEvent::NewNode {
                id,
                parent_id,
                action,
            } => {
                if let Some(existing) = self.tree.get(*id) {
                    if existing.parent != Some(*parent_id) {
                        return Err(ApplyError::ParentMismatch {
                            id: *id,
                            existing_parent: existing.parent,
                            wire_parent: *parent_id,
                        });
                    }
                    return Ok(());
                }
                if !self.tree.contains(*parent_id) {
                    return Err(ApplyError::UnknownParent {
                        id: *id,
                        parent: *parent_id,
                    });
                }
                let action = G::decode_action(action).map_err(ApplyError::BadAction)?;
                debug_assert_eq!(*id, derive_child_id(*parent_id, &G::encode_action(&action)));
                let node = Node::new(*id, Some(*parent_id), &self.players);
                self.tree
                    .insert_node(node)
                    .unwrap_or_else(|err| unreachable!("{}", err));
                self.tree.append_edge(*parent_id, *id, action);
                Ok(())
            }
            WalkEvent::WalkResult { .. } => Ok(()),
        }
    }

    pub fn root_state(&self) -> &G::State {
        &self.root_state
    }

    pub fn tree(&self) -> &Tree<G::Action, G::Player> {
        &self.tree
    }

    /// Number of completed walks. Equals the root's visit count.
    pub fn walks(&self) -> u64 {
        self.walks
    }
}

/// The simplest way to use the search: run `n_walks` walks from
/// `root_state` and return the chosen action.
pub fn mcts<G: Game>(
    root_state: G::State,
    settings: MctsSetting<G>,
    n_walks: u64,
) -> Result<Option<G::Action>, WalkError> {
    let mut engine = Engine::new(root_state, settings);
    for _ in 0..n_walks {
        engine.run_walk()?;
    }
    Ok(engine.best_action())
}
