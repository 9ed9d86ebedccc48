//! The seam between the search core and concrete game rules.
//!
//! The engine never inspects gamestates or actions; it moves them around as
//! opaque values and calls back into a [`Game`] implementation for every
//! rules question. Implementations for the built-in games live in
//! [`crate::games`].

use std::collections::HashMap;
use std::error;
use std::fmt;
use std::hash::Hash;

use rand::rngs::SmallRng;

/// Identity of whoever moves next in a gamestate: a named player, or the
/// environment making a stochastic move (e.g. a tile spawn in 2048).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mover<P> {
    Player(P),
    Environment,
}

/// Result of a finished game.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome<P> {
    Winner(P),
    Draw,
}

/// Each player's share of a walk's outcome, in `[0, 1]` per component.
pub type ScoreVec<P> = HashMap<P, f64>;

impl<P: Copy + Eq + Hash> Outcome<P> {
    /// Score vector derived from a win/loss/draw outcome: win 1, loss 0,
    /// draw 0.5. Used when the game provides no `final_score`.
    pub fn score_vec(&self, players: &[P]) -> ScoreVec<P> {
        players
            .iter()
            .map(|&p| {
                let score = match self {
                    Outcome::Winner(w) if *w == p => 1.0,
                    Outcome::Winner(_) => 0.0,
                    Outcome::Draw => 0.5,
                };
                (p, score)
            })
            .collect()
    }
}

/// Failure to decode an action, player or gamestate from its wire encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeError(pub String);

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "decode error: {}", self.0)
    }
}

impl error::Error for DecodeError {}

/// Rules of a turn-based game, as capabilities over opaque state/action
/// values.
///
/// The contract the search relies on:
/// - `legal_actions` is empty iff `outcome` is `Some` or the mover is
///   genuinely stuck;
/// - every action returned by `legal_actions` is accepted by
///   `take_action`;
/// - `encode_action` round-trips through `decode_action`, and the encoding
///   is stable across processes (node ids are derived from it);
/// - `undo_action` reverses the matching `take_action` exactly, and is only
///   called when `SUPPORTS_UNDO` is true.
pub trait Game: 'static {
    type State: Clone + PartialEq + fmt::Debug + Send;
    type Action: Clone + PartialEq + fmt::Debug + Send;
    type Player: Copy + Eq + Hash + fmt::Debug + Send;

    /// Game-type string used by the registry and the wire protocol.
    const NAME: &'static str;

    /// Whether `undo_action` is implemented.
    const SUPPORTS_UNDO: bool = false;

    fn init_game(rng: &mut SmallRng) -> Self::State;

    /// The game's fixed player set, in a stable order.
    fn players() -> Vec<Self::Player>;

    fn mover(state: &Self::State) -> Mover<Self::Player>;

    /// Apply `action` to `state` in place. Returns false, leaving the state
    /// untouched, if the action is invalid.
    fn take_action(state: &mut Self::State, action: &Self::Action) -> bool;

    fn undo_action(_state: &mut Self::State, _action: &Self::Action) {
        unreachable!("{} does not support undo", Self::NAME)
    }

    fn legal_actions(state: &Self::State) -> Vec<Self::Action>;

    fn outcome(state: &Self::State) -> Option<Outcome<Self::Player>>;

    /// Continuous terminal score, if the game defines one. Values must lie
    /// in `[0, 1]` and cover the whole player set.
    fn final_score(_state: &Self::State) -> Option<ScoreVec<Self::Player>> {
        None
    }

    /// A uniformly random legal action, or None if there is none. Games may
    /// implement this more cheaply than enumerating `legal_actions`.
    fn random_action(state: &Self::State, rng: &mut SmallRng) -> Option<Self::Action>;

    fn encode_action(action: &Self::Action) -> String;
    fn decode_action(s: &str) -> Result<Self::Action, DecodeError>;

    fn encode_player(player: Self::Player) -> String;
    fn decode_player(s: &str) -> Result<Self::Player, DecodeError>;

    fn encode_gamestate(state: &Self::State) -> Vec<u8>;
    fn decode_gamestate(bytes: &[u8]) -> Result<Self::State, DecodeError>;

    /// Human-readable rendering for game records and logs.
    fn format_gamestate(state: &Self::State) -> String;
}
