//! JSON wire format shared by workers and clients.
//!
//! Every record is a serde derive with an internal tag, so a consumer can
//! reconstruct the variant from the payload alone. Malformed payloads are a
//! protocol error: log and drop, never poison the stream.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::game::Game;
use crate::search::walk::{WalkEntry, WalkLog};
use crate::search::NodeId;

/// Broadcast channel carrying [`Command`]s to every worker.
pub const COMMANDS_CHANNEL: &str = "commands";

/// Broadcast channel carrying [`ActionReply`]s back to clients.
pub const ACTIONS_CHANNEL: &str = "actions";

/// Name of the ordered stream carrying walk events for one gamestate.
pub fn gamestate_stream(gamestate_id: u64) -> String {
    format!("gamestate-{}", gamestate_id)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command_type", rename_all = "kebab-case")]
pub enum Command {
    /// Start searching a fresh gamestate, replacing any active engine.
    NewGamestate {
        game_type: String,
        gamestate_id: u64,
        /// The game's own `encode_gamestate` output.
        gamestate: String,
    },
    /// Update options applied to engines built by later commands.
    NewConfig { config: EngineOptions },
    /// Drop the active engine and go idle.
    Stop,
}

/// Worker-side search options carried by `new-config`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// `"none"`, `"pre-visit"` or `"simple"`.
    #[serde(default)]
    pub heuristic_type: Option<String>,
    #[serde(default)]
    pub exploration_constant: Option<f64>,
    #[serde(default)]
    pub walk_batch: Option<usize>,
}

/// The shareable subset of a walk log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "kebab-case")]
pub enum WalkEvent {
    NewNode {
        id: NodeId,
        parent_id: NodeId,
        action: String,
    },
    WalkResult { score_vec: HashMap<String, f64> },
}

/// A walk event on a gamestate stream, stamped with its producer so
/// consumers can filter out their own echoes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamEnvelope {
    pub engineserver_id: u32,
    #[serde(flatten)]
    pub event: WalkEvent,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionReply {
    pub gamestate_id: u64,
    pub best_move: String,
}

pub fn encode<T: Serialize>(message: &T) -> String {
    serde_json::to_string(message).expect("wire message serialization cannot fail")
}

pub fn decode<'a, T: Deserialize<'a>>(payload: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Project a walk log onto the wire. `take-action` entries are local
/// restoration bookkeeping and stay home.
pub fn walk_events<G: Game>(log: &WalkLog<G::Action, G::Player>) -> Vec<WalkEvent> {
    log.iter()
        .filter_map(|entry| match entry {
            WalkEntry::TakeAction { .. } => None,
            WalkEntry::NewNode { id, parent, action } => Some(WalkEvent::NewNode {
                id: *id,
                parent_id: *parent,
                action: G::encode_action(action),
            }),
            WalkEntry::WalkResult { score } => Some(WalkEvent::WalkResult {
                score_vec: score
                    .iter()
                    .map(|(player, value)| (G::encode_player(*player), *value))
                    .collect(),
            }),
        })
        .collect()
}
