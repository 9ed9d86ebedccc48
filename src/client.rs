//! Agents, and the client side of the worker farm.

use std::error;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::broker::{Broker, ChannelSubscription, MemoryBroker};
use crate::game::{DecodeError, Game};
use crate::search::{Engine, MctsSetting, WalkError};
use crate::server;
use crate::wire::{self, ActionReply, Command};

pub const AGENT_TYPES: &[&str] = &["random", "mcts-local", "mcts-distributed"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentKind {
    Random,
    MctsLocal,
    MctsDistributed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownAgentError(pub String);

impl fmt::Display for UnknownAgentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "unknown agent type {:?}, expected one of {}",
            self.0,
            AGENT_TYPES.join(", ")
        )
    }
}

impl error::Error for UnknownAgentError {}

impl FromStr for AgentKind {
    type Err = UnknownAgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(AgentKind::Random),
            "mcts-local" => Ok(AgentKind::MctsLocal),
            "mcts-distributed" => Ok(AgentKind::MctsDistributed),
            other => Err(UnknownAgentError(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AgentError {
    /// The agent had no action to offer on a non-terminal state.
    NoAction,
    Walk(WalkError),
    Farm(FarmError),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AgentError::NoAction => write!(f, "agent found no action"),
            AgentError::Walk(err) => write!(f, "search failed: {}", err),
            AgentError::Farm(err) => write!(f, "farm request failed: {}", err),
        }
    }
}

impl error::Error for AgentError {}

impl From<WalkError> for AgentError {
    fn from(err: WalkError) -> Self {
        AgentError::Walk(err)
    }
}

impl From<FarmError> for AgentError {
    fn from(err: FarmError) -> Self {
        AgentError::Farm(err)
    }
}

/// A move supplier for one seat at the table.
pub enum Agent<G: Game> {
    Random,
    MctsLocal { settings: MctsSetting<G> },
    MctsDistributed { farm: Farm, timeout: Duration },
}

impl<G: Game> Agent<G> {
    pub fn from_kind(
        kind: AgentKind,
        settings: MctsSetting<G>,
        n_workers: usize,
        timeout: Duration,
    ) -> Agent<G> {
        match kind {
            AgentKind::Random => Agent::Random,
            AgentKind::MctsLocal => Agent::MctsLocal { settings },
            AgentKind::MctsDistributed => Agent::MctsDistributed {
                farm: Farm::launch(n_workers),
                timeout,
            },
        }
    }

    pub fn choose(&mut self, state: &G::State, rng: &mut SmallRng) -> Result<G::Action, AgentError> {
        match self {
            Agent::Random => G::random_action(state, rng).ok_or(AgentError::NoAction),
            Agent::MctsLocal { settings } => {
                let mut engine = Engine::new(state.clone(), *settings);
                engine.ponder()?.ok_or(AgentError::NoAction)
            }
            Agent::MctsDistributed { farm, timeout } => {
                Ok(farm.request_action::<G>(state, *timeout)?)
            }
        }
    }

    /// Release any resources held by the agent (worker threads, for the
    /// distributed kind).
    pub fn shutdown(self) {
        if let Agent::MctsDistributed { farm, .. } = self {
            farm.shutdown();
        }
    }
}

/// The client's deadline is soft; replies are accumulated until at least
/// `timeout` has passed, extended to this floor if nothing matched yet.
const HARD_CAP_FLOOR: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, Debug, PartialEq)]
pub enum FarmError {
    /// No worker answered for this gamestate before the hard cap.
    Timeout { gamestate_id: u64 },
    BadReply(DecodeError),
}

impl fmt::Display for FarmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FarmError::Timeout { gamestate_id } => {
                write!(f, "no action reply for gamestate {} in time", gamestate_id)
            }
            FarmError::BadReply(err) => write!(f, "undecodable action reply: {}", err),
        }
    }
}

impl error::Error for FarmError {}

/// A fleet of in-process engine servers sharing one in-memory broker.
pub struct Farm {
    broker: Arc<MemoryBroker>,
    workers: Vec<thread::JoinHandle<()>>,
    actions: ChannelSubscription,
    rng: SmallRng,
}

impl Farm {
    /// Launch `n_workers` engine servers, each on its own thread.
    pub fn launch(n_workers: usize) -> Farm {
        let broker = Arc::new(MemoryBroker::new());
        let actions = broker.subscribe(wire::ACTIONS_CHANNEL);
        let workers = (0..n_workers)
            .map(|_| server::spawn(Arc::clone(&broker) as Arc<dyn Broker>))
            .collect();
        Farm {
            broker,
            workers,
            actions,
            rng: SmallRng::from_entropy(),
        }
    }

    /// Ask the farm for a move: publish the gamestate under a fresh id,
    /// then collect matching replies for `timeout`, keeping the latest.
    /// The wait extends to `max(timeout, 5 s)` while no reply has matched.
    pub fn request_action<G: Game>(
        &mut self,
        state: &G::State,
        timeout: Duration,
    ) -> Result<G::Action, FarmError> {
        let hard_cap = timeout.max(HARD_CAP_FLOOR);
        self.request_action_within::<G>(state, timeout, hard_cap)
    }

    /// Deadline-explicit variant of [`Farm::request_action`].
    pub fn request_action_within<G: Game>(
        &mut self,
        state: &G::State,
        timeout: Duration,
        hard_cap: Duration,
    ) -> Result<G::Action, FarmError> {
        let gamestate_id = self.rng.gen::<u64>();
        let encoded = String::from_utf8(G::encode_gamestate(state))
            .expect("gamestate encoding must be valid UTF-8 for the wire");
        let command = Command::NewGamestate {
            game_type: G::NAME.to_string(),
            gamestate_id,
            gamestate: encoded,
        };
        debug!("requesting action for gamestate {}", gamestate_id);
        if let Err(err) = self
            .broker
            .publish(wire::COMMANDS_CHANNEL, wire::encode(&command))
        {
            warn!("failed to publish new-gamestate: {}", err);
        }

        let start = Instant::now();
        let mut latest: Option<String> = None;
        loop {
            while let Some(payload) = self.actions.try_recv() {
                match wire::decode::<ActionReply>(&payload) {
                    Ok(reply) if reply.gamestate_id == gamestate_id => {
                        latest = Some(reply.best_move)
                    }
                    Ok(_) => {} // a previous request's reply
                    Err(err) => warn!("dropping malformed action reply: {}", err),
                }
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout && latest.is_some() {
                break;
            }
            if elapsed >= hard_cap {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        match latest {
            Some(best_move) => G::decode_action(&best_move).map_err(FarmError::BadReply),
            None => Err(FarmError::Timeout { gamestate_id }),
        }
    }

    /// Stop the workers and wait for their threads.
    pub fn shutdown(self) {
        if let Err(err) = self
            .broker
            .publish(wire::COMMANDS_CHANNEL, wire::encode(&Command::Stop))
        {
            debug!("failed to publish stop during shutdown: {}", err);
        }
        self.broker.shutdown();
        for worker in self.workers {
            if worker.join().is_err() {
                warn!("engineserver thread panicked");
            }
        }
    }
}
