//! The engine server: one worker process in the farm.
//!
//! A background task reads broker commands into a bounded queue; the
//! control loop pops commands (blocking only while idle), runs small walk
//! batches on the active engine, broadcasts the resulting walk events and
//! folds peers' events back in. Workers hold no state between gamestates:
//! a `new-gamestate` command atomically replaces the active engine.

use std::sync::Arc;
use std::thread;

use log::{debug, error, info, warn};
use rand::Rng;

use crate::broker::{Broker, StreamReader};
use crate::game::Game;
use crate::games::connect4::{self, Connect4};
use crate::games::t2048::{self, T2048};
use crate::search::{Engine, HeuristicKind, MctsSetting, WalkError};
use crate::wire::{self, ActionReply, Command, EngineOptions, StreamEnvelope};

/// Walks per loop iteration. Small batches keep the broadcast and the
/// peer consumption fresh; the worker never blocks inside a batch.
pub const N_WALK_BATCH: usize = 25;

/// Capacity of the queue between the command-reader task and the loop.
const COMMAND_QUEUE_CAPACITY: usize = 64;

struct Search<G: Game> {
    gamestate_id: u64,
    engine: Engine<G>,
    walk_batch: usize,
}

enum ActiveSearch {
    Connect4(Search<Connect4>),
    T2048(Search<T2048>),
}

pub struct EngineServer {
    broker: Arc<dyn Broker>,
    engineserver_id: u32,
    commands: async_channel::Receiver<Command>,
    reader_handle: thread::JoinHandle<()>,
    reader: StreamReader,
    options: EngineOptions,
    active: Option<ActiveSearch>,
}

impl EngineServer {
    /// Construct a worker with a random 32-bit id.
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        let engineserver_id = rand::thread_rng().gen();
        Self::with_id(broker, engineserver_id)
    }

    pub fn with_id(broker: Arc<dyn Broker>, engineserver_id: u32) -> Self {
        let subscription = broker.subscribe(wire::COMMANDS_CHANNEL);
        let (sender, receiver) = async_channel::bounded(COMMAND_QUEUE_CAPACITY);
        // Decode on the reader task so the loop only sees well-formed
        // commands; malformed payloads must not poison the stream.
        let reader_handle = thread::spawn(move || {
            while let Some(payload) = subscription.recv_blocking() {
                match wire::decode::<Command>(&payload) {
                    Ok(command) => {
                        if sender.send_blocking(command).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!("dropping malformed command: {}", err),
                }
            }
        });
        EngineServer {
            broker,
            engineserver_id,
            commands: receiver,
            reader_handle,
            reader: StreamReader::new(),
            options: EngineOptions::default(),
            active: None,
        }
    }

    pub fn engineserver_id(&self) -> u32 {
        self.engineserver_id
    }

    /// Run until the commands channel shuts down.
    pub fn serve(mut self) {
        info!("engineserver {} serving", self.engineserver_id);
        loop {
            let command = if self.active.is_none() {
                match self.commands.recv_blocking() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                }
            } else {
                match self.commands.try_recv() {
                    Ok(command) => Some(command),
                    Err(async_channel::TryRecvError::Empty) => None,
                    Err(async_channel::TryRecvError::Closed) => break,
                }
            };
            if let Some(command) = command {
                self.dispatch(command);
            }

            let result = match self.active.as_mut() {
                Some(ActiveSearch::Connect4(search)) => step_search(
                    search,
                    self.broker.as_ref(),
                    &mut self.reader,
                    self.engineserver_id,
                ),
                Some(ActiveSearch::T2048(search)) => step_search(
                    search,
                    self.broker.as_ref(),
                    &mut self.reader,
                    self.engineserver_id,
                ),
                None => Ok(()),
            };
            if let Err(err) = result {
                // Workers are stateless between gamestates: abort this
                // search and wait for the client to reissue.
                error!("search aborted: {}", err);
                self.active = None;
            }
        }
        info!("engineserver {} shutting down", self.engineserver_id);
        let EngineServer {
            commands,
            reader_handle,
            ..
        } = self;
        drop(commands);
        if reader_handle.join().is_err() {
            warn!("command reader task panicked");
        }
    }

    fn dispatch(&mut self, command: Command) {
        match command {
            Command::NewGamestate {
                game_type,
                gamestate_id,
                gamestate,
            } => match game_type.as_str() {
                Connect4::NAME => {
                    let settings = connect4_settings(&self.options);
                    self.active =
                        start_search(gamestate_id, &gamestate, settings, &self.options)
                            .map(ActiveSearch::Connect4);
                }
                T2048::NAME => {
                    let settings = t2048_settings(&self.options);
                    self.active =
                        start_search(gamestate_id, &gamestate, settings, &self.options)
                            .map(ActiveSearch::T2048);
                }
                unknown => warn!("unknown game type {:?} in new-gamestate, skipping", unknown),
            },
            Command::NewConfig { config } => {
                debug!("new config: {:?}", config);
                self.options = config;
            }
            Command::Stop => {
                debug!("stop: dropping active search");
                self.active = None;
            }
        }
    }
}

fn start_search<G: Game>(
    gamestate_id: u64,
    encoded: &str,
    settings: MctsSetting<G>,
    options: &EngineOptions,
) -> Option<Search<G>> {
    let state = match G::decode_gamestate(encoded.as_bytes()) {
        Ok(state) => state,
        Err(err) => {
            warn!("dropping new-gamestate {}: {}", gamestate_id, err);
            return None;
        }
    };
    info!("new {} engine for gamestate {}", G::NAME, gamestate_id);
    Some(Search {
        gamestate_id,
        engine: Engine::new(state, settings),
        walk_batch: options.walk_batch.unwrap_or(N_WALK_BATCH),
    })
}

fn connect4_settings(options: &EngineOptions) -> MctsSetting<Connect4> {
    let mut settings = MctsSetting::default().add_undo();
    match options.heuristic_type.as_deref() {
        Some("pre-visit") => {
            settings = settings.add_heuristic(HeuristicKind::PreVisit, connect4::heuristic)
        }
        Some("simple") => {
            settings = settings.add_heuristic(HeuristicKind::Simple, connect4::heuristic)
        }
        Some("none") | None => {}
        Some(other) => warn!("unknown heuristic type {:?}, searching without one", other),
    }
    if let Some(c) = options.exploration_constant {
        settings = settings.add_exploration_constant(c);
    }
    settings
}

fn t2048_settings(options: &EngineOptions) -> MctsSetting<T2048> {
    let mut settings = MctsSetting::default().add_rollout_policy(t2048::rollout_score);
    if let Some(c) = options.exploration_constant {
        settings = settings.add_exploration_constant(c);
    }
    settings
}

/// One loop iteration for an active search: walk batch, broadcast, peer
/// consumption, best-action publication.
fn step_search<G: Game>(
    search: &mut Search<G>,
    broker: &dyn Broker,
    reader: &mut StreamReader,
    engineserver_id: u32,
) -> Result<(), WalkError> {
    let stream = wire::gamestate_stream(search.gamestate_id);

    let logs = search.engine.run_walks(search.walk_batch)?;
    for log in &logs {
        for event in wire::walk_events::<G>(log) {
            let envelope = StreamEnvelope {
                engineserver_id,
                event,
            };
            if let Err(err) = broker.append(&stream, wire::encode(&envelope)) {
                warn!("failed to append walk event: {}", err);
            }
        }
    }

    match reader.read(broker, &stream) {
        Ok(entries) => {
            for payload in entries {
                let envelope: StreamEnvelope = match wire::decode(&payload) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        warn!("dropping malformed stream entry: {}", err);
                        continue;
                    }
                };
                if envelope.engineserver_id == engineserver_id {
                    continue; // our own echo
                }
                if let Err(err) = search.engine.apply_remote(&envelope.event) {
                    // Peer entries are best effort; missing one only slows
                    // convergence.
                    warn!("skipping peer entry: {}", err);
                }
            }
        }
        Err(err) => warn!("failed to read peer stream: {}", err),
    }

    if let Some(best) = search.engine.best_action() {
        let reply = ActionReply {
            gamestate_id: search.gamestate_id,
            best_move: G::encode_action(&best),
        };
        if let Err(err) = broker.publish(wire::ACTIONS_CHANNEL, wire::encode(&reply)) {
            warn!("failed to publish best action: {}", err);
        }
    }

    Ok(())
}

/// Spawn a worker with a random id on its own thread. The command
/// subscription is taken on the caller's thread, so commands published (or
/// a broker shutdown) right after this call cannot slip past the worker.
pub fn spawn(broker: Arc<dyn Broker>) -> thread::JoinHandle<()> {
    let server = EngineServer::new(broker);
    thread::spawn(move || server.serve())
}
