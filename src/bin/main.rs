use std::fs::File;
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use canopy::client::{Agent, AgentKind};
use canopy::game::{Game, Mover};
use canopy::games::connect4::{self, Connect4};
use canopy::games::t2048::{self, T2048};
use canopy::games::GAME_TYPES;
use canopy::search::{HeuristicKind, MctsSetting, SearchBudget};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Play a game between agents, locally or against a worker farm.
#[derive(Parser)]
#[command(name = "canopy")]
struct Args {
    /// Game type: connect4 or 2048
    game_type: String,

    /// One agent per player: random, mcts-local or mcts-distributed
    #[arg(required = true)]
    agents: Vec<String>,

    /// Seed the game and the agents for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Walks per mcts-local move
    #[arg(long, default_value_t = 1000)]
    walks: u64,

    /// Worker threads per mcts-distributed agent
    #[arg(long, default_value_t = 2, env = "CANOPY_WORKERS")]
    workers: usize,

    /// Seconds an mcts-distributed agent waits for replies
    #[arg(long, default_value_t = 2)]
    timeout: u64,

    /// UCB heuristic for connect4: none, pre-visit or simple
    #[arg(long, default_value = "none")]
    heuristic: String,

    /// Where the game record goes ("-" for stdout)
    #[arg(long, default_value = "-", conflicts_with = "no_file")]
    file: String,

    /// Suppress the game record entirely
    #[arg(long)]
    no_file: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.game_type.as_str() {
        Connect4::NAME => {
            let mut settings = MctsSetting::default().add_budget(SearchBudget::Walks(args.walks));
            match args.heuristic.as_str() {
                "none" => {}
                "pre-visit" => {
                    settings = settings.add_heuristic(HeuristicKind::PreVisit, connect4::heuristic)
                }
                "simple" => {
                    settings = settings.add_heuristic(HeuristicKind::Simple, connect4::heuristic)
                }
                other => {
                    eprintln!("Unknown heuristic {:?}", other);
                    return ExitCode::FAILURE;
                }
            }
            play::<Connect4>(&args, settings)
        }
        T2048::NAME => {
            let settings = MctsSetting::default()
                .add_budget(SearchBudget::Walks(args.walks))
                .add_rollout_policy(t2048::rollout_score);
            play::<T2048>(&args, settings)
        }
        other => {
            eprintln!(
                "Unknown game type {:?}, expected one of {}",
                other,
                GAME_TYPES.join(", ")
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr())
        .apply()
        .expect("logger initialized twice");
}

fn play<G: Game>(args: &Args, settings: MctsSetting<G>) -> ExitCode {
    let mut rng = match args.seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    };

    let mut output: Option<Box<dyn Write>> = if args.no_file {
        None
    } else if args.file == "-" {
        Some(Box::new(io::stdout()))
    } else {
        match File::create(&args.file) {
            Ok(file) => Some(Box::new(file)),
            Err(err) => {
                eprintln!("Cannot open {:?}: {}", args.file, err);
                return ExitCode::FAILURE;
            }
        }
    };

    let players = G::players();
    if args.agents.len() != players.len() {
        eprintln!(
            "{} has {} players, got {} agents",
            G::NAME,
            players.len(),
            args.agents.len()
        );
        return ExitCode::FAILURE;
    }
    let mut agents: Vec<Agent<G>> = Vec::with_capacity(args.agents.len());
    for name in &args.agents {
        let kind: AgentKind = match name.parse() {
            Ok(kind) => kind,
            Err(err) => {
                eprintln!("{}", err);
                return ExitCode::FAILURE;
            }
        };
        agents.push(Agent::from_kind(
            kind,
            settings,
            args.workers,
            Duration::from_secs(args.timeout),
        ));
    }

    let mut state = G::init_game(&mut rng);
    let exit = loop {
        if let Some(out) = output.as_mut() {
            let _ = writeln!(out, "{}", G::format_gamestate(&state));
        }

        if let Some(outcome) = G::outcome(&state) {
            if let Some(out) = output.as_mut() {
                let _ = writeln!(out, "Game over: {:?}", outcome);
            }
            info!("game over: {:?}", outcome);
            break ExitCode::SUCCESS;
        }

        let action = match G::mover(&state) {
            Mover::Environment => match G::random_action(&state, &mut rng) {
                Some(action) => action,
                None => {
                    error!("environment has no action on a non-terminal state");
                    break ExitCode::FAILURE;
                }
            },
            Mover::Player(player) => {
                let seat = players
                    .iter()
                    .position(|&p| p == player)
                    .expect("mover not in the player set");
                match agents[seat].choose(&state, &mut rng) {
                    Ok(action) => action,
                    Err(err) => {
                        error!("agent {} failed: {}", args.agents[seat], err);
                        break ExitCode::FAILURE;
                    }
                }
            }
        };

        if let Some(out) = output.as_mut() {
            let _ = writeln!(out, "> {}", G::encode_action(&action));
        }
        if !G::take_action(&mut state, &action) {
            error!("agent returned invalid action {:?}", action);
            break ExitCode::FAILURE;
        }
    };

    for agent in agents {
        agent.shutdown();
    }
    exit
}
