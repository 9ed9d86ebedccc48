//! A distributed Monte Carlo Tree Search engine, generic over turn-based
//! games.
//!
//! A single engine grows a statistical search tree for one gamestate;
//! a farm of engine servers grows the same tree cooperatively by trading
//! incremental walk logs over a pub/sub broker, without ever serializing
//! the tree itself.
//!
//! # Examples
//!
//! Search a Connect-4 position locally:
//!
//! ```rust,no_run
//! use canopy::games::connect4::{Board, Connect4};
//! use canopy::search::{self, MctsSetting};
//!
//! let board = Board::empty();
//! let best = search::mcts::<Connect4>(board, MctsSetting::default(), 10_000).unwrap();
//! println!("Played {:?}", best);
//! ```

pub mod broker;
pub mod client;
pub mod game;
pub mod games;
pub mod search;
pub mod server;
mod tests;
pub mod wire;

pub use search::{mcts, Engine, MctsSetting};
