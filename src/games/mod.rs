//! Built-in game adapters.

use crate::game::Game;

pub mod connect4;
pub mod t2048;

/// Game-type strings the worker registry accepts.
pub const GAME_TYPES: &[&str] = &[connect4::Connect4::NAME, t2048::T2048::NAME];
