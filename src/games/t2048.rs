//! 2048: a single player shifts tiles, the environment spawns new ones.

use std::fmt;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::game::{DecodeError, Game, Mover, Outcome, ScoreVec};

pub const BOARD_SIZE: usize = 4;

/// Tile sums are normalized against this bound for the final score.
const SCORE_CEILING: f64 = 4096.0;

/// The game's single named player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Solo;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];

    fn as_str(self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Move {
    /// Player turn: slide all tiles in one direction.
    Shift(Direction),
    /// Environment turn: place a new tile on an empty cell.
    Spawn { row: u8, col: u8, value: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Turn {
    Player,
    Environment,
}

type Tiles = [[Option<u32>; BOARD_SIZE]; BOARD_SIZE];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub tiles: Tiles,
    turn: Turn,
}

impl Board {
    fn tile_sum(&self) -> f64 {
        self.tiles
            .iter()
            .flatten()
            .filter_map(|tile| *tile)
            .map(f64::from)
            .sum()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for row in &self.tiles {
            for tile in row {
                match tile {
                    Some(value) => write!(f, "{}\t", value)?,
                    None => write!(f, ".\t")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Cell order for one line of a shift, destination edge first.
fn line_coords(direction: Direction, line: usize) -> [(usize, usize); 4] {
    std::array::from_fn(|i| match direction {
        Direction::Left => (line, i),
        Direction::Right => (line, BOARD_SIZE - 1 - i),
        Direction::Up => (i, line),
        Direction::Down => (BOARD_SIZE - 1 - i, line),
    })
}

/// Slide every line towards `direction`, merging equal neighbours once per
/// shift. Returns whether anything moved.
fn shift(tiles: &mut Tiles, direction: Direction) -> bool {
    let mut changed = false;
    for line in 0..BOARD_SIZE {
        let coords = line_coords(direction, line);
        let values: Vec<u32> = coords.iter().filter_map(|&(r, c)| tiles[r][c]).collect();
        let mut merged = Vec::with_capacity(BOARD_SIZE);
        let mut i = 0;
        while i < values.len() {
            if i + 1 < values.len() && values[i] == values[i + 1] {
                merged.push(values[i] * 2);
                i += 2;
            } else {
                merged.push(values[i]);
                i += 1;
            }
        }
        for (index, &(r, c)) in coords.iter().enumerate() {
            let new = merged.get(index).copied();
            if tiles[r][c] != new {
                changed = true;
            }
            tiles[r][c] = new;
        }
    }
    changed
}

fn empty_cells(tiles: &Tiles) -> Vec<(usize, usize)> {
    (0..BOARD_SIZE)
        .flat_map(|r| (0..BOARD_SIZE).map(move |c| (r, c)))
        .filter(|&(r, c)| tiles[r][c].is_none())
        .collect()
}

pub struct T2048;

impl Game for T2048 {
    type State = Board;
    type Action = Move;
    type Player = Solo;

    const NAME: &'static str = "2048";

    fn init_game(rng: &mut SmallRng) -> Board {
        let mut tiles: Tiles = [[None; BOARD_SIZE]; BOARD_SIZE];
        let cells = empty_cells(&tiles);
        for &(r, c) in cells.choose_multiple(rng, 2) {
            tiles[r][c] = [2, 4].choose(rng).copied();
        }
        Board {
            tiles,
            turn: Turn::Player,
        }
    }

    fn players() -> Vec<Solo> {
        vec![Solo]
    }

    fn mover(state: &Board) -> Mover<Solo> {
        match state.turn {
            Turn::Player => Mover::Player(Solo),
            Turn::Environment => Mover::Environment,
        }
    }

    fn take_action(state: &mut Board, action: &Move) -> bool {
        match (state.turn, action) {
            (Turn::Player, Move::Shift(direction)) => {
                if !shift(&mut state.tiles, *direction) {
                    return false; // a shift must move something
                }
                state.turn = Turn::Environment;
                true
            }
            (Turn::Environment, Move::Spawn { row, col, value }) => {
                let (row, col) = (*row as usize, *col as usize);
                if row >= BOARD_SIZE
                    || col >= BOARD_SIZE
                    || state.tiles[row][col].is_some()
                    || !matches!(value, 2 | 4)
                {
                    return false;
                }
                state.tiles[row][col] = Some(*value);
                state.turn = Turn::Player;
                true
            }
            _ => false,
        }
    }

    fn legal_actions(state: &Board) -> Vec<Move> {
        match state.turn {
            Turn::Player => Direction::ALL
                .iter()
                .filter(|&&direction| {
                    let mut copy = state.tiles;
                    shift(&mut copy, direction)
                })
                .map(|&direction| Move::Shift(direction))
                .collect(),
            Turn::Environment => empty_cells(&state.tiles)
                .into_iter()
                .flat_map(|(r, c)| {
                    [2u32, 4].into_iter().map(move |value| Move::Spawn {
                        row: r as u8,
                        col: c as u8,
                        value,
                    })
                })
                .collect(),
        }
    }

    fn outcome(state: &Board) -> Option<Outcome<Solo>> {
        if Self::legal_actions(state).is_empty() {
            // Single-player game: running out of moves ends it, and the
            // continuous final score says how well it went.
            Some(Outcome::Winner(Solo))
        } else {
            None
        }
    }

    fn final_score(state: &Board) -> Option<ScoreVec<Solo>> {
        let normalized = (state.tile_sum() / SCORE_CEILING).min(1.0);
        Some([(Solo, normalized)].into_iter().collect())
    }

    fn random_action(state: &Board, rng: &mut SmallRng) -> Option<Move> {
        match state.turn {
            // Spawns are uniform over (cell, value) without enumerating
            // the full action list.
            Turn::Environment => {
                let cells = empty_cells(&state.tiles);
                let &(r, c) = cells.choose(rng)?;
                let value = [2u32, 4].choose(rng).copied()?;
                Some(Move::Spawn {
                    row: r as u8,
                    col: c as u8,
                    value,
                })
            }
            Turn::Player => Self::legal_actions(state).choose(rng).copied(),
        }
    }

    fn encode_action(action: &Move) -> String {
        match action {
            Move::Shift(direction) => direction.as_str().to_string(),
            Move::Spawn { row, col, value } => format!("spawn:{},{},{}", row, col, value),
        }
    }

    fn decode_action(s: &str) -> Result<Move, DecodeError> {
        match s {
            "left" => return Ok(Move::Shift(Direction::Left)),
            "right" => return Ok(Move::Shift(Direction::Right)),
            "up" => return Ok(Move::Shift(Direction::Up)),
            "down" => return Ok(Move::Shift(Direction::Down)),
            _ => {}
        }
        let rest = s
            .strip_prefix("spawn:")
            .ok_or_else(|| DecodeError(format!("unknown 2048 action {:?}", s)))?;
        let mut parts = rest.split(',');
        let mut next_number = || -> Result<u32, DecodeError> {
            parts
                .next()
                .and_then(|part| part.parse().ok())
                .ok_or_else(|| DecodeError(format!("malformed 2048 spawn {:?}", s)))
        };
        let row = next_number()?;
        let col = next_number()?;
        let value = next_number()?;
        if row as usize >= BOARD_SIZE || col as usize >= BOARD_SIZE {
            return Err(DecodeError(format!("2048 spawn out of range {:?}", s)));
        }
        Ok(Move::Spawn {
            row: row as u8,
            col: col as u8,
            value,
        })
    }

    fn encode_player(_player: Solo) -> String {
        "player".to_string()
    }

    fn decode_player(s: &str) -> Result<Solo, DecodeError> {
        match s {
            "player" => Ok(Solo),
            other => Err(DecodeError(format!("unknown 2048 player {:?}", other))),
        }
    }

    fn encode_gamestate(state: &Board) -> Vec<u8> {
        serde_json::to_vec(state).expect("board serialization cannot fail")
    }

    fn decode_gamestate(bytes: &[u8]) -> Result<Board, DecodeError> {
        serde_json::from_slice(bytes).map_err(|err| DecodeError(err.to_string()))
    }

    fn format_gamestate(state: &Board) -> String {
        state.to_string()
    }
}

/// Rollout replacement: score the board as it stands instead of playing it
/// out. The tile sum is penalized by every non-maximal local peak, since
/// scattered peaks block merges.
pub fn rollout_score(state: &Board, _rng: &mut SmallRng) -> ScoreVec<Solo> {
    let tile = |r: isize, c: isize| -> u32 {
        if r < 0 || r >= BOARD_SIZE as isize || c < 0 || c >= BOARD_SIZE as isize {
            return 0;
        }
        state.tiles[r as usize][c as usize].unwrap_or(0)
    };

    let in_bounds =
        |r: isize, c: isize| r >= 0 && r < BOARD_SIZE as isize && c >= 0 && c < BOARD_SIZE as isize;

    let mut peaks = Vec::new();
    for r in 0..BOARD_SIZE as isize {
        for c in 0..BOARD_SIZE as isize {
            let value = tile(r, c);
            let is_peak = [(r + 1, c), (r - 1, c), (r, c + 1), (r, c - 1)]
                .into_iter()
                .filter(|&(nr, nc)| in_bounds(nr, nc))
                .all(|(nr, nc)| value > tile(nr, nc));
            if is_peak {
                peaks.push(value);
            }
        }
    }
    peaks.sort_unstable();
    let non_max_peaks: f64 = peaks
        .iter()
        .rev()
        .skip(1)
        .map(|&value| f64::from(value))
        .sum();

    let score = ((state.tile_sum() - non_max_peaks) / SCORE_CEILING).clamp(0.0, 1.0);
    [(Solo, score)].into_iter().collect()
}
