//! Connect-4: 7 columns, 6 rows, four in a row wins.

use std::fmt;
use std::sync::OnceLock;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::game::{DecodeError, Game, Mover, Outcome};

pub const BOARD_WIDTH: usize = 7;
pub const BOARD_HEIGHT: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    pub fn other(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Mark::X => write!(f, "X"),
            Mark::O => write!(f, "O"),
        }
    }
}

/// Rows are indexed top to bottom; a dropped piece lands on the
/// highest-indexed free row of its column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub cells: [[Option<Mark>; BOARD_WIDTH]; BOARD_HEIGHT],
    pub num_moves: u32,
    pub turn: Mark,
}

impl Board {
    pub fn empty() -> Board {
        Board {
            cells: [[None; BOARD_WIDTH]; BOARD_HEIGHT],
            num_moves: 0,
            turn: Mark::X,
        }
    }

    fn winner(&self) -> Option<Mark> {
        for quad in quads() {
            let (r, c) = quad[0];
            if let Some(mark) = self.cells[r][c] {
                if quad
                    .iter()
                    .all(|&(r, c)| self.cells[r][c] == Some(mark))
                {
                    return Some(mark);
                }
            }
        }
        None
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Turn: {}\tnum_moves: {}", self.turn, self.num_moves)?;
        for row in &self.cells {
            for cell in row {
                match cell {
                    Some(mark) => write!(f, "{}", mark)?,
                    None => write!(f, "-")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Drop a piece into `column`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Drop {
    pub column: u8,
    pub mark: Mark,
}

/// All straight runs of `len` cells, in every direction.
fn runs(len: usize) -> Vec<Vec<(usize, usize)>> {
    let deltas: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];
    let mut runs = Vec::new();
    for r in 0..BOARD_HEIGHT as isize {
        for c in 0..BOARD_WIDTH as isize {
            for (dr, dc) in deltas {
                let end_r = r + dr * (len as isize - 1);
                let end_c = c + dc * (len as isize - 1);
                if end_r < 0
                    || end_r >= BOARD_HEIGHT as isize
                    || end_c < 0
                    || end_c >= BOARD_WIDTH as isize
                {
                    continue;
                }
                runs.push(
                    (0..len as isize)
                        .map(|i| ((r + dr * i) as usize, (c + dc * i) as usize))
                        .collect(),
                );
            }
        }
    }
    runs
}

fn quads() -> &'static [Vec<(usize, usize)>] {
    static QUADS: OnceLock<Vec<Vec<(usize, usize)>>> = OnceLock::new();
    QUADS.get_or_init(|| runs(4))
}

fn triples() -> &'static [Vec<(usize, usize)>] {
    static TRIPLES: OnceLock<Vec<Vec<(usize, usize)>>> = OnceLock::new();
    TRIPLES.get_or_init(|| runs(3))
}

pub struct Connect4;

impl Game for Connect4 {
    type State = Board;
    type Action = Drop;
    type Player = Mark;

    const NAME: &'static str = "connect4";
    const SUPPORTS_UNDO: bool = true;

    fn init_game(_rng: &mut SmallRng) -> Board {
        Board::empty()
    }

    fn players() -> Vec<Mark> {
        vec![Mark::X, Mark::O]
    }

    fn mover(state: &Board) -> Mover<Mark> {
        Mover::Player(state.turn)
    }

    fn take_action(state: &mut Board, action: &Drop) -> bool {
        let column = action.column as usize;
        if column >= BOARD_WIDTH || action.mark != state.turn {
            return false;
        }
        let row = match (0..BOARD_HEIGHT)
            .rev()
            .find(|&row| state.cells[row][column].is_none())
        {
            Some(row) => row,
            None => return false, // column full
        };
        state.cells[row][column] = Some(action.mark);
        state.num_moves += 1;
        state.turn = state.turn.other();
        true
    }

    fn undo_action(state: &mut Board, action: &Drop) {
        let column = action.column as usize;
        // The most recent piece in a column is its topmost occupied cell.
        let row = (0..BOARD_HEIGHT)
            .find(|&row| state.cells[row][column].is_some())
            .unwrap_or_else(|| panic!("undo on empty column {}", column));
        debug_assert_eq!(state.cells[row][column], Some(action.mark));
        state.cells[row][column] = None;
        state.num_moves -= 1;
        state.turn = action.mark;
    }

    fn legal_actions(state: &Board) -> Vec<Drop> {
        if Self::outcome(state).is_some() {
            return Vec::new();
        }
        (0..BOARD_WIDTH)
            .filter(|&column| state.cells[0][column].is_none())
            .map(|column| Drop {
                column: column as u8,
                mark: state.turn,
            })
            .collect()
    }

    fn outcome(state: &Board) -> Option<Outcome<Mark>> {
        if let Some(winner) = state.winner() {
            return Some(Outcome::Winner(winner));
        }
        if state.num_moves as usize == BOARD_WIDTH * BOARD_HEIGHT {
            return Some(Outcome::Draw);
        }
        None
    }

    fn random_action(state: &Board, rng: &mut SmallRng) -> Option<Drop> {
        Self::legal_actions(state).choose(rng).copied()
    }

    fn encode_action(action: &Drop) -> String {
        format!("{}{}", action.column, action.mark)
    }

    fn decode_action(s: &str) -> Result<Drop, DecodeError> {
        if !s.is_char_boundary(1) || s.len() < 2 {
            return Err(DecodeError(format!("malformed connect4 action {:?}", s)));
        }
        let (column, mark) = s.split_at(1);
        let column: u8 = column
            .parse()
            .map_err(|_| DecodeError(format!("bad column in connect4 action {:?}", s)))?;
        let mark = Self::decode_player(mark)?;
        if column as usize >= BOARD_WIDTH {
            return Err(DecodeError(format!("column {} out of range", column)));
        }
        Ok(Drop { column, mark })
    }

    fn encode_player(player: Mark) -> String {
        player.to_string()
    }

    fn decode_player(s: &str) -> Result<Mark, DecodeError> {
        match s {
            "X" => Ok(Mark::X),
            "O" => Ok(Mark::O),
            other => Err(DecodeError(format!("unknown connect4 player {:?}", other))),
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

/// Winning probability for the side to move, in `[0, 1]`.
///
/// Open-quad shortcuts first: a quad we complete this turn is a win, two
/// distinct cells each completing an opponent quad cannot both be blocked.
/// Otherwise a logistic squash of the open-triple difference plus a
/// middle-column bias.
pub fn heuristic(state: &Board) -> f64 {
    let me = state.turn;

    let (my_open_quads, opponent_open_quads) = open_runs(state, quads(), me);
    if !my_open_quads.is_empty() {
        return 1.0; // can win this turn
    }
    if opponent_open_quads.len() > 1 {
        return 0.0; // cannot stop the opponent
    }

    let (my_open_triples, opponent_open_triples) = open_runs(state, triples(), me);
    let open_triple_diff = my_open_triples.len() as f64 - opponent_open_triples.len() as f64;

    let middle_bias: f64 = state
        .cells
        .iter()
        .flat_map(|row| row.iter().enumerate())
        .filter(|(_, cell)| **cell == Some(me))
        .map(|(column, _)| 3.0 - (3.0 - column as f64).abs())
        .sum::<f64>()
        / 3.0;

    win_probability(open_triple_diff + middle_bias)
}

/// Cells that would complete a run for each side: runs holding three of
/// one mark and exactly one empty cell. Deduplicated by the empty cell.
fn open_runs(
    state: &Board,
    runs: &[Vec<(usize, usize)>],
    me: Mark,
) -> (Vec<(usize, usize)>, Vec<(usize, usize)>) {
    let mut mine = Vec::new();
    let mut theirs = Vec::new();
    for run in runs {
        let mut empty = None;
        let mut num_empty = 0;
        let mut num_mine = 0;
        let mut num_theirs = 0;
        for &(r, c) in run {
            match state.cells[r][c] {
                None => {
                    num_empty += 1;
                    empty = Some((r, c));
                }
                Some(mark) if mark == me => num_mine += 1,
                Some(_) => num_theirs += 1,
            }
        }
        if num_empty == 1 {
            let cell = empty.unwrap_or_else(|| unreachable!("num_empty counted"));
            if num_mine == run.len() - 1 && !mine.contains(&cell) {
                mine.push(cell);
            } else if num_theirs == run.len() - 1 && !theirs.contains(&cell) {
                theirs.push(cell);
            }
        }
    }
    (mine, theirs)
}

/// Squash a raw positional score onto a winning probability.
fn win_probability(raw: f64) -> f64 {
    1.0 / (1.0 + f64::exp(-raw))
}
