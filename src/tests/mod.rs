#[cfg(test)]
mod merge_tests;
#[cfg(test)]
mod server_tests;
#[cfg(test)]
mod t2048_tests;
#[cfg(test)]
mod wire_tests;

#[cfg(test)]
use crate::games::connect4::{Board, Mark, BOARD_HEIGHT, BOARD_WIDTH};

/// Build a connect4 board from row strings, top row first. 'X'/'O' are
/// pieces, '-' or '.' empty.
#[cfg(test)]
fn c4_board(rows: [&str; BOARD_HEIGHT], turn: Mark) -> Board {
    let mut board = Board::empty();
    let mut num_moves = 0;
    for (r, row) in rows.iter().enumerate() {
        assert_eq!(row.len(), BOARD_WIDTH, "row {:?} has wrong width", row);
        for (c, ch) in row.chars().enumerate() {
            board.cells[r][c] = match ch {
                'X' => {
                    num_moves += 1;
                    Some(Mark::X)
                }
                'O' => {
                    num_moves += 1;
                    Some(Mark::O)
                }
                '-' | '.' => None,
                other => panic!("unexpected cell {:?}", other),
            };
        }
    }
    board.num_moves = num_moves;
    board.turn = turn;
    board
}
