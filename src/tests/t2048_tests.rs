use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::game::{Game, Mover, Outcome};
use crate::games::t2048::{Board, Direction, Move, Solo, T2048, BOARD_SIZE};
use crate::search::tree::ROOT_ID;
use crate::search::{Engine, MctsSetting};

fn board_from(rows: [[u32; BOARD_SIZE]; BOARD_SIZE]) -> Board {
    let mut rng = SmallRng::seed_from_u64(0);
    let mut board = T2048::init_game(&mut rng);
    for (r, row) in rows.iter().enumerate() {
        for (c, &value) in row.iter().enumerate() {
            board.tiles[r][c] = if value == 0 { None } else { Some(value) };
        }
    }
    board
}

fn shift_left(mut board: Board) -> Board {
    assert!(T2048::take_action(&mut board, &Move::Shift(Direction::Left)));
    board
}

#[test]
fn tiles_slide_and_merge_towards_the_edge() {
    let board = board_from([[0, 2, 0, 2], [4, 0, 4, 8], [0, 0, 0, 2], [2, 4, 8, 16]]);
    let shifted = shift_left(board);
    assert_eq!(shifted.tiles[0], [Some(4), None, None, None]);
    assert_eq!(shifted.tiles[1], [Some(8), Some(8), None, None]);
    assert_eq!(shifted.tiles[2], [Some(2), None, None, None]);
    assert_eq!(
        shifted.tiles[3],
        [Some(2), Some(4), Some(8), Some(16)]
    );
}

#[test]
fn tiles_merge_at_most_once_per_shift() {
    // 2 2 2 -> 4 2, not 8; 4 4 4 4 -> 8 8.
    let board = board_from([[2, 2, 2, 0], [4, 4, 4, 4], [0, 0, 0, 0], [0, 0, 0, 0]]);
    let shifted = shift_left(board);
    assert_eq!(shifted.tiles[0], [Some(4), Some(2), None, None]);
    assert_eq!(shifted.tiles[1], [Some(8), Some(8), None, None]);
}

#[test]
fn shifts_that_move_nothing_are_illegal() {
    let board = board_from([[2, 0, 0, 0], [4, 0, 0, 0], [8, 0, 0, 0], [16, 0, 0, 0]]);
    let mut copy = board.clone();
    assert!(!T2048::take_action(&mut copy, &Move::Shift(Direction::Left)));
    assert_eq!(copy, board);

    let legal = T2048::legal_actions(&board);
    assert!(!legal.contains(&Move::Shift(Direction::Left)));
    assert!(legal.contains(&Move::Shift(Direction::Right)));
}

#[test]
fn environment_turns_spawn_on_empty_cells() {
    let mut board = board_from([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]);
    assert!(T2048::take_action(&mut board, &Move::Shift(Direction::Left)));
    assert_eq!(T2048::mover(&board), Mover::Environment);

    let actions = T2048::legal_actions(&board);
    // 15 empty cells, two values each
    assert_eq!(actions.len(), 30);
    assert!(actions.iter().all(|action| matches!(
        action,
        Move::Spawn { value: 2 | 4, .. }
    )));

    // Spawning on the occupied cell is invalid.
    assert!(!T2048::take_action(
        &mut board,
        &Move::Spawn {
            row: 0,
            col: 0,
            value: 2
        }
    ));
    assert!(T2048::take_action(
        &mut board,
        &Move::Spawn {
            row: 3,
            col: 3,
            value: 4
        }
    ));
    assert_eq!(T2048::mover(&board), Mover::Player(Solo));
}

#[test]
fn stuck_boards_are_terminal_with_a_normalized_score() {
    // Checkerboard of unequal neighbours: no shift changes anything.
    let board = board_from([
        [2, 4, 2, 4],
        [4, 2, 4, 2],
        [2, 4, 2, 4],
        [4, 2, 4, 2],
    ]);
    assert!(T2048::legal_actions(&board).is_empty());
    assert_eq!(T2048::outcome(&board), Some(Outcome::Winner(Solo)));

    let score = T2048::final_score(&board).unwrap();
    let expected = (16.0 * 3.0) / 4096.0;
    assert!((score[&Solo] - expected).abs() < 1e-12);
}

#[test]
fn action_encoding_round_trips() {
    for direction in Direction::ALL {
        let action = Move::Shift(direction);
        let encoded = T2048::encode_action(&action);
        assert_eq!(T2048::decode_action(&encoded), Ok(action));
    }
    let spawn = Move::Spawn {
        row: 1,
        col: 3,
        value: 4,
    };
    assert_eq!(
        T2048::decode_action(&T2048::encode_action(&spawn)),
        Ok(spawn)
    );
    assert!(T2048::decode_action("sideways").is_err());
    assert!(T2048::decode_action("spawn:9,0,2").is_err());
}

/// Scenario: a fresh seeded game searched for 100 walks.
#[test]
fn hundred_walks_from_a_fresh_game() {
    let mut rng = SmallRng::seed_from_u64(0);
    let board = T2048::init_game(&mut rng);
    let mut engine = Engine::<T2048>::from_seed(board, MctsSetting::default(), 37);
    engine.run_walks(100).unwrap();

    let tree = engine.tree();
    assert_eq!(tree.get(ROOT_ID).unwrap().visits, 100);
    let visited_children = tree
        .children(ROOT_ID)
        .unwrap()
        .iter()
        .filter(|(child_id, _)| tree.get(*child_id).unwrap().visits > 0)
        .count();
    assert!(visited_children >= 1);
    assert!(engine.best_action().is_some());
    tree.validate().unwrap();
}

#[test]
fn environment_nodes_are_searched_too() {
    // After 100 walks some grandchild below an environment node must have
    // been reached: the tree descends through stochastic moves.
    let mut rng = SmallRng::seed_from_u64(1);
    let board = T2048::init_game(&mut rng);
    let mut engine = Engine::<T2048>::from_seed(board, MctsSetting::default(), 41);
    engine.run_walks(100).unwrap();

    let deep = engine
        .tree()
        .nodes()
        .filter(|node| node.parent.is_some() && node.parent != Some(ROOT_ID))
        .count();
    assert!(deep > 0, "search never went two levels deep");
}

#[test]
fn rollout_policy_scores_are_valid() {
    let board = board_from([[2, 4, 2, 4], [4, 2, 4, 2], [2, 4, 2, 4], [4, 2, 4, 2]]);
    let mut rng = SmallRng::seed_from_u64(2);
    let score = crate::games::t2048::rollout_score(&board, &mut rng);
    assert!(score[&Solo] >= 0.0 && score[&Solo] <= 1.0);
}
