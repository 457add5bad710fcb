//! Property-based tests for the move engine.
//!
//! Boards are drawn as random exponents (0 = empty) on a 4x4 grid so the
//! host grid and the packed solver board can be compared cell for cell.

use game_2048::game::{moves_available, slide, Direction, Game, GameState, Grid};
use game_2048::solver::Board;
use proptest::prelude::*;

// =============================================================================
// Strategies
// =============================================================================

fn face(exponent: u8) -> u32 {
    if exponent == 0 {
        0
    } else {
        1 << exponent
    }
}

/// Any 4x4 board with tiles up to 2048.
fn arb_values() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(0u8..=11, 16).prop_map(|exps| exps.into_iter().map(face).collect())
}

/// A full board; small exponents so adjacent pairs are common.
fn arb_full_values() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(1u8..=4, 16).prop_map(|exps| exps.into_iter().map(face).collect())
}

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop::sample::select(Direction::ALL.to_vec())
}

fn game_from(values: &[u32]) -> Game {
    let grid = Grid::from_values(4, values).unwrap();
    Game::from_state(GameState { grid, score: 0, over: false, won: false, keep_playing: false }, 2048)
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// A move exists exactly when some direction changes the board.
    #[test]
    fn game_over_iff_no_direction_moves(values in prop_oneof![arb_values(), arb_full_values()]) {
        let grid = Grid::from_values(4, &values).unwrap();
        let any_moves = Direction::ALL.iter().any(|&dir| {
            let mut g = grid.clone();
            slide(&mut g, dir).moved
        });
        prop_assert_eq!(moves_available(&grid), any_moves);

        let full = values.iter().all(|&v| v != 0);
        let pair = (0..4).any(|y| (0..3).any(|x| values[y * 4 + x] == values[y * 4 + x + 1]))
            || (0..3).any(|y| (0..4).any(|x| values[y * 4 + x] == values[(y + 1) * 4 + x]));
        prop_assert_eq!(moves_available(&grid), !full || pair);
    }

    /// Sliding conserves the tile sum, and each merge removes exactly one tile.
    #[test]
    fn slide_conserves_sum(values in arb_values(), dir in arb_direction()) {
        let mut grid = Grid::from_values(4, &values).unwrap();
        let before: u32 = values.iter().sum();
        let tiles_before = values.iter().filter(|&&v| v != 0).count();

        let out = slide(&mut grid, dir);
        let after = grid.values();

        prop_assert_eq!(after.iter().sum::<u32>(), before);
        prop_assert_eq!(after.iter().filter(|&&v| v != 0).count(), tiles_before - out.merges.len());
        prop_assert_eq!(out.score_delta, out.merges.iter().map(|m| u64::from(m.value)).sum::<u64>());
        if !out.moved {
            prop_assert_eq!(after, values);
        }
    }

    /// A run of equal tiles merges pairwise, never into a single tile.
    #[test]
    fn equal_row_merges_once_per_tile(exp in 1u8..=10, dir in arb_direction()) {
        let v = face(exp);
        let mut grid = Grid::from_values(4, &[v; 16]).unwrap();
        let out = slide(&mut grid, dir);
        prop_assert_eq!(out.merges.len(), 8);
        prop_assert!(grid.tiles().all(|t| t.value == 2 * v));
        prop_assert_eq!(grid.tiles().count(), 8);
    }

    /// The packed solver board slides exactly like the host grid.
    #[test]
    fn solver_board_agrees_with_grid(values in arb_values(), dir in arb_direction()) {
        let mut grid = Grid::from_values(4, &values).unwrap();
        slide(&mut grid, dir);
        let board = Board::from_values(&values).unwrap();
        prop_assert_eq!(board.shift(dir).values(), grid.values());
    }

    /// A move that slides nothing leaves score and tiles alone and adds nothing.
    #[test]
    fn noop_move_changes_nothing(values in arb_values(), dir in arb_direction()) {
        let mut game = game_from(&values);
        let mut scratch = game.grid().clone();
        let moved = slide(&mut scratch, dir).moved;

        let outcome = game.shift(dir);
        prop_assert_eq!(outcome.is_some(), moved);
        if !moved {
            prop_assert_eq!(game.score(), 0);
            prop_assert_eq!(game.grid().values(), values);
        }
    }

    #[test]
    fn snapshot_survives_json(values in arb_values(), score in 0u64..1_000_000, over in any::<bool>(), won in any::<bool>(), keep_playing in any::<bool>()) {
        let grid = Grid::from_values(4, &values).unwrap();
        let state = GameState { grid, score, over, won, keep_playing };
        let json = serde_json::to_string(&state).unwrap();
        let back: GameState = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back.grid.values(), values);
        prop_assert_eq!(back, state);
    }
}

#[test]
fn merge_once_example() {
    let mut values = [0u32; 16];
    values[..4].copy_from_slice(&[2, 2, 2, 2]);
    let mut game = game_from(&values);
    let outcome = game.shift(Direction::Left).unwrap();
    assert_eq!(&game.grid().values()[..4], &[4, 4, 0, 0]);
    assert_eq!(outcome.slide.score_delta, 8);
    assert_eq!(game.score(), 8);
}
