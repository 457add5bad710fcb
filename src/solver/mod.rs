//! Search engine behind the worker protocol.
//!
//! The host never calls into this module directly; it talks to a
//! [`crate::worker::SolverWorker`] that owns a [`Searcher`] and a packed
//! [`Board`] mirror of the host grid.
//!
//! ```
//! use game_2048::solver::{Board, SearchConfig, Searcher};
//!
//! let board = Board::from_values(&[2, 2, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
//! let mut searcher = Searcher::new(SearchConfig { depth_cap: Some(2), ..SearchConfig::default() });
//! let dir = searcher.best_move(board).unwrap();
//! assert_ne!(board.shift(dir), board);
//! ```

mod board;
mod heuristic;
mod search;

pub use board::{warm, Board};
pub use search::{Placement, SearchConfig, SearchStats, Searcher};
