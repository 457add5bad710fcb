//! game-2048: the 2048 sliding-tile game with an out-of-process solver
//!
//! This crate provides:
//! - The grid and move engine (`game`): slides, single merges per tile per
//!   move, the win and game-over rules, and the persisted snapshot shape
//! - A solver worker (`worker`) reached only by tagged messages, with a
//!   packed bitboard and expectimax search behind it (`solver`)
//! - A `GameManager` that mirrors moves into the worker, runs the solver
//!   autorun, and asks the worker for evil tiles
//! - A binary replay log of effective moves (`replay`)
//!
//! Quick start:
//! ```
//! use game_2048::game::{Direction, Game};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let mut game = Game::new(4, 2048);
//! game.add_start_tiles(2, &mut rng);
//! for dir in Direction::ALL {
//!     if game.shift(dir).is_some() {
//!         game.add_random_tile(&mut rng);
//!         game.refresh_over();
//!     }
//! }
//! assert!(game.grid().tiles().count() >= 2);
//! ```
//!
//! The manager needs a tokio runtime; see `tests/manager.rs` for wiring it
//! to an in-process worker thread.

pub mod config;
pub mod error;
pub mod events;
pub mod game;
pub mod manager;
pub mod replay;
pub mod solver;
pub mod storage;
pub mod worker;

pub use config::GameConfig;
pub use error::{ConfigError, GameError, ReplayError, SolverError, StorageError};
pub use events::{Actuator, ActuatorMetadata, InputEvent, NullActuator};
pub use manager::{GameManager, MoveDisposition, MoveReport};
pub use storage::{FileStorage, MemoryStorage, StorageManager};
