//! Host-side game model: grid, move engine, and game rules.

mod grid;
mod mechanics;
mod state;

pub use grid::{Grid, Position, MAX_TILE, SerializedGrid, SerializedTile, Tile};
pub use mechanics::{moves_available, prepare_tiles, slide, tile_matches_available, Direction, Merge, SlideOutcome};
pub use state::{Game, GameState, PlacedTile, ShiftOutcome};
