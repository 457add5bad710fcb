use rand::Rng;
use serde::{Deserialize, Serialize};

use super::grid::{Grid, Position, Tile};
use super::mechanics::{self, Direction, SlideOutcome};

/// Serializable snapshot of a game, as handed to the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub grid: Grid,
    pub score: u64,
    pub over: bool,
    pub won: bool,
    pub keep_playing: bool,
}

/// A tile that was added to the board after a move (or at setup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedTile {
    pub position: Position,
    pub value: u32,
}

impl PlacedTile {
    /// Decode an adversarial placement code: `0..n` is a 2 at that row-major
    /// index, `n..2n` a 4 at `code - n`, where `n = size * size`.
    ///
    /// ```
    /// use game_2048::game::{PlacedTile, Position};
    /// assert_eq!(PlacedTile::from_code(5, 4), Some(PlacedTile { position: Position::new(1, 1), value: 2 }));
    /// assert_eq!(PlacedTile::from_code(16, 4), Some(PlacedTile { position: Position::new(0, 0), value: 4 }));
    /// assert_eq!(PlacedTile::from_code(32, 4), None);
    /// ```
    pub fn from_code(code: u32, size: usize) -> Option<Self> {
        let cells = size * size;
        let code = code as usize;
        let (index, value) = match code {
            c if c < cells => (c, 2),
            c if c < 2 * cells => (c - cells, 4),
            _ => return None,
        };
        Some(Self { position: Position::from_index(index, size), value })
    }

    pub fn to_code(self, size: usize) -> u32 {
        let index = self.position.index(size);
        let offset = if self.value == 4 { size * size } else { 0 };
        (index + offset) as u32
    }
}

/// Result of a move that changed the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftOutcome {
    pub slide: SlideOutcome,
    /// Set on the one move where the win tile first appears.
    pub reached_win: bool,
}

/// Grid plus score and terminal flags: the rules of one game.
///
/// `Game` is synchronous and knows nothing about workers or storage; the
/// manager wraps it with those concerns.
#[derive(Debug, Clone)]
pub struct Game {
    grid: Grid,
    score: u64,
    over: bool,
    won: bool,
    keep_playing: bool,
    first_win: bool,
    win_value: u32,
}

impl Game {
    pub fn new(size: usize, win_value: u32) -> Self {
        Self {
            grid: Grid::new(size),
            score: 0,
            over: false,
            won: false,
            keep_playing: false,
            first_win: true,
            win_value,
        }
    }

    /// Resume from a snapshot. The win can only fire again if the board does
    /// not already hold a win tile.
    pub fn from_state(state: GameState, win_value: u32) -> Self {
        let first_win = !state.grid.contains_value(win_value);
        Self {
            grid: state.grid,
            score: state.score,
            over: state.over,
            won: state.won,
            keep_playing: state.keep_playing,
            first_win,
            win_value,
        }
    }

    pub fn to_state(&self) -> GameState {
        GameState {
            grid: self.grid.clone(),
            score: self.score,
            over: self.over,
            won: self.won,
            keep_playing: self.keep_playing,
        }
    }

    #[inline]
    pub fn grid(&self) -> &Grid { &self.grid }
    #[inline]
    pub fn score(&self) -> u64 { self.score }
    #[inline]
    pub fn is_over(&self) -> bool { self.over }
    #[inline]
    pub fn is_won(&self) -> bool { self.won }
    #[inline]
    pub fn keeps_playing(&self) -> bool { self.keep_playing }
    #[inline]
    pub fn win_value(&self) -> u32 { self.win_value }

    /// Lost, or won without opting to keep playing.
    pub fn is_terminated(&self) -> bool { self.over || (self.won && !self.keep_playing) }

    /// One-way switch out of the won-blocking state.
    pub fn keep_playing(&mut self) { self.keep_playing = true; }

    /// Slide in `direction`.
    ///
    /// Returns `None` when the game is terminated or nothing moved; in both
    /// cases the game is untouched apart from per-move tile bookkeeping.
    pub fn shift(&mut self, direction: Direction) -> Option<ShiftOutcome> {
        if self.is_terminated() {
            return None;
        }
        let slide = mechanics::slide(&mut self.grid, direction);
        if !slide.moved {
            return None;
        }
        self.score += slide.score_delta;
        let reached_win = self.first_win && slide.merges.iter().any(|m| m.value == self.win_value);
        if reached_win {
            self.first_win = false;
            self.won = true;
        }
        Some(ShiftOutcome { slide, reached_win })
    }

    /// 2 with 90% odds, otherwise 4, in a uniformly random empty cell.
    pub fn add_random_tile<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<PlacedTile> {
        let position = self.grid.random_available_cell(rng)?;
        let value = if rng.gen_range(0..10) < 9 { 2 } else { 4 };
        self.place_tile(PlacedTile { position, value })
    }

    /// Place a specific tile. Refuses occupied or out-of-bounds cells.
    pub fn place_tile(&mut self, tile: PlacedTile) -> Option<PlacedTile> {
        if !self.grid.cell_available(tile.position) {
            return None;
        }
        self.grid.insert_tile(Tile::new(tile.position, tile.value));
        Some(tile)
    }

    pub fn add_start_tiles<R: Rng + ?Sized>(&mut self, count: usize, rng: &mut R) -> Vec<PlacedTile> {
        (0..count).filter_map(|_| self.add_random_tile(rng)).collect()
    }

    /// Recompute the game-over flag after a tile was added.
    pub fn refresh_over(&mut self) -> bool {
        self.over = !mechanics::moves_available(&self.grid);
        self.over
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn game_from(values: &[u32], win_value: u32) -> Game {
        let grid = Grid::from_values(4, values).unwrap();
        Game::from_state(
            GameState { grid, score: 0, over: false, won: false, keep_playing: false },
            win_value,
        )
    }

    #[test]
    fn placement_codes() {
        for code in 0..32 {
            let tile = PlacedTile::from_code(code, 4).unwrap();
            assert_eq!(tile.to_code(4), code);
            assert_eq!(tile.value, if code < 16 { 2 } else { 4 });
        }
        assert_eq!(PlacedTile::from_code(17, 4).unwrap().position, Position::new(1, 0));
    }

    #[test]
    fn start_tiles() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut game = Game::new(4, 2048);
        let placed = game.add_start_tiles(2, &mut rng);
        assert_eq!(placed.len(), 2);
        assert_eq!(game.grid().tiles().count(), 2);
        assert!(game.grid().tiles().all(|t| t.value == 2 || t.value == 4));
    }

    #[test]
    fn random_tile_odds() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut fours = 0;
        for _ in 0..2000 {
            let mut game = Game::new(4, 2048);
            if game.add_random_tile(&mut rng).unwrap().value == 4 {
                fours += 1;
            }
        }
        assert!((120..=280).contains(&fours), "fours={fours}");
    }

    #[test]
    fn won_fires_once() {
        let mut values = [0u32; 16];
        values[..4].copy_from_slice(&[1024, 1024, 1024, 1024]);
        let mut game = game_from(&values, 2048);
        let out = game.shift(Direction::Left).unwrap();
        assert!(out.reached_win);
        assert!(game.is_won());
        assert!(game.is_terminated());
        assert_eq!(game.shift(Direction::Right), None);

        game.keep_playing();
        assert!(!game.is_terminated());
        let out = game.shift(Direction::Right).unwrap();
        assert_eq!(out.slide.max_merged(), Some(4096));
        assert!(!out.reached_win);
        assert!(game.is_won());
    }

    #[test]
    fn resumed_board_with_win_tile_does_not_rewin() {
        let mut values = [0u32; 16];
        values[..4].copy_from_slice(&[2048, 0, 1024, 1024]);
        let mut game = game_from(&values, 2048);
        game.keep_playing();
        let out = game.shift(Direction::Right).unwrap();
        assert!(!out.reached_win);
        assert!(!game.is_won());
    }

    #[test]
    fn no_effect_move_changes_nothing() {
        let mut values = [0u32; 16];
        values[..4].copy_from_slice(&[2, 4, 8, 16]);
        let mut game = game_from(&values, 2048);
        let before = game.to_state();
        assert_eq!(game.shift(Direction::Left), None);
        assert_eq!(game.to_state(), before);
    }

    #[test]
    fn place_tile_rejects_occupied() {
        let mut game = game_from(&[2; 16], 2048);
        assert_eq!(game.place_tile(PlacedTile { position: Position::new(0, 0), value: 2 }), None);
        assert_eq!(game.place_tile(PlacedTile { position: Position::new(7, 0), value: 2 }), None);
    }

    #[test]
    fn snapshot_round_trip() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut game = Game::new(4, 2048);
        game.add_start_tiles(2, &mut rng);
        for dir in Direction::ALL {
            if game.shift(dir).is_some() {
                game.add_random_tile(&mut rng);
            }
        }
        let state = game.to_state();
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"keepPlaying\":false"));
        let back: GameState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
