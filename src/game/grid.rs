use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::GameError;

/// A cell coordinate. `x` runs left to right, `y` top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self { Self { x, y } }

    /// Row-major cell index, the encoding used on the worker wire.
    #[inline]
    pub fn index(self, size: usize) -> usize { self.y * size + self.x }

    #[inline]
    pub fn from_index(index: usize, size: usize) -> Self {
        Self { x: index % size, y: index / size }
    }

    /// Step by `(dx, dy)`; `None` if either coordinate would go negative.
    #[inline]
    pub(crate) fn step(self, dx: isize, dy: isize) -> Option<Self> {
        Some(Self { x: self.x.checked_add_signed(dx)?, y: self.y.checked_add_signed(dy)? })
    }
}

/// A numbered piece on the board.
///
/// `previous_position` and `merged_from` describe the last move only; the
/// move engine resets both before every move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub position: Position,
    pub value: u32,
    pub previous_position: Option<Position>,
    pub merged_from: Option<Box<[Tile; 2]>>,
}

impl Tile {
    pub fn new(position: Position, value: u32) -> Self {
        Self { position, value, previous_position: None, merged_from: None }
    }

    pub(crate) fn save_position(&mut self) {
        self.previous_position = Some(self.position);
    }

    pub(crate) fn update_position(&mut self, position: Position) {
        self.position = position;
    }

    /// True if this tile was produced by a merge during the current move.
    #[inline]
    pub fn is_merge_product(&self) -> bool { self.merged_from.is_some() }
}

/// Wire shape of a tile inside a persisted grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedTile {
    pub position: Position,
    pub value: u32,
}

/// Wire shape of a grid: `cells[x][y]` holds a tile or `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedGrid {
    pub size: usize,
    pub cells: Vec<Vec<Option<SerializedTile>>>,
}

/// Square board of optional tiles, stored row-major.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "SerializedGrid", try_from = "SerializedGrid")]
pub struct Grid {
    size: usize,
    cells: Vec<Option<Tile>>,
}

impl Grid {
    pub fn new(size: usize) -> Self {
        Self { size, cells: vec![None; size * size] }
    }

    /// Build a grid from row-major face values (0 = empty).
    ///
    /// ```
    /// use game_2048::game::{Grid, Position};
    /// let g = Grid::from_values(2, &[2, 0, 0, 4]).unwrap();
    /// assert_eq!(g.cell_content(Position::new(1, 1)).map(|t| t.value), Some(4));
    /// ```
    pub fn from_values(size: usize, values: &[u32]) -> Result<Self, GameError> {
        if values.len() != size * size {
            return Err(GameError::InvalidSnapshot(format!(
                "expected {} values, got {}",
                size * size,
                values.len()
            )));
        }
        let mut grid = Self::new(size);
        for (idx, &value) in values.iter().enumerate() {
            if value == 0 {
                continue;
            }
            check_value(value)?;
            grid.insert_tile(Tile::new(Position::from_index(idx, size), value));
        }
        Ok(grid)
    }

    #[inline]
    pub fn size(&self) -> usize { self.size }

    #[inline]
    pub fn within_bounds(&self, pos: Position) -> bool {
        pos.x < self.size && pos.y < self.size
    }

    /// Tile at `pos`, or `None` when empty or out of bounds.
    pub fn cell_content(&self, pos: Position) -> Option<&Tile> {
        if !self.within_bounds(pos) {
            return None;
        }
        self.cells[pos.index(self.size)].as_ref()
    }

    pub(crate) fn cell_content_mut(&mut self, pos: Position) -> Option<&mut Tile> {
        if !self.within_bounds(pos) {
            return None;
        }
        let size = self.size;
        self.cells[pos.index(size)].as_mut()
    }

    /// True if `pos` is on the board and empty.
    #[inline]
    pub fn cell_available(&self, pos: Position) -> bool {
        self.within_bounds(pos) && self.cells[pos.index(self.size)].is_none()
    }

    #[inline]
    pub fn cell_occupied(&self, pos: Position) -> bool { self.cell_content(pos).is_some() }

    /// True if at least one cell is empty.
    pub fn cells_available(&self) -> bool { self.cells.iter().any(Option::is_none) }

    pub fn available_cells(&self) -> Vec<Position> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_none())
            .map(|(idx, _)| Position::from_index(idx, self.size))
            .collect()
    }

    /// Uniformly random empty cell.
    pub fn random_available_cell<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Position> {
        self.available_cells().choose(rng).copied()
    }

    /// Place `tile` at its recorded position, replacing whatever was there.
    pub fn insert_tile(&mut self, tile: Tile) {
        debug_assert!(self.within_bounds(tile.position), "tile out of bounds: {:?}", tile.position);
        let idx = tile.position.index(self.size);
        self.cells[idx] = Some(tile);
    }

    /// Remove and return the tile at `pos`.
    pub fn remove_tile(&mut self, pos: Position) -> Option<Tile> {
        if !self.within_bounds(pos) {
            return None;
        }
        let idx = pos.index(self.size);
        self.cells[idx].take()
    }

    /// All cell positions in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.size * self.size).map(move |idx| Position::from_index(idx, self.size))
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.cells.iter().flatten()
    }

    pub(crate) fn tiles_mut(&mut self) -> impl Iterator<Item = &mut Tile> {
        self.cells.iter_mut().flatten()
    }

    /// Row-major face values with 0 for empty cells (the `BOARD` payload).
    pub fn values(&self) -> Vec<u32> {
        self.cells.iter().map(|c| c.as_ref().map_or(0, |t| t.value)).collect()
    }

    pub fn max_value(&self) -> u32 { self.tiles().map(|t| t.value).max().unwrap_or(0) }

    pub fn contains_value(&self, value: u32) -> bool { self.tiles().any(|t| t.value == value) }

    pub fn serialize(&self) -> SerializedGrid {
        let cells = (0..self.size)
            .map(|x| {
                (0..self.size)
                    .map(|y| {
                        self.cell_content(Position::new(x, y))
                            .map(|t| SerializedTile { position: t.position, value: t.value })
                    })
                    .collect()
            })
            .collect();
        SerializedGrid { size: self.size, cells }
    }

    pub fn deserialize(raw: SerializedGrid) -> Result<Self, GameError> {
        if raw.size == 0 {
            return Err(GameError::InvalidSnapshot("grid size must be positive".into()));
        }
        if raw.cells.len() != raw.size || raw.cells.iter().any(|col| col.len() != raw.size) {
            return Err(GameError::InvalidSnapshot(format!("cells are not {0}x{0}", raw.size)));
        }
        let mut grid = Self::new(raw.size);
        for (x, column) in raw.cells.into_iter().enumerate() {
            for (y, cell) in column.into_iter().enumerate() {
                let Some(tile) = cell else { continue };
                let key = Position::new(x, y);
                if tile.position != key {
                    return Err(GameError::InvalidSnapshot(format!(
                        "tile at {key:?} records position {:?}",
                        tile.position
                    )));
                }
                check_value(tile.value)?;
                grid.insert_tile(Tile::new(key, tile.value));
            }
        }
        Ok(grid)
    }
}

/// Largest tile a snapshot may hold; two of them still merge within `u32`.
pub const MAX_TILE: u32 = 1 << 30;

fn check_value(value: u32) -> Result<(), GameError> {
    if value < 2 || !value.is_power_of_two() {
        return Err(GameError::InvalidSnapshot(format!("tile value {value} is not a power of two")));
    }
    if value > MAX_TILE {
        return Err(GameError::InvalidSnapshot(format!("tile value {value} exceeds {MAX_TILE}")));
    }
    Ok(())
}

// Equality ignores per-move provenance.
impl PartialEq for Grid {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.serialize() == other.serialize()
    }
}

impl Eq for Grid {}

impl From<Grid> for SerializedGrid {
    fn from(grid: Grid) -> Self { grid.serialize() }
}

impl TryFrom<SerializedGrid> for Grid {
    type Error = GameError;
    fn try_from(raw: SerializedGrid) -> Result<Self, Self::Error> { Grid::deserialize(raw) }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(self.size * 8);
        for y in 0..self.size {
            if y > 0 {
                writeln!(f, "{rule}")?;
            }
            let row: Vec<String> = (0..self.size)
                .map(|x| match self.cell_content(Position::new(x, y)) {
                    Some(t) => format!("{:^7}", t.value),
                    None => " ".repeat(7),
                })
                .collect();
            writeln!(f, "{}", row.join("|"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn index_round_trip() {
        let p = Position::new(3, 2);
        assert_eq!(p.index(4), 11);
        assert_eq!(Position::from_index(11, 4), p);
    }

    #[test]
    fn bounds_and_availability() {
        let mut g = Grid::new(4);
        assert!(g.within_bounds(Position::new(3, 3)));
        assert!(!g.within_bounds(Position::new(4, 0)));
        assert!(!g.cell_available(Position::new(0, 4)));
        assert!(g.cell_content(Position::new(9, 9)).is_none());

        g.insert_tile(Tile::new(Position::new(1, 2), 2));
        assert!(g.cell_occupied(Position::new(1, 2)));
        assert!(!g.cell_available(Position::new(1, 2)));
        assert_eq!(g.available_cells().len(), 15);
        assert_eq!(g.remove_tile(Position::new(1, 2)).map(|t| t.value), Some(2));
        assert_eq!(g.available_cells().len(), 16);
    }

    #[test]
    fn random_cell_is_empty() {
        let mut rng = StdRng::seed_from_u64(5);
        let g = Grid::from_values(2, &[2, 4, 0, 8]).unwrap();
        for _ in 0..20 {
            assert_eq!(g.random_available_cell(&mut rng), Some(Position::new(0, 1)));
        }
        let full = Grid::from_values(2, &[2, 4, 2, 8]).unwrap();
        assert!(!full.cells_available());
        assert_eq!(full.random_available_cell(&mut rng), None);
    }

    #[test]
    fn values_are_row_major() {
        let g = Grid::from_values(2, &[2, 0, 4, 8]).unwrap();
        assert_eq!(g.cell_content(Position::new(0, 1)).map(|t| t.value), Some(4));
        assert_eq!(g.values(), vec![2, 0, 4, 8]);
    }

    #[test]
    fn serialized_cells_are_column_major() {
        let g = Grid::from_values(2, &[2, 0, 4, 0]).unwrap();
        let raw = g.serialize();
        assert_eq!(raw.cells[0][1], Some(SerializedTile { position: Position::new(0, 1), value: 4 }));
        assert_eq!(raw.cells[1][0], None);
        assert_eq!(Grid::deserialize(raw).unwrap(), g);
    }

    #[test]
    fn deserialize_rejects_misplaced_tiles() {
        let mut raw = Grid::from_values(2, &[2, 0, 0, 0]).unwrap().serialize();
        raw.cells[0][0] = Some(SerializedTile { position: Position::new(1, 1), value: 2 });
        assert!(Grid::deserialize(raw).is_err());
        assert!(Grid::from_values(2, &[3, 0, 0, 0]).is_err());
        assert!(Grid::from_values(2, &[2, 0, 0]).is_err());
    }

    #[test]
    fn rejects_tiles_that_cannot_merge() {
        assert!(Grid::from_values(2, &[1 << 31, 1 << 31, 0, 0]).is_err());
        let mut g = Grid::from_values(2, &[MAX_TILE, MAX_TILE, 0, 0]).unwrap();
        crate::game::slide(&mut g, crate::game::Direction::Left);
        assert_eq!(g.values(), vec![1 << 31, 0, 0, 0]);

        let mut raw = Grid::from_values(2, &[2, 0, 0, 0]).unwrap().serialize();
        raw.cells[0][0] = Some(SerializedTile { position: Position::new(0, 0), value: 1 << 31 });
        assert!(Grid::deserialize(raw).is_err());
    }

    #[test]
    fn json_uses_wire_shape() {
        let g = Grid::from_values(2, &[0, 2, 0, 0]).unwrap();
        let json = serde_json::to_value(&g).unwrap();
        assert_eq!(json["size"], 2);
        assert_eq!(json["cells"][1][0]["value"], 2);
        assert!(json["cells"][0][0].is_null());
        let back: Grid = serde_json::from_value(json).unwrap();
        assert_eq!(back, g);
    }
}
