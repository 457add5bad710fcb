//! The move engine: slide and merge tiles on a [`Grid`].
//!
//! A move walks the board from the edge tiles are travelling towards, so a
//! tile never overtakes one in front of it. Each tile slides to the farthest
//! empty cell; if the cell beyond holds an equal tile that was not itself
//! produced by a merge this move, the two combine. A merge product is never
//! eligible again within the same move, which is what turns `[2, 2, 2, 2]`
//! into `[4, 4, _, _]` rather than `[8, _, _, _]`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::grid::{Grid, Position, Tile, MAX_TILE};

/// A direction to move/merge tiles.
///
/// Discriminants are the wire codes used by the solver worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up = 0,
    Left = 1,
    Down = 2,
    Right = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Left, Direction::Down, Direction::Right];

    #[inline]
    pub fn code(self) -> u8 { self as u8 }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Direction::Up),
            1 => Some(Direction::Left),
            2 => Some(Direction::Down),
            3 => Some(Direction::Right),
            _ => None,
        }
    }

    /// Unit step `(dx, dy)` for this direction.
    #[inline]
    pub fn vector(self) -> (isize, isize) {
        match self {
            Direction::Up => (0, -1),
            Direction::Left => (-1, 0),
            Direction::Down => (0, 1),
            Direction::Right => (1, 0),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Up => "up",
            Direction::Left => "left",
            Direction::Down => "down",
            Direction::Right => "right",
        };
        f.write_str(s)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "w" | "k" => Ok(Direction::Up),
            "left" | "a" | "h" => Ok(Direction::Left),
            "down" | "s" | "j" => Ok(Direction::Down),
            "right" | "d" | "l" => Ok(Direction::Right),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// One merge event from a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merge {
    pub position: Position,
    pub value: u32,
    /// Pre-move positions of the two tiles that combined.
    pub sources: [Position; 2],
}

/// What a single slide did to the grid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlideOutcome {
    pub moved: bool,
    pub score_delta: u64,
    pub merges: Vec<Merge>,
}

impl SlideOutcome {
    /// Largest tile produced by a merge in this slide.
    pub fn max_merged(&self) -> Option<u32> { self.merges.iter().map(|m| m.value).max() }
}

/// Cell visit order for a move: farthest-from-destination cells come last.
pub(crate) struct Traversals {
    pub xs: Vec<usize>,
    pub ys: Vec<usize>,
}

pub(crate) fn build_traversals(size: usize, direction: Direction) -> Traversals {
    let (dx, dy) = direction.vector();
    let mut xs: Vec<usize> = (0..size).collect();
    let mut ys: Vec<usize> = (0..size).collect();
    if dx > 0 {
        xs.reverse();
    }
    if dy > 0 {
        ys.reverse();
    }
    Traversals { xs, ys }
}

/// Farthest empty cell reachable from `cell`, and the cell just past it
/// (`None` when that would be off the board).
pub(crate) fn find_farthest_position(
    grid: &Grid,
    cell: Position,
    direction: Direction,
) -> (Position, Option<Position>) {
    let (dx, dy) = direction.vector();
    let mut farthest = cell;
    loop {
        match farthest.step(dx, dy) {
            Some(next) if grid.cell_available(next) => farthest = next,
            Some(next) if grid.within_bounds(next) => return (farthest, Some(next)),
            _ => return (farthest, None),
        }
    }
}

/// Record every tile's position and clear merge provenance.
pub fn prepare_tiles(grid: &mut Grid) {
    for tile in grid.tiles_mut() {
        tile.merged_from = None;
        tile.save_position();
    }
}

/// Slide and merge all tiles in `direction`. Does not add a new tile.
///
/// ```
/// use game_2048::game::{slide, Direction, Grid};
/// let mut g = Grid::from_values(4, &[2, 2, 2, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
/// let out = slide(&mut g, Direction::Left);
/// assert!(out.moved);
/// assert_eq!(out.score_delta, 8);
/// assert_eq!(&g.values()[..4], &[4, 4, 0, 0]);
/// ```
pub fn slide(grid: &mut Grid, direction: Direction) -> SlideOutcome {
    prepare_tiles(grid);
    let traversals = build_traversals(grid.size(), direction);
    let mut outcome = SlideOutcome::default();

    for &x in &traversals.xs {
        for &y in &traversals.ys {
            let cell = Position::new(x, y);
            let Some(value) = grid.cell_content(cell).map(|t| t.value) else { continue };
            let (farthest, next) = find_farthest_position(grid, cell, direction);

            let merge_target = next.filter(|&n| {
                value <= MAX_TILE
                    && grid.cell_content(n).is_some_and(|other| other.value == value && !other.is_merge_product())
            });

            let Some(target) = merge_target else {
                if farthest != cell {
                    if let Some(mut tile) = grid.remove_tile(cell) {
                        tile.update_position(farthest);
                        grid.insert_tile(tile);
                    }
                    outcome.moved = true;
                }
                continue;
            };

            let (Some(mut moving), Some(resting)) = (grid.remove_tile(cell), grid.remove_tile(target)) else {
                continue;
            };
            moving.update_position(target);
            let sources = [
                moving.previous_position.unwrap_or(cell),
                resting.previous_position.unwrap_or(target),
            ];
            let mut merged = Tile::new(target, value * 2);
            merged.merged_from = Some(Box::new([moving, resting]));
            grid.insert_tile(merged);

            outcome.score_delta += u64::from(value * 2);
            outcome.merges.push(Merge { position: target, value: value * 2, sources });
            outcome.moved = true;
        }
    }
    outcome
}

/// True if any two orthogonally adjacent tiles share a value that can
/// still merge.
pub fn tile_matches_available(grid: &Grid) -> bool {
    grid.positions().any(|pos| {
        let Some(tile) = grid.cell_content(pos).filter(|t| t.value <= MAX_TILE) else { return false };
        Direction::ALL.iter().any(|dir| {
            let (dx, dy) = dir.vector();
            pos.step(dx, dy)
                .and_then(|n| grid.cell_content(n))
                .is_some_and(|other| other.value == tile.value)
        })
    })
}

/// True unless the board is full with no adjacent equal pair.
pub fn moves_available(grid: &Grid) -> bool {
    grid.cells_available() || tile_matches_available(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: [u32; 4]) -> Grid {
        let mut all = [0u32; 16];
        all[..4].copy_from_slice(&values);
        Grid::from_values(4, &all).unwrap()
    }

    fn first_row(grid: &Grid) -> Vec<u32> { grid.values()[..4].to_vec() }

    #[test]
    fn direction_codes() {
        for d in Direction::ALL {
            assert_eq!(Direction::from_code(d.code()), Some(d));
        }
        assert_eq!(Direction::from_code(4), None);
        assert_eq!("W".parse::<Direction>(), Ok(Direction::Up));
        assert_eq!("right".parse::<Direction>(), Ok(Direction::Right));
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn traversals_start_at_destination_edge() {
        let t = build_traversals(4, Direction::Right);
        assert_eq!(t.xs, vec![3, 2, 1, 0]);
        assert_eq!(t.ys, vec![0, 1, 2, 3]);
        let t = build_traversals(4, Direction::Down);
        assert_eq!(t.xs, vec![0, 1, 2, 3]);
        assert_eq!(t.ys, vec![3, 2, 1, 0]);
        let t = build_traversals(4, Direction::Up);
        assert_eq!(t.ys, vec![0, 1, 2, 3]);
    }

    #[test]
    fn farthest_position_stops_at_obstacle() {
        let g = row([0, 0, 2, 4]);
        assert_eq!(
            find_farthest_position(&g, Position::new(2, 0), Direction::Left),
            (Position::new(0, 0), None)
        );
        assert_eq!(
            find_farthest_position(&g, Position::new(2, 0), Direction::Right),
            (Position::new(2, 0), Some(Position::new(3, 0)))
        );
    }

    #[test]
    fn merge_happens_once_per_tile() {
        let mut g = row([2, 2, 4, 0]);
        let out = slide(&mut g, Direction::Right);
        assert_eq!(first_row(&g), vec![0, 0, 4, 4]);
        assert_eq!(out.score_delta, 4);
        assert_eq!(out.merges.len(), 1);
    }

    #[test]
    fn chains_collapse_pairwise() {
        let mut g = row([2, 2, 2, 2]);
        slide(&mut g, Direction::Left);
        assert_eq!(first_row(&g), vec![4, 4, 0, 0]);

        let mut g = row([2, 2, 2, 2]);
        slide(&mut g, Direction::Right);
        assert_eq!(first_row(&g), vec![0, 0, 4, 4]);

        let mut g = row([0, 2, 2, 2]);
        slide(&mut g, Direction::Right);
        assert_eq!(first_row(&g), vec![0, 0, 2, 4]);
    }

    #[test]
    fn merge_records_provenance() {
        let mut g = row([2, 0, 0, 2]);
        let out = slide(&mut g, Direction::Left);
        let merged = g.cell_content(Position::new(0, 0)).unwrap();
        assert_eq!(merged.value, 4);
        let sources = merged.merged_from.as_ref().unwrap();
        assert_eq!(sources[0].previous_position, Some(Position::new(3, 0)));
        assert_eq!(sources[0].position, Position::new(0, 0));
        assert_eq!(out.merges[0].sources, [Position::new(3, 0), Position::new(0, 0)]);
        // Cleared at the start of the next move.
        slide(&mut g, Direction::Right);
        assert!(g.tiles().all(|t| t.merged_from.is_none()));
    }

    #[test]
    fn blocked_move_has_no_effect() {
        let mut g = row([2, 4, 8, 16]);
        let before = g.clone();
        let out = slide(&mut g, Direction::Left);
        assert!(!out.moved);
        assert_eq!(out.score_delta, 0);
        assert_eq!(g, before);
    }

    #[test]
    fn vertical_moves() {
        #[rustfmt::skip]
        let mut g = Grid::from_values(4, &[
            2, 0, 0, 0,
            2, 0, 0, 0,
            4, 0, 0, 0,
            4, 0, 0, 2,
        ]).unwrap();
        let out = slide(&mut g, Direction::Up);
        #[rustfmt::skip]
        assert_eq!(g.values(), vec![
            4, 0, 0, 2,
            8, 0, 0, 0,
            0, 0, 0, 0,
            0, 0, 0, 0,
        ]);
        assert_eq!(out.score_delta, 12);
        assert_eq!(out.max_merged(), Some(8));
    }

    #[test]
    fn game_over_scan() {
        #[rustfmt::skip]
        let stuck = Grid::from_values(4, &[
            2, 4, 2, 4,
            4, 2, 4, 2,
            2, 4, 2, 4,
            4, 2, 4, 2,
        ]).unwrap();
        assert!(!moves_available(&stuck));

        #[rustfmt::skip]
        let vertical_pair = Grid::from_values(4, &[
            2, 4, 2, 4,
            4, 2, 4, 2,
            2, 4, 2, 4,
            4, 2, 4, 4,
        ]).unwrap();
        assert!(tile_matches_available(&vertical_pair));
        assert!(moves_available(&vertical_pair));

        assert!(moves_available(&row([2, 4, 8, 16])));
    }

    #[test]
    fn top_tiles_do_not_overflow() {
        let mut g = row([MAX_TILE, MAX_TILE, MAX_TILE, MAX_TILE]);
        let out = slide(&mut g, Direction::Left);
        assert_eq!(out.score_delta, 2 * u64::from(MAX_TILE) * 2);
        assert_eq!(first_row(&g), vec![1 << 31, 1 << 31, 0, 0]);

        let out = slide(&mut g, Direction::Left);
        assert!(!out.moved);
        assert_eq!(first_row(&g), vec![1 << 31, 1 << 31, 0, 0]);
        assert!(!tile_matches_available(&g));
    }
}
