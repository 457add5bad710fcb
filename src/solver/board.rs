use std::fmt;
use std::sync::OnceLock;

use crate::game::Direction;

const LINE_TABLE_SIZE: usize = 0x1_0000; // 65,536 possible 16-bit lines
const CELLS: usize = 16;
const MAX_EXPONENT: u8 = 0xf;

struct ShiftTables {
    left: Box<[u64]>,
    right: Box<[u64]>,
    up: Box<[u64]>,
    down: Box<[u64]>,
}

type BoardRaw = u64;
type Line = u64;

/// Packed 4x4 board: 16 four-bit exponents in a `u64`.
///
/// Cell index 0 (top-left) is the most significant nibble, index 15
/// (bottom-right) the least. An exponent `e` means tile value `2^e`; 0 is empty.
/// This is the worker's private mirror of the host grid.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Board(BoardRaw);

impl Board {
    pub const EMPTY: Board = Board(0);

    #[inline]
    pub fn from_raw(raw: BoardRaw) -> Self { Board(raw) }

    #[inline]
    pub fn raw(self) -> BoardRaw { self.0 }

    /// Build from 16 row-major face values (0 = empty).
    ///
    /// Returns `None` for the wrong length or a value that is not a power of
    /// two between 2 and 32768.
    pub fn from_values(values: &[u32]) -> Option<Self> {
        if values.len() != CELLS {
            return None;
        }
        let mut board = Board::EMPTY;
        for (idx, &value) in values.iter().enumerate() {
            if value == 0 {
                continue;
            }
            board = board.with_tile(idx, Self::exponent_for(value)?);
        }
        Some(board)
    }

    /// Exponent encoding a face value, if it fits in a nibble.
    pub fn exponent_for(value: u32) -> Option<u8> {
        if value < 2 || !value.is_power_of_two() {
            return None;
        }
        let e = value.trailing_zeros() as u8;
        (e <= MAX_EXPONENT).then_some(e)
    }

    /// Row-major face values, the inverse of [`Board::from_values`].
    pub fn values(self) -> Vec<u32> {
        (0..CELLS)
            .map(|idx| match self.exponent(idx) {
                0 => 0,
                e => 1 << e,
            })
            .collect()
    }

    /// Exponent stored at row-major `idx`.
    #[inline]
    pub fn exponent(self, idx: usize) -> u8 {
        ((self.0 >> (60 - 4 * idx)) & 0xf) as u8
    }

    /// Overwrite the cell at `idx` with `exponent`.
    #[inline]
    pub fn with_tile(self, idx: usize, exponent: u8) -> Self {
        let shift = 60 - 4 * idx;
        Board((self.0 & !(0xf << shift)) | (u64::from(exponent & 0xf) << shift))
    }

    /// Slide/merge in `dir` without inserting a tile.
    #[inline]
    pub fn shift(self, dir: Direction) -> Self {
        let t = tables();
        match dir {
            Direction::Left => shift_rows(self, &t.left),
            Direction::Right => shift_rows(self, &t.right),
            Direction::Up => shift_cols(self, &t.up),
            Direction::Down => shift_cols(self, &t.down),
        }
    }

    /// Directions that change the board.
    pub fn legal_moves(self) -> impl Iterator<Item = Direction> {
        Direction::ALL.into_iter().filter(move |&d| self.shift(d) != self)
    }

    #[inline]
    pub fn is_game_over(self) -> bool { self.legal_moves().next().is_none() }

    /// Row-major indices of empty cells.
    pub fn empty_cells(self) -> impl Iterator<Item = usize> {
        (0..CELLS).filter(move |&idx| self.exponent(idx) == 0)
    }

    // https://stackoverflow.com/questions/38225571/count-number-of-zero-nibbles-in-an-unsigned-64-bit-integer
    pub fn count_empty(self) -> u64 {
        let mut x = self.0;
        x |= x >> 1;
        x |= x >> 2;
        x &= 0x1111_1111_1111_1111;
        16 - u64::from(x.count_ones())
    }

    /// Number of distinct non-empty tile values.
    pub fn count_distinct(self) -> u32 {
        let mut seen = 0u32;
        let mut raw = self.0;
        while raw != 0 {
            seen |= 1 << (raw & 0xf);
            raw >>= 4;
        }
        (seen >> 1).count_ones()
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Board({:#018x})", self.0)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, chunk) in self.values().chunks(4).enumerate() {
            if row > 0 {
                writeln!(f, "{}", "-".repeat(31))?;
            }
            let cells: Vec<String> = chunk
                .iter()
                .map(|&v| if v == 0 { " ".repeat(7) } else { format!("{v:^7}") })
                .collect();
            writeln!(f, "{}", cells.join("|"))?;
        }
        Ok(())
    }
}

static TABLES: OnceLock<ShiftTables> = OnceLock::new();

#[inline(always)]
fn tables() -> &'static ShiftTables { TABLES.get_or_init(build_tables) }

/// Build lookup tables eagerly. Safe to call multiple times.
pub fn warm() { let _ = tables(); }

fn build_tables() -> ShiftTables {
    let mut left = vec![0u64; LINE_TABLE_SIZE];
    let mut right = vec![0u64; LINE_TABLE_SIZE];
    let mut up = vec![0u64; LINE_TABLE_SIZE];
    let mut down = vec![0u64; LINE_TABLE_SIZE];

    for (val, ((l, r), (u, d))) in left
        .iter_mut()
        .zip(right.iter_mut())
        .zip(up.iter_mut().zip(down.iter_mut()))
        .enumerate()
    {
        let tiles = line_to_tiles(val as Line);
        let towards_start = collapse_line(tiles);
        let mut reversed = tiles;
        reversed.reverse();
        let mut towards_end = collapse_line(reversed);
        towards_end.reverse();

        *l = pack_row(towards_start);
        *r = pack_row(towards_end);
        *u = pack_col(towards_start);
        *d = pack_col(towards_end);
    }

    ShiftTables {
        left: left.into_boxed_slice(),
        right: right.into_boxed_slice(),
        up: up.into_boxed_slice(),
        down: down.into_boxed_slice(),
    }
}

/// Slide a line towards index 0, merging each pair at most once.
fn collapse_line(tiles: [u8; 4]) -> [u8; 4] {
    let mut out = [0u8; 4];
    let mut len = 0;
    let mut mergeable = false;
    for &t in tiles.iter().filter(|&&t| t != 0) {
        if mergeable && out[len - 1] == t && t < MAX_EXPONENT {
            out[len - 1] += 1;
            mergeable = false;
        } else {
            out[len] = t;
            len += 1;
            mergeable = true;
        }
    }
    out
}

// Credit to Nneonneo
pub(crate) fn transpose(x: BoardRaw) -> BoardRaw {
    let a1 = x & 0xF0F0_0F0F_F0F0_0F0F;
    let a2 = x & 0x0000_F0F0_0000_F0F0;
    let a3 = x & 0x0F0F_0000_0F0F_0000;
    let a = a1 | (a2 << 12) | (a3 >> 12);
    let b1 = a & 0xFF00_FF00_00FF_00FF;
    let b2 = a & 0x00FF_00FF_0000_0000;
    let b3 = a & 0x0000_0000_FF00_FF00;
    b1 | (b2 >> 24) | (b3 << 24)
}

/// Row (or, on a transposed board, column) `line_idx`, top first.
#[inline]
pub(crate) fn extract_line(board: BoardRaw, line_idx: u64) -> Line {
    (board >> ((3 - line_idx) * 16)) & 0xffff
}

pub(crate) fn line_to_tiles(line: Line) -> [u8; 4] {
    [
        ((line >> 12) & 0xf) as u8,
        ((line >> 8) & 0xf) as u8,
        ((line >> 4) & 0xf) as u8,
        (line & 0xf) as u8,
    ]
}

fn pack_row(t: [u8; 4]) -> Line {
    u64::from(t[0]) << 12 | u64::from(t[1]) << 8 | u64::from(t[2]) << 4 | u64::from(t[3])
}

fn pack_col(t: [u8; 4]) -> Line {
    u64::from(t[0]) << 48 | u64::from(t[1]) << 32 | u64::from(t[2]) << 16 | u64::from(t[3])
}

fn shift_rows(board: Board, table: &[u64]) -> Board {
    let raw = (0..4).fold(0, |acc, row_idx| {
        let row = extract_line(board.0, row_idx) as usize;
        acc | (table[row] << (48 - 16 * row_idx))
    });
    Board(raw)
}

fn shift_cols(board: Board, table: &[u64]) -> Board {
    let t = transpose(board.0);
    let raw = (0..4).fold(0, |acc, col_idx| {
        let col = extract_line(t, col_idx) as usize;
        acc | (table[col] << (12 - 4 * col_idx))
    });
    Board(raw)
}
