//! Binary log of a game's effective moves.
//!
//! Layout, little-endian throughout:
//!
//! ```text
//! magic "G2R1" | version u8 | size u8 | win_value u32 | has_seed u8 | seed u64
//! | start_score u64 | final_score u64 | start_count u16 | steps u32
//! | start tiles:  (index u16, exponent u8) * start_count
//! | steps:        (direction u8, index u16, exponent u8) * steps   (exponent 0 = no tile)
//! | crc32c of everything above, u32
//! ```

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::ReplayError;
use crate::game::{Direction, Game, GameState, Grid, PlacedTile, Position};

const MAGIC: &[u8; 4] = b"G2R1";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 1 + 4 + 1 + 8 + 8 + 8 + 2 + 4;
const TILE_LEN: usize = 3;
const STEP_LEN: usize = 1 + TILE_LEN;

/// One effective move and the tile placed after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStep {
    pub direction: Direction,
    pub tile: Option<PlacedTile>,
}

/// A recorded game: enough to rebuild it move by move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay {
    pub size: usize,
    pub win_value: u32,
    pub seed: Option<u64>,
    /// Nonzero when recording began from a resumed game.
    pub start_score: u64,
    pub final_score: u64,
    pub start_tiles: Vec<PlacedTile>,
    pub steps: Vec<ReplayStep>,
}

impl Replay {
    pub fn new(size: usize, win_value: u32, seed: Option<u64>, start_tiles: Vec<PlacedTile>) -> Self {
        Self { size, win_value, seed, start_score: 0, final_score: 0, start_tiles, steps: Vec::new() }
    }

    /// Start recording from a board already in play.
    pub fn resume(state: &GameState, win_value: u32, seed: Option<u64>) -> Self {
        let grid = &state.grid;
        let tiles = grid.tiles().map(|t| PlacedTile { position: t.position, value: t.value }).collect();
        Self {
            start_score: state.score,
            final_score: state.score,
            ..Self::new(grid.size(), win_value, seed, tiles)
        }
    }

    pub fn record(&mut self, direction: Direction, tile: Option<PlacedTile>, score: u64) {
        self.steps.push(ReplayStep { direction, tile });
        self.final_score = score;
    }

    pub fn len(&self) -> usize { self.steps.len() }

    pub fn is_empty(&self) -> bool { self.steps.is_empty() }

    /// Rebuild the game by re-applying every step.
    ///
    /// A win that blocked further moves is continued automatically, since
    /// later steps can only exist if the player chose to keep playing.
    pub fn play(&self) -> Result<Game, ReplayError> {
        let empty = GameState {
            grid: Grid::new(self.size),
            score: self.start_score,
            over: false,
            won: false,
            keep_playing: false,
        };
        let mut game = Game::from_state(empty, self.win_value);
        for tile in &self.start_tiles {
            game.place_tile(*tile).ok_or_else(|| diverged(0, format!("start tile {tile:?} does not fit")))?;
        }
        for (i, step) in self.steps.iter().enumerate() {
            let n = i + 1;
            if game.is_won() && !game.keeps_playing() {
                game.keep_playing();
            }
            game.shift(step.direction)
                .ok_or_else(|| diverged(n, format!("{} had no effect", step.direction)))?;
            if let Some(tile) = step.tile {
                game.place_tile(tile).ok_or_else(|| diverged(n, format!("tile {tile:?} landed on an occupied cell")))?;
            }
            game.refresh_over();
        }
        if game.score() != self.final_score {
            return Err(diverged(
                self.steps.len(),
                format!("score {} does not match recorded {}", game.score(), self.final_score),
            ));
        }
        Ok(game)
    }
}

fn diverged(step: usize, reason: String) -> ReplayError { ReplayError::Diverged { step, reason } }

fn field<const N: usize>(content: &[u8], off: &mut usize) -> Result<[u8; N], ReplayError> {
    let bytes = content.get(*off..*off + N).ok_or(ReplayError::Malformed)?;
    *off += N;
    bytes.try_into().map_err(|_| ReplayError::Malformed)
}

fn exponent(value: u32) -> u8 { value.trailing_zeros() as u8 }

fn push_tile(buf: &mut Vec<u8>, tile: Option<PlacedTile>, size: usize) -> Result<(), ReplayError> {
    let (index, exp) = match tile {
        Some(t) => (t.position.index(size), exponent(t.value)),
        None => (0, 0),
    };
    let index: u16 = index.try_into().map_err(|_| ReplayError::Malformed)?;
    buf.extend_from_slice(&index.to_le_bytes());
    buf.push(exp);
    Ok(())
}

fn read_tile(bytes: &[u8], size: usize) -> Result<Option<PlacedTile>, ReplayError> {
    let index = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
    match bytes[2] {
        0 => Ok(None),
        exp if exp < 32 && index < size * size => {
            Ok(Some(PlacedTile { position: Position::from_index(index, size), value: 1 << exp }))
        }
        _ => Err(ReplayError::Malformed),
    }
}

pub fn encode(replay: &Replay) -> Result<Vec<u8>, ReplayError> {
    let size: u8 = replay.size.try_into().map_err(|_| ReplayError::Malformed)?;
    let start_count: u16 = replay.start_tiles.len().try_into().map_err(|_| ReplayError::Malformed)?;
    let steps: u32 = replay.steps.len().try_into().map_err(|_| ReplayError::Malformed)?;

    let body_len = replay.start_tiles.len() * TILE_LEN + replay.steps.len() * STEP_LEN;
    let mut buf = Vec::with_capacity(HEADER_LEN + body_len + 4);
    buf.extend_from_slice(MAGIC);
    buf.push(VERSION);
    buf.push(size);
    buf.extend_from_slice(&replay.win_value.to_le_bytes());
    buf.push(u8::from(replay.seed.is_some()));
    buf.extend_from_slice(&replay.seed.unwrap_or(0).to_le_bytes());
    buf.extend_from_slice(&replay.start_score.to_le_bytes());
    buf.extend_from_slice(&replay.final_score.to_le_bytes());
    buf.extend_from_slice(&start_count.to_le_bytes());
    buf.extend_from_slice(&steps.to_le_bytes());

    for tile in &replay.start_tiles {
        push_tile(&mut buf, Some(*tile), replay.size)?;
    }
    for step in &replay.steps {
        buf.push(step.direction.code());
        push_tile(&mut buf, step.tile, replay.size)?;
    }

    let checksum = crc32c::crc32c(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    Ok(buf)
}

pub fn decode(bytes: &[u8]) -> Result<Replay, ReplayError> {
    if bytes.len() < HEADER_LEN + 4 {
        return Err(ReplayError::Malformed);
    }
    let (content, trailer) = bytes.split_at(bytes.len() - 4);
    let file_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    if file_crc != crc32c::crc32c(content) {
        return Err(ReplayError::Checksum);
    }
    if &content[..4] != MAGIC || content[4] != VERSION {
        return Err(ReplayError::MagicOrVersion);
    }

    let size = content[5] as usize;
    if size == 0 {
        return Err(ReplayError::Malformed);
    }
    let mut off = 6;
    let win_value = u32::from_le_bytes(field(content, &mut off)?);
    let [has_seed] = field::<1>(content, &mut off)?;
    let seed = u64::from_le_bytes(field(content, &mut off)?);
    let start_score = u64::from_le_bytes(field(content, &mut off)?);
    let final_score = u64::from_le_bytes(field(content, &mut off)?);
    let start_count = u16::from_le_bytes(field(content, &mut off)?) as usize;
    let step_count = u32::from_le_bytes(field(content, &mut off)?) as usize;

    let body = &content[HEADER_LEN..];
    let expected = start_count
        .checked_mul(TILE_LEN)
        .and_then(|a| step_count.checked_mul(STEP_LEN).and_then(|b| a.checked_add(b)))
        .ok_or(ReplayError::Malformed)?;
    if body.len() != expected {
        return Err(ReplayError::Malformed);
    }

    let (start_bytes, step_bytes) = body.split_at(start_count * TILE_LEN);
    let start_tiles = start_bytes
        .chunks_exact(TILE_LEN)
        .map(|chunk| read_tile(chunk, size)?.ok_or(ReplayError::Malformed))
        .collect::<Result<Vec<_>, _>>()?;
    let steps = step_bytes
        .chunks_exact(STEP_LEN)
        .map(|chunk| {
            let direction = Direction::from_code(chunk[0]).ok_or(ReplayError::Malformed)?;
            Ok(ReplayStep { direction, tile: read_tile(&chunk[1..], size)? })
        })
        .collect::<Result<Vec<_>, ReplayError>>()?;

    Ok(Replay {
        size,
        win_value,
        seed: (has_seed != 0).then_some(seed),
        start_score,
        final_score,
        start_tiles,
        steps,
    })
}

pub fn write_to_path<P: AsRef<Path>>(path: P, replay: &Replay) -> Result<(), ReplayError> {
    let data = encode(replay)?;
    let mut f = fs::File::create(path)?;
    f.write_all(&data)?;
    Ok(())
}

pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Replay, ReplayError> {
    decode(&fs::read(path)?)
}
