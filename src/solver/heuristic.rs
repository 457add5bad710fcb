use std::sync::OnceLock;

use super::board::{extract_line, line_to_tiles, transpose, Board};

/// Weights for the per-line evaluation. Scores are summed over the four rows
/// and the four columns of a board.
#[derive(Debug, Clone, Copy)]
struct Weights {
    base: f64,
    empty: f64,
    merges: f64,
    monotonicity_power: f64,
    monotonicity: f64,
    sum_power: f64,
    sum: f64,
}

// Credit to Nneonneo for the shape of these terms.
const WEIGHTS: Weights = Weights {
    base: 200_000.0,
    empty: 270.0,
    merges: 700.0,
    monotonicity_power: 4.0,
    monotonicity: 47.0,
    sum_power: 3.5,
    sum: 11.0,
};

static LINE_SCORES: OnceLock<Box<[f64]>> = OnceLock::new();

fn line_scores() -> &'static [f64] {
    LINE_SCORES.get_or_init(|| (0..0x1_0000u64).map(|line| score_line(line_to_tiles(line), &WEIGHTS)).collect())
}

pub(crate) fn warm() { let _ = line_scores(); }

/// Static evaluation of a board: higher is better for the player.
pub(crate) fn evaluate(board: Board) -> f64 {
    let table = line_scores();
    let transposed = transpose(board.raw());
    (0..4).fold(0.0, |acc, idx| {
        acc + table[extract_line(board.raw(), idx) as usize] + table[extract_line(transposed, idx) as usize]
    })
}

fn score_line(tiles: [u8; 4], w: &Weights) -> f64 {
    let empty = tiles.iter().filter(|&&t| t == 0).count() as f64;

    // Runs of equal adjacent tiles; a run of k equal tiles counts k.
    let mut merges = 0.0;
    let mut run = 0.0;
    let mut prev = 0u8;
    for &t in &tiles {
        if t != 0 && t == prev {
            run += 1.0;
        } else if run > 0.0 {
            merges += 1.0 + run;
            run = 0.0;
        }
        prev = t;
    }
    if run > 0.0 {
        merges += 1.0 + run;
    }

    let (mut towards_start, mut towards_end) = (0.0, 0.0);
    for pair in tiles.windows(2) {
        let a = f64::from(pair[0]).powf(w.monotonicity_power);
        let b = f64::from(pair[1]).powf(w.monotonicity_power);
        if a > b {
            towards_start += a - b;
        } else {
            towards_end += b - a;
        }
    }
    let monotonicity = f64::min(towards_start, towards_end);

    let sum: f64 = tiles.iter().map(|&t| f64::from(t).powf(w.sum_power)).sum();

    w.base + w.empty * empty + w.merges * merges - w.monotonicity * monotonicity - w.sum * sum
}
