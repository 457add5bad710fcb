use std::collections::HashMap;

use rayon::prelude::*;

use crate::game::Direction;

use super::board::{self, Board};
use super::heuristic::{self, evaluate};

/// Knobs for both searches.
///
/// - `prob_cutoff`: expectimax stops expanding chance branches whose
///   cumulative probability falls below this.
/// - `depth_cap`: hard cap on expectimax depth (`None` keeps the dynamic
///   depth, which grows with the number of distinct tiles).
/// - `adversary_depth`: player plies searched below each candidate placement
///   when choosing an adversarial tile.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub prob_cutoff: f32,
    pub depth_cap: Option<u32>,
    pub adversary_depth: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { prob_cutoff: 1e-4, depth_cap: None, adversary_depth: 2 }
    }
}

/// Node counts from the last search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub nodes: u64,
    pub peak_nodes: u64,
}

/// One candidate adversarial placement and the player's best reply value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub index: usize,
    pub exponent: u8,
    pub value: f64,
}

#[derive(Clone, Copy)]
struct CacheEntry {
    score: f64,
    depth: u32,
}

/// Move search (expectimax against random tiles) and tile search (minimax
/// against a player who answers each tile with their best move).
pub struct Searcher {
    cfg: SearchConfig,
    stats: SearchStats,
}

impl Searcher {
    pub fn new(cfg: SearchConfig) -> Self {
        board::warm();
        heuristic::warm();
        Self { cfg, stats: SearchStats::default() }
    }

    #[inline]
    pub fn last_stats(&self) -> SearchStats { self.stats }

    /// Best direction by expectimax, or `None` if no move changes the board.
    pub fn best_move(&mut self, board: Board) -> Option<Direction> {
        let depth = self.depth_for(board);
        let mut cache = HashMap::new();
        let mut nodes = 0u64;
        let mut best: Option<(Direction, f64)> = None;
        for dir in board.legal_moves() {
            let score = self.chance(board.shift(dir), depth, 1.0, &mut cache, &mut nodes);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((dir, score));
            }
        }
        self.record(nodes);
        best.map(|(dir, _)| dir)
    }

    /// Score every possible 2/4 placement on `board`, lowest (worst for the
    /// player) first.
    pub fn rank_placements(&mut self, board: Board) -> Vec<Placement> {
        let depth = self.cfg.adversary_depth.max(1);
        let candidates: Vec<(usize, u8)> =
            board.empty_cells().flat_map(|idx| [(idx, 1u8), (idx, 2u8)]).collect();
        let mut ranked: Vec<(Placement, u64)> = candidates
            .par_iter()
            .map(|&(index, exponent)| {
                let mut nodes = 0u64;
                let value = minimax_player(
                    board.with_tile(index, exponent),
                    depth,
                    f64::NEG_INFINITY,
                    f64::INFINITY,
                    &mut nodes,
                );
                (Placement { index, exponent, value }, nodes)
            })
            .collect();
        ranked.sort_by(|a, b| a.0.value.total_cmp(&b.0.value));
        self.record(ranked.iter().map(|(_, n)| n).sum());
        ranked.into_iter().map(|(p, _)| p).collect()
    }

    fn record(&mut self, nodes: u64) {
        self.stats.nodes = nodes;
        self.stats.peak_nodes = self.stats.peak_nodes.max(nodes);
    }

    fn depth_for(&self, board: Board) -> u32 {
        let dynamic = board.count_distinct().saturating_sub(2).max(3);
        self.cfg.depth_cap.map_or(dynamic, |cap| dynamic.min(cap.max(1)))
    }

    fn max_node(
        &self,
        board: Board,
        depth: u32,
        prob: f32,
        cache: &mut HashMap<Board, CacheEntry>,
        nodes: &mut u64,
    ) -> f64 {
        *nodes += 1;
        board
            .legal_moves()
            .map(|dir| self.chance(board.shift(dir), depth, prob, cache, nodes))
            .fold(0.0, f64::max)
    }

    fn chance(
        &self,
        board: Board,
        depth: u32,
        prob: f32,
        cache: &mut HashMap<Board, CacheEntry>,
        nodes: &mut u64,
    ) -> f64 {
        *nodes += 1;
        if depth == 0 || prob < self.cfg.prob_cutoff {
            return evaluate(board);
        }
        if let Some(entry) = cache.get(&board) {
            if entry.depth >= depth {
                return entry.score;
            }
        }
        let empty = board.count_empty();
        if empty == 0 {
            return evaluate(board);
        }
        let branch_prob = prob / empty as f32;
        let mut score = 0.0;
        for idx in board.empty_cells() {
            score += 0.9 * self.max_node(board.with_tile(idx, 1), depth - 1, branch_prob * 0.9, cache, nodes);
            score += 0.1 * self.max_node(board.with_tile(idx, 2), depth - 1, branch_prob * 0.1, cache, nodes);
        }
        score /= empty as f64;
        cache.insert(board, CacheEntry { score, depth });
        score
    }
}

impl Default for Searcher {
    fn default() -> Self { Self::new(SearchConfig::default()) }
}

fn minimax_player(board: Board, depth: u32, mut alpha: f64, beta: f64, nodes: &mut u64) -> f64 {
    *nodes += 1;
    if depth == 0 {
        return evaluate(board);
    }
    let mut best = f64::NEG_INFINITY;
    for dir in board.legal_moves() {
        best = best.max(minimax_adversary(board.shift(dir), depth - 1, alpha, beta, nodes));
        alpha = alpha.max(best);
        if alpha >= beta {
            break;
        }
    }
    // No legal move: the adversary has won outright.
    if best == f64::NEG_INFINITY { 0.0 } else { best }
}

fn minimax_adversary(board: Board, depth: u32, alpha: f64, mut beta: f64, nodes: &mut u64) -> f64 {
    *nodes += 1;
    if depth == 0 {
        return evaluate(board);
    }
    let mut worst = f64::INFINITY;
    for idx in board.empty_cells() {
        for exponent in [1u8, 2u8] {
            worst = worst.min(minimax_player(board.with_tile(idx, exponent), depth, alpha, beta, nodes));
            beta = beta.min(worst);
            if beta <= alpha {
                return worst;
            }
        }
    }
    if worst == f64::INFINITY { evaluate(board) } else { worst }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> Searcher {
        Searcher::new(SearchConfig { depth_cap: Some(2), ..SearchConfig::default() })
    }

    #[test]
    fn best_move_is_legal() {
        let board = Board::from_raw(0x1100_0000_0000_0000);
        let mut s = quick();
        let dir = s.best_move(board).unwrap();
        assert_ne!(board.shift(dir), board);
        assert!(s.last_stats().nodes > 0);
    }

    #[test]
    fn no_move_on_stuck_board() {
        let stuck = Board::from_raw(0x1212_2121_1212_2121);
        assert_eq!(quick().best_move(stuck), None);
    }

    #[test]
    fn placements_cover_every_empty_cell_sorted() {
        let board = Board::from_raw(0x1234_5612_3456_1200);
        let ranked = Searcher::new(SearchConfig { adversary_depth: 1, ..SearchConfig::default() })
            .rank_placements(board);
        assert_eq!(ranked.len(), 4);
        assert!(ranked.iter().all(|p| board.exponent(p.index) == 0));
        assert!(ranked.windows(2).all(|w| w[0].value <= w[1].value));
    }

    #[test]
    fn full_board_has_no_placements() {
        let stuck = Board::from_raw(0x1212_2121_1212_2121);
        assert!(quick().rank_placements(stuck).is_empty());
    }
}
