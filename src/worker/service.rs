use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use crate::game::Direction;
use crate::solver::{Board, SearchConfig, Searcher};

use super::protocol::{Kind, Request, RequestFrame, Response, WorkerMessage};

const BOARD_CELLS: usize = 16;

/// The worker side of the protocol: a sequential state machine over a
/// packed 4x4 mirror of the host board.
///
/// Requests are handled strictly one at a time in arrival order.
pub struct SolverWorker {
    board: Board,
    searcher: Searcher,
    rng: StdRng,
}

impl SolverWorker {
    pub fn new(search: SearchConfig) -> Self {
        Self { board: Board::EMPTY, searcher: Searcher::new(search), rng: StdRng::seed_from_u64(0) }
    }

    /// Current mirror of the host board.
    #[inline]
    pub fn board(&self) -> Board { self.board }

    pub fn handle(&mut self, request: Request) -> Response {
        let kind = request.kind();
        match request {
            Request::Setup { seed } | Request::Reset { seed } => {
                self.rng = StdRng::seed_from_u64(seed.unwrap_or(0));
                self.board = Board::EMPTY;
                ack(kind)
            }
            Request::Board { tiles } => match Board::from_values(&tiles) {
                Some(board) => {
                    self.board = board;
                    Response::Board
                }
                None => failed(kind, format!("expected {BOARD_CELLS} power-of-two cells, got {tiles:?}")),
            },
            Request::Move { direction } => match Direction::from_code(direction) {
                Some(dir) => {
                    self.board = self.board.shift(dir);
                    Response::Move
                }
                None => failed(kind, format!("unknown direction code {direction}")),
            },
            Request::Add { position, value } => {
                let Some(exponent) = Board::exponent_for(value).filter(|_| position < BOARD_CELLS) else {
                    return failed(kind, format!("cannot place {value} at {position}"));
                };
                if self.board.exponent(position) != 0 {
                    tracing::warn!(position, value, "ADD onto an occupied mirror cell");
                }
                self.board = self.board.with_tile(position, exponent);
                Response::Add
            }
            Request::Solve => {
                let direction = self.searcher.best_move(self.board);
                if let Some(dir) = direction {
                    self.board = self.board.shift(dir);
                }
                tracing::debug!(?direction, nodes = self.searcher.last_stats().nodes, "solved");
                Response::Solve { direction: direction.map(Direction::code) }
            }
            Request::Tile => {
                let ranked = self.searcher.rank_placements(self.board);
                let position_code = ranked.first().map(|worst| {
                    // Break ties between equally bad placements at random.
                    let ties = ranked.iter().take_while(|p| p.value <= worst.value).count();
                    let pick = ranked[self.rng.gen_range(0..ties)];
                    let offset = if pick.exponent == 2 { BOARD_CELLS } else { 0 };
                    (pick.index + offset) as u32
                });
                Response::Tile { position_code }
            }
        }
    }

    /// Serve frames until the host side hangs up.
    ///
    /// Blocking; run it on a dedicated thread.
    pub fn run(
        mut self,
        mut inbound: mpsc::UnboundedReceiver<RequestFrame>,
        outbound: mpsc::UnboundedSender<WorkerMessage>,
    ) {
        if outbound.send(WorkerMessage::Ready).is_err() {
            return;
        }
        while let Some(frame) = inbound.blocking_recv() {
            let response = self.handle(frame.request);
            if outbound.send(WorkerMessage::Reply { id: frame.id, response }).is_err() {
                break;
            }
        }
        tracing::debug!("solver worker exiting");
    }
}

impl Default for SolverWorker {
    fn default() -> Self { Self::new(SearchConfig::default()) }
}

fn ack(kind: Kind) -> Response {
    Response::ack(kind).unwrap_or_else(|| failed(kind, "no acknowledgement for this kind".into()))
}

fn failed(kind: Kind, message: String) -> Response {
    tracing::warn!(%kind, %message, "worker rejected request");
    Response::Failed { kind, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker() -> SolverWorker {
        SolverWorker::new(SearchConfig { depth_cap: Some(1), adversary_depth: 1, ..SearchConfig::default() })
    }

    #[test]
    fn mirrors_board_moves_and_adds() {
        let mut w = worker();
        assert_eq!(w.handle(Request::Setup { seed: Some(1) }), Response::Setup);
        let mut tiles = vec![0u32; 16];
        tiles[0] = 2;
        tiles[3] = 2;
        assert_eq!(w.handle(Request::Board { tiles }), Response::Board);
        assert_eq!(w.handle(Request::Move { direction: Direction::Left.code() }), Response::Move);
        assert_eq!(w.board().values()[0], 4);
        assert_eq!(w.handle(Request::Add { position: 15, value: 4 }), Response::Add);
        assert_eq!(w.board().values()[15], 4);
    }

    #[test]
    fn rejects_bad_input() {
        let mut w = worker();
        assert!(matches!(w.handle(Request::Board { tiles: vec![2; 9] }), Response::Failed { kind: Kind::Board, .. }));
        assert!(matches!(w.handle(Request::Move { direction: 7 }), Response::Failed { kind: Kind::Move, .. }));
        assert!(matches!(w.handle(Request::Add { position: 16, value: 2 }), Response::Failed { kind: Kind::Add, .. }));
        assert!(matches!(w.handle(Request::Add { position: 0, value: 3 }), Response::Failed { kind: Kind::Add, .. }));
    }

    #[test]
    fn solve_applies_move_to_mirror() {
        let mut w = worker();
        let mut tiles = vec![0u32; 16];
        tiles[5] = 2;
        w.handle(Request::Board { tiles });
        let before = w.board();
        let Response::Solve { direction: Some(code) } = w.handle(Request::Solve) else {
            panic!("expected a move");
        };
        let dir = Direction::from_code(code).unwrap();
        assert_eq!(w.board(), before.shift(dir));
    }

    #[test]
    fn tile_targets_empty_cell_without_applying() {
        let mut w = worker();
        let mut tiles = vec![2u32, 4, 8, 16, 32, 64, 128, 256, 2, 4, 8, 16, 32, 64, 0, 0];
        w.handle(Request::Board { tiles: tiles.clone() });
        let Response::Tile { position_code: Some(code) } = w.handle(Request::Tile) else {
            panic!("expected a placement");
        };
        let index = (code % 16) as usize;
        assert!(index == 14 || index == 15);
        assert!(code < 32);
        assert_eq!(w.board().values(), tiles);

        tiles[14] = 2;
        tiles[15] = 4;
        w.handle(Request::Board { tiles });
        assert_eq!(w.handle(Request::Tile), Response::Tile { position_code: None });
    }

    #[test]
    fn reset_clears_mirror() {
        let mut w = worker();
        w.handle(Request::Board { tiles: vec![2; 16] });
        assert_eq!(w.handle(Request::Reset { seed: None }), Response::Reset);
        assert_eq!(w.board(), Board::EMPTY);
    }
}
