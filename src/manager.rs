//! The game manager: owns the game, keeps the solver worker in step with it,
//! and runs the solver autorun.
//!
//! All game mutation happens under one session lock. Moves additionally
//! hold a move gate for their whole duration: human moves only `try_lock`
//! the gate and are dropped while another move (or an autorun iteration)
//! is in flight, while the autorun task waits for it. Read-only accessors
//! take the session lock alone, so they delay a move but never drop it.
//!
//! Solver faults never abort a local move. They mark the worker's mirror as
//! stale and the next sync point sends a full `BOARD` instead of an
//! incremental `MOVE`/`ADD`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::GameConfig;
use crate::error::{GameError, SolverError};
use crate::events::{Actuator, ActuatorMetadata, InputEvent};
use crate::game::{Direction, Game, GameState, PlacedTile};
use crate::replay::Replay;
use crate::storage::StorageManager;
use crate::worker::SolverClient;

/// What happened to a move request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveDisposition {
    Moved(MoveReport),
    /// Nothing slid; the game is untouched.
    Unchanged,
    /// Over, or won without keep-playing.
    Terminated,
    /// Another move (or an autorun iteration) was in flight.
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveReport {
    pub direction: Direction,
    pub score_delta: u64,
    pub merges: usize,
    pub new_tile: Option<PlacedTile>,
    /// This move produced the first win tile.
    pub won: bool,
    pub over: bool,
}

/// How the worker's mirror follows a local move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerSync {
    None,
    /// Send `MOVE`, then `ADD` for the placed tile.
    Mirror,
    /// The worker already applied the move when answering `SOLVE`; only `ADD`.
    Follow,
}

struct Session {
    game: Game,
    rng: StdRng,
    evil: bool,
    storage: Box<dyn StorageManager>,
    actuator: Box<dyn Actuator>,
    replay: Replay,
    worker_stale: bool,
}

struct AutorunHandle {
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    task: JoinHandle<Result<u64, GameError>>,
}

impl AutorunHandle {
    fn is_running(&self) -> bool { self.running.load(Ordering::Acquire) && !self.stop.load(Ordering::Acquire) }
}

struct Shared {
    /// Held for the whole of a move; always taken before `session`.
    move_gate: Mutex<()>,
    session: Mutex<Session>,
    solver: Option<SolverClient>,
    autorun: std::sync::Mutex<Option<AutorunHandle>>,
    config: GameConfig,
}

/// Cloneable handle to one running game.
#[derive(Clone)]
pub struct GameManager {
    shared: Arc<Shared>,
}

impl GameManager {
    /// Load the saved game (or deal a fresh one), bring the worker in sync,
    /// and actuate the first frame.
    ///
    /// With a solver attached this waits for `READY`, then sends `SETUP`
    /// and `BOARD`; a failure there is returned.
    pub async fn start(
        config: GameConfig,
        storage: Box<dyn StorageManager>,
        actuator: Box<dyn Actuator>,
        solver: Option<SolverClient>,
    ) -> Result<Self, GameError> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let saved = match storage.game_state() {
            Ok(Some(state)) if state.grid.size() == config.size => Some(state),
            Ok(Some(state)) => {
                tracing::warn!(saved = state.grid.size(), configured = config.size, "saved game has another size");
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("cannot load saved game: {e}");
                None
            }
        };
        let (game, replay) = match saved {
            Some(state) => {
                tracing::info!(score = state.score, "resuming saved game");
                let replay = Replay::resume(&state, config.win_value, config.seed);
                (Game::from_state(state, config.win_value), replay)
            }
            None => fresh_game(&config, &mut rng),
        };

        let session = Session {
            game,
            rng,
            evil: false,
            storage,
            actuator,
            replay,
            worker_stale: solver.is_some(),
        };
        let manager = Self {
            shared: Arc::new(Shared {
                move_gate: Mutex::new(()),
                session: Mutex::new(session),
                solver,
                autorun: std::sync::Mutex::new(None),
                config,
            }),
        };

        {
            let shared = &manager.shared;
            let mut session = shared.session.lock().await;
            if let Some(solver) = &shared.solver {
                solver.wait_ready().await?;
                solver.setup(shared.config.seed).await?;
                let tiles = session.game.grid().values();
                solver.set_board(tiles).await?;
                session.worker_stale = false;
            }
            actuate(&mut session);
        }
        Ok(manager)
    }

    pub fn config(&self) -> &GameConfig { &self.shared.config }

    pub fn has_solver(&self) -> bool { self.shared.solver.is_some() }

    pub async fn handle(&self, event: InputEvent) -> Result<(), GameError> {
        tracing::debug!(?event, "input");
        match event {
            InputEvent::Move(direction) => {
                self.throttle_move(direction).await;
            }
            InputEvent::Restart => self.restart().await,
            InputEvent::Autorun => {
                self.toggle_autorun()?;
            }
            InputEvent::EvilTile => {
                self.toggle_evil().await?;
            }
            InputEvent::KeepPlaying => self.keep_playing().await,
        }
        Ok(())
    }

    /// A human move. Dropped, not queued, if another move is in flight.
    pub async fn throttle_move(&self, direction: Direction) -> MoveDisposition {
        let Ok(_gate) = self.shared.move_gate.try_lock() else {
            tracing::debug!(%direction, "move dropped, another move is in flight");
            return MoveDisposition::Dropped;
        };
        let mut session = self.shared.session.lock().await;
        let sync = self.human_sync();
        move_locked(&self.shared, &mut session, direction, sync).await
    }

    /// A human move that waits for any in-flight move to finish first.
    pub async fn move_tiles(&self, direction: Direction) -> MoveDisposition {
        let _gate = self.shared.move_gate.lock().await;
        let mut session = self.shared.session.lock().await;
        let sync = self.human_sync();
        move_locked(&self.shared, &mut session, direction, sync).await
    }

    fn human_sync(&self) -> WorkerSync {
        if self.shared.solver.is_some() && self.shared.config.mirror_moves {
            WorkerSync::Mirror
        } else {
            WorkerSync::None
        }
    }

    /// Spawn the autorun task unless one is already running.
    ///
    /// `max_moves` bounds the number of effective moves it makes.
    pub fn start_autorun(&self, max_moves: Option<u64>) -> Result<(), GameError> {
        let solver = self.shared.solver.clone().ok_or(GameError::SolverUnavailable)?;
        let mut slot = self.autorun_slot();
        if slot.as_ref().is_some_and(AutorunHandle::is_running) {
            return Ok(());
        }
        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_autorun(self.shared.clone(), solver, stop.clone(), running.clone(), max_moves));
        *slot = Some(AutorunHandle { stop, running, task });
        Ok(())
    }

    /// Ask the autorun task to stop. A request already sent to the worker
    /// still completes; the task exits at its next check.
    ///
    /// Returns whether an autorun was running.
    pub fn stop_autorun(&self) -> bool {
        let handle = self.autorun_slot().take();
        let Some(handle) = handle else { return false };
        let was_running = handle.is_running();
        handle.stop.store(true, Ordering::Release);
        tracing::debug!(was_running, "autorun stop requested");
        was_running
    }

    /// Start or stop the autorun; returns whether it is now running.
    pub fn toggle_autorun(&self) -> Result<bool, GameError> {
        if self.is_autorunning() {
            self.stop_autorun();
            Ok(false)
        } else {
            self.start_autorun(None)?;
            Ok(true)
        }
    }

    pub fn is_autorunning(&self) -> bool { self.autorun_slot().as_ref().is_some_and(AutorunHandle::is_running) }

    /// Wait for the current autorun task to end and return how many moves
    /// it made. `Ok(0)` if none was started.
    pub async fn wait_autorun(&self) -> Result<u64, GameError> {
        let handle = self.autorun_slot().take();
        let Some(handle) = handle else { return Ok(0) };
        handle.task.await.map_err(|e| GameError::Autorun(e.to_string()))?
    }

    fn autorun_slot(&self) -> MutexGuard<'_, Option<AutorunHandle>> {
        self.shared.autorun.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flip adversarial tile placement; returns the new setting.
    pub async fn toggle_evil(&self) -> Result<bool, GameError> {
        if self.shared.solver.is_none() {
            return Err(GameError::SolverUnavailable);
        }
        let mut session = self.shared.session.lock().await;
        session.evil = !session.evil;
        let evil = session.evil;
        session.actuator.evil_toggled(evil);
        tracing::info!(evil, "evil tiles toggled");
        Ok(evil)
    }

    pub async fn is_evil(&self) -> bool { self.shared.session.lock().await.evil }

    /// Leave the won-blocking state and keep moving.
    pub async fn keep_playing(&self) {
        let mut session = self.shared.session.lock().await;
        session.game.keep_playing();
        session.actuator.continue_game();
        actuate(&mut session);
    }

    /// Stop any autorun, drop the saved game, deal a fresh board, and reset
    /// the worker onto it.
    pub async fn restart(&self) {
        self.stop_autorun();
        let shared = &self.shared;
        let gate = shared.move_gate.lock().await;
        let mut guard = shared.session.lock().await;
        let session = &mut *guard;
        session.actuator.continue_game();
        if let Err(e) = session.storage.clear_game_state() {
            tracing::warn!("cannot clear saved game: {e}");
        }
        let (game, replay) = fresh_game(&shared.config, &mut session.rng);
        session.game = game;
        session.replay = replay;
        if let Some(solver) = &shared.solver {
            match solver.reset(shared.config.seed).await {
                Ok(()) => {
                    resync(session, solver).await;
                }
                Err(e) => mark_stale(session, &e),
            }
        }
        tracing::info!("game restarted");
        actuate(session);
    }

    pub async fn snapshot(&self) -> GameState { self.shared.session.lock().await.game.to_state() }

    /// The moves recorded since the last start or restart.
    pub async fn replay(&self) -> Replay { self.shared.session.lock().await.replay.clone() }

    pub async fn best_score(&self) -> u64 {
        let session = self.shared.session.lock().await;
        session.storage.best_score().unwrap_or_else(|e| {
            tracing::warn!("cannot read best score: {e}");
            0
        })
    }
}

fn fresh_game(config: &GameConfig, rng: &mut StdRng) -> (Game, Replay) {
    let mut game = Game::new(config.size, config.win_value);
    let start = game.add_start_tiles(config.start_tiles, rng);
    let replay = Replay::new(config.size, config.win_value, config.seed, start);
    (game, replay)
}

async fn move_locked(shared: &Shared, session: &mut Session, direction: Direction, sync: WorkerSync) -> MoveDisposition {
    if session.game.is_terminated() {
        tracing::debug!(%direction, "move ignored, game is terminated");
        return MoveDisposition::Terminated;
    }
    let Some(outcome) = session.game.shift(direction) else {
        tracing::trace!(%direction, "move had no effect");
        return MoveDisposition::Unchanged;
    };

    let solver = shared.solver.as_ref();
    if let (WorkerSync::None, Some(_)) = (sync, solver) {
        // The worker never sees this move; evil placement must resync first.
        session.worker_stale = true;
    }
    if let (WorkerSync::Mirror, Some(solver)) = (sync, solver) {
        if !session.worker_stale {
            if let Err(e) = solver.mirror_move(direction).await {
                mark_stale(session, &e);
            }
        }
    }

    let new_tile = place_new_tile(session, solver).await;

    match (sync, solver) {
        (_, None) => {}
        (WorkerSync::None, Some(_)) => session.worker_stale = true,
        (_, Some(solver)) if session.worker_stale => {
            resync(session, solver).await;
        }
        (_, Some(solver)) => {
            if let Some(tile) = new_tile {
                let index = tile.position.index(session.game.grid().size());
                if let Err(e) = solver.add_tile(index, tile.value).await {
                    mark_stale(session, &e);
                }
            }
        }
    }

    let over = session.game.refresh_over();
    let score = session.game.score();
    session.replay.record(direction, new_tile, score);
    if outcome.reached_win {
        tracing::info!(score, tile = session.game.win_value(), "won");
    }
    if over {
        tracing::info!(score, "game over");
    }
    actuate(session);

    let report = MoveReport {
        direction,
        score_delta: outcome.slide.score_delta,
        merges: outcome.slide.merges.len(),
        new_tile,
        won: outcome.reached_win,
        over,
    };
    tracing::debug!(?report, score, "moved");
    MoveDisposition::Moved(report)
}

/// Evil placement asks the worker for the worst cell; anything unusable
/// from it falls back to a random tile.
async fn place_new_tile(session: &mut Session, solver: Option<&SolverClient>) -> Option<PlacedTile> {
    if let (true, Some(solver)) = (session.evil, solver) {
        if session.worker_stale {
            resync(session, solver).await;
        }
        if !session.worker_stale {
            let size = session.game.grid().size();
            match solver.evil_tile().await {
                Ok(Some(code)) => match PlacedTile::from_code(code, size) {
                    Some(tile) => match session.game.place_tile(tile) {
                        Some(placed) => return Some(placed),
                        None => tracing::warn!(code, "evil tile targets an occupied cell"),
                    },
                    None => tracing::warn!(code, "evil tile code out of range"),
                },
                Ok(None) => tracing::warn!("worker found no evil placement"),
                Err(e) => mark_stale(session, &e),
            }
        }
    }
    session.game.add_random_tile(&mut session.rng)
}

/// Send the whole board. Clears the stale mark on success.
async fn resync(session: &mut Session, solver: &SolverClient) -> bool {
    let tiles = session.game.grid().values();
    match solver.set_board(tiles).await {
        Ok(()) => {
            session.worker_stale = false;
            true
        }
        Err(e) => {
            mark_stale(session, &e);
            false
        }
    }
}

fn mark_stale(session: &mut Session, err: &SolverError) {
    tracing::warn!("solver out of sync, will resend board: {err}");
    session.worker_stale = true;
}

/// Persist, track the best score, and render.
fn actuate(session: &mut Session) {
    let game = &session.game;
    let score = game.score();
    let mut best = session.storage.best_score().unwrap_or_else(|e| {
        tracing::warn!("cannot read best score: {e}");
        0
    });
    if score > best {
        best = score;
        if let Err(e) = session.storage.set_best_score(score) {
            tracing::warn!("cannot store best score: {e}");
        }
    }
    let saved = if game.is_over() {
        session.storage.clear_game_state()
    } else {
        session.storage.set_game_state(&game.to_state())
    };
    if let Err(e) = saved {
        tracing::warn!("cannot persist game: {e}");
    }
    let metadata = ActuatorMetadata {
        score,
        over: game.is_over(),
        won: game.is_won(),
        best_score: best,
        terminated: game.is_terminated(),
    };
    session.actuator.actuate(game.grid(), &metadata);
}

async fn run_autorun(
    shared: Arc<Shared>,
    solver: SolverClient,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    max_moves: Option<u64>,
) -> Result<u64, GameError> {
    shared.session.lock().await.actuator.solver_toggled(true);
    tracing::info!("autorun started");
    let result = autorun_loop(&shared, &solver, &stop, max_moves).await;
    running.store(false, Ordering::Release);
    shared.session.lock().await.actuator.solver_toggled(false);
    match &result {
        Ok(moves) => tracing::info!(moves, "autorun stopped"),
        Err(e) => tracing::warn!("autorun aborted: {e}"),
    }
    result
}

async fn autorun_loop(
    shared: &Shared,
    solver: &SolverClient,
    stop: &AtomicBool,
    max_moves: Option<u64>,
) -> Result<u64, GameError> {
    let delay = shared.config.autorun_delay();
    let mut moves = 0u64;
    let mut synced = false;
    loop {
        if stop.load(Ordering::Acquire) || max_moves.is_some_and(|limit| moves >= limit) {
            break;
        }
        let mut guard = shared.session.lock().await;
        let session = &mut *guard;
        // Checked again under the lock, before anything is sent.
        if stop.load(Ordering::Acquire) {
            break;
        }
        if session.game.is_terminated() {
            tracing::debug!(won = session.game.is_won(), "autorun reached a terminal state");
            break;
        }
        if !synced || session.worker_stale {
            let tiles = session.game.grid().values();
            if let Err(e) = solver.set_board(tiles).await {
                session.worker_stale = true;
                return Err(e.into());
            }
            session.worker_stale = false;
            synced = true;
        }

        let direction = match solver.best_move().await {
            Ok(Some(direction)) => direction,
            Ok(None) => {
                tracing::debug!("solver found no move");
                break;
            }
            Err(e) => {
                session.worker_stale = true;
                return Err(e.into());
            }
        };
        match move_locked(shared, session, direction, WorkerSync::Follow).await {
            MoveDisposition::Moved(_) => moves += 1,
            MoveDisposition::Unchanged => {
                tracing::warn!(%direction, "solver move had no effect here, resyncing");
                session.worker_stale = true;
            }
            MoveDisposition::Terminated | MoveDisposition::Dropped => break,
        }
        drop(guard);
        drop(gate);

        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
    }
    Ok(moves)
}
