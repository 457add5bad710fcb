//! Input vocabulary and the rendering collaborator.

use crate::game::{Direction, Grid};

/// Everything a front end can ask the manager to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Move(Direction),
    Restart,
    /// Toggle the solver autorun.
    Autorun,
    /// Toggle adversarial tile placement.
    EvilTile,
    KeepPlaying,
}

/// Score and flags shown next to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorMetadata {
    pub score: u64,
    pub over: bool,
    pub won: bool,
    pub best_score: u64,
    pub terminated: bool,
}

/// Renders game state. Called with the session lock held, so
/// implementations must not call back into the manager.
pub trait Actuator: Send {
    fn actuate(&mut self, grid: &Grid, metadata: &ActuatorMetadata);

    /// Clear any won/lost message.
    fn continue_game(&mut self) {}

    fn solver_toggled(&mut self, _running: bool) {}

    fn evil_toggled(&mut self, _enabled: bool) {}
}

/// Discards everything; for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullActuator;

impl Actuator for NullActuator {
    fn actuate(&mut self, _grid: &Grid, _metadata: &ActuatorMetadata) {}
}
