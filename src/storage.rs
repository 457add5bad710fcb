//! Persisted game state and best score.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::StorageError;
use crate::game::GameState;

/// Where the manager keeps the in-progress snapshot and the best score.
pub trait StorageManager: Send {
    fn game_state(&self) -> Result<Option<GameState>, StorageError>;
    fn set_game_state(&mut self, state: &GameState) -> Result<(), StorageError>;
    /// Drop the snapshot. The best score is kept.
    fn clear_game_state(&mut self) -> Result<(), StorageError>;
    fn best_score(&self) -> Result<u64, StorageError>;
    fn set_best_score(&mut self, score: u64) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Stored {
    #[serde(default)]
    best_score: u64,
    #[serde(default)]
    game_state: Option<GameState>,
}

/// Process-lifetime storage; nothing survives a restart of the binary.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    stored: Stored,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }
}

impl StorageManager for MemoryStorage {
    fn game_state(&self) -> Result<Option<GameState>, StorageError> { Ok(self.stored.game_state.clone()) }

    fn set_game_state(&mut self, state: &GameState) -> Result<(), StorageError> {
        self.stored.game_state = Some(state.clone());
        Ok(())
    }

    fn clear_game_state(&mut self) -> Result<(), StorageError> {
        self.stored.game_state = None;
        Ok(())
    }

    fn best_score(&self) -> Result<u64, StorageError> { Ok(self.stored.best_score) }

    fn set_best_score(&mut self, score: u64) -> Result<(), StorageError> {
        self.stored.best_score = score;
        Ok(())
    }
}

/// One JSON document on disk holding both the snapshot and the best score.
///
/// The file is read once on open and rewritten atomically on every change.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    stored: Stored,
}

impl FileStorage {
    /// Open `path`, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let stored = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Stored::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, stored })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn flush(&self) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(&self.stored)?;
        atomic_write(&self.path, &bytes)?;
        tracing::trace!(path = %self.path.display(), "state written");
        Ok(())
    }
}

impl StorageManager for FileStorage {
    fn game_state(&self) -> Result<Option<GameState>, StorageError> { Ok(self.stored.game_state.clone()) }

    fn set_game_state(&mut self, state: &GameState) -> Result<(), StorageError> {
        self.stored.game_state = Some(state.clone());
        self.flush()
    }

    fn clear_game_state(&mut self) -> Result<(), StorageError> {
        if self.stored.game_state.take().is_none() {
            return Ok(());
        }
        self.flush()
    }

    fn best_score(&self) -> Result<u64, StorageError> { Ok(self.stored.best_score) }

    fn set_best_score(&mut self, score: u64) -> Result<(), StorageError> {
        self.stored.best_score = score;
        self.flush()
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Grid;

    fn state(score: u64) -> GameState {
        let grid = Grid::from_values(4, &[2, 0, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 8]).unwrap();
        GameState { grid, score, over: false, won: false, keep_playing: false }
    }

    #[test]
    fn memory_storage_keeps_best_across_clear() {
        let mut s = MemoryStorage::new();
        assert_eq!(s.game_state().unwrap(), None);
        s.set_game_state(&state(12)).unwrap();
        s.set_best_score(12).unwrap();
        s.clear_game_state().unwrap();
        assert_eq!(s.game_state().unwrap(), None);
        assert_eq!(s.best_score().unwrap(), 12);
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        {
            let mut s = FileStorage::open(&path).unwrap();
            assert_eq!(s.best_score().unwrap(), 0);
            s.set_game_state(&state(40)).unwrap();
            s.set_best_score(40).unwrap();
        }
        let mut s = FileStorage::open(&path).unwrap();
        assert_eq!(s.game_state().unwrap(), Some(state(40)));
        assert_eq!(s.best_score().unwrap(), 40);

        s.clear_game_state().unwrap();
        let s = FileStorage::open(&path).unwrap();
        assert_eq!(s.game_state().unwrap(), None);
        assert_eq!(s.best_score().unwrap(), 40);
    }

    #[test]
    fn snapshot_uses_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut s = FileStorage::open(&path).unwrap();
        s.set_game_state(&state(4)).unwrap();
        let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        let snapshot = &raw["gameState"];
        assert_eq!(snapshot["keepPlaying"], serde_json::json!(false));
        assert_eq!(snapshot["grid"]["size"], serde_json::json!(4));
        assert_eq!(snapshot["grid"]["cells"][0][0]["value"], serde_json::json!(2));
        assert!(snapshot["grid"]["cells"][1][0].is_null());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(FileStorage::open(&path), Err(StorageError::Json(_))));
    }
}
