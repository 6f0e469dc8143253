// The one embedded sled handle the whole node shares.
// Every record store holds an Arc<Engine>, and closing the engine makes
// every store fail with StoreClosed instead of touching a dropped database.

use crate::error::{BlockchainError, Result};
use log::{debug, info};
use sled::Db;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub struct Engine {
    db: RwLock<Option<Db>>,
    path: PathBuf,
}

impl Engine {
    pub fn open(path: impl AsRef<Path>) -> Result<Engine> {
        let path = path.as_ref().to_path_buf();
        let db = sled::open(&path).map_err(|e| {
            BlockchainError::Database(format!(
                "Failed to open database at {}: {e}",
                path.display()
            ))
        })?;
        info!("Opened database at {}", path.display());
        Ok(Engine {
            db: RwLock::new(Some(db)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.db.read().map(|db| db.is_some()).unwrap_or(false)
    }

    /// Run `f` against the live handle, or fail with `StoreClosed`
    pub fn with_db<R>(&self, f: impl FnOnce(&Db) -> Result<R>) -> Result<R> {
        let guard = self
            .db
            .read()
            .map_err(|_| BlockchainError::Database("engine lock poisoned".to_string()))?;
        match guard.as_ref() {
            Some(db) => f(db),
            None => Err(BlockchainError::StoreClosed),
        }
    }

    /// Flush and release the handle. Returns false when it was already closed.
    pub fn close(&self) -> Result<bool> {
        let mut guard = self
            .db
            .write()
            .map_err(|_| BlockchainError::Database("engine lock poisoned".to_string()))?;
        let Some(db) = guard.take() else {
            debug!("Database at {} already closed", self.path.display());
            return Ok(false);
        };
        db.flush()
            .map_err(|e| BlockchainError::Database(format!("Failed to flush database: {e}")))?;
        info!("Closed database at {}", self.path.display());
        Ok(true)
    }
}
