// Join barrier for the node's worker threads.

use crate::error::{BlockchainError, Result};
use log::{debug, error};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

#[derive(Clone, Default)]
pub struct TaskGroup {
    handles: Arc<Mutex<Vec<(String, JoinHandle<()>)>>>,
}

impl TaskGroup {
    pub fn new() -> TaskGroup {
        TaskGroup::default()
    }

    /// Spawn a named thread tracked by this group
    pub fn spawn<F>(&self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(f)
            .map_err(|e| BlockchainError::Io(format!("Failed to spawn {name}: {e}")))?;
        let mut handles = self
            .handles
            .lock()
            .map_err(|_| BlockchainError::Io("task list lock poisoned".to_string()))?;
        reap(&mut handles);
        handles.push((name.to_string(), handle));
        Ok(())
    }

    /// Join threads that already exited and drop their handles.
    /// Returns how many are still running.
    pub fn reap_finished(&self) -> usize {
        match self.handles.lock() {
            Ok(mut handles) => {
                reap(&mut handles);
                handles.len()
            }
            Err(_) => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.handles.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Join every tracked thread, including ones spawned while joining
    pub fn join_all(&self) {
        loop {
            let drained: Vec<_> = match self.handles.lock() {
                Ok(mut handles) => handles.drain(..).collect(),
                Err(_) => return,
            };
            if drained.is_empty() {
                return;
            }
            for (name, handle) in drained {
                join_one(name, handle);
            }
        }
    }
}

fn reap(handles: &mut Vec<(String, JoinHandle<()>)>) {
    let (finished, running): (Vec<_>, Vec<_>) = handles
        .drain(..)
        .partition(|(_, handle)| handle.is_finished());
    *handles = running;
    for (name, handle) in finished {
        join_one(name, handle);
    }
}

fn join_one(name: String, handle: JoinHandle<()>) {
    match handle.join() {
        Ok(()) => debug!("Task {name} finished"),
        Err(_) => error!("Task {name} panicked"),
    }
}
