//! Named background thread with a joinable handle

use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Holder for one background thread
#[derive(Debug, Default)]
pub struct Worker {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `body` on a new thread called `name`
    ///
    /// A handle left over from a previous thread is detached; that thread
    /// has already been told to exit.
    pub fn spawn<F>(&self, name: &str, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|e| Error::ThreadSpawn(e.to_string()))?;
        log::debug!("{}: thread started", name);
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    /// Take the running thread's handle for a later [`Worker::wait`]
    pub fn take(&self) -> Option<JoinHandle<()>> {
        self.handle.lock().take()
    }

    /// Wait for the thread to exit
    ///
    /// Called from the worker itself this only detaches, since a thread
    /// can't join itself.
    pub fn join(&self) {
        if let Some(handle) = self.take() {
            Self::wait(handle);
        }
    }

    /// Wait for a thread taken with [`Worker::take`]
    pub fn wait(handle: JoinHandle<()>) {
        if handle.thread().id() == thread::current().id() {
            return;
        }
        let name = handle.thread().name().unwrap_or("worker").to_string();
        if handle.join().is_err() {
            log::error!("{}: thread panicked", name);
        }
    }
}
