//! Mock transport implementation for testing
//!
//! Records every line written by the gateway so tests can assert on the exact
//! command traffic without a radio module attached.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::link::transport::Transport;

/// In-memory transport; clones share the same buffers
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    /// Lines written to the transport (outgoing)
    written: Arc<Mutex<Vec<String>>>,
    /// Simulated error for the next write
    next_error: Arc<Mutex<Option<io::Error>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written so far, without terminators
    pub fn written(&self) -> Vec<String> {
        lock(&self.written).clone()
    }

    pub fn last_written(&self) -> Option<String> {
        lock(&self.written).last().cloned()
    }

    pub fn clear(&self) {
        lock(&self.written).clear();
    }

    /// Set an error to be returned on the next write
    pub fn set_next_error(&self, error: io::Error) {
        *lock(&self.next_error) = Some(error);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write_line(&mut self, text: &str) -> io::Result<()> {
        if let Some(error) = lock(&self.next_error).take() {
            return Err(error);
        }
        lock(&self.written).push(text.to_string());
        Ok(())
    }
}
