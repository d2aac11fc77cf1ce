//! Shared receive buffer between the reader thread and the consuming read.
//!
//! Chunk arrival and the consuming read are driven by independent event
//! sources, so the buffer is a single critical section: a mutex-guarded byte
//! queue plus a condvar the waiter parks on. The `pending` flag makes the
//! one-read-at-a-time rule structurally checkable instead of merely
//! documented.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::error::{Error, Result};

#[derive(Default)]
struct State {
    buffer: VecDeque<u8>,
    pending: bool,
    closed: bool,
}

/// Accumulator for bytes arrived from the wire but not yet consumed.
#[derive(Default)]
pub(crate) struct ReceiveBuffer {
    state: Mutex<State>,
    arrived: Condvar,
}

impl ReceiveBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means the reader thread panicked mid-push;
        // the queue itself is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a chunk arrived from the wire and wake a pending read.
    pub(crate) fn push_chunk(&self, chunk: &[u8]) {
        let mut state = self.lock();
        state.buffer.extend(chunk);
        self.arrived.notify_all();
    }

    /// Record that the underlying connection closed. Buffered bytes remain
    /// readable; a pending read that cannot be satisfied fails.
    pub(crate) fn mark_closed(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.arrived.notify_all();
    }

    /// Number of buffered, unconsumed bytes.
    #[cfg(test)]
    pub(crate) fn buffered_len(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Take exactly `len` bytes from the front of the buffer, waiting until
    /// they arrive or `deadline` passes.
    ///
    /// On success the buffer retains exactly the bytes beyond `len`, in
    /// original order. On timeout or close, nothing is consumed.
    pub(crate) fn take_exact(&self, len: usize, deadline: Option<Instant>) -> Result<Vec<u8>> {
        let mut state = self.lock();

        if state.pending {
            return Err(Error::ReadInProgress);
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        state.pending = true;
        loop {
            if state.buffer.len() >= len {
                state.pending = false;
                return Ok(state.buffer.drain(..len).collect());
            }
            if state.closed {
                state.pending = false;
                return Err(Error::ConnectionClosed);
            }

            state = match deadline {
                None => self
                    .arrived
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        let buffered = state.buffer.len();
                        state.pending = false;
                        return Err(Error::Timeout {
                            wanted: len,
                            buffered,
                        });
                    }
                    self.arrived
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                },
            };
        }
    }
}
