//! Bounded, delimiter-framed record buffer shared by writers and the pump.
//!
//! Callers append `payload + delimiter` frames; the pump drains one complete
//! record at a time, up to and including the first delimiter byte. Both
//! operations take the same exclusive lock. A condition variable wakes the
//! pump when data arrives or the buffer is closed, and wakes `flush` callers
//! when the buffer settles.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::error::WriteError;

/// Default buffer capacity in bytes.
pub const DEFAULT_BUFFER_CAPACITY: usize = 4 * 1024 * 1024;

#[derive(Debug, Default)]
struct BufferState {
    bytes: VecDeque<u8>,
    closed: bool,
    in_flight: bool,
}

impl BufferState {
    fn take_record(&mut self, delimiter: u8) -> Option<Vec<u8>> {
        let end = self.bytes.iter().position(|&b| b == delimiter)?;
        Some(self.bytes.drain(..=end).collect())
    }

    fn settled(&self) -> bool {
        self.bytes.is_empty() && !self.in_flight
    }
}

/// Capacity-bounded FIFO of delimiter-terminated records.
#[derive(Debug)]
pub struct RecordBuffer {
    state: Mutex<BufferState>,
    changed: Condvar,
    capacity: usize,
    delimiter: u8,
}

impl RecordBuffer {
    /// Create an empty buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize, delimiter: u8) -> Self {
        Self {
            state: Mutex::new(BufferState::default()),
            changed: Condvar::new(),
            capacity,
            delimiter,
        }
    }

    /// Maximum number of bytes the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Delimiter byte terminating each record.
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Number of bytes currently buffered.
    pub fn len(&self) -> usize {
        self.state.lock().bytes.len()
    }

    /// Returns `true` when no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.state.lock().bytes.is_empty()
    }

    /// Bytes still available before the buffer is full.
    pub fn remaining(&self) -> usize {
        self.capacity - self.len()
    }

    /// Append `payload` followed by the delimiter.
    ///
    /// The frame is accepted whole or rejected whole: on
    /// [`WriteError::BufferFull`] the buffer is left untouched. Returns the
    /// framed length, `payload.len() + 1`.
    pub fn append(&self, payload: &[u8]) -> Result<usize, WriteError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(WriteError::Closed);
        }
        let available = self.capacity - state.bytes.len();
        let needed = payload.len().saturating_add(1);
        if needed > available {
            return Err(WriteError::BufferFull { needed, available });
        }
        state.bytes.extend(payload);
        state.bytes.push_back(self.delimiter);
        drop(state);
        self.changed.notify_all();
        Ok(needed)
    }

    /// Remove the next complete record without waiting.
    ///
    /// The returned record includes its trailing delimiter and is marked as
    /// in flight until [`settle`](Self::settle) is called.
    pub fn try_pop(&self) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        let record = state.take_record(self.delimiter)?;
        state.in_flight = true;
        Some(record)
    }

    /// Remove the next complete record, blocking until one is appended.
    ///
    /// Returns `None` once the buffer is closed and holds no further records.
    pub fn pop_blocking(&self) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        loop {
            if let Some(record) = state.take_record(self.delimiter) {
                state.in_flight = true;
                return Some(record);
            }
            if state.closed {
                return None;
            }
            self.changed.wait(&mut state);
        }
    }

    /// Mark the most recently popped record as fully handled.
    pub fn settle(&self) {
        let mut state = self.state.lock();
        state.in_flight = false;
        drop(state);
        self.changed.notify_all();
    }

    /// Refuse further appends and wake any blocked drainer.
    ///
    /// Records already buffered stay available to [`pop_blocking`](Self::pop_blocking).
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.changed.notify_all();
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Drop every buffered byte, returning how many complete records were discarded.
    pub(crate) fn discard(&self) -> usize {
        let mut state = self.state.lock();
        let delimiter = self.delimiter;
        let records = state.bytes.iter().filter(|&&b| b == delimiter).count();
        state.bytes.clear();
        state.in_flight = false;
        drop(state);
        self.changed.notify_all();
        records
    }

    /// Wait until the buffer is empty and no record is in flight.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub fn wait_settled(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.settled() {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.settled();
            }
        }
        true
    }
}
