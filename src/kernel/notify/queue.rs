use parking_lot::{Condvar, Mutex};
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;
use tracing::debug;

use crate::error::EnqueueError;

/// Queue entry: a payload, or the terminal shutdown sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope<T> {
    Notify(T),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequenced<T> {
    pub sequence: u64,
    pub message: Envelope<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Empty,
    HasPending(usize),
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    ShuttingDown,
    Stopped,
}

struct Monitor<T> {
    ring: HeapRb<Sequenced<T>>,
    phase: Phase,
    next_sequence: u64,
    dropped: u64,
}

/// Bounded multi-producer, single-consumer FIFO.
///
/// Producers never block past the monitor: a full queue drops the new
/// entry. Sequence numbers are assigned under the monitor, so the consumer
/// sees them strictly increasing.
pub struct NotificationQueue<T> {
    name: String,
    capacity: usize,
    monitor: Mutex<Monitor<T>>,
    available: Condvar,
}

impl<T> NotificationQueue<T> {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            capacity,
            monitor: Mutex::new(Monitor {
                ring: HeapRb::new(capacity),
                phase: Phase::Open,
                next_sequence: 0,
                dropped: 0,
            }),
            available: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `body` and wakes the consumer. Returns the assigned sequence
    /// number.
    pub fn enqueue(&self, body: T) -> Result<u64, EnqueueError> {
        let mut m = self.monitor.lock();
        if m.phase != Phase::Open {
            return Err(EnqueueError::Closed);
        }
        if m.ring.is_full() {
            m.dropped += 1;
            return Err(EnqueueError::Full);
        }
        let sequence = m.next_sequence;
        let entry = Sequenced {
            sequence,
            message: Envelope::Notify(body),
        };
        if m.ring.try_push(entry).is_err() {
            m.dropped += 1;
            return Err(EnqueueError::Full);
        }
        m.next_sequence += 1;
        self.available.notify_one();
        Ok(sequence)
    }

    /// Blocks until an entry is available and unlinks the head.
    ///
    /// Dequeuing the shutdown sentinel moves the queue to `Stopped`.
    pub fn next(&self) -> Sequenced<T> {
        let mut m = self.monitor.lock();
        loop {
            if let Some(entry) = Self::pop_locked(&mut m) {
                return entry;
            }
            self.available.wait(&mut m);
        }
    }

    /// Non-blocking variant of `next`.
    pub fn try_next(&self) -> Option<Sequenced<T>> {
        Self::pop_locked(&mut self.monitor.lock())
    }

    fn pop_locked(m: &mut Monitor<T>) -> Option<Sequenced<T>> {
        let entry = m.ring.try_pop()?;
        if matches!(entry.message, Envelope::Shutdown) {
            m.phase = Phase::Stopped;
        }
        Some(entry)
    }

    /// Discards everything queued and installs a single shutdown sentinel.
    ///
    /// Returns the number of discarded entries. Later calls are no-ops.
    pub fn shutdown(&self) -> usize {
        let mut m = self.monitor.lock();
        if m.phase != Phase::Open {
            return 0;
        }
        let mut discarded = 0;
        while m.ring.try_pop().is_some() {
            discarded += 1;
        }
        let sentinel = Sequenced {
            sequence: m.next_sequence,
            message: Envelope::Shutdown,
        };
        // The ring was just emptied, so the sentinel always fits.
        let _ = m.ring.try_push(sentinel);
        m.next_sequence += 1;
        m.phase = Phase::ShuttingDown;
        self.available.notify_one();
        debug!(queue = %self.name, discarded, "shutdown sentinel installed");
        discarded
    }

    pub fn pending(&self) -> usize {
        self.monitor.lock().ring.occupied_len()
    }

    /// Entries rejected because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.monitor.lock().dropped
    }

    pub fn state(&self) -> QueueState {
        let m = self.monitor.lock();
        match m.phase {
            Phase::Stopped => QueueState::Stopped,
            Phase::ShuttingDown => QueueState::ShuttingDown,
            Phase::Open => match m.ring.occupied_len() {
                0 => QueueState::Empty,
                n => QueueState::HasPending(n),
            },
        }
    }
}

impl<T> std::fmt::Debug for NotificationQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("state", &self.state())
            .finish()
    }
}
