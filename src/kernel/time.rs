use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Time source for the collector.
///
/// `wall_millis` may go backwards (wall-clock correction); `nano_time` must not.
pub trait Clock: Send + Sync {
    fn wall_millis(&self) -> u64;
    fn nano_time(&self) -> u64;
}

#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn wall_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn nano_time(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Hand-driven clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    wall: AtomicU64,
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new(wall_millis: u64) -> Self {
        Self {
            wall: AtomicU64::new(wall_millis),
            nanos: AtomicU64::new(0),
        }
    }

    pub fn set_wall_millis(&self, millis: u64) {
        self.wall.store(millis, Ordering::SeqCst);
    }

    pub fn advance_wall_millis(&self, millis: u64) {
        self.wall.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set_nanos(&self, nanos: u64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn wall_millis(&self) -> u64 {
        self.wall.load(Ordering::SeqCst)
    }

    fn nano_time(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

/// Milliseconds since `vm_start`, clamped to 0 when the wall clock reads
/// earlier than the recorded start.
pub fn millis_since(vm_start: u64, now: u64) -> u64 {
    now.saturating_sub(vm_start)
}
