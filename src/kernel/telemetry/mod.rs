//! Aggregated runtime counters and the heap notification payloads.
//!
//! # LOCKING INVARIANT
//! All counters live behind the single `StatsAggregator` lock. Recording
//! methods hand threshold crossings back to the caller, who enqueues them
//! after the lock is released; the aggregator lock and a queue monitor are
//! never held together.

pub mod directory;
pub mod event;
pub mod metrics;
pub mod recorder;

pub use directory::PoolDirectory;
pub use event::*;
pub use metrics::*;
pub use recorder::StatsAggregator;
