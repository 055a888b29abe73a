//! Runtime management telemetry.
//!
//! Host events flow in through `event`, land in the `telemetry` aggregator,
//! and threshold/GC notices leave through the bounded queues in `notify`.
//! `dlpar` is an independent second pipeline for platform reconfiguration.

pub mod dlpar;
pub mod event;
pub mod management;
pub mod notify;
pub mod telemetry;
pub mod time;
