use thiserror::Error;

use crate::kernel::event::EventKind;

/// Startup failures. A failed `Management::init` leaves nothing running.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid runtime layout: {0}")]
    Layout(String),

    #[error("failed to register {kind:?} listener")]
    Registration {
        kind: EventKind,
        #[source]
        source: HookError,
    },

    #[error("failed to spawn dispatcher thread '{name}'")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// The event source refused a registration.
#[derive(Debug, Error)]
#[error("hook interface rejected registration: {0}")]
pub struct HookError(pub String);

/// Why a notification did not make it into a queue. Producers discard it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("notification queue is full")]
    Full,
    #[error("notification queue is shut down")]
    Closed,
}

/// A sink failed to hand a notification to its consumer.
#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// The platform probe could not sample resource counters.
#[derive(Debug, Error)]
#[error("platform probe failed: {0}")]
pub struct ProbeError(pub String);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
