pub mod config;
pub mod error;
pub mod kernel;

// Re-export specific items for convenient access
pub use config::TelemetryConfig;
pub use error::{ConfigError, DeliveryError, EnqueueError, HookError, InitError, ProbeError};
pub use kernel::management::{Host, Management, ShutdownReport};
