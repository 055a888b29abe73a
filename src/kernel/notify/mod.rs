//! Bounded notification queues and their dispatcher threads.

pub mod dispatcher;
pub mod queue;
pub mod sink;

pub use dispatcher::{DispatchExit, Dispatcher};
pub use queue::{Envelope, NotificationQueue, QueueState, Sequenced};
pub use sink::{HeapDelivery, NotificationSink, ResourceChangeSink};
