use std::sync::Arc;
use tracing::warn;

use crate::error::DeliveryError;
use crate::kernel::dlpar::ResourceKind;
use crate::kernel::telemetry::{
    GcNotice, HeapNotification, PoolDirectory, ThresholdNotice, UsageThresholdInfo,
};

/// Consumer of heap notifications (the presentation layer).
pub trait NotificationSink: Send + Sync {
    fn deliver_threshold(&self, notice: ThresholdNotice) -> Result<(), DeliveryError>;
    fn deliver_gc(&self, notice: GcNotice) -> Result<(), DeliveryError>;
}

/// Consumer of platform resource-change notifications.
pub trait ResourceChangeSink: Send + Sync {
    fn deliver_resource_change(
        &self,
        kind: ResourceKind,
        value: u64,
        sequence: u64,
    ) -> Result<(), DeliveryError>;
}

/// Turns queued heap notifications into outbound notices.
///
/// Pool and collector names are resolved here, at dispatch time.
pub struct HeapDelivery {
    directory: Arc<PoolDirectory>,
    sink: Arc<dyn NotificationSink>,
}

impl HeapDelivery {
    pub fn new(directory: Arc<PoolDirectory>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { directory, sink }
    }

    pub fn deliver(&self, sequence: u64, notification: HeapNotification) -> Result<(), DeliveryError> {
        match notification {
            HeapNotification::ThresholdExceeded(info) => self.threshold(sequence, info, false),
            HeapNotification::CollectionThresholdExceeded(info) => self.threshold(sequence, info, true),
            HeapNotification::EndOfGc(gc) => {
                let name = self
                    .directory
                    .collector_name(gc.collector_id)
                    .unwrap_or_default()
                    .to_string();
                self.sink.deliver_gc(GcNotice::new(name, gc.info, sequence))
            }
        }
    }

    fn threshold(
        &self,
        sequence: u64,
        info: UsageThresholdInfo,
        collection_usage: bool,
    ) -> Result<(), DeliveryError> {
        let Some(pool) = self.directory.pool(info.pool_id) else {
            warn!(pool_id = info.pool_id, "threshold notification for unknown pool skipped");
            return Ok(());
        };
        self.sink.deliver_threshold(ThresholdNotice {
            pool_name: pool.name.clone(),
            initial_size: pool.initial_size,
            used: info.used,
            total: info.total,
            max: info.max,
            crossing_count: info.crossing_count,
            sequence,
            collection_usage,
        })
    }
}
