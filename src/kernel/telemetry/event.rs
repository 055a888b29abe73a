use serde::Serialize;

use crate::kernel::event::{CollectorId, PoolId};
use super::metrics::GcInfo;

/// Payload queued on the heap notification pipeline.
///
/// The shutdown sentinel is carried by the queue envelope, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapNotification {
    ThresholdExceeded(UsageThresholdInfo),
    CollectionThresholdExceeded(UsageThresholdInfo),
    EndOfGc(Box<GcNotification>),
}

/// Captured at the crossing. Pool name and initial size are looked up when
/// the notification is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageThresholdInfo {
    pub pool_id: PoolId,
    pub used: u64,
    pub total: u64,
    pub max: u64,
    pub crossing_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcNotification {
    pub collector_id: CollectorId,
    pub info: GcInfo,
}

/// Outbound threshold notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThresholdNotice {
    pub pool_name: String,
    pub initial_size: u64,
    pub used: u64,
    pub total: u64,
    pub max: u64,
    pub crossing_count: u64,
    pub sequence: u64,
    pub collection_usage: bool,
}

/// Outbound end-of-collection notification. Per-pool arrays list every heap
/// pool, then every non-heap pool, in layout order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GcNotice {
    pub collector_name: String,
    pub action: String,
    pub cause: String,
    pub index: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub initial_size: Vec<u64>,
    pub pre_used: Vec<u64>,
    pub pre_committed: Vec<u64>,
    pub pre_max: Vec<Option<u64>>,
    pub post_used: Vec<u64>,
    pub post_committed: Vec<u64>,
    pub post_max: Vec<Option<u64>>,
    pub sequence: u64,
}

impl GcNotice {
    pub fn new(collector_name: String, info: GcInfo, sequence: u64) -> Self {
        Self {
            collector_name,
            action: info.action,
            cause: info.cause,
            index: info.index,
            start_time: info.start_time,
            end_time: info.end_time,
            initial_size: info.initial_size,
            pre_used: info.pre_used,
            pre_committed: info.pre_committed,
            pre_max: info.pre_max,
            post_used: info.post_used,
            post_committed: info.post_committed,
            post_max: info.post_max,
            sequence,
        }
    }
}
