use bitflags::bitflags;
use serde::Serialize;

use crate::kernel::event::{CollectorId, NonHeapKind, PoolId, SegmentUsage};

bitflags! {
    /// Per-pool edge-detection state. A bit is set when usage crosses its
    /// threshold and cleared once usage falls back below.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NotificationState: u32 {
        const USAGE_EXCEEDED = 0b01;
        const COLLECTION_USAGE_EXCEEDED = 0b10;
    }
}

/// Memory usage as reported to management clients. `max` is `None` when
/// undefined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    pub init: u64,
    pub used: u64,
    pub committed: u64,
    pub max: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ThreadCounts {
    pub live: u32,
    pub peak: u32,
    pub daemon: u32,
    pub total_started: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassCounts {
    pub loaded: u64,
    pub unloaded: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryPoolData {
    pub id: PoolId,
    pub name: String,
    pub initial_size: u64,
    pub pre_collection_size: u64,
    pub pre_collection_used: u64,
    pub pre_collection_max: u64,
    pub post_collection_size: u64,
    pub post_collection_used: u64,
    pub post_collection_max: u64,
    pub peak_size: u64,
    pub peak_used: u64,
    pub peak_max: u64,
    /// 0 disables usage threshold checking.
    pub usage_threshold: u64,
    pub usage_threshold_crossed: u64,
    /// 0 disables collection-usage threshold checking.
    pub collection_usage_threshold: u64,
    pub collection_usage_threshold_crossed: u64,
    #[serde(skip)]
    pub notification_state: NotificationState,
    /// Most recent sample, pre or post.
    pub current_size: u64,
    pub current_used: u64,
    pub current_max: u64,
}

impl MemoryPoolData {
    /// Replaces the peak triple when `used` exceeds the recorded peak.
    pub(crate) fn observe_peak(&mut self, size: u64, used: u64, max: u64) {
        if self.peak_used < used {
            self.peak_used = used;
            self.peak_size = size;
            self.peak_max = max;
        }
    }

    pub fn usage(&self) -> MemoryUsage {
        MemoryUsage {
            init: self.initial_size,
            used: self.current_used,
            committed: self.current_size,
            max: Some(self.current_max),
        }
    }

    /// Peak usage, reconciled against the current sample on read.
    pub fn peak_usage(&self) -> MemoryUsage {
        if self.current_used > self.peak_used {
            return self.usage();
        }
        MemoryUsage {
            init: self.initial_size,
            used: self.peak_used,
            committed: self.peak_size,
            max: Some(self.peak_max),
        }
    }

    pub fn collection_usage(&self) -> MemoryUsage {
        MemoryUsage {
            init: self.initial_size,
            used: self.post_collection_used,
            committed: self.post_collection_size,
            max: Some(self.post_collection_max),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NonHeapPoolData {
    pub id: PoolId,
    pub kind: NonHeapKind,
    pub initial_size: u64,
    pub pre_collection: SegmentUsage,
    pub post_collection: SegmentUsage,
    pub current: SegmentUsage,
    pub peak: SegmentUsage,
    pub max_size: Option<u64>,
}

impl NonHeapPoolData {
    pub(crate) fn observe(&mut self, sample: SegmentUsage) {
        self.current = sample;
        if sample.used > self.peak.used {
            self.peak = sample;
        }
    }

    pub fn usage(&self) -> MemoryUsage {
        MemoryUsage {
            init: self.initial_size,
            used: self.current.used,
            committed: self.current.committed,
            max: self.max_size,
        }
    }

    pub fn peak_usage(&self) -> MemoryUsage {
        let peak = if self.current.used > self.peak.used { self.current } else { self.peak };
        MemoryUsage {
            init: self.initial_size,
            used: peak.used,
            committed: peak.committed,
            max: self.max_size,
        }
    }
}

/// Details of the most recent collection by one collector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcInfo {
    pub collector_id: CollectorId,
    pub action: String,
    pub cause: String,
    /// Number of collections so far.
    pub index: u64,
    /// Millis since VM start.
    pub start_time: u64,
    pub end_time: u64,
    pub initial_size: Vec<u64>,
    pub pre_used: Vec<u64>,
    pub pre_committed: Vec<u64>,
    pub pre_max: Vec<Option<u64>>,
    pub post_used: Vec<u64>,
    pub post_committed: Vec<u64>,
    pub post_max: Vec<Option<u64>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectorData {
    pub id: CollectorId,
    pub name: String,
    pub is_local: bool,
    pub managed_pools: Vec<PoolId>,
    pub total_gc_time: u64,
    pub total_compacts: u64,
    pub total_memory_freed: i64,
    pub memory_used: u64,
    pub last_gc: GcInfo,
}

/// Totals for one collector as returned by queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcTotals {
    pub collection_count: u64,
    pub total_time_ms: u64,
    pub total_compacts: u64,
    pub total_memory_freed: i64,
    pub memory_used: u64,
    pub last_gc: Option<GcInfo>,
}

/// All counters kept by the collector, guarded as one unit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TelemetrySnapshot {
    pub vm_start_time: u64,
    pub initial_heap_size: u64,
    pub max_heap_size: u64,

    pub threads: ThreadCounts,
    pub classes: ClassCounts,

    pub total_compilation_time: u64,
    pub last_compilation_edge: u64,
    pub threads_compiling: u32,

    pub pre_collection_heap_size: u64,
    pub pre_collection_heap_used: u64,
    pub post_collection_heap_size: u64,
    pub post_collection_heap_used: u64,

    pub heap_pools: Vec<MemoryPoolData>,
    pub non_heap_pools: Vec<NonHeapPoolData>,
    pub collectors: Vec<CollectorData>,

    pub gc_notifications: bool,
}

impl TelemetrySnapshot {
    pub fn heap_pool(&self, id: PoolId) -> Option<&MemoryPoolData> {
        self.heap_pools.iter().find(|p| p.id == id)
    }

    pub fn heap_pool_mut(&mut self, id: PoolId) -> Option<&mut MemoryPoolData> {
        self.heap_pools.iter_mut().find(|p| p.id == id)
    }

    pub fn non_heap_pool(&self, id: PoolId) -> Option<&NonHeapPoolData> {
        self.non_heap_pools.iter().find(|p| p.id == id)
    }

    pub fn collector(&self, id: CollectorId) -> Option<&CollectorData> {
        self.collectors.iter().find(|c| c.id == id)
    }

    /// Index of `id` in the collector table, falling back to the first entry
    /// for unknown ids.
    pub(crate) fn collector_index(&self, id: CollectorId) -> usize {
        self.collectors.iter().position(|c| c.id == id).unwrap_or(0)
    }

    pub fn pool_count(&self) -> usize {
        self.heap_pools.len() + self.non_heap_pools.len()
    }
}
