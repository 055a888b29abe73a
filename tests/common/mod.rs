#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use vmtelemetry::kernel::dlpar::{PlatformProbe, PlatformResources, ResourceKind};
use vmtelemetry::kernel::event::{
    CollectorDescriptor, EventKind, EventListener, EventSource, GcSample, HookRegistry,
    LifecycleEvent, PoolDescriptor, RuntimeLayout, SegmentUsage, ThreadCensus,
};
use vmtelemetry::kernel::notify::{NotificationSink, ResourceChangeSink};
use vmtelemetry::kernel::telemetry::{GcNotice, ThresholdNotice};
use vmtelemetry::{DeliveryError, HookError, ProbeError};

pub const NURSERY: u32 = 1;
pub const TENURED: u32 = 2;
pub const SCAVENGE: u32 = 1;
pub const GLOBAL: u32 = 2;

/// Two heap pools, a local and a global collector, four non-heap pools.
pub fn layout() -> RuntimeLayout {
    RuntimeLayout {
        heap_pools: vec![
            PoolDescriptor { id: NURSERY, name: "nursery".into(), initial_size: 1_000, max_size: 4_000 },
            PoolDescriptor { id: TENURED, name: "tenured".into(), initial_size: 2_000, max_size: 8_000 },
        ],
        collectors: vec![
            CollectorDescriptor { id: SCAVENGE, name: "scavenge".into(), is_local: true, managed_pools: vec![NURSERY] },
            CollectorDescriptor { id: GLOBAL, name: "global".into(), is_local: false, managed_pools: vec![NURSERY, TENURED] },
        ],
        non_heap_pools: RuntimeLayout::standard_non_heap(Some((512, 256))),
        initial_heap_size: 3_000,
        max_heap_size: 12_000,
        initial_threads: ThreadCensus { live: 2, daemon: 1 },
    }
}

/// A GC sample where the nursery and tenured pools report the given usage
/// against fixed totals of 1000 and 2000.
pub fn sample(collector_id: u32, nursery_used: u64, tenured_used: u64) -> GcSample {
    GcSample {
        collector_id,
        heap_size: 3_000,
        heap_free: 3_000 - nursery_used - tenured_used,
        pool_totals: vec![1_000, 2_000],
        pool_frees: vec![1_000 - nursery_used, 2_000 - tenured_used],
        pool_maxes: vec![4_000, 8_000],
        non_heap: vec![SegmentUsage { used: 10, committed: 64 }; 4],
        action: "end of major GC".into(),
        cause: "allocation failure".into(),
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub thresholds: Mutex<Vec<ThresholdNotice>>,
    pub gcs: Mutex<Vec<GcNotice>>,
    pub resources: Mutex<Vec<(ResourceKind, u64, u64)>>,
    pub fail: AtomicBool,
}

impl RecordingSink {
    pub fn delivered(&self) -> usize {
        self.thresholds.lock().len() + self.gcs.lock().len() + self.resources.lock().len()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver_threshold(&self, notice: ThresholdNotice) -> Result<(), DeliveryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError("sink refused threshold notice".into()));
        }
        self.thresholds.lock().push(notice);
        Ok(())
    }

    fn deliver_gc(&self, notice: GcNotice) -> Result<(), DeliveryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError("sink refused gc notice".into()));
        }
        self.gcs.lock().push(notice);
        Ok(())
    }
}

impl ResourceChangeSink for RecordingSink {
    fn deliver_resource_change(&self, kind: ResourceKind, value: u64, sequence: u64) -> Result<(), DeliveryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError("sink refused resource change".into()));
        }
        self.resources.lock().push((kind, value, sequence));
        Ok(())
    }
}

/// Platform counters the test moves by hand.
#[derive(Default)]
pub struct FakePlatform {
    pub cpus: AtomicU32,
    pub capacity: AtomicU32,
    pub memory: AtomicU64,
    pub broken: AtomicBool,
}

impl FakePlatform {
    pub fn with(cpus: u32, capacity: u32, memory: u64) -> Self {
        Self {
            cpus: AtomicU32::new(cpus),
            capacity: AtomicU32::new(capacity),
            memory: AtomicU64::new(memory),
            broken: AtomicBool::new(false),
        }
    }
}

impl PlatformProbe for FakePlatform {
    fn sample(&self) -> Result<PlatformResources, ProbeError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(ProbeError("statistics unavailable".into()));
        }
        Ok(PlatformResources {
            cpus: self.cpus.load(Ordering::SeqCst),
            processing_capacity: self.capacity.load(Ordering::SeqCst),
            physical_memory: self.memory.load(Ordering::SeqCst),
        })
    }
}

/// Event source that refuses one kind, delegating the rest to a registry.
pub struct RefusingSource {
    pub inner: HookRegistry,
    pub refuse: EventKind,
}

impl EventSource for RefusingSource {
    fn register(&self, kind: EventKind, listener: Arc<dyn EventListener>) -> Result<(), HookError> {
        if kind == self.refuse {
            return Err(HookError(format!("{kind:?} hook unavailable")));
        }
        self.inner.register(kind, listener)
    }

    fn unregister(&self, kind: EventKind, listener: &Arc<dyn EventListener>) {
        self.inner.unregister(kind, listener);
    }
}

/// Polls `cond` until it holds or two seconds pass.
pub fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub fn gc_pair(collector_id: u32, pre: (u64, u64), post: (u64, u64)) -> [LifecycleEvent; 2] {
    let start = sample(collector_id, pre.0, pre.1);
    let end = sample(collector_id, post.0, post.1);
    if collector_id == GLOBAL {
        [LifecycleEvent::GlobalGcStart(start), LifecycleEvent::GlobalGcEnd(end)]
    } else {
        [LifecycleEvent::LocalGcStart(start), LifecycleEvent::LocalGcEnd(end)]
    }
}
