use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::HookError;

pub type PoolId = u32;
pub type CollectorId = u32;

/// Lifecycle events the host emits, one synchronous call per event.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    ClassLoad,
    ClassUnload { count: u64 },
    ThreadCreated { daemon: bool },
    ThreadDestroyed { daemon: bool },
    CompileStart,
    CompileEnd,
    GlobalGcStart(GcSample),
    GlobalGcEnd(GcSample),
    LocalGcStart(GcSample),
    LocalGcEnd(GcSample),
    CompactEnd,
    PlatformReconfigured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    ClassLoad,
    ClassUnload,
    ThreadCreated,
    ThreadDestroyed,
    CompileStart,
    CompileEnd,
    GlobalGcStart,
    GlobalGcEnd,
    LocalGcStart,
    LocalGcEnd,
    CompactEnd,
    PlatformReconfigured,
}

impl EventKind {
    pub const ALL: [EventKind; 12] = [
        EventKind::ClassLoad,
        EventKind::ClassUnload,
        EventKind::ThreadCreated,
        EventKind::ThreadDestroyed,
        EventKind::CompileStart,
        EventKind::CompileEnd,
        EventKind::GlobalGcStart,
        EventKind::GlobalGcEnd,
        EventKind::LocalGcStart,
        EventKind::LocalGcEnd,
        EventKind::CompactEnd,
        EventKind::PlatformReconfigured,
    ];
}

impl LifecycleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LifecycleEvent::ClassLoad => EventKind::ClassLoad,
            LifecycleEvent::ClassUnload { .. } => EventKind::ClassUnload,
            LifecycleEvent::ThreadCreated { .. } => EventKind::ThreadCreated,
            LifecycleEvent::ThreadDestroyed { .. } => EventKind::ThreadDestroyed,
            LifecycleEvent::CompileStart => EventKind::CompileStart,
            LifecycleEvent::CompileEnd => EventKind::CompileEnd,
            LifecycleEvent::GlobalGcStart(_) => EventKind::GlobalGcStart,
            LifecycleEvent::GlobalGcEnd(_) => EventKind::GlobalGcEnd,
            LifecycleEvent::LocalGcStart(_) => EventKind::LocalGcStart,
            LifecycleEvent::LocalGcEnd(_) => EventKind::LocalGcEnd,
            LifecycleEvent::CompactEnd => EventKind::CompactEnd,
            LifecycleEvent::PlatformReconfigured => EventKind::PlatformReconfigured,
        }
    }
}

/// Memory state captured by the host at a GC edge.
///
/// `pool_totals`, `pool_frees` and `pool_maxes` follow the heap pool order of
/// the `RuntimeLayout`; `non_heap` follows the non-heap pool order.
/// `pool_maxes` is only consulted at GC end.
#[derive(Debug, Clone, Default)]
pub struct GcSample {
    /// 0 identifies a concurrent collector; such samples are ignored.
    pub collector_id: CollectorId,
    pub heap_size: u64,
    pub heap_free: u64,
    pub pool_totals: Vec<u64>,
    pub pool_frees: Vec<u64>,
    pub pool_maxes: Vec<u64>,
    pub non_heap: Vec<SegmentUsage>,
    pub action: String,
    pub cause: String,
}

/// Used/committed bytes of one non-heap segment list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentUsage {
    pub used: u64,
    pub committed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolDescriptor {
    pub id: PoolId,
    pub name: String,
    pub initial_size: u64,
    pub max_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorDescriptor {
    pub id: CollectorId,
    pub name: String,
    /// Local (scavenge-style) collectors never receive compaction counts.
    pub is_local: bool,
    pub managed_pools: Vec<PoolId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonHeapKind {
    ClassStorage,
    MiscStorage,
    JitCodeCache,
    JitDataCache,
}

impl NonHeapKind {
    pub fn display_name(self) -> &'static str {
        match self {
            NonHeapKind::ClassStorage => "class storage",
            NonHeapKind::MiscStorage => "miscellaneous non-heap storage",
            NonHeapKind::JitCodeCache => "JIT code cache",
            NonHeapKind::JitDataCache => "JIT data cache",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonHeapDescriptor {
    pub id: PoolId,
    pub kind: NonHeapKind,
    pub initial: SegmentUsage,
    /// `None` when the pool has no defined maximum.
    pub max_size: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ThreadCensus {
    pub live: u32,
    pub daemon: u32,
}

/// Everything the host enumerates once at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeLayout {
    pub heap_pools: Vec<PoolDescriptor>,
    pub collectors: Vec<CollectorDescriptor>,
    pub non_heap_pools: Vec<NonHeapDescriptor>,
    pub initial_heap_size: u64,
    pub max_heap_size: u64,
    pub initial_threads: ThreadCensus,
}

impl RuntimeLayout {
    /// Standard non-heap pool set: class and misc storage, plus the two JIT
    /// caches when a JIT is present.
    pub fn standard_non_heap(jit: Option<(u64, u64)>) -> Vec<NonHeapDescriptor> {
        let mut pools = vec![
            NonHeapDescriptor {
                id: 0x100,
                kind: NonHeapKind::ClassStorage,
                initial: SegmentUsage::default(),
                max_size: None,
            },
            NonHeapDescriptor {
                id: 0x101,
                kind: NonHeapKind::MiscStorage,
                initial: SegmentUsage::default(),
                max_size: None,
            },
        ];
        if let Some((code_cache, data_cache)) = jit {
            pools.push(NonHeapDescriptor {
                id: 0x102,
                kind: NonHeapKind::JitCodeCache,
                initial: SegmentUsage::default(),
                max_size: Some(code_cache),
            });
            pools.push(NonHeapDescriptor {
                id: 0x103,
                kind: NonHeapKind::JitDataCache,
                initial: SegmentUsage::default(),
                max_size: Some(data_cache),
            });
        }
        pools
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.heap_pools.is_empty() {
            return Err("no heap memory pools".into());
        }
        if self.collectors.is_empty() {
            return Err("no garbage collectors".into());
        }
        let mut ids: Vec<PoolId> = self
            .heap_pools
            .iter()
            .map(|p| p.id)
            .chain(self.non_heap_pools.iter().map(|p| p.id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.heap_pools.len() + self.non_heap_pools.len() {
            return Err("duplicate memory pool id".into());
        }
        if self.collectors.iter().any(|c| c.id == 0) {
            return Err("collector id 0 is reserved for concurrent collectors".into());
        }
        Ok(())
    }
}

/// Receiver side of a hook registration.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent);
}

/// A source of enumerated lifecycle events (the host's hook interface).
pub trait EventSource: Send + Sync {
    fn register(&self, kind: EventKind, listener: Arc<dyn EventListener>) -> Result<(), HookError>;
    fn unregister(&self, kind: EventKind, listener: &Arc<dyn EventListener>);
}

/// In-process hook table. Hosts call `fire` from whatever thread produced
/// the event; listeners run synchronously on that thread.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<HashMap<EventKind, Vec<Arc<dyn EventListener>>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self, event: &LifecycleEvent) {
        let listeners = self.hooks.read().get(&event.kind()).cloned().unwrap_or_default();
        for listener in listeners {
            listener.on_event(event);
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.hooks.read().get(&kind).map_or(0, Vec::len)
    }
}

impl EventSource for HookRegistry {
    fn register(&self, kind: EventKind, listener: Arc<dyn EventListener>) -> Result<(), HookError> {
        self.hooks.write().entry(kind).or_default().push(listener);
        Ok(())
    }

    fn unregister(&self, kind: EventKind, listener: &Arc<dyn EventListener>) {
        if let Some(list) = self.hooks.write().get_mut(&kind) {
            list.retain(|l| !Arc::ptr_eq(l, listener));
        }
    }
}
