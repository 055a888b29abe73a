use parking_lot::RwLock;
use std::sync::Arc;

use crate::kernel::event::{CollectorId, GcSample, PoolId, RuntimeLayout, SegmentUsage};
use crate::kernel::time::{millis_since, Clock};
use super::event::{GcNotification, HeapNotification, UsageThresholdInfo};
use super::metrics::{
    ClassCounts, CollectorData, GcInfo, GcTotals, MemoryPoolData, MemoryUsage, NonHeapPoolData,
    NotificationState, TelemetrySnapshot, ThreadCounts,
};

/// Shared counters behind one reader/writer lock.
///
/// Recording methods take the write lock; queries that read several fields
/// take the read lock. Threshold crossings are returned to the caller rather
/// than queued here, so this lock is never held while a queue lock is taken.
pub struct StatsAggregator {
    data: RwLock<TelemetrySnapshot>,
    clock: Arc<dyn Clock>,
}

impl StatsAggregator {
    pub fn new(layout: &RuntimeLayout, clock: Arc<dyn Clock>, gc_notifications: bool) -> Self {
        let heap_pools = layout
            .heap_pools
            .iter()
            .map(|p| MemoryPoolData {
                id: p.id,
                name: p.name.clone(),
                initial_size: p.initial_size,
                pre_collection_max: p.max_size,
                post_collection_max: p.max_size,
                current_size: p.initial_size,
                current_max: p.max_size,
                ..MemoryPoolData::default()
            })
            .collect();

        let non_heap_pools = layout
            .non_heap_pools
            .iter()
            .map(|p| NonHeapPoolData {
                id: p.id,
                kind: p.kind,
                initial_size: p.initial.committed,
                pre_collection: SegmentUsage::default(),
                post_collection: SegmentUsage::default(),
                current: p.initial,
                peak: p.initial,
                max_size: p.max_size,
            })
            .collect();

        let collectors = layout
            .collectors
            .iter()
            .map(|c| CollectorData {
                id: c.id,
                name: c.name.clone(),
                is_local: c.is_local,
                managed_pools: c.managed_pools.clone(),
                ..CollectorData::default()
            })
            .collect();

        let census = layout.initial_threads;
        let snapshot = TelemetrySnapshot {
            vm_start_time: clock.wall_millis(),
            initial_heap_size: layout.initial_heap_size,
            max_heap_size: layout.max_heap_size,
            threads: ThreadCounts {
                live: census.live,
                peak: census.live,
                daemon: census.daemon,
                total_started: u64::from(census.live),
            },
            heap_pools,
            non_heap_pools,
            collectors,
            gc_notifications,
            ..TelemetrySnapshot::default()
        };

        Self {
            data: RwLock::new(snapshot),
            clock,
        }
    }

    // --- Threads ---

    pub fn record_thread_start(&self, daemon: bool) {
        let mut d = self.data.write();
        d.threads.total_started += 1;
        d.threads.live += 1;
        if d.threads.live > d.threads.peak {
            d.threads.peak = d.threads.live;
        }
        if daemon {
            d.threads.daemon += 1;
        }
    }

    pub fn record_thread_end(&self, daemon: bool) {
        let mut d = self.data.write();
        d.threads.live = d.threads.live.saturating_sub(1);
        if daemon {
            d.threads.daemon = d.threads.daemon.saturating_sub(1);
        }
    }

    // --- Classes ---

    pub fn record_class_load(&self) {
        self.data.write().classes.loaded += 1;
    }

    pub fn record_class_unload(&self, count: u64) {
        self.data.write().classes.unloaded += count;
    }

    // --- Compilation ---

    /// Charges the interval since the last edge to the number of threads
    /// that were compiling during it, then opens a new interval.
    pub fn record_compile_start(&self) {
        let now = self.clock.nano_time();
        let mut d = self.data.write();
        charge_compile_interval(&mut d, now);
        d.threads_compiling += 1;
    }

    pub fn record_compile_end(&self) {
        let now = self.clock.nano_time();
        let mut d = self.data.write();
        charge_compile_interval(&mut d, now);
        d.threads_compiling = d.threads_compiling.saturating_sub(1);
    }

    // --- Garbage collection ---

    /// Records pre-collection state and evaluates usage thresholds.
    pub fn record_gc_start(&self, sample: &GcSample) -> Vec<HeapNotification> {
        let now = self.clock.wall_millis();
        let mut notices = Vec::new();
        let mut guard = self.data.write();
        let d = &mut *guard;

        let idx = d.collector_index(sample.collector_id);
        let start = millis_since(d.vm_start_time, now);
        if let Some(collector) = d.collectors.get_mut(idx) {
            collector.last_gc.start_time = start;
        }

        d.pre_collection_heap_size = sample.heap_size;
        d.pre_collection_heap_used = sample.heap_size.saturating_sub(sample.heap_free);

        let samples = sample.pool_totals.iter().zip(&sample.pool_frees);
        for (pool, (&total, &free)) in d.heap_pools.iter_mut().zip(samples) {
            let used = total.saturating_sub(free);
            pool.pre_collection_size = total;
            pool.pre_collection_used = used;
            pool.pre_collection_max = pool.post_collection_max;
            pool.current_size = total;
            pool.current_used = used;
            pool.current_max = pool.pre_collection_max;
            pool.observe_peak(total, used, pool.pre_collection_max);

            let crossed = edge_crossed(
                pool.usage_threshold,
                used,
                &mut pool.notification_state,
                NotificationState::USAGE_EXCEEDED,
                &mut pool.usage_threshold_crossed,
            );
            if let Some(crossing_count) = crossed {
                notices.push(HeapNotification::ThresholdExceeded(UsageThresholdInfo {
                    pool_id: pool.id,
                    used,
                    total,
                    max: pool.pre_collection_max,
                    crossing_count,
                }));
            }
        }

        for (pool, &segment) in d.non_heap_pools.iter_mut().zip(&sample.non_heap) {
            pool.pre_collection = segment;
            pool.observe(segment);
        }

        notices
    }

    /// Records post-collection state, evaluates collection-usage thresholds,
    /// updates collector totals and, when enabled, produces EndOfGC.
    pub fn record_gc_end(&self, sample: &GcSample) -> Vec<HeapNotification> {
        let now = self.clock.wall_millis();
        let mut notices = Vec::new();
        let mut guard = self.data.write();
        let d = &mut *guard;

        d.post_collection_heap_size = sample.heap_size;
        d.post_collection_heap_used = sample.heap_size.saturating_sub(sample.heap_free);

        let samples = sample.pool_totals.iter().zip(&sample.pool_frees).enumerate();
        for (pool, (i, (&total, &free))) in d.heap_pools.iter_mut().zip(samples) {
            let used = total.saturating_sub(free);
            pool.post_collection_size = total;
            pool.post_collection_used = used;
            if let Some(&max) = sample.pool_maxes.get(i) {
                pool.post_collection_max = max;
            }
            pool.current_size = total;
            pool.current_used = used;
            pool.current_max = pool.post_collection_max;
            pool.observe_peak(total, used, pool.post_collection_max);

            let crossed = edge_crossed(
                pool.collection_usage_threshold,
                used,
                &mut pool.notification_state,
                NotificationState::COLLECTION_USAGE_EXCEEDED,
                &mut pool.collection_usage_threshold_crossed,
            );
            if let Some(crossing_count) = crossed {
                notices.push(HeapNotification::CollectionThresholdExceeded(UsageThresholdInfo {
                    pool_id: pool.id,
                    used,
                    total,
                    max: pool.post_collection_max,
                    crossing_count,
                }));
            }
        }

        for (pool, &segment) in d.non_heap_pools.iter_mut().zip(&sample.non_heap) {
            pool.post_collection = segment;
            pool.observe(segment);
        }

        let idx = d.collector_index(sample.collector_id);
        let end = millis_since(d.vm_start_time, now);
        let freed = d.pre_collection_heap_used as i64 - d.post_collection_heap_used as i64;
        let info = build_gc_info(&d.heap_pools, &d.non_heap_pools);
        let memory_used: u64 = match d.collectors.get(idx) {
            Some(c) => d
                .heap_pools
                .iter()
                .filter(|p| c.managed_pools.contains(&p.id))
                .map(|p| p.post_collection_used)
                .sum(),
            None => 0,
        };
        let Some(collector) = d.collectors.get_mut(idx) else {
            return notices;
        };

        let last = &mut collector.last_gc;
        if end >= last.start_time {
            collector.total_gc_time += end - last.start_time;
            last.end_time = end;
        } else {
            last.end_time = last.start_time;
        }
        last.index += 1;
        last.collector_id = collector.id;
        last.action = sample.action.clone();
        last.cause = sample.cause.clone();
        last.initial_size = info.initial_size;
        last.pre_used = info.pre_used;
        last.pre_committed = info.pre_committed;
        last.pre_max = info.pre_max;
        last.post_used = info.post_used;
        last.post_committed = info.post_committed;
        last.post_max = info.post_max;

        collector.memory_used = memory_used;
        collector.total_memory_freed += freed;

        if d.gc_notifications {
            notices.push(HeapNotification::EndOfGc(Box::new(GcNotification {
                collector_id: collector.id,
                info: collector.last_gc.clone(),
            })));
        }

        notices
    }

    /// Counts a compaction against the first global collector.
    pub fn record_compact_end(&self) {
        let mut d = self.data.write();
        if let Some(collector) = d.collectors.iter_mut().find(|c| !c.is_local) {
            collector.total_compacts += 1;
        }
    }

    // --- Settings ---

    pub fn set_usage_threshold(&self, pool: PoolId, threshold: u64) -> bool {
        let mut d = self.data.write();
        match d.heap_pool_mut(pool) {
            Some(p) => {
                p.usage_threshold = threshold;
                if threshold == 0 {
                    p.notification_state.remove(NotificationState::USAGE_EXCEEDED);
                }
                true
            }
            None => false,
        }
    }

    pub fn set_collection_usage_threshold(&self, pool: PoolId, threshold: u64) -> bool {
        let mut d = self.data.write();
        match d.heap_pool_mut(pool) {
            Some(p) => {
                p.collection_usage_threshold = threshold;
                if threshold == 0 {
                    p.notification_state.remove(NotificationState::COLLECTION_USAGE_EXCEEDED);
                }
                true
            }
            None => false,
        }
    }

    pub fn set_gc_notifications_enabled(&self, enabled: bool) {
        self.data.write().gc_notifications = enabled;
    }

    // --- Queries ---

    pub fn heap_usage(&self) -> MemoryUsage {
        let d = self.data.read();
        MemoryUsage {
            init: d.initial_heap_size,
            used: d.heap_pools.iter().map(|p| p.current_used).sum(),
            committed: d.heap_pools.iter().map(|p| p.current_size).sum(),
            max: Some(d.max_heap_size),
        }
    }

    pub fn non_heap_usage(&self) -> MemoryUsage {
        let d = self.data.read();
        MemoryUsage {
            init: d.non_heap_pools.iter().map(|p| p.initial_size).sum(),
            used: d.non_heap_pools.iter().map(|p| p.current.used).sum(),
            committed: d.non_heap_pools.iter().map(|p| p.current.committed).sum(),
            max: d.non_heap_pools.iter().map(|p| p.max_size).sum(),
        }
    }

    pub fn pool_usage(&self, pool: PoolId) -> Option<MemoryUsage> {
        let d = self.data.read();
        d.heap_pool(pool)
            .map(MemoryPoolData::usage)
            .or_else(|| d.non_heap_pool(pool).map(NonHeapPoolData::usage))
    }

    pub fn pool_peak_usage(&self, pool: PoolId) -> Option<MemoryUsage> {
        let d = self.data.read();
        d.heap_pool(pool)
            .map(MemoryPoolData::peak_usage)
            .or_else(|| d.non_heap_pool(pool).map(NonHeapPoolData::peak_usage))
    }

    /// Resets the peak of `pool` to its current usage.
    pub fn reset_peak_usage(&self, pool: PoolId) -> bool {
        let mut guard = self.data.write();
        let d = &mut *guard;
        if let Some(p) = d.heap_pools.iter_mut().find(|p| p.id == pool) {
            p.peak_used = p.current_used;
            p.peak_size = p.current_size;
            p.peak_max = p.current_max;
            return true;
        }
        if let Some(p) = d.non_heap_pools.iter_mut().find(|p| p.id == pool) {
            p.peak = p.current;
            return true;
        }
        false
    }

    /// Usage right after the most recent collection. Heap pools only.
    pub fn pool_collection_usage(&self, pool: PoolId) -> Option<MemoryUsage> {
        self.data.read().heap_pool(pool).map(MemoryPoolData::collection_usage)
    }

    pub fn is_threshold_exceeded(&self, pool: PoolId) -> bool {
        self.pool_state(pool).contains(NotificationState::USAGE_EXCEEDED)
    }

    pub fn is_collection_threshold_exceeded(&self, pool: PoolId) -> bool {
        self.pool_state(pool).contains(NotificationState::COLLECTION_USAGE_EXCEEDED)
    }

    fn pool_state(&self, pool: PoolId) -> NotificationState {
        self.data
            .read()
            .heap_pool(pool)
            .map_or(NotificationState::empty(), |p| p.notification_state)
    }

    pub fn usage_threshold_count(&self, pool: PoolId) -> Option<u64> {
        self.data.read().heap_pool(pool).map(|p| p.usage_threshold_crossed)
    }

    pub fn collection_usage_threshold_count(&self, pool: PoolId) -> Option<u64> {
        self.data
            .read()
            .heap_pool(pool)
            .map(|p| p.collection_usage_threshold_crossed)
    }

    pub fn thread_counts(&self) -> ThreadCounts {
        self.data.read().threads
    }

    pub fn reset_peak_thread_count(&self) {
        let mut d = self.data.write();
        d.threads.peak = d.threads.live;
    }

    pub fn class_counts(&self) -> ClassCounts {
        self.data.read().classes
    }

    pub fn gc_totals(&self, collector: CollectorId) -> Option<GcTotals> {
        let d = self.data.read();
        d.collector(collector).map(|c| GcTotals {
            collection_count: c.last_gc.index,
            total_time_ms: c.total_gc_time,
            total_compacts: c.total_compacts,
            total_memory_freed: c.total_memory_freed,
            memory_used: c.memory_used,
            last_gc: (c.last_gc.index > 0).then(|| c.last_gc.clone()),
        })
    }

    /// Accumulated compile time in clock units (nanoseconds for `SystemClock`).
    pub fn compile_time_total(&self) -> u64 {
        self.data.read().total_compilation_time
    }

    pub fn gc_notifications_enabled(&self) -> bool {
        self.data.read().gc_notifications
    }

    pub fn vm_start_time(&self) -> u64 {
        self.data.read().vm_start_time
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.data.read().clone()
    }
}

fn charge_compile_interval(d: &mut TelemetrySnapshot, now: u64) {
    if d.threads_compiling > 0 {
        let elapsed = now.saturating_sub(d.last_compilation_edge);
        d.total_compilation_time += elapsed * u64::from(d.threads_compiling);
    }
    d.last_compilation_edge = now;
}

/// Edge-triggered threshold check. Returns the new crossing count on an
/// up-crossing, clears `flag` once usage is back below.
fn edge_crossed(
    threshold: u64,
    used: u64,
    state: &mut NotificationState,
    flag: NotificationState,
    crossed: &mut u64,
) -> Option<u64> {
    if threshold == 0 {
        return None;
    }
    if used >= threshold {
        if state.contains(flag) {
            return None;
        }
        state.insert(flag);
        *crossed += 1;
        Some(*crossed)
    } else {
        state.remove(flag);
        None
    }
}

fn build_gc_info(heap: &[MemoryPoolData], non_heap: &[NonHeapPoolData]) -> GcInfo {
    let mut info = GcInfo::default();
    for p in heap {
        info.initial_size.push(p.initial_size);
        info.pre_used.push(p.pre_collection_used);
        info.pre_committed.push(p.pre_collection_size);
        info.pre_max.push(Some(p.pre_collection_max));
        info.post_used.push(p.post_collection_used);
        info.post_committed.push(p.post_collection_size);
        info.post_max.push(Some(p.post_collection_max));
    }
    for p in non_heap {
        info.initial_size.push(p.initial_size);
        info.pre_used.push(p.pre_collection.used);
        info.pre_committed.push(p.pre_collection.committed);
        info.pre_max.push(p.max_size);
        info.post_used.push(p.post_collection.used);
        info.post_committed.push(p.post_collection.committed);
        info.post_max.push(p.max_size);
    }
    info
}
