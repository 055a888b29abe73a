//! Lifecycle context for the collector: init, event ingestion, queries and
//! shutdown. One instance per runtime, owned by the embedder.

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::TelemetryConfig;
use crate::error::InitError;
use crate::kernel::dlpar::{DlparPipeline, PlatformHooks, PlatformResources};
use crate::kernel::event::{
    CollectorId, EventKind, EventListener, EventSource, GcSample, LifecycleEvent, PoolId,
    RuntimeLayout,
};
use crate::kernel::notify::{
    DispatchExit, Dispatcher, HeapDelivery, NotificationQueue, NotificationSink, QueueState,
};
use crate::kernel::telemetry::{
    ClassCounts, GcTotals, HeapNotification, MemoryUsage, PoolDirectory, StatsAggregator,
    TelemetrySnapshot, ThreadCounts,
};
use crate::kernel::time::Clock;

/// Collaborators supplied by the embedding runtime.
pub struct Host {
    pub layout: RuntimeLayout,
    pub events: Arc<dyn EventSource>,
    pub sink: Arc<dyn NotificationSink>,
    pub platform: Option<PlatformHooks>,
    pub clock: Arc<dyn Clock>,
}

/// State reachable from the registered listener.
struct Shared {
    stats: StatsAggregator,
    heap_queue: Arc<NotificationQueue<HeapNotification>>,
    dlpar: DlparPipeline,
}

impl Shared {
    fn ingest(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::ClassLoad => self.stats.record_class_load(),
            LifecycleEvent::ClassUnload { count } => self.stats.record_class_unload(*count),
            LifecycleEvent::ThreadCreated { daemon } => self.stats.record_thread_start(*daemon),
            LifecycleEvent::ThreadDestroyed { daemon } => self.stats.record_thread_end(*daemon),
            LifecycleEvent::CompileStart => self.stats.record_compile_start(),
            LifecycleEvent::CompileEnd => self.stats.record_compile_end(),
            LifecycleEvent::GlobalGcStart(sample) | LifecycleEvent::LocalGcStart(sample) => {
                self.on_gc(sample, false)
            }
            LifecycleEvent::GlobalGcEnd(sample) | LifecycleEvent::LocalGcEnd(sample) => {
                self.on_gc(sample, true)
            }
            LifecycleEvent::CompactEnd => self.stats.record_compact_end(),
            LifecycleEvent::PlatformReconfigured => {
                self.dlpar.on_reconfigured();
            }
        }
    }

    fn on_gc(&self, sample: &GcSample, is_end: bool) {
        // Only stop-the-world collectors are recorded.
        if sample.collector_id == 0 {
            return;
        }
        let notices = if is_end {
            self.stats.record_gc_end(sample)
        } else {
            self.stats.record_gc_start(sample)
        };
        self.publish(notices);
    }

    fn publish(&self, notices: Vec<HeapNotification>) {
        for notice in notices {
            if let Err(reason) = self.heap_queue.enqueue(notice) {
                debug!(%reason, "heap notification dropped");
            }
        }
    }
}

impl EventListener for Shared {
    fn on_event(&self, event: &LifecycleEvent) {
        self.ingest(event);
    }
}

/// What the dispatchers reported when the collector was stopped.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub heap: Option<DispatchExit>,
    pub dlpar: Option<DispatchExit>,
}

pub struct Management {
    shared: Arc<Shared>,
    events: Arc<dyn EventSource>,
    listener: Arc<dyn EventListener>,
    registered: Vec<EventKind>,
    heap_dispatcher: Option<Dispatcher>,
    stopped: bool,
}

impl Management {
    /// Builds the counters, starts both dispatchers and registers for every
    /// lifecycle event. On failure everything already started is torn down.
    pub fn init(config: &TelemetryConfig, host: Host) -> Result<Self, InitError> {
        config
            .validate()
            .map_err(|err| InitError::InvalidConfig(err.to_string()))?;
        host.layout.validate().map_err(InitError::Layout)?;

        let stats = StatsAggregator::new(&host.layout, host.clock, config.gc_notifications);
        let directory = Arc::new(PoolDirectory::from_layout(&host.layout));
        let heap_queue = Arc::new(NotificationQueue::new("heap", config.queue_capacity));
        let dlpar = DlparPipeline::start(config, host.platform);

        let delivery = HeapDelivery::new(directory, host.sink);
        let heap_dispatcher = match Dispatcher::spawn(
            &config.thread_names.heap,
            Arc::clone(&heap_queue),
            move |sequence, notification| delivery.deliver(sequence, notification),
        ) {
            Ok(dispatcher) => dispatcher,
            Err(err) => {
                dlpar.shutdown();
                return Err(err);
            }
        };

        let shared = Arc::new(Shared {
            stats,
            heap_queue,
            dlpar,
        });
        let listener: Arc<dyn EventListener> = shared.clone();
        let mut management = Self {
            shared,
            events: host.events,
            listener,
            registered: Vec::with_capacity(EventKind::ALL.len()),
            heap_dispatcher: Some(heap_dispatcher),
            stopped: false,
        };

        for kind in EventKind::ALL {
            if let Err(source) = management
                .events
                .register(kind, Arc::clone(&management.listener))
            {
                management.stop();
                return Err(InitError::Registration { kind, source });
            }
            management.registered.push(kind);
        }

        info!(
            heap_pools = host.layout.heap_pools.len(),
            non_heap_pools = host.layout.non_heap_pools.len(),
            collectors = host.layout.collectors.len(),
            dlpar = management.shared.dlpar.is_enabled(),
            "management telemetry initialized"
        );
        Ok(management)
    }

    /// Feeds one event directly, as a registered hook would.
    pub fn ingest(&self, event: &LifecycleEvent) {
        self.shared.ingest(event);
    }

    pub fn stats(&self) -> &StatsAggregator {
        &self.shared.stats
    }

    pub fn heap_queue(&self) -> &NotificationQueue<HeapNotification> {
        &self.shared.heap_queue
    }

    pub fn heap_queue_state(&self) -> QueueState {
        self.shared.heap_queue.state()
    }

    pub fn dlpar(&self) -> &DlparPipeline {
        &self.shared.dlpar
    }

    // Queries

    pub fn heap_usage(&self) -> MemoryUsage {
        self.shared.stats.heap_usage()
    }

    pub fn non_heap_usage(&self) -> MemoryUsage {
        self.shared.stats.non_heap_usage()
    }

    pub fn pool_usage(&self, pool: PoolId) -> Option<MemoryUsage> {
        self.shared.stats.pool_usage(pool)
    }

    pub fn pool_peak_usage(&self, pool: PoolId) -> Option<MemoryUsage> {
        self.shared.stats.pool_peak_usage(pool)
    }

    pub fn reset_peak_usage(&self, pool: PoolId) -> bool {
        self.shared.stats.reset_peak_usage(pool)
    }

    pub fn pool_collection_usage(&self, pool: PoolId) -> Option<MemoryUsage> {
        self.shared.stats.pool_collection_usage(pool)
    }

    pub fn is_threshold_exceeded(&self, pool: PoolId) -> bool {
        self.shared.stats.is_threshold_exceeded(pool)
    }

    pub fn is_collection_threshold_exceeded(&self, pool: PoolId) -> bool {
        self.shared.stats.is_collection_threshold_exceeded(pool)
    }

    pub fn thread_counts(&self) -> ThreadCounts {
        self.shared.stats.thread_counts()
    }

    pub fn class_counts(&self) -> ClassCounts {
        self.shared.stats.class_counts()
    }

    pub fn gc_totals(&self, collector: CollectorId) -> Option<GcTotals> {
        self.shared.stats.gc_totals(collector)
    }

    pub fn compile_time_total(&self) -> u64 {
        self.shared.stats.compile_time_total()
    }

    pub fn platform_resources(&self) -> PlatformResources {
        self.shared.dlpar.resources()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.shared.stats.snapshot()
    }

    // Settings

    pub fn set_usage_threshold(&self, pool: PoolId, threshold: u64) -> bool {
        self.shared.stats.set_usage_threshold(pool, threshold)
    }

    pub fn set_collection_usage_threshold(&self, pool: PoolId, threshold: u64) -> bool {
        self.shared.stats.set_collection_usage_threshold(pool, threshold)
    }

    pub fn set_gc_notifications_enabled(&self, enabled: bool) {
        self.shared.stats.set_gc_notifications_enabled(enabled);
    }

    /// Deregisters from the event source, stops both pipelines and joins
    /// their dispatchers.
    pub fn shutdown(mut self) -> ShutdownReport {
        self.stop()
    }

    fn stop(&mut self) -> ShutdownReport {
        if self.stopped {
            return ShutdownReport::default();
        }
        self.stopped = true;

        for kind in self.registered.drain(..) {
            self.events.unregister(kind, &self.listener);
        }

        let discarded = self.shared.heap_queue.shutdown();
        let heap = self.heap_dispatcher.as_mut().and_then(Dispatcher::join);
        let dlpar = self.shared.dlpar.shutdown();
        info!(discarded, "management telemetry stopped");
        ShutdownReport { heap, dlpar }
    }
}

impl Drop for Management {
    fn drop(&mut self) {
        self.stop();
    }
}
