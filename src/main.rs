use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vmtelemetry::kernel::dlpar::{PlatformHooks, PlatformProbe, PlatformResources, ResourceKind};
use vmtelemetry::kernel::event::{
    CollectorDescriptor, GcSample, HookRegistry, LifecycleEvent, PoolDescriptor, RuntimeLayout,
    SegmentUsage, ThreadCensus,
};
use vmtelemetry::kernel::notify::{NotificationSink, ResourceChangeSink};
use vmtelemetry::kernel::telemetry::{GcNotice, ThresholdNotice};
use vmtelemetry::kernel::time::SystemClock;
use vmtelemetry::{DeliveryError, Host, Management, ProbeError, TelemetryConfig};

const CADENCE_MS: u64 = 50;
const DEMO_TICKS: u64 = 200;
const MIB: u64 = 1024 * 1024;

/// Prints every notice as a JSON line.
struct JsonLogSink;

impl NotificationSink for JsonLogSink {
    fn deliver_threshold(&self, notice: ThresholdNotice) -> Result<(), DeliveryError> {
        let line = serde_json::to_string(&notice).map_err(|e| DeliveryError(e.to_string()))?;
        info!(target: "notification", "threshold {}", line);
        Ok(())
    }

    fn deliver_gc(&self, notice: GcNotice) -> Result<(), DeliveryError> {
        let line = serde_json::to_string(&notice).map_err(|e| DeliveryError(e.to_string()))?;
        info!(target: "notification", "gc {}", line);
        Ok(())
    }
}

impl ResourceChangeSink for JsonLogSink {
    fn deliver_resource_change(&self, kind: ResourceKind, value: u64, sequence: u64) -> Result<(), DeliveryError> {
        info!(target: "notification", ?kind, value, sequence, "resource change");
        Ok(())
    }
}

/// Synthetic platform whose CPU count the driver bumps.
#[derive(Default)]
struct SimulatedPlatform {
    cpus: AtomicU32,
    memory: AtomicU64,
}

impl PlatformProbe for SimulatedPlatform {
    fn sample(&self) -> Result<PlatformResources, ProbeError> {
        Ok(PlatformResources {
            cpus: self.cpus.load(Ordering::SeqCst),
            processing_capacity: 100,
            physical_memory: self.memory.load(Ordering::SeqCst),
        })
    }
}

fn demo_layout() -> RuntimeLayout {
    RuntimeLayout {
        heap_pools: vec![
            PoolDescriptor { id: 1, name: "nursery-allocate".into(), initial_size: 32 * MIB, max_size: 128 * MIB },
            PoolDescriptor { id: 2, name: "tenured".into(), initial_size: 64 * MIB, max_size: 512 * MIB },
        ],
        collectors: vec![
            CollectorDescriptor { id: 1, name: "scavenge".into(), is_local: true, managed_pools: vec![1] },
            CollectorDescriptor { id: 2, name: "global".into(), is_local: false, managed_pools: vec![1, 2] },
        ],
        non_heap_pools: RuntimeLayout::standard_non_heap(Some((64 * MIB, 16 * MIB))),
        initial_heap_size: 96 * MIB,
        max_heap_size: 640 * MIB,
        initial_threads: ThreadCensus { live: 1, daemon: 0 },
    }
}

fn gc_sample(collector_id: u32, tick: u64, is_end: bool) -> GcSample {
    let tenured_used = (tick * 3 * MIB) % (400 * MIB);
    let nursery_used = if is_end { MIB } else { 30 * MIB };
    let totals = vec![32 * MIB, 448 * MIB];
    GcSample {
        collector_id,
        heap_size: totals.iter().sum(),
        heap_free: totals.iter().sum::<u64>() - nursery_used - tenured_used,
        pool_frees: vec![totals[0] - nursery_used, totals[1] - tenured_used],
        pool_totals: totals,
        pool_maxes: vec![128 * MIB, 512 * MIB],
        non_heap: vec![SegmentUsage { used: tick * 1024, committed: 4 * MIB }; 4],
        action: if collector_id == 2 { "end of major GC".into() } else { "end of minor GC".into() },
        cause: "allocation failure".into(),
    }
}

fn load_config() -> anyhow::Result<TelemetryConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("VMTELEMETRY_CONFIG").ok());
    match path {
        Some(path) => TelemetryConfig::load(&path).with_context(|| format!("loading config from {path}")),
        None => Ok(TelemetryConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("vmtelemetry demo host booting...");

    let config = load_config()?;
    let registry = Arc::new(HookRegistry::new());
    let platform = Arc::new(SimulatedPlatform::default());
    platform.cpus.store(4, Ordering::SeqCst);
    platform.memory.store(8 * 1024 * MIB, Ordering::SeqCst);
    let sink = Arc::new(JsonLogSink);

    let management = Management::init(
        &config,
        Host {
            layout: demo_layout(),
            events: registry.clone(),
            sink: sink.clone(),
            platform: Some(PlatformHooks { probe: platform.clone(), sink }),
            clock: Arc::new(SystemClock::new()),
        },
    )
    .context("management init failed")?;
    management.set_usage_threshold(2, 200 * MIB);
    management.set_collection_usage_threshold(2, 300 * MIB);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        ctrl_c.cancel();
    });

    let mut cadence = tokio::time::interval(Duration::from_millis(CADENCE_MS));
    cadence.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!("demo host active. Press Ctrl+C to stop.");
    for tick in 0..DEMO_TICKS {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = cadence.tick() => {}
        }

        registry.fire(&LifecycleEvent::ClassLoad);
        if tick % 3 == 0 {
            registry.fire(&LifecycleEvent::ThreadCreated { daemon: tick % 2 == 0 });
            registry.fire(&LifecycleEvent::CompileStart);
        }
        if tick % 3 == 1 {
            registry.fire(&LifecycleEvent::CompileEnd);
            registry.fire(&LifecycleEvent::ThreadDestroyed { daemon: tick % 2 == 0 });
        }
        if tick % 5 == 0 {
            let collector = if tick % 20 == 0 { 2 } else { 1 };
            let (start, end) = if collector == 2 {
                (LifecycleEvent::GlobalGcStart(gc_sample(2, tick, false)), LifecycleEvent::GlobalGcEnd(gc_sample(2, tick, true)))
            } else {
                (LifecycleEvent::LocalGcStart(gc_sample(1, tick, false)), LifecycleEvent::LocalGcEnd(gc_sample(1, tick, true)))
            };
            registry.fire(&start);
            registry.fire(&end);
            if collector == 2 {
                registry.fire(&LifecycleEvent::CompactEnd);
            }
        }
        if tick % 50 == 49 {
            platform.cpus.fetch_add(1, Ordering::SeqCst);
            registry.fire(&LifecycleEvent::PlatformReconfigured);
        }
    }

    let snapshot = management.snapshot();
    info!("final snapshot {}", serde_json::to_string_pretty(&snapshot)?);
    let report = management.shutdown();
    info!(?report, "demo host stopped");
    Ok(())
}
