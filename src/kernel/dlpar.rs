//! Platform resource reconfiguration (DLPAR) pipeline.
//!
//! Same queue/dispatcher/shutdown shape as the heap pipeline, with its own
//! monitor so the two never contend.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::error::{DeliveryError, ProbeError};
use crate::kernel::notify::{DispatchExit, Dispatcher, NotificationQueue, ResourceChangeSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResourceKind {
    CpusChanged,
    CapacityChanged,
    MemoryChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceChange {
    pub kind: ResourceKind,
    pub value: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlatformResources {
    pub cpus: u32,
    pub processing_capacity: u32,
    pub physical_memory: u64,
}

impl PlatformResources {
    /// Counters that differ from `previous`, in CPU, capacity, memory order.
    pub fn changes_since(&self, previous: &PlatformResources) -> Vec<ResourceChange> {
        let mut changes = Vec::with_capacity(3);
        if self.cpus != previous.cpus {
            changes.push(ResourceChange {
                kind: ResourceKind::CpusChanged,
                value: u64::from(self.cpus),
            });
        }
        if self.processing_capacity != previous.processing_capacity {
            changes.push(ResourceChange {
                kind: ResourceKind::CapacityChanged,
                value: u64::from(self.processing_capacity),
            });
        }
        if self.physical_memory != previous.physical_memory {
            changes.push(ResourceChange {
                kind: ResourceKind::MemoryChanged,
                value: self.physical_memory,
            });
        }
        changes
    }
}

/// Raw OS statistics, supplied by the host.
pub trait PlatformProbe: Send + Sync {
    fn sample(&self) -> Result<PlatformResources, ProbeError>;
}

pub struct PlatformHooks {
    pub probe: Arc<dyn PlatformProbe>,
    pub sink: Arc<dyn ResourceChangeSink>,
}

struct Active {
    queue: Arc<NotificationQueue<ResourceChange>>,
    probe: Arc<dyn PlatformProbe>,
    dispatcher: Mutex<Option<Dispatcher>>,
}

pub struct DlparPipeline {
    active: Option<Active>,
    current: Mutex<PlatformResources>,
}

impl DlparPipeline {
    /// A pipeline whose triggers are all no-ops.
    pub fn disabled() -> Self {
        Self {
            active: None,
            current: Mutex::new(PlatformResources::default()),
        }
    }

    /// Starts the pipeline, or returns a disabled one when DLPAR is turned
    /// off, no platform hooks were supplied, the first probe sample fails or
    /// the dispatcher thread cannot be started.
    pub fn start(config: &TelemetryConfig, platform: Option<PlatformHooks>) -> Self {
        if !config.dlpar.enabled {
            info!("dlpar notifications disabled by configuration");
            return Self::disabled();
        }
        let Some(hooks) = platform else {
            info!("no platform probe supplied, dlpar notifications disabled");
            return Self::disabled();
        };
        let baseline = match hooks.probe.sample() {
            Ok(sample) => sample,
            Err(err) => {
                warn!(%err, "dlpar pipeline disabled");
                return Self::disabled();
            }
        };

        let queue = Arc::new(NotificationQueue::new("dlpar", config.dlpar.queue_capacity));
        let sink = hooks.sink;
        let dispatcher = Dispatcher::spawn(
            &config.thread_names.dlpar,
            Arc::clone(&queue),
            move |sequence, change: ResourceChange| -> Result<(), DeliveryError> {
                sink.deliver_resource_change(change.kind, change.value, sequence)
            },
        );
        let dispatcher = match dispatcher {
            Ok(dispatcher) => dispatcher,
            Err(err) => {
                warn!(%err, "dlpar dispatcher failed to start, pipeline disabled");
                return Self::disabled();
            }
        };

        Self {
            active: Some(Active {
                queue,
                probe: hooks.probe,
                dispatcher: Mutex::new(Some(dispatcher)),
            }),
            current: Mutex::new(baseline),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.active.is_some()
    }

    pub fn queue(&self) -> Option<&Arc<NotificationQueue<ResourceChange>>> {
        self.active.as_ref().map(|a| &a.queue)
    }

    /// Last sampled counters.
    pub fn resources(&self) -> PlatformResources {
        *self.current.lock()
    }

    /// Samples the platform and enqueues one notification per changed
    /// counter. Returns the number queued.
    pub fn on_reconfigured(&self) -> usize {
        let Some(active) = &self.active else {
            return 0;
        };
        let sample = match active.probe.sample() {
            Ok(sample) => sample,
            Err(err) => {
                debug!(%err, "platform sample failed, reconfiguration ignored");
                return 0;
            }
        };

        // Held across the enqueues so concurrent triggers stay ordered.
        let mut current = self.current.lock();
        let changes = sample.changes_since(&current);
        *current = sample;

        let mut queued = 0;
        for change in changes {
            match active.queue.enqueue(change) {
                Ok(_) => queued += 1,
                Err(reason) => debug!(?change, %reason, "resource change notification dropped"),
            }
        }
        queued
    }

    /// Installs the shutdown sentinel and waits for the dispatcher to exit.
    pub fn shutdown(&self) -> Option<DispatchExit> {
        let active = self.active.as_ref()?;
        active.queue.shutdown();
        let mut dispatcher = active.dispatcher.lock().take()?;
        dispatcher.join()
    }
}

impl Drop for DlparPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
