use std::collections::HashMap;

use crate::kernel::event::{CollectorId, PoolId, RuntimeLayout};

#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub name: String,
    pub initial_size: u64,
}

/// Immutable names and initial sizes captured at init.
///
/// The heap dispatcher resolves pool and collector names here at delivery
/// time, without touching the aggregator lock.
#[derive(Debug, Clone, Default)]
pub struct PoolDirectory {
    pools: HashMap<PoolId, PoolEntry>,
    collectors: HashMap<CollectorId, String>,
}

impl PoolDirectory {
    pub fn from_layout(layout: &RuntimeLayout) -> Self {
        let mut pools = HashMap::new();
        for p in &layout.heap_pools {
            pools.insert(
                p.id,
                PoolEntry {
                    name: p.name.clone(),
                    initial_size: p.initial_size,
                },
            );
        }
        for p in &layout.non_heap_pools {
            pools.insert(
                p.id,
                PoolEntry {
                    name: p.kind.display_name().to_string(),
                    initial_size: p.initial.committed,
                },
            );
        }
        let collectors = layout
            .collectors
            .iter()
            .map(|c| (c.id, c.name.clone()))
            .collect();
        Self { pools, collectors }
    }

    pub fn pool(&self, id: PoolId) -> Option<&PoolEntry> {
        self.pools.get(&id)
    }

    pub fn collector_name(&self, id: CollectorId) -> Option<&str> {
        self.collectors.get(&id).map(String::as_str)
    }
}
