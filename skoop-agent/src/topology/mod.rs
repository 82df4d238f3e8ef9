//! Topology collection: one pass over every ready workload on the node
//!
//! A [`TopologySource`] is chosen once at startup (runtime-backed or
//! watch-backed) and never re-probed. The [`Collector`] serializes cycles,
//! seeds each one with the anchor, and publishes the rebuilt list only when
//! the source finishes.

mod runtime;
mod watch;

pub use runtime::RuntimeTopology;
pub use watch::WatchTopology;

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::snapshot::SnapshotPublisher;
use crate::stats::CycleStats;
use crate::store::{EntityStore, Lifetime, NamespaceIndexing};
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Entity list under construction during one cycle.
///
/// Every added entity is written to the store immediately, so store writes
/// made before an aborted cycle are kept.
pub struct CycleBuilder {
    store: EntityStore,
    anchor: Arc<Entity>,
    entities: Vec<Arc<Entity>>,
}

impl CycleBuilder {
    fn new(store: EntityStore, anchor: Arc<Entity>) -> Self {
        let entities = vec![Arc::clone(&anchor)];
        Self {
            store,
            anchor,
            entities,
        }
    }

    pub fn anchor(&self) -> &Arc<Entity> {
        &self.anchor
    }

    /// Index the entity with host-network protection and queue it for
    /// publication
    pub fn add(&mut self, entity: Entity) {
        let entity = Arc::new(entity);
        self.store
            .put(&entity, NamespaceIndexing::SkipHostNetwork, Lifetime::Expiring);
        self.entities.push(entity);
    }

    /// Entities built so far, anchor included
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn finish(self) -> Vec<Arc<Entity>> {
        self.entities
    }
}

/// Strategy enumerating the workloads of this node
#[async_trait]
pub trait TopologySource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Build an entity for every ready workload and add it to `cycle`.
    ///
    /// Per-workload failures are logged and skipped. Only failures of the
    /// enumeration itself, or cancellation, end the cycle with an error.
    async fn collect(&self, cycle: &mut CycleBuilder, cancel: &CancellationToken) -> Result<()>;
}

/// Runs refresh cycles against one source, one at a time
pub struct Collector {
    source: Box<dyn TopologySource>,
    store: EntityStore,
    publisher: SnapshotPublisher,
    anchor: Arc<Entity>,
    stats: Arc<CycleStats>,
    lock: Mutex<()>,
}

impl Collector {
    pub fn new(
        source: Box<dyn TopologySource>,
        store: EntityStore,
        publisher: SnapshotPublisher,
        anchor: Arc<Entity>,
        stats: Arc<CycleStats>,
    ) -> Self {
        Self {
            source,
            store,
            publisher,
            anchor,
            stats,
            lock: Mutex::new(()),
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Run one full cycle and publish its entity list.
    ///
    /// Returns the number of published entities, anchor included. On error
    /// the previous list stays published.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let start = Instant::now();

        let mut cycle = CycleBuilder::new(self.store.clone(), Arc::clone(&self.anchor));
        if let Err(e) = self.source.collect(&mut cycle, cancel).await {
            // Missed deadlines are counted where the deadline is enforced
            if !matches!(e, Error::CycleTimeout) {
                self.stats.record_failed();
            }
            return Err(e);
        }

        let entities = cycle.finish();
        let count = entities.len();
        self.publisher.publish(entities);
        self.stats.record_completed(start.elapsed(), count);

        debug!(
            "finished cache process via {}: {} entities",
            self.source.name(),
            count
        );
        Ok(count)
    }
}
