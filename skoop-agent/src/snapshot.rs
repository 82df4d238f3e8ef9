//! Lock-free publication of the full entity list
//!
//! Every refresh cycle replaces the list wholesale with one atomic store, so
//! readers see either the previous complete list or the next one.

use crate::entity::Entity;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Ordered, immutable list of entities from one cycle, anchor first
pub type EntityList = Arc<Vec<Arc<Entity>>>;

/// Holds the current entity list behind an atomically swapped reference
#[derive(Clone)]
pub struct SnapshotPublisher {
    current: Arc<ArcSwap<Vec<Arc<Entity>>>>,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(Vec::new())),
        }
    }

    /// Replace the published list
    pub fn publish(&self, entities: Vec<Arc<Entity>>) {
        self.current.store(Arc::new(entities));
    }

    /// The list published by the most recent completed cycle
    pub fn current(&self) -> EntityList {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        Self::new()
    }
}
