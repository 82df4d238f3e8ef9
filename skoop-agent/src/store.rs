//! Entity store indexed by netns inode, IP address and PID
//!
//! Each index is its own concurrent map, so probes doing point lookups never
//! wait on a refresh cycle writing other keys. Non-pinned entries carry a
//! deadline and silently age out when a workload stops being observed;
//! nothing deletes them explicitly.

use crate::entity::Entity;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Whether an entity is written under its namespace inode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceIndexing {
    Always,
    /// Host-network entities are indexed by IP and PID only, so they can
    /// never take the anchor's namespace slot
    SkipHostNetwork,
}

/// Expiry policy for the keys written by one `put`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    Pinned,
    Expiring,
}

#[derive(Clone)]
struct Slot {
    entity: Arc<Entity>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_pinned(&self) -> bool {
        self.expires_at.is_none()
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

/// Number of live-or-expired keys held by each index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSizes {
    pub netns: usize,
    pub ip: usize,
    pub pid: usize,
}

struct Indices {
    by_netns: DashMap<u64, Slot>,
    by_ip: DashMap<IpAddr, Slot>,
    by_pid: DashMap<u32, Slot>,
}

/// Thread-safe three-index entity cache
#[derive(Clone)]
pub struct EntityStore {
    inner: Arc<Indices>,
    ttl: Duration,
}

impl EntityStore {
    /// Create an empty store whose expiring entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Indices {
                by_netns: DashMap::new(),
                by_ip: DashMap::new(),
                by_pid: DashMap::new(),
            }),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or refresh an entity under its namespace inode, every IP of
    /// its namespace and every member PID.
    ///
    /// Every write resets the key's deadline. A pinned key is never
    /// displaced by an expiring write.
    pub fn put(&self, entity: &Arc<Entity>, indexing: NamespaceIndexing, lifetime: Lifetime) {
        let slot = Slot {
            entity: Arc::clone(entity),
            expires_at: match lifetime {
                Lifetime::Pinned => None,
                Lifetime::Expiring => Some(Instant::now() + self.ttl),
            },
        };

        let skip_netns =
            indexing == NamespaceIndexing::SkipHostNetwork && entity.is_host_network();
        if !skip_netns {
            upsert(&self.inner.by_netns, entity.netns(), &slot);
        }
        for ip in entity.ip_list() {
            upsert(&self.inner.by_ip, *ip, &slot);
        }
        for pid in entity.pids() {
            upsert(&self.inner.by_pid, *pid, &slot);
        }

        debug!(
            "Indexed {} (netns={}, ips={}, pids={}, netns_indexed={})",
            entity,
            entity.netns(),
            entity.ip_list().len(),
            entity.pids().len(),
            !skip_netns
        );
    }

    /// Look up the entity owning a network namespace inode
    pub fn lookup_by_namespace(&self, inum: u64) -> Option<Arc<Entity>> {
        lookup(&self.inner.by_netns, &inum)
    }

    /// Look up the entity owning an IP address
    pub fn lookup_by_ip(&self, ip: IpAddr) -> Option<Arc<Entity>> {
        lookup(&self.inner.by_ip, &ip)
    }

    /// Look up the entity a process belongs to
    pub fn lookup_by_pid(&self, pid: u32) -> Option<Arc<Entity>> {
        lookup(&self.inner.by_pid, &pid)
    }

    /// Drop every expired key from all indices, returning how many went away
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        purge(&self.inner.by_netns, now)
            + purge(&self.inner.by_ip, now)
            + purge(&self.inner.by_pid, now)
    }

    pub fn index_sizes(&self) -> IndexSizes {
        IndexSizes {
            netns: self.inner.by_netns.len(),
            ip: self.inner.by_ip.len(),
            pid: self.inner.by_pid.len(),
        }
    }
}

fn upsert<K: Eq + Hash>(map: &DashMap<K, Slot>, key: K, slot: &Slot) {
    match map.entry(key) {
        Entry::Occupied(mut occupied) => {
            if occupied.get().is_pinned() && !slot.is_pinned() {
                return;
            }
            occupied.insert(slot.clone());
        }
        Entry::Vacant(vacant) => {
            vacant.insert(slot.clone());
        }
    }
}

fn lookup<K: Eq + Hash>(map: &DashMap<K, Slot>, key: &K) -> Option<Arc<Entity>> {
    let now = Instant::now();
    let slot = map.get(key)?;
    if slot.is_live(now) {
        return Some(Arc::clone(&slot.entity));
    }
    drop(slot);
    map.remove_if(key, |_, slot| !slot.is_live(now));
    None
}

fn purge<K: Eq + Hash>(map: &DashMap<K, Slot>, now: Instant) -> usize {
    let before = map.len();
    map.retain(|_, slot| slot.is_live(now));
    before - map.len()
}
