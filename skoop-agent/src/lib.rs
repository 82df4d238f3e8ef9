//! Node-local workload identity cache for skoop
//!
//! Kernel-event probes see network namespace inodes, IPs and PIDs. This crate
//! keeps those resolvable to the owning pod:
//! - Bootstrap the anchor entity (host namespace, or the sidecar's own pod)
//! - Enumerate workloads from the container runtime, or from an API-server
//!   watch when no runtime is reachable
//! - Index entities by namespace inode, IP and PID with TTL expiry
//! - Publish the full entity list with an atomic swap each refresh cycle

pub mod bootstrap;
pub mod cache;
pub mod cgroup;
pub mod config;
pub mod crictl;
pub mod daemon;
pub mod entity;
pub mod error;
pub mod introspect;
pub mod netns;
pub mod runtime;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod topology;
pub mod watch;

pub use bootstrap::IdentitySource;
pub use cache::{Mode, TopologyCache, TopologyView};
pub use config::CacheConfig;
pub use entity::{Entity, NetnsIdentity, WorkloadIdentity};
pub use error::{Error, Result};
pub use introspect::{HostIntrospect, LinuxHost};
pub use stats::CycleStatsSnapshot;
pub use store::IndexSizes;
pub use topology::{RuntimeTopology, TopologySource, WatchTopology};
pub use watch::{LocalWorkload, WorkloadWatch};
