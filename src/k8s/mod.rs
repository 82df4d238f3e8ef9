pub mod client;
pub mod types;
pub mod watcher;

pub use client::K8sClient;
pub use types::PodInfo;
pub use watcher::{NodePods, NodeWorkloads, PodWatcher};
