use thiserror::Error;

/// Errors raised by the workload identity cache.
///
/// Startup failures (`HostNamespace`, `HostAddresses`, `PodIdentity`) abort
/// [`crate::TopologyCache::start`]. `ListSandboxes` aborts only the current
/// refresh cycle. Per-sandbox variants are logged by the
/// collector and the sandbox is skipped.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed get host netns inode: {0}")]
    HostNamespace(String),

    #[error("failed get host link addresses: {0}")]
    HostAddresses(String),

    #[error("failed get current pod info: {0}")]
    PodIdentity(String),

    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("failed list pod sandboxes: {0}")]
    ListSandboxes(String),

    #[error("invalid sandbox who has no metadata, id {id}")]
    MissingMetadata { id: String },

    #[error("sandbox {id}: failed get status: {reason}")]
    SandboxStatus { id: String, reason: String },

    #[error("failed get sandbox info: {0}")]
    SandboxInfo(String),

    #[error("runtime {0} does not expose sandbox info in a known format")]
    UnsupportedRuntime(String),

    #[error("sandbox {0}: invalid sandbox status, no ip")]
    NoNetwork(String),

    #[error("failed get netns for pid {pid}: {reason}")]
    Namespace { pid: u32, reason: String },

    #[error("timeout process pods")]
    CycleTimeout,

    #[error("refresh cycle aborted: {0}")]
    CycleAborted(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let err = Error::Namespace {
            pid: 42,
            reason: "No such file or directory".to_string(),
        };
        assert!(err.to_string().contains("42"));

        let err = Error::NoNetwork("default/nginx".to_string());
        assert_eq!(
            err.to_string(),
            "sandbox default/nginx: invalid sandbox status, no ip"
        );
    }
}
