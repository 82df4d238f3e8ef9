//! Network namespace and interface address helpers

use anyhow::{anyhow, Context, Result};
use log::debug;
use std::fs;
use std::net::IpAddr;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// Resolve the network namespace inode of a process.
///
/// `/proc/<pid>/ns/net` is a magic link reading `net:[<inode>]`; when the
/// target is not in that form the inode of the link target is used.
pub fn namespace_inode(proc_root: &Path, pid: u32) -> Result<u64> {
    let ns_path = proc_root.join(pid.to_string()).join("ns/net");

    if let Ok(target) = fs::read_link(&ns_path) {
        if let Some(inode) = parse_ns_link(&target.to_string_lossy()) {
            return Ok(inode);
        }
    }

    let metadata = fs::metadata(&ns_path)
        .with_context(|| format!("Failed to stat {}", ns_path.display()))?;
    Ok(metadata.ino())
}

/// Parse `net:[4026531840]`
fn parse_ns_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("net:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Global-unicast addresses of every local interface, in discovery order
pub fn host_link_addresses() -> Result<Vec<IpAddr>> {
    let addrs =
        nix::ifaddrs::getifaddrs().map_err(|e| anyhow!("failed get host link list: {}", e))?;

    let mut ips = Vec::new();
    for ifaddr in addrs {
        let Some(address) = ifaddr.address else {
            continue;
        };
        let ip = if let Some(v4) = address.as_sockaddr_in() {
            IpAddr::V4(v4.ip())
        } else if let Some(v6) = address.as_sockaddr_in6() {
            IpAddr::V6(v6.ip())
        } else {
            continue;
        };

        if !is_global_unicast(&ip) {
            debug!("Skipping {} on {}", ip, ifaddr.interface_name);
            continue;
        }
        if !ips.contains(&ip) {
            ips.push(ip);
        }
    }
    Ok(ips)
}

/// True for unicast addresses outside loopback, link-local, multicast,
/// unspecified and limited broadcast. Private ranges count as global.
pub fn is_global_unicast(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_unspecified()
                || v4.is_loopback()
                || v4.is_multicast()
                || v4.is_link_local()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            !(v6.is_unspecified()
                || v6.is_loopback()
                || v6.is_multicast()
                || (v6.segments()[0] & 0xffc0) == 0xfe80)
        }
    }
}
