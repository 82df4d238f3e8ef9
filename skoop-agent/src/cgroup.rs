//! cgroup path resolution and process enumeration for pod cgroups
//!
//! Runtimes report a pod's cgroup parent either as a systemd slice name
//! (`kubepods-burstable-pod<uid>.slice`) or as a cgroupfs path
//! (`/kubepods/burstable/pod<uid>`). Both are mapped onto the mounted
//! hierarchy, trying the unified (v2) layout before the v1 controllers.
//!
//! Supported layouts:
//! - cgroup v2: /sys/fs/cgroup/{path}
//! - cgroup v1: /sys/fs/cgroup/{pids,cpu\,cpuacct,memory}/{path}

use log::debug;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// cgroup mount point
const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// v1 controllers probed when the unified hierarchy does not hold the path
const V1_CONTROLLERS: [&str; 3] = ["pids", "cpu,cpuacct", "memory"];

/// Quality of Service classes in Kubernetes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosClass {
    Guaranteed,
    Burstable,
    BestEffort,
}

impl QosClass {
    /// Parse the `status.qosClass` value of a pod
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Guaranteed" => Some(Self::Guaranteed),
            "Burstable" => Some(Self::Burstable),
            "BestEffort" => Some(Self::BestEffort),
            _ => None,
        }
    }

    fn slice_segment(&self) -> Option<&'static str> {
        match self {
            Self::Guaranteed => None,
            Self::Burstable => Some("burstable"),
            Self::BestEffort => Some("besteffort"),
        }
    }
}

/// Maps runtime-reported cgroup paths onto the mounted cgroup hierarchy
#[derive(Debug, Clone)]
pub struct CgroupResolver {
    cgroup_root: PathBuf,
}

impl CgroupResolver {
    /// Create a resolver rooted at the default cgroup mount
    pub fn new() -> Self {
        Self {
            cgroup_root: PathBuf::from(CGROUP_ROOT),
        }
    }

    /// Create a resolver with a custom cgroup root (for testing)
    pub fn with_root(cgroup_root: PathBuf) -> Self {
        Self { cgroup_root }
    }

    /// Find the directory backing a runtime-reported cgroup path
    pub fn locate(&self, cgroup_path: &str) -> Option<PathBuf> {
        let relative = expand_cgroup_path(cgroup_path);
        if relative.as_os_str().is_empty() {
            return None;
        }

        let unified = self.cgroup_root.join(&relative);
        if unified.is_dir() {
            return Some(unified);
        }

        V1_CONTROLLERS
            .iter()
            .map(|controller| self.cgroup_root.join(controller).join(&relative))
            .find(|candidate| candidate.is_dir())
    }

    /// Resolve the cgroup of a pod from its UID and QoS class.
    ///
    /// Returns the path in the form a runtime would report it, so the result
    /// can be fed back into [`CgroupResolver::pids_under`].
    pub fn locate_pod(&self, pod_uid: &str, qos: QosClass) -> Option<String> {
        pod_cgroup_candidates(pod_uid, qos).into_iter().find(|candidate| {
            let found = self.locate(candidate).is_some();
            debug!("Trying pod cgroup {}: found={}", candidate, found);
            found
        })
    }

    /// Every PID in the cgroup and its descendants, sorted and de-duplicated
    pub fn pids_under(&self, cgroup_path: &str) -> Vec<u32> {
        let Some(dir) = self.locate(cgroup_path) else {
            debug!("cgroup {} not found under {}", cgroup_path, self.cgroup_root.display());
            return Vec::new();
        };

        let mut pids = BTreeSet::new();
        collect_pids(&dir, &mut pids);
        pids.into_iter().collect()
    }
}

impl Default for CgroupResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand a systemd slice name into its hierarchical path.
///
/// `kubepods-burstable-pod1.slice` lives at
/// `kubepods.slice/kubepods-burstable.slice/kubepods-burstable-pod1.slice`.
/// Anything else is taken as a path relative to the cgroup root.
pub fn expand_cgroup_path(cgroup_path: &str) -> PathBuf {
    let trimmed = cgroup_path.trim().trim_start_matches('/');

    let Some(unit) = trimmed.strip_suffix(".slice") else {
        return PathBuf::from(trimmed);
    };
    if unit.contains('/') || unit.is_empty() {
        return PathBuf::from(trimmed);
    }

    let mut path = PathBuf::new();
    let mut prefix = String::new();
    for part in unit.split('-') {
        if !prefix.is_empty() {
            prefix.push('-');
        }
        prefix.push_str(part);
        path.push(format!("{}.slice", prefix));
    }
    path
}

/// Candidate pod cgroup paths for the systemd and cgroupfs drivers
fn pod_cgroup_candidates(pod_uid: &str, qos: QosClass) -> [String; 2] {
    // systemd escapes dashes in unit names
    let escaped_uid = pod_uid.replace('-', "_");

    let systemd = match qos.slice_segment() {
        Some(class) => format!("kubepods-{}-pod{}.slice", class, escaped_uid),
        None => format!("kubepods-pod{}.slice", escaped_uid),
    };
    let cgroupfs = match qos.slice_segment() {
        Some(class) => format!("/kubepods/{}/pod{}", class, pod_uid),
        None => format!("/kubepods/pod{}", pod_uid),
    };

    [systemd, cgroupfs]
}

fn collect_pids(dir: &Path, pids: &mut BTreeSet<u32>) {
    if let Ok(contents) = fs::read_to_string(dir.join("cgroup.procs")) {
        pids.extend(
            contents
                .lines()
                .filter_map(|line| line.trim().parse::<u32>().ok()),
        );
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Failed to read cgroup directory {}: {}", dir.display(), e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_pids(&path, pids);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_procs(dir: &Path, pids: &[u32]) {
        fs::create_dir_all(dir).unwrap();
        let body: String = pids.iter().map(|p| format!("{}\n", p)).collect();
        fs::write(dir.join("cgroup.procs"), body).unwrap();
    }

    #[test]
    fn test_expand_systemd_slice() {
        assert_eq!(
            expand_cgroup_path("kubepods-burstable-pod12345_6789.slice"),
            PathBuf::from(
                "kubepods.slice/kubepods-burstable.slice/kubepods-burstable-pod12345_6789.slice"
            )
        );
        assert_eq!(
            expand_cgroup_path("kubepods-pod1.slice"),
            PathBuf::from("kubepods.slice/kubepods-pod1.slice")
        );
    }

    #[test]
    fn test_expand_cgroupfs_path() {
        assert_eq!(
            expand_cgroup_path("/kubepods/besteffort/podabc"),
            PathBuf::from("kubepods/besteffort/podabc")
        );
        assert_eq!(
            expand_cgroup_path("/kubepods.slice/kubepods-pod1.slice"),
            PathBuf::from("kubepods.slice/kubepods-pod1.slice")
        );
    }

    #[test]
    fn test_pids_under_walks_children() {
        let root = tempfile::tempdir().unwrap();
        let pod = root
            .path()
            .join("kubepods.slice/kubepods-besteffort.slice/kubepods-besteffort-poda_b.slice");
        write_procs(&pod, &[]);
        write_procs(&pod.join("cri-containerd-1.scope"), &[300, 100]);
        write_procs(&pod.join("cri-containerd-2.scope"), &[200, 100]);

        let resolver = CgroupResolver::with_root(root.path().to_path_buf());
        assert_eq!(
            resolver.pids_under("kubepods-besteffort-poda_b.slice"),
            vec![100, 200, 300]
        );
    }

    #[test]
    fn test_pids_under_falls_back_to_v1_controller() {
        let root = tempfile::tempdir().unwrap();
        write_procs(&root.path().join("pids/kubepods/burstable/podx"), &[7]);

        let resolver = CgroupResolver::with_root(root.path().to_path_buf());
        assert_eq!(resolver.pids_under("/kubepods/burstable/podx"), vec![7]);
    }

    #[test]
    fn test_pids_under_missing_cgroup_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let resolver = CgroupResolver::with_root(root.path().to_path_buf());
        assert!(resolver.pids_under("kubepods-pod404.slice").is_empty());
        assert!(resolver.pids_under("").is_empty());
    }

    #[test]
    fn test_locate_pod_with_qos() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join(
            "kubepods.slice/kubepods-burstable.slice/kubepods-burstable-pod12345_6789.slice",
        ))
        .unwrap();
        fs::create_dir_all(root.path().join("kubepods/podguaranteed-1")).unwrap();

        let resolver = CgroupResolver::with_root(root.path().to_path_buf());
        assert_eq!(
            resolver.locate_pod("12345-6789", QosClass::Burstable),
            Some("kubepods-burstable-pod12345_6789.slice".to_string())
        );
        assert_eq!(
            resolver.locate_pod("guaranteed-1", QosClass::Guaranteed),
            Some("/kubepods/podguaranteed-1".to_string())
        );
        assert_eq!(resolver.locate_pod("missing", QosClass::BestEffort), None);
    }
}
