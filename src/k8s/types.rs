use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub node_name: Option<String>,
    pub pod_ip: Option<String>,
    pub phase: String,
    pub qos_class: Option<String>,
    pub host_network: bool,
    pub labels: BTreeMap<String, String>,
}

impl PodInfo {
    pub fn from_k8s_pod(pod: &k8s_openapi::api::core::v1::Pod) -> Self {
        let metadata = &pod.metadata;
        let spec = pod.spec.as_ref();
        let status = pod.status.as_ref();

        Self {
            name: metadata.name.clone().unwrap_or_default(),
            namespace: metadata.namespace.clone().unwrap_or_default(),
            uid: metadata.uid.clone().unwrap_or_default(),
            node_name: spec.and_then(|s| s.node_name.clone()),
            pod_ip: status.and_then(|s| s.pod_ip.clone()),
            phase: status
                .and_then(|s| s.phase.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            qos_class: status.and_then(|s| s.qos_class.clone()),
            host_network: spec.and_then(|s| s.host_network).unwrap_or(false),
            labels: metadata.labels.clone().unwrap_or_default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == "Running"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Pod, PodSpec, PodStatus};
    use kube::api::ObjectMeta;

    #[test]
    fn test_from_k8s_pod() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("nginx".to_string()),
                namespace: Some("web".to_string()),
                uid: Some("1b4e28ba-2fa1-11d2-883f-0016d3cca427".to_string()),
                labels: Some(BTreeMap::from([("app".to_string(), "nginx".to_string())])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("worker-1".to_string()),
                host_network: Some(true),
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                pod_ip: Some("10.0.0.7".to_string()),
                qos_class: Some("Burstable".to_string()),
                ..Default::default()
            }),
        };

        let info = PodInfo::from_k8s_pod(&pod);
        assert_eq!(info.name, "nginx");
        assert_eq!(info.namespace, "web");
        assert_eq!(info.node_name.as_deref(), Some("worker-1"));
        assert_eq!(info.qos_class.as_deref(), Some("Burstable"));
        assert!(info.host_network);
        assert!(info.is_running());
        assert_eq!(info.labels.get("app").map(String::as_str), Some("nginx"));
    }

    #[test]
    fn test_missing_status_is_unknown() {
        let info = PodInfo::from_k8s_pod(&Pod::default());
        assert_eq!(info.phase, "Unknown");
        assert!(!info.is_running());
        assert!(!info.host_network);
    }
}
