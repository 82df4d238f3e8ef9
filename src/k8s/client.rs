use crate::{Result, SkoopError};
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use tracing::{debug, info};

pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    pub async fn try_default() -> Result<Self> {
        debug!("Initializing Kubernetes client");

        let client = Client::try_default().await.map_err(|e| {
            SkoopError::KubernetesError(format!("Failed to create K8s client: {}", e))
        })?;

        info!("Successfully connected to Kubernetes cluster");

        Ok(Self { client })
    }

    pub fn pods_all(&self) -> Api<Pod> {
        Api::all(self.client.clone())
    }
}

pub fn node_field_selector(node_name: &str) -> String {
    format!("spec.nodeName={}", node_name)
}
