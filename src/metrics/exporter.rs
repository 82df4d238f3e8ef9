use crate::metrics::collector::CacheMetrics;
use crate::{Result, SkoopError};
use prometheus::{Encoder, TextEncoder};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Renders [`CacheMetrics`] in the Prometheus text exposition format
pub struct PrometheusExporter<'a> {
    metrics: &'a CacheMetrics,
}

impl<'a> PrometheusExporter<'a> {
    pub fn new(metrics: &'a CacheMetrics) -> Self {
        Self { metrics }
    }

    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.metrics.registry().gather(), &mut buffer)
            .map_err(|e| SkoopError::MetricsError(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| SkoopError::MetricsError(e.to_string()))
    }

    /// Replace `path` with the current metrics, for node-exporter's textfile
    /// collector. The file is written beside the target and renamed.
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let body = self.render()?;

        let mut tmp = PathBuf::from(path);
        tmp.set_extension("prom.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, path)?;

        debug!("Wrote metrics to {}", path.display());
        Ok(())
    }
}
