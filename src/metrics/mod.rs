pub mod collector;
pub mod exporter;

pub use collector::CacheMetrics;
pub use exporter::PrometheusExporter;
