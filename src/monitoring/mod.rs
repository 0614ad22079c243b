mod metrics;
mod service;

pub use metrics::MetricsCollector;
pub use service::MonitoringService;
