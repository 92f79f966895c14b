//! Metrics for the property pipeline, organized by phase.
//!
//! Each phase owns a struct in [`phases`] with static recording helpers, and
//! registers its metric names up front so they appear in the exporter even
//! before first use.

pub mod phases;

pub use phases::{DiscoveryMetrics, OrchestratorMetrics, ProcessingMetrics, ScraperMetrics};

use std::sync::Once;
use tracing::{info, warn};

/// Address for the Prometheus HTTP listener. The exporter is only started when set.
pub const METRICS_ADDR_ENV: &str = "PROPERTY_METRICS_ADDR";

static INIT: Once = Once::new();

/// Install the Prometheus recorder if `PROPERTY_METRICS_ADDR` is set.
///
/// Idempotent. Without a recorder the `metrics` macros are no-ops, which is
/// what tests and one-off CLI runs get.
pub fn init_metrics() {
    INIT.call_once(|| {
        let addr_str = match std::env::var(METRICS_ADDR_ENV) {
            Ok(v) if !v.trim().is_empty() => v,
            _ => {
                info!("{} not set, metrics exporter disabled", METRICS_ADDR_ENV);
                return;
            }
        };

        let addr = match addr_str.parse::<std::net::SocketAddr>() {
            Ok(addr) => addr,
            Err(e) => {
                warn!("Invalid metrics addr '{}': {}", addr_str, e);
                return;
            }
        };

        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => {
                info!("Prometheus HTTP exporter started at http://{}/metrics", addr);
                register_all_metrics();
            }
            Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
        }
    });
}

pub fn register_all_metrics() {
    DiscoveryMetrics::register_metrics();
    ScraperMetrics::register_metrics();
    ProcessingMetrics::register_metrics();
    OrchestratorMetrics::register_metrics();
}

/// Trait for phase-specific metrics collections
pub trait PhaseMetrics {
    /// Register all metrics for this phase
    fn register_metrics();

    /// Get the phase name for prefixing metrics
    fn phase_name() -> &'static str;

    /// Get documentation for all metrics in this phase
    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Builds metric names following `property_{phase}_{name}[_total]`.
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("property_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("property_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("property_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_naming_convention() {
        assert_eq!(
            phase_metric!(counter, "discovery", "sources_validated"),
            "property_discovery_sources_validated_total"
        );
        assert_eq!(
            phase_metric!(histogram, "scraper", "attempts"),
            "property_scraper_attempts"
        );
    }

    #[test]
    fn test_registration_without_recorder() {
        register_all_metrics();
    }
}
