use super::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct DiscoveryMetrics;

impl DiscoveryMetrics {
    pub fn record_candidate_check(validated: bool) {
        if validated {
            ::metrics::counter!(phase_metric!(counter, "discovery", "sources_validated"))
                .increment(1);
        } else {
            ::metrics::counter!(phase_metric!(counter, "discovery", "candidates_rejected"))
                .increment(1);
        }
    }

    pub fn record_check_error() {
        ::metrics::counter!(phase_metric!(counter, "discovery", "check_errors")).increment(1);
    }

    pub fn record_batch(duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "discovery", "batches")).increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "discovery", "batch_duration_seconds"))
            .record(duration_secs);
    }
}

impl PhaseMetrics for DiscoveryMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "discovery", "sources_validated"));
        let _ = ::metrics::counter!(phase_metric!(counter, "discovery", "candidates_rejected"));
        let _ = ::metrics::counter!(phase_metric!(counter, "discovery", "check_errors"));
        let _ = ::metrics::counter!(phase_metric!(counter, "discovery", "batches"));
        let _ =
            ::metrics::histogram!(phase_metric!(histogram, "discovery", "batch_duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "discovery"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "discovery", "sources_validated"),
                metric_type: MetricType::Counter,
                help: "Candidate URLs accepted as property data sources",
            },
            MetricDoc {
                name: phase_metric!(counter, "discovery", "candidates_rejected"),
                metric_type: MetricType::Counter,
                help: "Candidate URLs that were reachable but lacked property signals",
            },
            MetricDoc {
                name: phase_metric!(counter, "discovery", "check_errors"),
                metric_type: MetricType::Counter,
                help: "Candidate URL checks that failed outright",
            },
            MetricDoc {
                name: phase_metric!(counter, "discovery", "batches"),
                metric_type: MetricType::Counter,
                help: "Discovery batches completed",
            },
            MetricDoc {
                name: phase_metric!(histogram, "discovery", "batch_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall time per discovery batch",
            },
        ]
    }
}

pub struct ScraperMetrics;

impl ScraperMetrics {
    pub fn record_success(attempts: u32, raw: usize, normalized: usize) {
        ::metrics::counter!(phase_metric!(counter, "scraper", "sources_success")).increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "scraper", "attempts"))
            .record(attempts as f64);
        ::metrics::counter!(phase_metric!(counter, "scraper", "candidates_raw"))
            .increment(raw as u64);
        ::metrics::counter!(phase_metric!(counter, "scraper", "candidates_normalized"))
            .increment(normalized as u64);
    }

    pub fn record_exhausted(attempts: u32) {
        ::metrics::counter!(phase_metric!(counter, "scraper", "sources_exhausted")).increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "scraper", "attempts"))
            .record(attempts as f64);
    }
}

impl PhaseMetrics for ScraperMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "scraper", "sources_success"));
        let _ = ::metrics::counter!(phase_metric!(counter, "scraper", "sources_exhausted"));
        let _ = ::metrics::counter!(phase_metric!(counter, "scraper", "candidates_raw"));
        let _ = ::metrics::counter!(phase_metric!(counter, "scraper", "candidates_normalized"));
        let _ = ::metrics::histogram!(phase_metric!(histogram, "scraper", "attempts"));
    }

    fn phase_name() -> &'static str {
        "scraper"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "scraper", "sources_success"),
                metric_type: MetricType::Counter,
                help: "Sources scraped successfully",
            },
            MetricDoc {
                name: phase_metric!(counter, "scraper", "sources_exhausted"),
                metric_type: MetricType::Counter,
                help: "Sources that failed every retry attempt",
            },
            MetricDoc {
                name: phase_metric!(counter, "scraper", "candidates_raw"),
                metric_type: MetricType::Counter,
                help: "Raw candidates classified from fetched content",
            },
            MetricDoc {
                name: phase_metric!(counter, "scraper", "candidates_normalized"),
                metric_type: MetricType::Counter,
                help: "Candidates that survived normalization",
            },
            MetricDoc {
                name: phase_metric!(histogram, "scraper", "attempts"),
                metric_type: MetricType::Histogram,
                help: "Attempts used per source",
            },
        ]
    }
}

pub struct ProcessingMetrics;

impl ProcessingMetrics {
    pub fn record_batch(processed: usize, valid: usize, duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "processing", "records"))
            .increment(processed as u64);
        ::metrics::counter!(phase_metric!(counter, "processing", "records_valid"))
            .increment(valid as u64);
        ::metrics::histogram!(phase_metric!(histogram, "processing", "batch_duration_seconds"))
            .record(duration_secs);
    }

    pub fn record_geocode(success: bool) {
        if success {
            ::metrics::counter!(phase_metric!(counter, "processing", "geocode_success"))
                .increment(1);
        } else {
            ::metrics::counter!(phase_metric!(counter, "processing", "geocode_failed"))
                .increment(1);
        }
    }

    pub fn record_enrichment_gap(missing: usize) {
        ::metrics::counter!(phase_metric!(counter, "processing", "enrichment_lookups_missing"))
            .increment(missing as u64);
    }

    pub fn record_stage_error() {
        ::metrics::counter!(phase_metric!(counter, "processing", "stage_errors")).increment(1);
    }
}

impl PhaseMetrics for ProcessingMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "processing", "records"));
        let _ = ::metrics::counter!(phase_metric!(counter, "processing", "records_valid"));
        let _ = ::metrics::counter!(phase_metric!(counter, "processing", "geocode_success"));
        let _ = ::metrics::counter!(phase_metric!(counter, "processing", "geocode_failed"));
        let _ = ::metrics::counter!(phase_metric!(
            counter,
            "processing",
            "enrichment_lookups_missing"
        ));
        let _ = ::metrics::counter!(phase_metric!(counter, "processing", "stage_errors"));
        let _ = ::metrics::histogram!(phase_metric!(
            histogram,
            "processing",
            "batch_duration_seconds"
        ));
    }

    fn phase_name() -> &'static str {
        "processing"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "processing", "records"),
                metric_type: MetricType::Counter,
                help: "Records that completed the processing stages",
            },
            MetricDoc {
                name: phase_metric!(counter, "processing", "records_valid"),
                metric_type: MetricType::Counter,
                help: "Processed records passing validation",
            },
            MetricDoc {
                name: phase_metric!(counter, "processing", "geocode_success"),
                metric_type: MetricType::Counter,
                help: "Addresses geocoded",
            },
            MetricDoc {
                name: phase_metric!(counter, "processing", "geocode_failed"),
                metric_type: MetricType::Counter,
                help: "Addresses left ungeocoded after an error or miss",
            },
            MetricDoc {
                name: phase_metric!(counter, "processing", "enrichment_lookups_missing"),
                metric_type: MetricType::Counter,
                help: "Federal reference lookups that returned nothing",
            },
            MetricDoc {
                name: phase_metric!(counter, "processing", "stage_errors"),
                metric_type: MetricType::Counter,
                help: "Stage-level failures caught at batch granularity",
            },
            MetricDoc {
                name: phase_metric!(histogram, "processing", "batch_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall time per processing batch",
            },
        ]
    }
}

pub struct OrchestratorMetrics;

impl OrchestratorMetrics {
    pub fn record_run(success: bool, duration_secs: f64) {
        if success {
            ::metrics::counter!(phase_metric!(counter, "orchestrator", "runs_success"))
                .increment(1);
        } else {
            ::metrics::counter!(phase_metric!(counter, "orchestrator", "runs_failed")).increment(1);
        }
        ::metrics::histogram!(phase_metric!(histogram, "orchestrator", "run_duration_seconds"))
            .record(duration_secs);
    }

    pub fn set_progress(progress: u8) {
        ::metrics::gauge!(phase_metric!(gauge, "orchestrator", "progress_percent"))
            .set(progress as f64);
    }
}

impl PhaseMetrics for OrchestratorMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "orchestrator", "runs_success"));
        let _ = ::metrics::counter!(phase_metric!(counter, "orchestrator", "runs_failed"));
        let _ = ::metrics::histogram!(phase_metric!(
            histogram,
            "orchestrator",
            "run_duration_seconds"
        ));
        let _ = ::metrics::gauge!(phase_metric!(gauge, "orchestrator", "progress_percent"));
    }

    fn phase_name() -> &'static str {
        "orchestrator"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "orchestrator", "runs_success"),
                metric_type: MetricType::Counter,
                help: "Integration runs that completed",
            },
            MetricDoc {
                name: phase_metric!(counter, "orchestrator", "runs_failed"),
                metric_type: MetricType::Counter,
                help: "Integration runs that ended in a failed result",
            },
            MetricDoc {
                name: phase_metric!(histogram, "orchestrator", "run_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall time per integration run",
            },
            MetricDoc {
                name: phase_metric!(gauge, "orchestrator", "progress_percent"),
                metric_type: MetricType::Gauge,
                help: "Progress of the current run",
            },
        ]
    }
}
