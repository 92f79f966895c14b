//! Three-phase integration run (discovery, scraping, processing) and the
//! query surface over its results.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::error::{Result, ScraperError};
use crate::metrics::OrchestratorMetrics;
use crate::pipeline::discovery::CountyDiscoveryEngine;
use crate::pipeline::processing::export::{self, ExportFormat};
use crate::pipeline::processing::{DataProcessingPipeline, QualityMetrics};
use crate::pipeline::scraper::IntelligentScraper;
use crate::storage::{PropertyStore, SearchFilters};
use crate::types::{DataSource, EnrichedProperty, ProcessedProperty, SourceStatus};

const DISCOVERY_END: u8 = 25;
const SCRAPING_END: u8 = 75;
const COMPLETE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationPhase {
    Discovery,
    Scraping,
    Processing,
    Complete,
}

/// Live view of the current (or last) run.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrationStatus {
    pub phase: IntegrationPhase,
    /// 0..=100, never decreases within a run
    pub progress: u8,
    pub is_running: bool,
    pub failed: bool,
    pub counties_discovered: usize,
    pub sources_found: usize,
    pub properties_scraped: usize,
    pub properties_processed: usize,
    pub valid_properties: usize,
    pub errors: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl Default for IntegrationStatus {
    fn default() -> Self {
        Self {
            phase: IntegrationPhase::Discovery,
            progress: 0,
            is_running: false,
            failed: false,
            counties_discovered: 0,
            sources_found: 0,
            properties_scraped: 0,
            properties_processed: 0,
            valid_properties: 0,
            errors: Vec::new(),
            start_time: None,
            estimated_completion: None,
        }
    }
}

impl IntegrationStatus {
    fn started(now: DateTime<Utc>) -> Self {
        Self {
            is_running: true,
            start_time: Some(now),
            ..Self::default()
        }
    }

    /// Raise progress; lower values are ignored.
    pub fn advance(&mut self, progress: u8) {
        let progress = progress.min(COMPLETE);
        if progress <= self.progress {
            return;
        }
        self.progress = progress;
        OrchestratorMetrics::set_progress(progress);

        if let Some(start) = self.start_time {
            let now = Utc::now();
            self.estimated_completion = if progress >= COMPLETE {
                Some(now)
            } else {
                let elapsed_ms = (now - start).num_milliseconds().max(0);
                let total_ms = elapsed_ms * COMPLETE as i64 / progress as i64;
                Some(start + ChronoDuration::milliseconds(total_ms))
            };
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IntegrationOptions {
    /// Postal codes to restrict discovery to; all states when `None`
    pub states: Option<Vec<String>>,
    /// Cap on sources scraped in one run
    pub max_sources: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrationResult {
    pub success: bool,
    pub counties_discovered: usize,
    pub sources_found: usize,
    pub properties_scraped: usize,
    pub properties_processed: usize,
    pub valid_properties: usize,
    pub quality: QualityMetrics,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub total: usize,
    pub properties: Vec<EnrichedProperty>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetailsResponse {
    pub success: bool,
    pub property: Option<EnrichedProperty>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AreaQuery {
    pub state: String,
    pub county: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AreaAnalytics {
    pub success: bool,
    pub state: String,
    pub county: Option<String>,
    pub property_count: usize,
    pub average_assessed_value: Option<f64>,
    pub median_assessed_value: Option<f64>,
    pub average_confidence: f64,
    /// Share of records with a known flood zone that sit in a special flood hazard area
    pub flood_hazard_share: f64,
    pub geocoded_share: f64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportResponse {
    pub success: bool,
    pub format: ExportFormat,
    pub content: String,
    pub record_count: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StateCoverage {
    pub state: String,
    pub jurisdictions: usize,
    pub sources: usize,
    pub active_sources: usize,
    pub properties: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CoverageStats {
    pub success: bool,
    pub states: Vec<StateCoverage>,
    pub total_jurisdictions: usize,
    pub total_sources: usize,
    pub total_properties: usize,
    pub errors: Vec<String>,
}

/// Clears the running flag however the run ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct IntegrationOrchestrator {
    discovery: Arc<CountyDiscoveryEngine>,
    scraper: Arc<IntelligentScraper>,
    pipeline: Arc<DataProcessingPipeline>,
    store: Arc<dyn PropertyStore>,
    status: Mutex<IntegrationStatus>,
    running: AtomicBool,
    stop_requested: AtomicBool,
}

impl IntegrationOrchestrator {
    pub fn new(
        discovery: Arc<CountyDiscoveryEngine>,
        scraper: Arc<IntelligentScraper>,
        pipeline: Arc<DataProcessingPipeline>,
        store: Arc<dyn PropertyStore>,
    ) -> Self {
        Self {
            discovery,
            scraper,
            pipeline,
            store,
            status: Mutex::new(IntegrationStatus::default()),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        }
    }

    fn status_mut(&self) -> MutexGuard<'_, IntegrationStatus> {
        // Status stays readable even if a holder panicked
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn stopping(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Run discovery, scraping and processing once.
    ///
    /// A second call while a run is active fails with
    /// [`ScraperError::AlreadyRunning`] and leaves the active run untouched.
    /// Any other failure is reported in the returned result.
    #[instrument(skip(self))]
    pub async fn start_integration(&self, options: IntegrationOptions) -> Result<IntegrationResult> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Rejected integration start: a run is already active");
            return Err(ScraperError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);
        self.stop_requested.store(false, Ordering::SeqCst);
        *self.status_mut() = IntegrationStatus::started(Utc::now());

        let started = Instant::now();
        info!(states = ?options.states, max_sources = ?options.max_sources, "Integration started");

        let outcome = self.run_phases(&options).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(mut result) => {
                result.duration_ms = duration_ms;
                let mut status = self.status_mut();
                status.is_running = false;
                result.errors = status.errors.clone();
                info!(
                    success = result.success,
                    valid = result.valid_properties,
                    duration_ms,
                    "Integration finished"
                );
                result
            }
            Err(e) => {
                error!(error = %e, "Integration failed");
                let mut status = self.status_mut();
                status.is_running = false;
                status.failed = true;
                status.errors.push(e.to_string());
                IntegrationResult {
                    success: false,
                    errors: status.errors.clone(),
                    duration_ms,
                    ..IntegrationResult::default()
                }
            }
        };

        OrchestratorMetrics::record_run(result.success, duration_ms as f64 / 1000.0);
        Ok(result)
    }

    async fn run_phases(&self, options: &IntegrationOptions) -> Result<IntegrationResult> {
        let mut result = IntegrationResult::default();

        // Discovery: 0..25
        let discovered = self
            .discovery
            .discover_all_counties_with(options.states.as_deref(), |p| {
                let mut status = self.status_mut();
                status.counties_discovered = p.processed;
                status.sources_found = p.sources_found;
                if p.total > 0 {
                    status.advance((p.processed * DISCOVERY_END as usize / p.total) as u8);
                }
                if self.stopping() {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await?;

        result.counties_discovered = discovered.processed;
        result.sources_found = discovered.sources_found;
        {
            let mut status = self.status_mut();
            status.counties_discovered = discovered.processed;
            status.sources_found = discovered.sources_found;
            status.errors.extend(discovered.errors.iter().cloned());
            status.advance(DISCOVERY_END);
        }
        let sources: Vec<DataSource> = discovered.sources().cloned().collect();
        self.store.upsert_sources(&sources).await?;
        if self.stop_if_requested("discovery") {
            return Ok(result);
        }

        // Scraping: 25..75, proportional to jurisdictions scraped
        self.status_mut().phase = IntegrationPhase::Scraping;
        let (scraped, finished) = self.scrape_sources(sources, options.max_sources).await?;
        result.properties_scraped = scraped.len();
        if finished {
            self.status_mut().advance(SCRAPING_END);
        }
        if self.stop_if_requested("scraping") {
            return Ok(result);
        }

        // Processing: 75..100
        self.status_mut().phase = IntegrationPhase::Processing;
        if scraped.is_empty() {
            return Err(ScraperError::NoData(
                "no properties were scraped from any source".to_string(),
            ));
        }
        let processed = self.pipeline.process_property_batch(scraped).await?;
        let min_confidence = self.pipeline.min_confidence();
        let valid: Vec<EnrichedProperty> =
            processed.valid_properties(min_confidence).cloned().collect();
        self.store.upsert_properties(&valid).await?;

        result.properties_processed = processed.processed;
        result.valid_properties = processed.valid;
        result.quality = processed.quality(min_confidence);
        result.success = true;

        let mut status = self.status_mut();
        status.properties_processed = processed.processed;
        status.valid_properties = processed.valid;
        status.errors.extend(processed.errors);
        status.phase = IntegrationPhase::Complete;
        status.advance(COMPLETE);

        Ok(result)
    }

    /// Scrape jurisdiction by jurisdiction, checking the stop flag between them.
    /// The flag is `false` when a stop request cut the loop short.
    ///
    /// A source that answers but yields no candidates is deactivated.
    async fn scrape_sources(
        &self,
        sources: Vec<DataSource>,
        max_sources: Option<usize>,
    ) -> Result<(Vec<ProcessedProperty>, bool)> {
        let mut sources = sources;
        if let Some(max) = max_sources {
            sources.truncate(max);
        }

        // Keep discovery order while grouping by jurisdiction
        let mut groups: Vec<Vec<DataSource>> = Vec::new();
        let mut group_index: HashMap<String, usize> = HashMap::new();
        for source in sources {
            let key = source
                .jurisdiction
                .as_ref()
                .map(|j| j.fips())
                .unwrap_or_else(|| source.id.clone());
            match group_index.get(&key) {
                Some(&i) => groups[i].push(source),
                None => {
                    group_index.insert(key, groups.len());
                    groups.push(vec![source]);
                }
            }
        }

        let total = groups.len();
        let mut properties = Vec::new();
        for (done, group) in groups.into_iter().enumerate() {
            if self.stopping() {
                return Ok((properties, false));
            }
            let mut updated = Vec::with_capacity(group.len());
            for mut source in group {
                let scrape = self.scraper.scrape_county_data(&mut source).await;
                if let Some(e) = scrape.error {
                    self.status_mut()
                        .errors
                        .push(format!("{}: {}", source.url, e));
                } else if scrape.raw_count == 0 {
                    info!(url = %source.url, "Source returned no records; deactivating");
                    source.deactivate();
                }
                properties.extend(scrape.data);
                updated.push(source);
            }
            self.store.upsert_sources(&updated).await?;

            let mut status = self.status_mut();
            status.properties_scraped = properties.len();
            let span = (SCRAPING_END - DISCOVERY_END) as usize;
            status.advance(DISCOVERY_END + ((done + 1) * span / total) as u8);
        }

        Ok((properties, true))
    }

    fn stop_if_requested(&self, phase: &str) -> bool {
        if !self.stopping() {
            return false;
        }
        info!(phase, "Integration stopped on request");
        self.status_mut()
            .errors
            .push(format!("stopped by request after {}", phase));
        true
    }

    /// Ask the active run to stop before its next batch or phase. In-flight
    /// requests are not cancelled.
    pub fn stop_integration(&self) {
        if self.running.load(Ordering::SeqCst) {
            info!("Stop requested");
            self.stop_requested.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn get_status(&self) -> IntegrationStatus {
        self.status_mut().clone()
    }

    pub async fn search_properties(&self, filters: &SearchFilters) -> SearchResponse {
        match self.store.search(filters).await {
            Ok((total, properties)) => SearchResponse {
                success: true,
                total,
                properties,
                errors: Vec::new(),
            },
            Err(e) => SearchResponse {
                success: false,
                total: 0,
                properties: Vec::new(),
                errors: vec![e.to_string()],
            },
        }
    }

    pub async fn get_property_details(&self, id: &str) -> DetailsResponse {
        match self.store.get_property(id).await {
            Ok(Some(property)) => DetailsResponse {
                success: true,
                property: Some(property),
                errors: Vec::new(),
            },
            Ok(None) => DetailsResponse {
                success: false,
                property: None,
                errors: vec![format!("property not found: {}", id)],
            },
            Err(e) => DetailsResponse {
                success: false,
                property: None,
                errors: vec![e.to_string()],
            },
        }
    }

    pub async fn get_area_analytics(&self, area: &AreaQuery) -> AreaAnalytics {
        let filters = SearchFilters {
            state: Some(area.state.clone()),
            county: area.county.clone(),
            limit: Some(usize::MAX),
            ..SearchFilters::default()
        };
        let mut analytics = AreaAnalytics {
            state: area.state.clone(),
            county: area.county.clone(),
            ..AreaAnalytics::default()
        };

        let records = match self.store.search(&filters).await {
            Ok((_, records)) => records,
            Err(e) => {
                analytics.errors.push(e.to_string());
                return analytics;
            }
        };
        analytics.success = true;
        analytics.property_count = records.len();
        if records.is_empty() {
            return analytics;
        }

        let count = records.len() as f64;
        let mut values: Vec<f64> = records
            .iter()
            .filter_map(|r| r.property.assessed_value)
            .collect();
        values.sort_by(|a, b| a.total_cmp(b));
        if !values.is_empty() {
            analytics.average_assessed_value = Some(values.iter().sum::<f64>() / values.len() as f64);
            analytics.median_assessed_value = Some(median(&values));
        }
        analytics.average_confidence = records
            .iter()
            .map(|r| r.property.confidence_score as f64)
            .sum::<f64>()
            / count;

        let zoned: Vec<&EnrichedProperty> = records
            .iter()
            .filter(|r| r.federal_data.flood_zone().is_some())
            .collect();
        if !zoned.is_empty() {
            let hazard = zoned
                .iter()
                .filter(|r| r.federal_data.in_special_flood_hazard_area())
                .count();
            analytics.flood_hazard_share = hazard as f64 / zoned.len() as f64;
        }
        analytics.geocoded_share = records.iter().filter(|r| r.is_geocoded()).count() as f64 / count;
        analytics
    }

    /// Export every stored record matching `filters`. A missing `limit`
    /// exports all matches rather than one page.
    pub async fn export_data(&self, filters: &SearchFilters, format: ExportFormat) -> ExportResponse {
        let mut filters = filters.clone();
        filters.limit = filters.limit.or(Some(usize::MAX));

        let outcome = match self.store.search(&filters).await {
            Ok((_, records)) => export::export(&records, format).map(|content| {
                let count = match format {
                    ExportFormat::GeoJson => records.iter().filter(|r| r.is_geocoded()).count(),
                    _ => records.len(),
                };
                (content, count)
            }),
            Err(e) => Err(e),
        };

        match outcome {
            Ok((content, record_count)) => ExportResponse {
                success: true,
                format,
                content,
                record_count,
                errors: Vec::new(),
            },
            Err(e) => ExportResponse {
                success: false,
                format,
                content: String::new(),
                record_count: 0,
                errors: vec![e.to_string()],
            },
        }
    }

    pub async fn get_coverage_stats(&self) -> CoverageStats {
        let (sources, properties) = match (self.store.list_sources().await, self.store.all_properties().await) {
            (Ok(s), Ok(p)) => (s, p),
            (Err(e), _) | (_, Err(e)) => {
                return CoverageStats {
                    errors: vec![e.to_string()],
                    ..CoverageStats::default()
                }
            }
        };

        let mut by_state: BTreeMap<String, (BTreeSet<String>, usize, usize, usize)> = BTreeMap::new();
        for source in &sources {
            let Some(jurisdiction) = &source.jurisdiction else { continue };
            let entry = by_state.entry(jurisdiction.state_code.clone()).or_default();
            entry.0.insert(jurisdiction.fips());
            entry.1 += 1;
            if source.status == SourceStatus::Active {
                entry.2 += 1;
            }
        }
        for record in &properties {
            by_state.entry(record.property.state.clone()).or_default().3 += 1;
        }

        let states: Vec<StateCoverage> = by_state
            .into_iter()
            .map(|(state, (jurisdictions, sources, active_sources, properties))| StateCoverage {
                state,
                jurisdictions: jurisdictions.len(),
                sources,
                active_sources,
                properties,
            })
            .collect();

        CoverageStats {
            success: true,
            total_jurisdictions: states.iter().map(|s| s.jurisdictions).sum(),
            total_sources: sources.len(),
            total_properties: properties.len(),
            states,
            errors: Vec::new(),
        }
    }
}

fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
