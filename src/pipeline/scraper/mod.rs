//! Per-source fetch with sequential retries, followed by classification and
//! normalization of whatever the source returned.

pub mod classifier;

use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::app::ports::HttpClientPort;
use crate::constants::CLIENT_IDENTITIES;
use crate::metrics::ScraperMetrics;
use crate::pipeline::policy::RetryPolicy;
use crate::pipeline::processing::normalize::normalize_candidate;
use crate::types::{DataSource, ProcessedProperty, SourceStatus};

pub use classifier::{
    ApiJsonClassifier, ClassificationContext, ClassifierFactory, ContentClassifier,
    CsvClassifier, DefaultClassifierFactory, FragmentKind, TableHeuristicClassifier,
};

/// Outcome of scraping one source. Failures are expressed here, never raised.
#[derive(Debug, Clone)]
pub struct ScrapeResult {
    pub source_id: String,
    pub success: bool,
    pub data: Vec<ProcessedProperty>,
    /// Candidates the classifier produced before normalization
    pub raw_count: usize,
    /// normalized / raw, 0.0 when nothing was classified
    pub success_rate: f64,
    pub error: Option<String>,
    pub attempts: u32,
}

impl ScrapeResult {
    fn failed(source_id: &str, error: String, attempts: u32) -> Self {
        Self {
            source_id: source_id.to_string(),
            success: false,
            data: Vec::new(),
            raw_count: 0,
            success_rate: 0.0,
            error: Some(error),
            attempts,
        }
    }
}

pub struct IntelligentScraper {
    http: Arc<dyn HttpClientPort>,
    retry: RetryPolicy,
    classifiers: Arc<dyn ClassifierFactory>,
}

impl IntelligentScraper {
    pub fn new(
        http: Arc<dyn HttpClientPort>,
        retry: RetryPolicy,
        classifiers: Arc<dyn ClassifierFactory>,
    ) -> Self {
        Self {
            http,
            retry,
            classifiers,
        }
    }

    pub fn with_default_classifiers(http: Arc<dyn HttpClientPort>, retry: RetryPolicy) -> Self {
        Self::new(http, retry, Arc::new(DefaultClassifierFactory::new()))
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetch one source, retrying sequentially with a rotated client identity
    /// per attempt, then classify and normalize the content.
    ///
    /// Updates `source.status`, `source.success_rate` and `source.last_checked`.
    #[instrument(skip(self, source), fields(source_id = %source.id, url = %source.url))]
    pub async fn scrape_county_data(&self, source: &mut DataSource) -> ScrapeResult {
        let started = Instant::now();
        let max_attempts = self.retry.max_attempts.max(1);
        let offset = rand::thread_rng().gen_range(0..CLIENT_IDENTITIES.len());
        let mut last_error = String::from("no attempts made");

        for attempt in 1..=max_attempts {
            let identity = &CLIENT_IDENTITIES[(offset + attempt as usize - 1) % CLIENT_IDENTITIES.len()];
            let headers = identity.headers();

            match self
                .http
                .get(&source.url, &headers, self.retry.request_timeout)
                .await
            {
                Ok(response) if response.is_success() => {
                    let content = response.text();
                    let mut result = self.extract(source, &content);
                    result.attempts = attempt;

                    source.status = SourceStatus::Active;
                    source.success_rate = result.success_rate;
                    source.last_checked = Utc::now();

                    ScraperMetrics::record_success(attempt, result.raw_count, result.data.len());
                    info!(
                        attempt,
                        raw = result.raw_count,
                        normalized = result.data.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Scraped source"
                    );
                    return result;
                }
                Ok(response) => {
                    last_error = format!("HTTP {} from {}", response.status, source.url);
                }
                Err(e) => {
                    last_error = e;
                }
            }

            warn!(attempt, max_attempts, error = %last_error, "Scrape attempt failed");
            if attempt < max_attempts {
                let delay = self.retry.delay_after(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        source.status = SourceStatus::Error;
        source.success_rate = 0.0;
        source.last_checked = Utc::now();
        ScraperMetrics::record_exhausted(max_attempts);

        ScrapeResult::failed(&source.id, last_error, max_attempts)
    }

    /// Classify fetched content and normalize every candidate that survives.
    pub fn extract(&self, source: &DataSource, content: &str) -> ScrapeResult {
        let classifier = self.classifiers.for_method(source.method);
        let context = ClassificationContext {
            source_url: source.url.clone(),
            state: source.jurisdiction.as_ref().map(|j| j.state_code.clone()),
            county: source.jurisdiction.as_ref().map(|j| j.short_name()),
            fetched_at: Utc::now(),
        };

        let candidates = classifier.classify(content, &context);
        let raw_count = candidates.len();
        let data: Vec<ProcessedProperty> = candidates
            .iter()
            .filter_map(|candidate| match normalize_candidate(candidate, &source.url) {
                Ok(property) => Some(property),
                Err(e) => {
                    debug!(error = %e, "Dropped candidate");
                    None
                }
            })
            .collect();

        let success_rate = if raw_count == 0 {
            0.0
        } else {
            data.len() as f64 / raw_count as f64
        };

        debug!(classifier = classifier.name(), raw_count, kept = data.len(), "Classified content");

        ScrapeResult {
            source_id: source.id.clone(),
            success: true,
            data,
            raw_count,
            success_rate,
            error: None,
            attempts: 1,
        }
    }
}
