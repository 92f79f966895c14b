//! Jurisdiction enumeration and candidate source probing.

use chrono::Utc;
use futures::future::join_all;
use reqwest::Url;
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::app::ports::{GeographyPort, HttpClientPort};
use crate::constants::{CLIENT_IDENTITIES, MAX_CANDIDATE_URLS, PROPERTY_KEYWORDS, URL_TEMPLATES};
use crate::error::{Result, ScraperError};
use crate::metrics::DiscoveryMetrics;
use crate::pipeline::policy::BatchPolicy;
use crate::pipeline::scraper::{ClassifierFactory, DefaultClassifierFactory};
use crate::types::{DataSource, Jurisdiction, SourceMethod, SourceStatus};

/// Check failures beyond this are counted but their messages dropped.
const MAX_RECORDED_ERRORS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn for_source_count(count: usize) -> Self {
        match count {
            c if c >= 3 => Priority::High,
            c if c >= 1 => Priority::Medium,
            _ => Priority::Low,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CountyDiscovery {
    pub jurisdiction: Jurisdiction,
    pub sources: Vec<DataSource>,
    pub priority: Priority,
    /// Candidate checks that could not reach their URL
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryResult {
    pub total_jurisdictions: usize,
    pub processed: usize,
    pub sources_found: usize,
    pub failed_checks: usize,
    pub errors: Vec<String>,
    pub counties: Vec<CountyDiscovery>,
}

impl DiscoveryResult {
    fn absorb(&mut self, county: CountyDiscovery) {
        self.processed += 1;
        self.sources_found += county.sources.len();
        self.failed_checks += county.errors.len();
        for error in &county.errors {
            if self.errors.len() < MAX_RECORDED_ERRORS {
                self.errors.push(error.clone());
            }
        }
        self.counties.push(county);
    }

    pub fn sources(&self) -> impl Iterator<Item = &DataSource> {
        self.counties.iter().flat_map(|c| c.sources.iter())
    }
}

/// Snapshot handed to the caller after each batch has fully joined.
#[derive(Debug, Clone, Copy)]
pub struct BatchProgress {
    pub batch_index: usize,
    pub total_batches: usize,
    pub processed: usize,
    pub total: usize,
    pub sources_found: usize,
}

pub struct CountyDiscoveryEngine {
    geography: Arc<dyn GeographyPort>,
    http: Arc<dyn HttpClientPort>,
    batch: BatchPolicy,
    min_keyword_matches: usize,
    max_jurisdictions: Option<usize>,
    classifiers: Arc<dyn ClassifierFactory>,
}

impl CountyDiscoveryEngine {
    pub fn new(
        geography: Arc<dyn GeographyPort>,
        http: Arc<dyn HttpClientPort>,
        batch: BatchPolicy,
        min_keyword_matches: usize,
    ) -> Self {
        Self {
            geography,
            http,
            batch,
            min_keyword_matches,
            max_jurisdictions: None,
            classifiers: Arc::new(DefaultClassifierFactory::new()),
        }
    }

    pub fn with_max_jurisdictions(mut self, max: Option<usize>) -> Self {
        self.max_jurisdictions = max;
        self
    }

    pub fn with_classifiers(mut self, classifiers: Arc<dyn ClassifierFactory>) -> Self {
        self.classifiers = classifiers;
        self
    }

    /// Enumerate jurisdictions, optionally restricted to the given state codes.
    pub async fn list_jurisdictions(&self, states: Option<&[String]>) -> Result<Vec<Jurisdiction>> {
        let mut jurisdictions = self
            .geography
            .list_jurisdictions()
            .await
            .map_err(|e| ScraperError::PipelineStage {
                stage: "discovery".to_string(),
                message: format!("geography lookup failed: {}", e),
            })?;

        if let Some(states) = states.filter(|s| !s.is_empty()) {
            jurisdictions.retain(|j| states.iter().any(|s| s.eq_ignore_ascii_case(&j.state_code)));
        }
        if let Some(max) = self.max_jurisdictions {
            jurisdictions.truncate(max);
        }
        Ok(jurisdictions)
    }

    pub async fn discover_all_counties(&self, states: Option<&[String]>) -> Result<DiscoveryResult> {
        self.discover_all_counties_with(states, |_| ControlFlow::Continue(()))
            .await
    }

    /// Check every jurisdiction in bounded batches. `on_batch` runs after each
    /// batch has joined and may break to stop before the next batch starts.
    ///
    /// Only a failed enumeration is an error; check failures land in the result.
    #[instrument(skip(self, on_batch))]
    pub async fn discover_all_counties_with<F>(
        &self,
        states: Option<&[String]>,
        mut on_batch: F,
    ) -> Result<DiscoveryResult>
    where
        F: FnMut(BatchProgress) -> ControlFlow<()>,
    {
        let jurisdictions = self.list_jurisdictions(states).await?;
        let total = jurisdictions.len();
        let total_batches = self.batch.batch_count(total);
        info!(total, total_batches, batch_size = self.batch.batch_size, "Starting county discovery");

        let mut result = DiscoveryResult {
            total_jurisdictions: total,
            ..DiscoveryResult::default()
        };

        for (batch_index, chunk) in jurisdictions.chunks(self.batch.batch_size.max(1)).enumerate() {
            let started = Instant::now();
            let outcomes = join_all(chunk.iter().map(|j| self.discover_county_data(j))).await;
            for county in outcomes {
                result.absorb(county);
            }
            DiscoveryMetrics::record_batch(started.elapsed().as_secs_f64());
            debug!(
                batch = batch_index + 1,
                total_batches,
                sources_found = result.sources_found,
                "Discovery batch joined"
            );

            let progress = BatchProgress {
                batch_index,
                total_batches,
                processed: result.processed,
                total,
                sources_found: result.sources_found,
            };
            if on_batch(progress).is_break() {
                info!(processed = result.processed, "Discovery stopped before next batch");
                break;
            }
            self.batch.pause(batch_index, total_batches).await;
        }

        info!(
            processed = result.processed,
            sources_found = result.sources_found,
            failed_checks = result.failed_checks,
            "County discovery complete"
        );
        Ok(result)
    }

    /// Validate every candidate URL for one jurisdiction, in order.
    pub async fn discover_county_data(&self, jurisdiction: &Jurisdiction) -> CountyDiscovery {
        let mut sources = Vec::new();
        let mut errors = Vec::new();

        for url in generate_candidate_urls(jurisdiction) {
            match self.check_candidate(&url).await {
                Ok(Some(mut source)) => {
                    source.name = format!(
                        "{}, {} ({})",
                        jurisdiction.name,
                        jurisdiction.state_code,
                        host_of(&url)
                    );
                    source.jurisdiction = Some(jurisdiction.clone());
                    sources.push(source);
                }
                Ok(None) => {}
                Err(e) => errors.push(e.to_string()),
            }
        }

        let priority = Priority::for_source_count(sources.len());
        if !sources.is_empty() {
            info!(
                jurisdiction = %jurisdiction.name,
                state = %jurisdiction.state_code,
                sources = sources.len(),
                ?priority,
                "Discovered data sources"
            );
        }

        CountyDiscovery {
            jurisdiction: jurisdiction.clone(),
            sources,
            priority,
            errors,
        }
    }

    /// `None` for anything that is not a usable property-data source,
    /// including unreachable URLs.
    pub async fn validate_data_source(&self, url: &str) -> Option<DataSource> {
        match self.check_candidate(url).await {
            Ok(source) => source,
            Err(e) => {
                debug!(url, error = %e, "Candidate unreachable");
                None
            }
        }
    }

    /// Existence check, then content fetch. `Ok(None)` means the source is
    /// reachable but does not look like property data.
    async fn check_candidate(&self, url: &str) -> Result<Option<DataSource>> {
        let timeout = self.batch.request_timeout;
        let unreachable = |reason: String| ScraperError::SourceUnreachable {
            url: url.to_string(),
            reason,
        };

        let status = match self.http.head(url, timeout).await {
            Ok(status) => status,
            Err(e) => {
                DiscoveryMetrics::record_check_error();
                return Err(unreachable(e));
            }
        };
        // Servers that refuse HEAD still get a GET
        if status >= 400 && status != 405 && status != 501 {
            DiscoveryMetrics::record_check_error();
            return Err(unreachable(format!("HTTP {}", status)));
        }

        let headers = CLIENT_IDENTITIES[0].headers();
        let response = match self.http.get(url, &headers, timeout).await {
            Ok(r) if r.is_success() => r,
            Ok(r) => {
                DiscoveryMetrics::record_check_error();
                return Err(unreachable(format!("HTTP {}", r.status)));
            }
            Err(e) => {
                DiscoveryMetrics::record_check_error();
                return Err(unreachable(e));
            }
        };

        let content = response.text();
        let method = method_for_content_type(&response.content_type);
        let keywords = count_keywords(&content);
        let structured = self.classifiers.for_method(method).looks_structured(&content);

        let validated = keywords >= self.min_keyword_matches && structured;
        DiscoveryMetrics::record_candidate_check(validated);
        if !validated {
            let mismatch = ScraperError::ContentMismatch { url: url.to_string() };
            debug!(error = %mismatch, keywords, structured, "Rejected candidate");
            return Ok(None);
        }

        Ok(Some(DataSource {
            id: Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes()).to_string(),
            name: host_of(url),
            url: url.to_string(),
            method,
            data_type: "property_records".to_string(),
            status: SourceStatus::Active,
            last_checked: Utc::now(),
            success_rate: 0.0,
            selectors: None,
            jurisdiction: None,
        }))
    }
}

/// Lowercased county name without its suffix, reduced to `[a-z0-9]`.
pub fn url_token(jurisdiction: &Jurisdiction) -> String {
    jurisdiction
        .short_name()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Candidate URLs from common government-site naming conventions, capped.
pub fn generate_candidate_urls(jurisdiction: &Jurisdiction) -> Vec<String> {
    let county = url_token(jurisdiction);
    if county.is_empty() {
        return Vec::new();
    }
    let st = jurisdiction.state_code.to_lowercase();
    let mut urls: Vec<String> = Vec::with_capacity(MAX_CANDIDATE_URLS);
    for template in URL_TEMPLATES {
        let url = template.replace("{county}", &county).replace("{st}", &st);
        if !urls.contains(&url) {
            urls.push(url);
        }
        if urls.len() == MAX_CANDIDATE_URLS {
            break;
        }
    }
    urls
}

/// Number of distinct property keywords present in the content.
pub fn count_keywords(content: &str) -> usize {
    let lower = content.to_lowercase();
    PROPERTY_KEYWORDS
        .iter()
        .filter(|k| lower.contains(*k))
        .count()
}

pub fn method_for_content_type(content_type: &str) -> SourceMethod {
    let ct = content_type.to_ascii_lowercase();
    if ct.contains("json") {
        SourceMethod::Api
    } else if ct.contains("csv") {
        SourceMethod::Csv
    } else {
        SourceMethod::Scraper
    }
}

/// Host of a URL, lowercased by the parser; the URL itself when it does not parse.
fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::HttpGetResult;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    struct StaticGeography(Vec<Jurisdiction>);

    #[async_trait]
    impl GeographyPort for StaticGeography {
        async fn list_jurisdictions(&self) -> std::result::Result<Vec<Jurisdiction>, String> {
            Ok(self.0.clone())
        }
    }

    /// Serves registered pages; every other URL fails like an unknown host.
    #[derive(Default)]
    struct PageHttp {
        pages: HashMap<String, (String, String)>,
        gets: Mutex<usize>,
    }

    impl PageHttp {
        fn page(mut self, url: &str, content_type: &str, body: &str) -> Self {
            self.pages
                .insert(url.to_string(), (content_type.to_string(), body.to_string()));
            self
        }
    }

    #[async_trait]
    impl HttpClientPort for PageHttp {
        async fn get(
            &self,
            url: &str,
            _headers: &[(String, String)],
            _timeout: Duration,
        ) -> std::result::Result<HttpGetResult, String> {
            *self.gets.lock().unwrap() += 1;
            let (content_type, body) = self
                .pages
                .get(url)
                .ok_or_else(|| format!("dns error: {}", url))?;
            Ok(HttpGetResult {
                status: 200,
                bytes: body.clone().into_bytes(),
                content_type: content_type.clone(),
                content_length: body.len() as u64,
            })
        }

        async fn head(&self, url: &str, _timeout: Duration) -> std::result::Result<u16, String> {
            if self.pages.contains_key(url) {
                Ok(200)
            } else {
                Err(format!("dns error: {}", url))
            }
        }
    }

    fn travis() -> Jurisdiction {
        Jurisdiction {
            name: "Travis County".to_string(),
            state_code: "TX".to_string(),
            state_fips: "48".to_string(),
            county_fips: "453".to_string(),
        }
    }

    fn orleans() -> Jurisdiction {
        Jurisdiction {
            name: "Orleans Parish".to_string(),
            state_code: "LA".to_string(),
            state_fips: "22".to_string(),
            county_fips: "071".to_string(),
        }
    }

    const ASSESSOR_PAGE: &str = r#"<html><body>
        <h1>Property Tax Assessor</h1><p>Search parcel records by owner or address.</p>
        <table><tr><th>Owner</th><th>Address</th></tr><tr><td>Acme LLC</td><td>1 Main St</td></tr></table>
        </body></html>"#;

    fn engine(http: PageHttp, jurisdictions: Vec<Jurisdiction>) -> CountyDiscoveryEngine {
        CountyDiscoveryEngine::new(
            Arc::new(StaticGeography(jurisdictions)),
            Arc::new(http),
            BatchPolicy::immediate(2),
            3,
        )
    }

    #[test]
    fn test_candidate_urls_are_tokenized_and_bounded() {
        let mut j = travis();
        j.name = "St. Mary's County".to_string();
        let urls = generate_candidate_urls(&j);
        assert!(urls.len() <= MAX_CANDIDATE_URLS);
        assert!(!urls.is_empty());
        assert_eq!(urls[0], "https://stmaryscountytx.gov");
        assert!(urls.iter().all(|u| !u.contains('{')));
    }

    #[test]
    fn test_priority_thresholds() {
        assert_eq!(Priority::for_source_count(0), Priority::Low);
        assert_eq!(Priority::for_source_count(1), Priority::Medium);
        assert_eq!(Priority::for_source_count(2), Priority::Medium);
        assert_eq!(Priority::for_source_count(3), Priority::High);
    }

    #[test]
    fn test_method_from_content_type() {
        assert_eq!(method_for_content_type("application/json; charset=utf-8"), SourceMethod::Api);
        assert_eq!(method_for_content_type("text/csv"), SourceMethod::Csv);
        assert_eq!(method_for_content_type("text/html"), SourceMethod::Scraper);
    }

    #[test]
    fn test_host_of_ignores_userinfo_port_and_case() {
        assert_eq!(host_of("https://user@Assessor.TravisCountyTX.gov:8080/x"), "assessor.traviscountytx.gov");
        assert_eq!(host_of("https://www.co.travis.tx.us/assessor"), "www.co.travis.tx.us");
        assert_eq!(host_of("not a url"), "not a url");
    }

    #[tokio::test]
    async fn test_validate_accepts_property_page() {
        let http = PageHttp::default().page("https://traviscountytx.gov", "text/html", ASSESSOR_PAGE);
        let engine = engine(http, vec![]);
        let source = engine
            .validate_data_source("https://traviscountytx.gov")
            .await
            .expect("page should validate");
        assert_eq!(source.method, SourceMethod::Scraper);
        assert_eq!(source.status, SourceStatus::Active);
    }

    #[tokio::test]
    async fn test_validate_rejects_page_with_few_keywords() {
        let page = r#"<html><body><p>Welcome. Pay your tax bill online.</p>
            <table><tr><td>a</td></tr><tr><td>b</td></tr></table></body></html>"#;
        let http = PageHttp::default().page("https://traviscountytx.gov", "text/html", page);
        let engine = engine(http, vec![travis()]);

        assert!(engine.validate_data_source("https://traviscountytx.gov").await.is_none());

        let county = engine.discover_county_data(&travis()).await;
        assert!(county.sources.is_empty());
        assert_eq!(county.priority, Priority::Low);
    }

    #[tokio::test]
    async fn test_validate_rejects_unstructured_page() {
        let page = "<p>Property tax assessor: look up a parcel by address.</p>";
        let http = PageHttp::default().page("https://traviscountytx.gov", "text/html", page);
        let engine = engine(http, vec![]);
        assert!(engine.validate_data_source("https://traviscountytx.gov").await.is_none());
    }

    #[tokio::test]
    async fn test_discover_all_counties_collects_failures_without_aborting() {
        let http = PageHttp::default().page("https://traviscountytx.gov", "text/html", ASSESSOR_PAGE);
        let engine = engine(http, vec![travis(), orleans()]);

        let mut batches = Vec::new();
        let result = engine
            .discover_all_counties_with(None, |p| {
                batches.push(p);
                ControlFlow::Continue(())
            })
            .await
            .unwrap();

        assert_eq!(result.total_jurisdictions, 2);
        assert_eq!(result.processed, 2);
        assert_eq!(result.sources_found, 1);
        assert!(result.failed_checks > 0);
        assert!(!result.errors.is_empty());
        assert_eq!(batches.len(), 1);

        let travis = &result.counties[0];
        assert_eq!(travis.priority, Priority::Medium);
        assert_eq!(travis.sources[0].jurisdiction.as_ref().unwrap().state_code, "TX");
    }

    #[tokio::test]
    async fn test_state_filter_and_stop_between_batches() {
        let engine = CountyDiscoveryEngine::new(
            Arc::new(StaticGeography(vec![travis(), orleans(), travis()])),
            Arc::new(PageHttp::default()),
            BatchPolicy::immediate(1),
            3,
        );

        let filtered = engine
            .discover_all_counties(Some(&["la".to_string()]))
            .await
            .unwrap();
        assert_eq!(filtered.total_jurisdictions, 1);

        let stopped = engine
            .discover_all_counties_with(None, |_| ControlFlow::Break(()))
            .await
            .unwrap();
        assert_eq!(stopped.total_jurisdictions, 3);
        assert_eq!(stopped.processed, 1);
    }
}
