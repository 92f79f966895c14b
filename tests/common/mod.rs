#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use property_scraper::app::ports::{
    FederalDataPort, GeocodeHit, GeocoderPort, GeographyPort, HttpClientPort, HttpGetResult,
};
use property_scraper::pipeline::policy::{BatchPolicy, RetryPolicy};
use property_scraper::pipeline::{
    CountyDiscoveryEngine, DataProcessingPipeline, IntegrationOrchestrator, IntelligentScraper,
};
use property_scraper::storage::{InMemoryStorage, PropertyStore};
use property_scraper::types::{FederalRecord, Jurisdiction, ProcessedProperty};

pub const ASSESSOR_PAGE: &str = r#"<html><body>
<h1>Travis County Property Tax Assessor</h1>
<p>Search parcel records by owner or address.</p>
<table>
  <tr><th>Owner</th><th>Situs Address</th><th>Assessed Value</th></tr>
  <tr><td>Acme Holdings LLC</td><td>100 Congress Avenue</td><td>$1,200,000</td></tr>
  <tr><td>SMITH, JOHN</td><td>12 Oak Street</td><td>$250,000</td></tr>
  <tr><td>Riverside Trust</td><td>7 Lake Drive</td><td>$410,000</td></tr>
</table>
</body></html>"#;

pub fn travis() -> Jurisdiction {
    Jurisdiction {
        name: "Travis County".to_string(),
        state_code: "TX".to_string(),
        state_fips: "48".to_string(),
        county_fips: "453".to_string(),
    }
}

pub fn orleans() -> Jurisdiction {
    Jurisdiction {
        name: "Orleans Parish".to_string(),
        state_code: "LA".to_string(),
        state_fips: "22".to_string(),
        county_fips: "071".to_string(),
    }
}

/// Jurisdiction list, optionally held back until released.
pub struct FakeGeography {
    pub jurisdictions: Vec<Jurisdiction>,
    pub gate: Option<Arc<Notify>>,
}

#[async_trait]
impl GeographyPort for FakeGeography {
    async fn list_jurisdictions(&self) -> Result<Vec<Jurisdiction>, String> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.jurisdictions.clone())
    }
}

/// Serves registered pages; anything else fails like an unknown host.
/// Optionally holds every GET after the first `n` until the gate opens.
#[derive(Default)]
pub struct FakeHttp {
    pages: HashMap<String, (String, String)>,
    gets: AtomicUsize,
    hold_after: Option<(usize, Arc<Notify>)>,
}

impl FakeHttp {
    pub fn page(mut self, url: &str, content_type: &str, body: &str) -> Self {
        self.pages
            .insert(url.to_string(), (content_type.to_string(), body.to_string()));
        self
    }

    pub fn hold_after(mut self, gets: usize, gate: Arc<Notify>) -> Self {
        self.hold_after = Some((gets, gate));
        self
    }
}

#[async_trait]
impl HttpClientPort for FakeHttp {
    async fn get(
        &self,
        url: &str,
        _headers: &[(String, String)],
        _timeout: Duration,
    ) -> Result<HttpGetResult, String> {
        let seen = self.gets.fetch_add(1, Ordering::SeqCst);
        if let Some((limit, gate)) = &self.hold_after {
            if seen >= *limit {
                gate.notified().await;
            }
        }
        let (content_type, body) = self
            .pages
            .get(url)
            .ok_or_else(|| format!("dns error: failed to lookup {}", url))?;
        Ok(HttpGetResult {
            status: 200,
            bytes: body.clone().into_bytes(),
            content_type: content_type.clone(),
            content_length: body.len() as u64,
        })
    }

    async fn head(&self, url: &str, _timeout: Duration) -> Result<u16, String> {
        if self.pages.contains_key(url) {
            Ok(200)
        } else {
            Err(format!("dns error: failed to lookup {}", url))
        }
    }
}

/// Geocodes everything to downtown Austin; addresses containing `stall`
/// never answer.
pub struct FakeGeocoder;

#[async_trait]
impl GeocoderPort for FakeGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodeHit>, String> {
        if address.to_lowercase().contains("stall") {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(Some(GeocodeHit {
            latitude: 30.2672,
            longitude: -97.7431,
            postcode: Some("78701".to_string()),
            region: Some("Texas".to_string()),
            place: Some("Austin".to_string()),
            county: Some("Travis County".to_string()),
        }))
    }
}

/// Flood data for addresses on Lake Drive, census data for every geocoded point.
pub struct FakeFederal;

#[async_trait]
impl FederalDataPort for FakeFederal {
    async fn enrich(&self, address: &str, coordinates: Option<(f64, f64)>) -> Vec<FederalRecord> {
        if coordinates.is_none() {
            return Vec::new();
        }
        let mut records = vec![FederalRecord::Census {
            tract: "001100".to_string(),
            block_group: Some("1".to_string()),
            state_fips: "48".to_string(),
            county_fips: "453".to_string(),
        }];
        if address.contains("LAKE DR") {
            records.push(FederalRecord::Flood {
                zone: "AE".to_string(),
                special_flood_hazard_area: true,
                panel: None,
            });
        }
        records
    }
}

pub fn pipeline(geocode_timeout: Duration) -> DataProcessingPipeline {
    DataProcessingPipeline::new(BatchPolicy::new(10, Duration::ZERO, geocode_timeout), 50)
        .with_geocoder(Arc::new(FakeGeocoder))
        .with_federal(Arc::new(FakeFederal))
}

pub fn orchestrator(
    http: FakeHttp,
    jurisdictions: Vec<Jurisdiction>,
    gate: Option<Arc<Notify>>,
) -> (IntegrationOrchestrator, Arc<dyn PropertyStore>) {
    let http: Arc<dyn HttpClientPort> = Arc::new(http);
    let discovery = CountyDiscoveryEngine::new(
        Arc::new(FakeGeography { jurisdictions, gate }),
        http.clone(),
        BatchPolicy::immediate(50),
        3,
    );
    let scraper = IntelligentScraper::with_default_classifiers(http, RetryPolicy::immediate(2));
    let store: Arc<dyn PropertyStore> = Arc::new(InMemoryStorage::new());
    let orchestrator = IntegrationOrchestrator::new(
        Arc::new(discovery),
        Arc::new(scraper),
        Arc::new(pipeline(Duration::from_secs(5))),
        store.clone(),
    );
    (orchestrator, store)
}

pub fn property(address: &str, owner: &str, confidence: u8) -> ProcessedProperty {
    ProcessedProperty {
        id: format!("{}|{}|{}", address, owner, confidence),
        address: address.to_string(),
        owner_name: owner.to_string(),
        assessed_value: Some(150_000.0),
        state: "TX".to_string(),
        county: "Travis".to_string(),
        zip: None,
        confidence_score: confidence,
        data_source: "https://traviscountytx.gov".to_string(),
        created_at: Utc::now(),
    }
}
