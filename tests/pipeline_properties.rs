mod common;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use property_scraper::app::ports::HttpClientPort;
use property_scraper::pipeline::discovery::generate_candidate_urls;
use property_scraper::pipeline::policy::{BatchPolicy, RetryPolicy};
use property_scraper::pipeline::processing::normalize::{matches_street_grammar, standardize_address};
use property_scraper::pipeline::processing::{is_valid_property, DataProcessingPipeline};
use property_scraper::pipeline::{CountyDiscoveryEngine, IntelligentScraper};
use property_scraper::types::{DataSource, SourceMethod, SourceStatus};

use common::*;

#[test]
fn standardizes_main_street() {
    assert_eq!(standardize_address("123 Main Street"), "123 MAIN ST");
}

#[tokio::test]
async fn dedup_keeps_higher_confidence_record() -> Result<()> {
    let pipeline = DataProcessingPipeline::new(BatchPolicy::immediate(10), 50);
    let result = pipeline
        .process_property_batch(vec![
            property("123 Main Street", "Jane Doe", 40),
            property("123 MAIN ST", "JANE DOE", 75),
        ])
        .await?;

    assert_eq!(result.processed, 2);
    assert_eq!(result.properties.len(), 1);
    assert_eq!(result.properties[0].property.confidence_score, 75);
    Ok(())
}

#[tokio::test]
async fn geocode_timeout_does_not_drop_record() -> Result<()> {
    let pipeline = pipeline(Duration::from_millis(200));
    let mut batch: Vec<_> = (1..=9)
        .map(|n| property(&format!("{} Main Street", n), &format!("Owner {} LLC", n), 80))
        .collect();
    batch.push(property("10 Stall Road", "Owner 10 LLC", 80));

    let result = pipeline.process_property_batch(batch).await?;

    assert_eq!(result.processed, 10);
    assert_eq!(result.geocoded, 9);
    assert_eq!(result.properties.len(), 10);
    let stalled = result
        .properties
        .iter()
        .find(|p| p.property.address == "10 STALL RD")
        .expect("stalled record retained");
    assert!(!stalled.is_geocoded());
    assert!(stalled.federal_data.is_empty());
    assert!(result.errors.is_empty());
    Ok(())
}

#[tokio::test]
async fn enrichment_and_geocoder_context_flow_through() -> Result<()> {
    let pipeline = pipeline(Duration::from_secs(5));
    let mut p = property("7 Lake Drive", "Riverside Trust", 90);
    p.county = "Unknown".to_string();
    let result = pipeline.process_property_batch(vec![p]).await?;

    let record = &result.properties[0];
    assert_eq!(record.property.county, "Travis");
    assert_eq!(record.property.zip.as_deref(), Some("78701"));
    assert_eq!(record.city.as_deref(), Some("Austin"));
    assert_eq!(record.census_tract.as_deref(), Some("001100"));
    assert_eq!(record.federal_data.flood_zone(), Some("AE"));
    assert_eq!(result.enriched, 1);
    Ok(())
}

#[tokio::test]
async fn validation_soundness_over_processed_records() -> Result<()> {
    let pipeline = DataProcessingPipeline::new(BatchPolicy::immediate(10), 50);
    let mut unknown_state = property("5 Elm Street", "Acme LLC", 90);
    unknown_state.state = "Unknown".to_string();
    let result = pipeline
        .process_property_batch(vec![
            property("5 Elm Street", "Acme LLC", 90),
            property("5 Elm", "Other LLC", 90),
            property("6 Elm Street", "X", 90),
            property("7 Elm Street", "Low Score LLC", 49),
            unknown_state,
        ])
        .await?;

    // Same address and owner as the first record: collapsed, first kept
    assert_eq!(result.properties.len(), 4);
    for record in result.valid_properties(50) {
        let p = &record.property;
        assert!(p.address.len() >= 5);
        assert!(p.owner_name.len() >= 2);
        assert!(!p.state.is_empty() && p.state != "Unknown");
        assert!(p.confidence_score >= 50);
        assert!(matches_street_grammar(&p.address));
    }
    assert_eq!(result.valid, 1);
    assert!(result
        .properties
        .iter()
        .filter(|r| r.property.address == "5 ELM")
        .all(|r| !is_valid_property(r, 50)));

    let quality = result.quality(50);
    assert!(quality.quality_score >= 0.0 && quality.quality_score <= 100.0);
    assert!(quality.quality_score < 100.0);
    Ok(())
}

#[tokio::test]
async fn low_keyword_page_is_not_a_source() {
    let page = "<html><body><h1>Welcome</h1><p>Office hours and parking.</p>\
                <table><tr><td>Mon</td></tr><tr><td>Tue</td></tr></table></body></html>";
    let url = generate_candidate_urls(&travis())[0].clone();
    let http: Arc<dyn HttpClientPort> = Arc::new(FakeHttp::default().page(&url, "text/html", page));
    let engine = CountyDiscoveryEngine::new(
        Arc::new(FakeGeography {
            jurisdictions: vec![travis()],
            gate: None,
        }),
        http,
        BatchPolicy::immediate(10),
        3,
    );

    assert!(engine.validate_data_source(&url).await.is_none());
    let county = engine.discover_county_data(&travis()).await;
    assert_eq!(county.sources.len(), 0);
}

#[tokio::test]
async fn json_source_is_discovered_and_scraped_as_api() -> Result<()> {
    let body = r#"{"features": [
        {"attributes": {"OWNER_NAME": "Bayou Holdings LLC", "SITUS_ADDRESS": "400 Canal Street", "ASSESSED_VALUE": 880000}},
        {"attributes": {"OWNER_NAME": "BROUSSARD, MARIE", "SITUS_ADDRESS": "21 Royal St", "ASSESSED_VALUE": 310000}}
    ]}"#;
    let url = generate_candidate_urls(&orleans())[0].clone();
    let http: Arc<dyn HttpClientPort> =
        Arc::new(FakeHttp::default().page(&url, "application/json", body));
    let engine = CountyDiscoveryEngine::new(
        Arc::new(FakeGeography {
            jurisdictions: vec![orleans()],
            gate: None,
        }),
        http.clone(),
        BatchPolicy::immediate(10),
        3,
    );

    let mut county = engine.discover_county_data(&orleans()).await;
    assert_eq!(county.sources.len(), 1);
    let source: &mut DataSource = &mut county.sources[0];
    assert_eq!(source.method, SourceMethod::Api);

    let scraper = IntelligentScraper::with_default_classifiers(http, RetryPolicy::immediate(1));
    let result = scraper.scrape_county_data(source).await;
    assert!(result.success);
    assert_eq!(result.data.len(), 2);
    assert!(result.data.iter().all(|p| p.state == "LA" && p.county == "Orleans"));
    assert_eq!(source.status, SourceStatus::Active);
    assert_eq!(source.success_rate, 1.0);
    Ok(())
}
