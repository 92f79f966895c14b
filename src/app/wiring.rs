use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::app::ports::{FederalDataPort, GeocoderPort, HttpClientPort};
use crate::config::{Config, GEOCODER_TOKEN_ENV};
use crate::error::Result;
use crate::infra::census_geography::CensusGeography;
use crate::infra::federal::FederalDataIntegrator;
use crate::infra::geocoder::MapboxGeocoder;
use crate::infra::http_client::ReqwestHttp;
use crate::pipeline::{
    CountyDiscoveryEngine, DataProcessingPipeline, IntegrationOrchestrator, IntelligentScraper,
};
use crate::storage::{InMemoryStorage, PropertyStore};

/// The pipeline components built from configuration, before they are
/// composed into an orchestrator.
pub struct Components {
    pub discovery: Arc<CountyDiscoveryEngine>,
    pub scraper: Arc<IntelligentScraper>,
    pub pipeline: Arc<DataProcessingPipeline>,
}

/// Build every component over the given HTTP client.
///
/// Geocoding is skipped when no access token is configured; records then
/// pass through ungeocoded and receive no federal data.
pub fn build_components(config: &Config, http: Arc<dyn HttpClientPort>) -> Result<Components> {
    config.validate()?;

    let geography = Arc::new(CensusGeography::new(
        http.clone(),
        config.discovery.geography_url.clone(),
        Duration::from_secs(config.discovery.request_timeout_secs),
    ));
    let discovery = CountyDiscoveryEngine::new(
        geography,
        http.clone(),
        config.discovery_batch_policy(),
        config.discovery.min_keyword_matches,
    )
    .with_max_jurisdictions(config.discovery.max_jurisdictions);

    let scraper = IntelligentScraper::with_default_classifiers(http.clone(), config.scraper_retry_policy());

    let federal: Arc<dyn FederalDataPort> = Arc::new(FederalDataIntegrator::new(http.clone(), &config.federal));
    let mut pipeline =
        DataProcessingPipeline::new(config.geocode_batch_policy(), config.processing.min_confidence)
            .with_federal(federal);
    match config.geocoder.resolve_token() {
        Some(token) => {
            let geocoder: Arc<dyn GeocoderPort> = Arc::new(MapboxGeocoder::new(
                http,
                config.geocoder.base_url.clone(),
                token,
                Duration::from_secs(config.processing.geocode_timeout_secs),
            ));
            pipeline = pipeline.with_geocoder(geocoder);
            info!("Geocoding enabled");
        }
        None => warn!("{} not set, geocoding disabled", GEOCODER_TOKEN_ENV),
    }

    Ok(Components {
        discovery: Arc::new(discovery),
        scraper: Arc::new(scraper),
        pipeline: Arc::new(pipeline),
    })
}

/// Production orchestrator: reqwest adapters and in-memory storage.
pub fn build_orchestrator(config: &Config) -> Result<IntegrationOrchestrator> {
    let http: Arc<dyn HttpClientPort> = Arc::new(ReqwestHttp::new());
    let components = build_components(config, http)?;
    let store: Arc<dyn PropertyStore> = Arc::new(InMemoryStorage::new());
    Ok(IntegrationOrchestrator::new(
        components.discovery,
        components.scraper,
        components.pipeline,
        store,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.discovery.batch_size = 0;
        assert!(build_orchestrator(&config).is_err());
    }

    #[test]
    fn test_default_config_builds() {
        assert!(build_orchestrator(&Config::default()).is_ok());
    }
}
