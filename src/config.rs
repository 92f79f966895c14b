use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, ScraperError};
use crate::pipeline::policy::{Backoff, BatchPolicy, RetryPolicy};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Environment variable carrying the geocoder access token.
pub const GEOCODER_TOKEN_ENV: &str = "MAPBOX_ACCESS_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub discovery: DiscoveryConfig,
    pub scraper: ScraperConfig,
    pub processing: ProcessingConfig,
    pub federal: FederalConfig,
    pub geocoder: GeocoderConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub min_keyword_matches: usize,
    pub max_jurisdictions: Option<usize>,
    pub geography_url: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            batch_delay_ms: 1000,
            request_timeout_secs: 10,
            min_keyword_matches: 3,
            max_jurisdictions: None,
            geography_url: "https://api.census.gov/data/2020/dec/pl?get=NAME&for=county:*"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub backoff: Backoff,
    pub request_timeout_secs: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 2000,
            backoff: Backoff::Fixed,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub geocode_batch_size: usize,
    pub geocode_batch_delay_ms: u64,
    pub geocode_timeout_secs: u64,
    pub min_confidence: u8,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            geocode_batch_size: 10,
            geocode_batch_delay_ms: 1000,
            geocode_timeout_secs: 10,
            min_confidence: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FederalConfig {
    pub census_url: String,
    pub flood_url: String,
    pub environmental_url: String,
    pub request_timeout_secs: u64,
}

impl Default for FederalConfig {
    fn default() -> Self {
        Self {
            census_url: "https://geo.fcc.gov/api/census/area".to_string(),
            flood_url:
                "https://hazards.fema.gov/gis/nfhl/rest/services/public/NFHL/MapServer/28/query"
                    .to_string(),
            environmental_url: "https://echodata.epa.gov/echo/echo_rest_services.get_facilities"
                .to_string(),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub base_url: String,
    /// Falls back to `MAPBOX_ACCESS_TOKEN` when absent.
    pub access_token: Option<String>,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.mapbox.com/geocoding/v5/mapbox.places".to_string(),
            access_token: None,
        }
    }
}

impl GeocoderConfig {
    pub fn resolve_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .or_else(|| std::env::var(GEOCODER_TOKEN_ENV).ok())
            .filter(|t| !t.trim().is_empty())
    }
}

impl Config {
    /// Load from `config.toml` in the working directory, defaulting when absent.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Config::default());
        }
        let config_content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.discovery.batch_size == 0 {
            return Err(ScraperError::Config("discovery.batch_size must be > 0".into()));
        }
        if self.processing.geocode_batch_size == 0 {
            return Err(ScraperError::Config(
                "processing.geocode_batch_size must be > 0".into(),
            ));
        }
        if self.scraper.max_attempts == 0 {
            return Err(ScraperError::Config("scraper.max_attempts must be > 0".into()));
        }
        if self.processing.min_confidence > 100 {
            return Err(ScraperError::Config(
                "processing.min_confidence must be within 0..=100".into(),
            ));
        }
        Ok(())
    }

    pub fn scraper_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.scraper.max_attempts,
            base_delay: Duration::from_millis(self.scraper.retry_delay_ms),
            backoff: self.scraper.backoff,
            request_timeout: Duration::from_secs(self.scraper.request_timeout_secs),
        }
    }

    pub fn discovery_batch_policy(&self) -> BatchPolicy {
        BatchPolicy {
            batch_size: self.discovery.batch_size,
            inter_batch_delay: Duration::from_millis(self.discovery.batch_delay_ms),
            request_timeout: Duration::from_secs(self.discovery.request_timeout_secs),
        }
    }

    pub fn geocode_batch_policy(&self) -> BatchPolicy {
        BatchPolicy {
            batch_size: self.processing.geocode_batch_size,
            inter_batch_delay: Duration::from_millis(self.processing.geocode_batch_delay_ms),
            request_timeout: Duration::from_secs(self.processing.geocode_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load_from("/definitely/not/here.toml").unwrap();
        assert_eq!(config.discovery.batch_size, 50);
        assert_eq!(config.scraper.max_attempts, 3);
        assert_eq!(config.processing.geocode_batch_size, 10);
        assert_eq!(config.processing.min_confidence, 50);
    }

    #[test]
    fn test_partial_file_overrides_only_given_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[scraper]\nmax_attempts = 5\nbackoff = \"exponential\"\n\n[discovery]\nmax_jurisdictions = 20"
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.scraper.max_attempts, 5);
        assert_eq!(config.scraper.backoff, Backoff::Exponential);
        assert_eq!(config.scraper.retry_delay_ms, 2000);
        assert_eq!(config.discovery.max_jurisdictions, Some(20));
        assert_eq!(config.discovery.batch_size, 50);

        let policy = config.scraper_retry_policy();
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[discovery]\nbatch_size = 0").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ScraperError::Config(_)));
    }
}
