use async_trait::async_trait;
use std::time::Duration;

use crate::types::{FederalRecord, Jurisdiction};

#[async_trait]
pub trait HttpClientPort: Send + Sync {
    /// GET with explicit headers; the timeout aborts the whole request.
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpGetResult, String>;

    /// Cheap existence check. Returns the HTTP status.
    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, String>;
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub content_length: u64,
}

impl HttpGetResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Enumerates county-equivalent jurisdictions from a reference geography dataset.
#[async_trait]
pub trait GeographyPort: Send + Sync {
    async fn list_jurisdictions(&self) -> Result<Vec<Jurisdiction>, String>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeocodeHit {
    pub latitude: f64,
    pub longitude: f64,
    pub postcode: Option<String>,
    /// State name or code
    pub region: Option<String>,
    pub place: Option<String>,
    pub county: Option<String>,
}

#[async_trait]
pub trait GeocoderPort: Send + Sync {
    /// `Ok(None)` when the service had no match for the address.
    async fn geocode(&self, address: &str) -> Result<Option<GeocodeHit>, String>;
}

/// Reference-data lookups for a single location.
#[async_trait]
pub trait FederalDataPort: Send + Sync {
    /// Every lookup that succeeded; failures are omitted, never surfaced.
    async fn enrich(&self, address: &str, coordinates: Option<(f64, f64)>) -> Vec<FederalRecord>;
}
