use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::app::ports::{GeocodeHit, GeocoderPort, HttpClientPort};

/// Forward geocoder speaking the Mapbox places API shape: a `features` array
/// whose entries carry `center: [lng, lat]` and a `context` hierarchy.
pub struct MapboxGeocoder {
    http: Arc<dyn HttpClientPort>,
    base_url: String,
    access_token: String,
    timeout: Duration,
}

impl MapboxGeocoder {
    pub fn new(
        http: Arc<dyn HttpClientPort>,
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            access_token: access_token.into(),
            timeout,
        }
    }

    fn request_url(&self, address: &str) -> Result<Url, String> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| format!("invalid geocoder base url '{}': {}", self.base_url, e))?;
        url.path_segments_mut()
            .map_err(|_| format!("geocoder base url '{}' cannot carry a path", self.base_url))?
            .pop_if_empty()
            .push(&format!("{}.json", address));
        url.query_pairs_mut()
            .append_pair("access_token", &self.access_token)
            .append_pair("country", "US")
            .append_pair("types", "address")
            .append_pair("limit", "1");
        Ok(url)
    }

    /// Strip the access token from anything that may echo the request URL.
    fn redact(&self, message: &str) -> String {
        if self.access_token.is_empty() {
            return message.to_string();
        }
        message.replace(&self.access_token, "[redacted]")
    }
}

#[async_trait]
impl GeocoderPort for MapboxGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodeHit>, String> {
        let url = self.request_url(address)?;
        let resp = self
            .http
            .get(url.as_str(), &[], self.timeout)
            .await
            .map_err(|e| self.redact(&e))?;
        if !resp.is_success() {
            return Err(format!("geocoder returned HTTP {}", resp.status));
        }
        let body: Value = serde_json::from_slice(&resp.bytes).map_err(|e| e.to_string())?;
        Ok(parse_feature(&body))
    }
}

/// Extract the first feature's centroid and place context.
pub fn parse_feature(body: &Value) -> Option<GeocodeHit> {
    let feature = body.get("features")?.as_array()?.first()?;
    let center = feature.get("center")?.as_array()?;
    let longitude = center.first()?.as_f64()?;
    let latitude = center.get(1)?.as_f64()?;

    let mut hit = GeocodeHit {
        latitude,
        longitude,
        postcode: None,
        region: None,
        place: None,
        county: None,
    };

    if let Some(context) = feature.get("context").and_then(|c| c.as_array()) {
        for entry in context {
            let id = entry.get("id").and_then(|v| v.as_str()).unwrap_or("");
            let text = entry
                .get("text")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            match id.split('.').next().unwrap_or("") {
                "postcode" => hit.postcode = text,
                "place" => hit.place = text,
                "district" => hit.county = text,
                "region" => {
                    // Prefer "US-TX" short codes over the display name
                    hit.region = entry
                        .get("short_code")
                        .and_then(|v| v.as_str())
                        .and_then(|s| s.strip_prefix("US-"))
                        .map(|s| s.to_string())
                        .or(text);
                }
                _ => {}
            }
        }
    }

    Some(hit)
}
