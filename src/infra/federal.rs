//! Census, flood-zone and environmental-hazard lookups against federal
//! reference services.
//!
//! Every lookup is best-effort: an unreachable service, an error status or an
//! unexpected payload is logged and the corresponding record is omitted.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::app::ports::{FederalDataPort, HttpClientPort};
use crate::config::FederalConfig;
use crate::metrics::ProcessingMetrics;
use crate::types::{within_plausible_bounds, FederalRecord};

pub struct FederalDataIntegrator {
    http: Arc<dyn HttpClientPort>,
    census_url: String,
    flood_url: String,
    environmental_url: String,
    timeout: Duration,
}

impl FederalDataIntegrator {
    pub fn new(http: Arc<dyn HttpClientPort>, config: &FederalConfig) -> Self {
        Self {
            http,
            census_url: config.census_url.clone(),
            flood_url: config.flood_url.clone(),
            environmental_url: config.environmental_url.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    async fn fetch_json(&self, url: &str) -> Option<Value> {
        match self.http.get(url, &[], self.timeout).await {
            Ok(resp) if resp.is_success() => match serde_json::from_slice(&resp.bytes) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Federal lookup returned invalid JSON from {}: {}", url, e);
                    None
                }
            },
            Ok(resp) => {
                warn!("Federal lookup {} returned HTTP {}", url, resp.status);
                None
            }
            Err(e) => {
                warn!("Federal lookup {} failed: {}", url, e);
                None
            }
        }
    }

    /// Census tract and block group for a point.
    pub async fn census(&self, latitude: f64, longitude: f64) -> Option<FederalRecord> {
        let url = format!(
            "{}?lat={}&lon={}&format=json",
            self.census_url, latitude, longitude
        );
        let body = self.fetch_json(&url).await?;
        parse_census(&body)
    }

    /// Flood hazard zone intersecting a point.
    pub async fn flood_zone(&self, latitude: f64, longitude: f64) -> Option<FederalRecord> {
        let url = format!(
            "{}?geometry={},{}&geometryType=esriGeometryPoint&inSR=4326&spatialRel=esriSpatialRelIntersects&outFields=FLD_ZONE,SFHA_TF,DFIRM_ID&returnGeometry=false&f=json",
            self.flood_url, longitude, latitude
        );
        let body = self.fetch_json(&url).await?;
        parse_flood(&body)
    }

    /// Regulated facilities within one mile of a point.
    pub async fn environmental(&self, latitude: f64, longitude: f64) -> Option<FederalRecord> {
        let url = format!(
            "{}?output=JSON&p_lat={}&p_long={}&p_radius=1",
            self.environmental_url, latitude, longitude
        );
        let body = self.fetch_json(&url).await?;
        parse_environmental(&body)
    }
}

#[async_trait]
impl FederalDataPort for FederalDataIntegrator {
    async fn enrich(&self, address: &str, coordinates: Option<(f64, f64)>) -> Vec<FederalRecord> {
        let Some((lat, lng)) = coordinates else {
            debug!("No coordinates for '{}', skipping federal lookups", address);
            return Vec::new();
        };
        if !within_plausible_bounds(lat, lng) {
            debug!("Coordinates ({}, {}) out of bounds for '{}'", lat, lng, address);
            return Vec::new();
        }

        let (census, flood, environmental) = tokio::join!(
            self.census(lat, lng),
            self.flood_zone(lat, lng),
            self.environmental(lat, lng)
        );

        let records: Vec<FederalRecord> = [census, flood, environmental]
            .into_iter()
            .flatten()
            .collect();
        if records.len() < 3 {
            ProcessingMetrics::record_enrichment_gap(3 - records.len());
        }
        records
    }
}

pub fn parse_census(body: &Value) -> Option<FederalRecord> {
    let result = body.get("results")?.as_array()?.first()?;
    let block = result.get("block_fips")?.as_str()?;
    if block.len() < 11 {
        return None;
    }
    let state_fips = block.get(0..2)?.to_string();
    let county_fips = block.get(2..5)?.to_string();
    let tract = block.get(5..11)?.to_string();
    let block_group = block.get(11..12).map(|s| s.to_string());
    Some(FederalRecord::Census {
        tract,
        block_group,
        state_fips,
        county_fips,
    })
}

pub fn parse_flood(body: &Value) -> Option<FederalRecord> {
    let attrs = body
        .get("features")?
        .as_array()?
        .first()?
        .get("attributes")?;
    let zone = attrs.get("FLD_ZONE")?.as_str()?.trim().to_string();
    if zone.is_empty() {
        return None;
    }
    let sfha = attrs
        .get("SFHA_TF")
        .and_then(|v| v.as_str())
        .map(|s| s.eq_ignore_ascii_case("T"))
        // Zones beginning with A or V are special flood hazard areas
        .unwrap_or_else(|| zone.starts_with('A') || zone.starts_with('V'));
    let panel = attrs
        .get("DFIRM_ID")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    Some(FederalRecord::Flood {
        zone,
        special_flood_hazard_area: sfha,
        panel,
    })
}

pub fn parse_environmental(body: &Value) -> Option<FederalRecord> {
    let results = body.get("Results")?;
    let count = match results.get("QueryRows")? {
        Value::String(s) => s.parse::<u32>().ok()?,
        Value::Number(n) => u32::try_from(n.as_u64()?).ok()?,
        _ => return None,
    };
    let nearest_site = results
        .get("Facilities")
        .and_then(|f| f.as_array())
        .and_then(|f| f.first())
        .and_then(|f| f.get("FacName"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    Some(FederalRecord::Environmental {
        hazard_sites_nearby: count,
        nearest_site,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::HttpGetResult;
    use serde_json::json;

    struct RoutedHttp;

    #[async_trait]
    impl HttpClientPort for RoutedHttp {
        async fn get(
            &self,
            url: &str,
            _headers: &[(String, String)],
            _timeout: Duration,
        ) -> Result<HttpGetResult, String> {
            let body = if url.starts_with("http://census") {
                json!({"results": [{"block_fips": "484530011001010"}]})
            } else if url.starts_with("http://flood") {
                return Err("timeout".to_string());
            } else {
                json!({"Results": {"QueryRows": "0", "Facilities": []}})
            };
            let bytes = serde_json::to_vec(&body).unwrap();
            Ok(HttpGetResult {
                status: 200,
                content_length: bytes.len() as u64,
                bytes,
                content_type: "application/json".to_string(),
            })
        }

        async fn head(&self, _url: &str, _timeout: Duration) -> Result<u16, String> {
            Ok(200)
        }
    }

    fn integrator() -> FederalDataIntegrator {
        let config = FederalConfig {
            census_url: "http://census".to_string(),
            flood_url: "http://flood".to_string(),
            environmental_url: "http://epa".to_string(),
            request_timeout_secs: 1,
        };
        FederalDataIntegrator::new(Arc::new(RoutedHttp), &config)
    }

    #[tokio::test]
    async fn test_failed_lookup_is_omitted() {
        let records = integrator()
            .enrich("123 MAIN ST", Some((30.2672, -97.7431)))
            .await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.kind() == "census"));
        assert!(records.iter().all(|r| r.kind() != "flood"));
    }

    #[tokio::test]
    async fn test_no_coordinates_means_no_lookups() {
        assert!(integrator().enrich("123 MAIN ST", None).await.is_empty());
        assert!(integrator()
            .enrich("123 MAIN ST", Some((51.5, -0.12)))
            .await
            .is_empty());
    }

    #[test]
    fn test_parse_census_splits_block_fips() {
        let record = parse_census(&json!({"results": [{"block_fips": "484530011001010"}]}));
        assert_eq!(
            record,
            Some(FederalRecord::Census {
                tract: "001100".to_string(),
                block_group: Some("1".to_string()),
                state_fips: "48".to_string(),
                county_fips: "453".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_flood_infers_sfha_from_zone() {
        let record = parse_flood(&json!({"features": [{"attributes": {"FLD_ZONE": "AE"}}]}));
        assert!(matches!(
            record,
            Some(FederalRecord::Flood {
                special_flood_hazard_area: true,
                ..
            })
        ));
        assert!(parse_flood(&json!({"features": []})).is_none());
    }

    #[test]
    fn test_parse_environmental_rejects_out_of_range_counts() {
        let count = |rows: Value| match parse_environmental(&json!({"Results": {"QueryRows": rows}})) {
            Some(FederalRecord::Environmental {
                hazard_sites_nearby, ..
            }) => Some(hazard_sites_nearby),
            _ => None,
        };
        assert_eq!(count(json!(3)), Some(3));
        assert_eq!(count(json!("7")), Some(7));
        assert_eq!(count(json!(5_000_000_000u64)), None);
        assert_eq!(count(json!(-1)), None);
    }
}
