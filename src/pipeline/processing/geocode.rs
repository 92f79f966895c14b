use futures::future::join_all;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::app::ports::{GeocodeHit, GeocoderPort};
use crate::constants::{state_code_for_name, JURISDICTION_SUFFIXES};
use crate::error::{Result, ScraperError};
use crate::metrics::ProcessingMetrics;
use crate::pipeline::policy::BatchPolicy;
use crate::types::{within_plausible_bounds, EnrichedProperty};

enum Lookup {
    Hit(GeocodeHit),
    Miss,
    Failed(String),
}

/// Geocode records in bounded batches, filling coordinates and city and
/// overriding zip/state/county from the geocoder's place context.
///
/// A failed or timed-out lookup leaves its record ungeocoded. The stage only
/// errors when every lookup failed, which points at the service rather than
/// the addresses. Returns the number of records geocoded.
pub async fn geocode_records(
    geocoder: &Arc<dyn GeocoderPort>,
    policy: &BatchPolicy,
    records: &mut [EnrichedProperty],
) -> Result<usize> {
    let total_batches = policy.batch_count(records.len());
    let mut geocoded = 0;
    let mut failures = 0;
    let mut last_failure = None;

    for (batch_index, batch) in records.chunks_mut(policy.batch_size.max(1)).enumerate() {
        let lookups = join_all(batch.iter().map(|record| {
            let geocoder = geocoder.clone();
            let address = geocode_query(record);
            async move {
                match timeout(policy.request_timeout, geocoder.geocode(&address)).await {
                    Ok(Ok(Some(hit))) => Lookup::Hit(hit),
                    Ok(Ok(None)) => Lookup::Miss,
                    Ok(Err(e)) => Lookup::Failed(e),
                    Err(_) => Lookup::Failed(format!("geocode timed out for '{}'", address)),
                }
            }
        }))
        .await;

        for (record, lookup) in batch.iter_mut().zip(lookups) {
            match lookup {
                Lookup::Hit(hit) => {
                    let applied = apply_hit(record, &hit);
                    if applied {
                        geocoded += 1;
                    } else {
                        debug!(
                            id = %record.property.id,
                            lat = hit.latitude,
                            lng = hit.longitude,
                            "Discarded out-of-bounds geocode"
                        );
                    }
                    ProcessingMetrics::record_geocode(applied);
                }
                Lookup::Miss => ProcessingMetrics::record_geocode(false),
                Lookup::Failed(e) => {
                    warn!(id = %record.property.id, error = %e, "Geocode failed");
                    ProcessingMetrics::record_geocode(false);
                    failures += 1;
                    last_failure = Some(e);
                }
            }
        }

        policy.pause(batch_index, total_batches).await;
    }

    if !records.is_empty() && failures == records.len() {
        return Err(ScraperError::PipelineStage {
            stage: "geocode".to_string(),
            message: format!(
                "all {} lookups failed; last error: {}",
                failures,
                last_failure.unwrap_or_default()
            ),
        });
    }
    Ok(geocoded)
}

fn geocode_query(record: &EnrichedProperty) -> String {
    let p = &record.property;
    let mut query = format!("{}, {} County, {}", p.address, p.county, p.state);
    if let Some(zip) = &p.zip {
        query.push(' ');
        query.push_str(zip);
    }
    query
}

/// Apply a hit when its coordinates are plausible. Returns whether it was applied.
fn apply_hit(record: &mut EnrichedProperty, hit: &GeocodeHit) -> bool {
    if !within_plausible_bounds(hit.latitude, hit.longitude) {
        return false;
    }
    record.latitude = Some(hit.latitude);
    record.longitude = Some(hit.longitude);

    if let Some(zip) = hit.postcode.as_deref().filter(|z| !z.is_empty()) {
        record.property.zip = Some(zip.to_string());
    }
    if let Some(place) = hit.place.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        record.city = Some(place.to_string());
    }
    if let Some(state) = hit.region.as_deref().and_then(state_code_for_name) {
        record.property.state = state.to_string();
    }
    if let Some(county) = hit.county.as_deref().filter(|c| !c.is_empty()) {
        let mut county = county.trim();
        for suffix in JURISDICTION_SUFFIXES {
            if let Some(stripped) = county.strip_suffix(suffix) {
                county = stripped.trim_end();
                break;
            }
        }
        record.property.county = county.to_string();
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProcessedProperty;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;

    struct ContextGeocoder;

    #[async_trait]
    impl GeocoderPort for ContextGeocoder {
        async fn geocode(&self, address: &str) -> std::result::Result<Option<GeocodeHit>, String> {
            if address.starts_with("0 ") {
                return Ok(None);
            }
            if address.starts_with("9 ") {
                return Ok(Some(GeocodeHit {
                    latitude: 51.5,
                    longitude: -0.12,
                    postcode: None,
                    region: None,
                    place: None,
                    county: None,
                }));
            }
            Ok(Some(GeocodeHit {
                latitude: 30.27,
                longitude: -97.74,
                postcode: Some("78701".to_string()),
                region: Some("Texas".to_string()),
                place: Some("Austin".to_string()),
                county: Some("Travis County".to_string()),
            }))
        }
    }

    struct DownGeocoder;

    #[async_trait]
    impl GeocoderPort for DownGeocoder {
        async fn geocode(&self, _address: &str) -> std::result::Result<Option<GeocodeHit>, String> {
            Err("503 Service Unavailable".to_string())
        }
    }

    fn record(address: &str) -> EnrichedProperty {
        EnrichedProperty::from_processed(ProcessedProperty {
            id: address.to_string(),
            address: address.to_string(),
            owner_name: "JANE DOE".to_string(),
            assessed_value: None,
            state: "TX".to_string(),
            county: "Unknown".to_string(),
            zip: None,
            confidence_score: 80,
            data_source: "src".to_string(),
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_context_overrides_scraped_fields() {
        let geocoder: Arc<dyn GeocoderPort> = Arc::new(ContextGeocoder);
        let mut records = vec![record("1 MAIN ST"), record("0 NOWHERE RD"), record("9 ABROAD LN")];

        let geocoded = geocode_records(&geocoder, &BatchPolicy::immediate(2), &mut records)
            .await
            .unwrap();

        assert_eq!(geocoded, 1);
        assert_eq!(records[0].coordinates(), Some((30.27, -97.74)));
        assert_eq!(records[0].property.zip.as_deref(), Some("78701"));
        assert_eq!(records[0].property.county, "Travis");
        assert_eq!(records[0].city.as_deref(), Some("Austin"));
        assert!(!records[1].is_geocoded());
        assert!(records[1].city.is_none());
        assert!(!records[2].is_geocoded());
        assert_eq!(records[2].property.county, "Unknown");
    }

    #[tokio::test]
    async fn test_total_outage_is_a_stage_error() {
        let geocoder: Arc<dyn GeocoderPort> = Arc::new(DownGeocoder);
        let mut records = vec![record("1 MAIN ST")];
        let policy = BatchPolicy::new(10, Duration::ZERO, Duration::from_secs(1));
        let err = geocode_records(&geocoder, &policy, &mut records).await.unwrap_err();
        assert!(matches!(err, ScraperError::PipelineStage { .. }));
        assert!(!records[0].is_geocoded());
    }
}
