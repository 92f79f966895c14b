// Staged processing: standardize -> geocode -> deduplicate -> enrich -> validate

pub mod conflation;
pub mod enrich;
pub mod export;
pub mod geocode;
pub mod normalize;
pub mod quality_gate;

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::app::ports::{FederalDataPort, GeocoderPort};
use crate::error::{Result, ScraperError};
use crate::metrics::ProcessingMetrics;
use crate::pipeline::policy::BatchPolicy;
use crate::types::{EnrichedProperty, ProcessedProperty, RawCandidate};

pub use export::ExportFormat;
pub use quality_gate::{is_valid_property, QualityMetrics};

/// Per-stage counts for one batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingResult {
    /// Records that entered the pipeline
    pub processed: usize,
    pub geocoded: usize,
    /// Records removed as duplicates
    pub deduplicated: usize,
    pub enriched: usize,
    pub valid: usize,
    /// Every record that survived deduplication, valid or not
    pub properties: Vec<EnrichedProperty>,
    pub errors: Vec<String>,
    pub elapsed_ms: u64,
}

impl ProcessingResult {
    pub fn quality(&self, min_confidence: u8) -> QualityMetrics {
        QualityMetrics::compute(&self.properties, min_confidence)
    }

    pub fn valid_properties(&self, min_confidence: u8) -> impl Iterator<Item = &EnrichedProperty> {
        self.properties
            .iter()
            .filter(move |p| is_valid_property(p, min_confidence))
    }
}

pub struct DataProcessingPipeline {
    geocoder: Option<Arc<dyn GeocoderPort>>,
    federal: Option<Arc<dyn FederalDataPort>>,
    batch: BatchPolicy,
    min_confidence: u8,
}

impl DataProcessingPipeline {
    pub fn new(batch: BatchPolicy, min_confidence: u8) -> Self {
        Self {
            geocoder: None,
            federal: None,
            batch,
            min_confidence,
        }
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn GeocoderPort>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn with_federal(mut self, federal: Arc<dyn FederalDataPort>) -> Self {
        self.federal = Some(federal);
        self
    }

    pub fn min_confidence(&self) -> u8 {
        self.min_confidence
    }

    /// Normalize raw candidates from one source, then process them. Candidates
    /// that fail normalization are dropped and reported in `errors`.
    pub async fn process_raw_batch(
        &self,
        raw: &[RawCandidate],
        data_source: &str,
    ) -> Result<ProcessingResult> {
        let mut rejected = Vec::new();
        let properties: Vec<ProcessedProperty> = raw
            .iter()
            .filter_map(|candidate| match normalize::normalize_candidate(candidate, data_source) {
                Ok(p) => Some(p),
                Err(e) => {
                    rejected.push(e.to_string());
                    None
                }
            })
            .collect();

        let mut result = self.process_property_batch(properties).await?;
        result.errors.splice(0..0, rejected);
        Ok(result)
    }

    /// Run a batch through every stage. A failing stage is recorded in
    /// `errors` and the batch continues with the records as they stood.
    ///
    /// Errors only when there is nothing to process.
    #[instrument(skip(self, properties), fields(count = properties.len()))]
    pub async fn process_property_batch(
        &self,
        properties: Vec<ProcessedProperty>,
    ) -> Result<ProcessingResult> {
        if properties.is_empty() {
            return Err(ScraperError::NoData("no properties to process".to_string()));
        }
        let started = Instant::now();
        let mut result = ProcessingResult {
            processed: properties.len(),
            ..ProcessingResult::default()
        };

        let mut records: Vec<EnrichedProperty> = properties
            .into_iter()
            .map(|p| EnrichedProperty::from_processed(standardize(p)))
            .collect();

        if let Some(geocoder) = &self.geocoder {
            match geocode::geocode_records(geocoder, &self.batch, &mut records).await {
                Ok(count) => result.geocoded = count,
                Err(e) => {
                    Self::stage_failed(&mut result, e);
                    result.geocoded = records.iter().filter(|r| r.is_geocoded()).count();
                }
            }
        }

        let before = records.len();
        records = conflation::deduplicate(records);
        result.deduplicated = before - records.len();
        if result.deduplicated > 0 {
            debug!(removed = result.deduplicated, "Removed duplicate records");
        }

        if let Some(federal) = &self.federal {
            result.enriched = enrich::enrich_records(federal, &self.batch, &mut records).await;
            let missing = records.len() - result.enriched;
            if missing > 0 {
                ProcessingMetrics::record_enrichment_gap(missing);
            }
        }

        result.valid = records
            .iter()
            .filter(|r| is_valid_property(r, self.min_confidence))
            .count();
        result.properties = records;
        result.elapsed_ms = started.elapsed().as_millis() as u64;

        ProcessingMetrics::record_batch(result.processed, result.valid, started.elapsed().as_secs_f64());
        info!(
            processed = result.processed,
            geocoded = result.geocoded,
            deduplicated = result.deduplicated,
            enriched = result.enriched,
            valid = result.valid,
            elapsed_ms = result.elapsed_ms,
            "Processed property batch"
        );
        Ok(result)
    }

    fn stage_failed(result: &mut ProcessingResult, error: ScraperError) {
        warn!(error = %error, "Processing stage failed; continuing with unchanged records");
        ProcessingMetrics::record_stage_error();
        result.errors.push(error.to_string());
    }
}

/// Standardize the address, keeping the original when nothing survives.
fn standardize(mut property: ProcessedProperty) -> ProcessedProperty {
    let standardized = normalize::standardize_address(&property.address);
    if !standardized.is_empty() {
        property.address = standardized;
    }
    property
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn property(address: &str, owner: &str, confidence: u8) -> ProcessedProperty {
        ProcessedProperty {
            id: format!("{}-{}", address, confidence),
            address: address.to_string(),
            owner_name: owner.to_string(),
            assessed_value: Some(120_000.0),
            state: "TX".to_string(),
            county: "Travis".to_string(),
            zip: None,
            confidence_score: confidence,
            data_source: "src".to_string(),
            created_at: Utc::now(),
        }
    }

    fn pipeline() -> DataProcessingPipeline {
        DataProcessingPipeline::new(BatchPolicy::immediate(10), 50)
    }

    #[tokio::test]
    async fn test_empty_batch_is_no_data() {
        assert!(matches!(
            pipeline().process_property_batch(Vec::new()).await,
            Err(ScraperError::NoData(_))
        ));
    }

    #[tokio::test]
    async fn test_standardize_dedup_validate() {
        let result = pipeline()
            .process_property_batch(vec![
                property("123 Main Street", "DOE, JANE", 40),
                property("123 MAIN ST", "Doe Jane", 75),
                property("Lot 4 Unplatted", "ACME LLC", 90),
            ])
            .await
            .unwrap();

        assert_eq!(result.processed, 3);
        assert_eq!(result.deduplicated, 1);
        assert_eq!(result.properties.len(), 2);
        assert_eq!(result.properties[0].property.address, "123 MAIN ST");
        assert_eq!(result.properties[0].property.confidence_score, 75);
        // The unplatted lot fails the street grammar but is still retained
        assert_eq!(result.valid, 1);
        assert!(result.errors.is_empty());

        let quality = result.quality(50);
        assert_eq!(quality.total_records, 2);
        assert_eq!(quality.quality_score, 50.0);
    }

    #[tokio::test]
    async fn test_raw_batch_reports_rejected_candidates() {
        let raw = vec![
            RawCandidate {
                address: Some("5 Hill Rd".to_string()),
                owner: Some("Baker Tom".to_string()),
                state: Some("TX".to_string()),
                county: Some("Hays".to_string()),
                ..RawCandidate::default()
            },
            RawCandidate {
                address: Some("6 Hill Rd".to_string()),
                ..RawCandidate::default()
            },
        ];
        let result = pipeline().process_raw_batch(&raw, "src").await.unwrap();
        assert_eq!(result.processed, 1);
        assert_eq!(result.errors.len(), 1);
    }
}
