use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

use crate::app::ports::FederalDataPort;
use crate::pipeline::policy::BatchPolicy;
use crate::types::{EnrichedProperty, FederalData};

/// Attach federal reference data to each record, a batch at a time.
///
/// Lookups that fail leave `federal_data` empty; the record is kept either
/// way. Returns the number of records that received any reference data.
pub async fn enrich_records(
    federal: &Arc<dyn FederalDataPort>,
    policy: &BatchPolicy,
    records: &mut [EnrichedProperty],
) -> usize {
    let total_batches = policy.batch_count(records.len());
    let mut enriched = 0;

    for (batch_index, batch) in records.chunks_mut(policy.batch_size.max(1)).enumerate() {
        let lookups = join_all(batch.iter().map(|record| {
            let federal = federal.clone();
            let address = record.property.address.clone();
            let coordinates = record.coordinates();
            async move { federal.enrich(&address, coordinates).await }
        }))
        .await;

        for (record, found) in batch.iter_mut().zip(lookups) {
            let data = FederalData::from(found);
            if let Some(tract) = data.census_tract() {
                record.census_tract = Some(tract.to_string());
            }
            if !data.is_empty() {
                enriched += 1;
                record.last_updated = chrono::Utc::now();
            } else {
                debug!(id = %record.property.id, "No federal data for record");
            }
            record.federal_data = data;
        }

        policy.pause(batch_index, total_batches).await;
    }

    enriched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FederalRecord, ProcessedProperty};
    use async_trait::async_trait;
    use chrono::Utc;

    /// Census data for geocoded records only.
    struct CensusOnly;

    #[async_trait]
    impl FederalDataPort for CensusOnly {
        async fn enrich(&self, _address: &str, coordinates: Option<(f64, f64)>) -> Vec<FederalRecord> {
            match coordinates {
                Some(_) => vec![FederalRecord::Census {
                    tract: "001100".to_string(),
                    block_group: Some("2".to_string()),
                    state_fips: "48".to_string(),
                    county_fips: "453".to_string(),
                }],
                None => Vec::new(),
            }
        }
    }

    fn record(geocoded: bool) -> EnrichedProperty {
        let mut record = EnrichedProperty::from_processed(ProcessedProperty {
            id: "p".to_string(),
            address: "1 MAIN ST".to_string(),
            owner_name: "ACME LLC".to_string(),
            assessed_value: None,
            state: "TX".to_string(),
            county: "Travis".to_string(),
            zip: None,
            confidence_score: 80,
            data_source: "src".to_string(),
            created_at: Utc::now(),
        });
        if geocoded {
            record.latitude = Some(30.27);
            record.longitude = Some(-97.74);
        }
        record
    }

    #[tokio::test]
    async fn test_failed_enrichment_keeps_record_with_empty_bag() {
        let federal: Arc<dyn FederalDataPort> = Arc::new(CensusOnly);
        let mut records = vec![record(true), record(false)];

        let enriched = enrich_records(&federal, &BatchPolicy::immediate(10), &mut records).await;

        assert_eq!(enriched, 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].census_tract.as_deref(), Some("001100"));
        assert!(records[1].federal_data.is_empty());
        assert!(records[1].census_tract.is_none());
    }
}
