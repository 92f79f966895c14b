use serde::Serialize;

use crate::constants::UNKNOWN_STATE;
use crate::pipeline::processing::normalize::{matches_street_grammar, standardize_address};
use crate::types::EnrichedProperty;

pub const MIN_ADDRESS_LEN: usize = 5;
pub const MIN_OWNER_LEN: usize = 2;
pub const DEFAULT_MIN_CONFIDENCE: u8 = 50;

/// A record is valid when every predicate holds:
/// - address at least 5 characters and matching the street grammar
/// - owner at least 2 characters
/// - state known
/// - confidence at or above `min_confidence`
pub fn is_valid_property(record: &EnrichedProperty, min_confidence: u8) -> bool {
    let p = &record.property;
    let address = p.address.trim();
    address.chars().count() >= MIN_ADDRESS_LEN
        && p.owner_name.trim().chars().count() >= MIN_OWNER_LEN
        && !p.state.trim().is_empty()
        && p.state != UNKNOWN_STATE
        && matches_street_grammar(&standardize_address(address))
        && p.confidence_score >= min_confidence
}

/// Aggregate quality over one batch of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub total_records: usize,
    pub valid_records: usize,
    pub average_confidence: f64,
    pub geocoded_records: usize,
    pub enriched_records: usize,
    /// valid / total * 100, 0 for an empty batch
    pub quality_score: f64,
}

impl QualityMetrics {
    pub fn compute(records: &[EnrichedProperty], min_confidence: u8) -> Self {
        let total_records = records.len();
        if total_records == 0 {
            return Self::default();
        }
        let valid_records = records
            .iter()
            .filter(|r| is_valid_property(r, min_confidence))
            .count();
        let confidence_sum: u64 = records
            .iter()
            .map(|r| r.property.confidence_score as u64)
            .sum();

        Self {
            total_records,
            valid_records,
            average_confidence: confidence_sum as f64 / total_records as f64,
            geocoded_records: records.iter().filter(|r| r.is_geocoded()).count(),
            enriched_records: records.iter().filter(|r| !r.federal_data.is_empty()).count(),
            quality_score: valid_records as f64 / total_records as f64 * 100.0,
        }
    }
}
