//! Address standardization, confidence scoring and candidate normalization.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use uuid::Uuid;

use crate::constants::{
    ADDRESS_ABBREVIATIONS, CONFIDENCE_ADDRESS, CONFIDENCE_COUNTY, CONFIDENCE_OWNER,
    CONFIDENCE_STATE, CONFIDENCE_VALUE, MAX_CONFIDENCE, STREET_SUFFIXES,
};
use crate::error::{Result, ScraperError};
use crate::types::{ProcessedProperty, RawCandidate};

static ABBREVIATIONS: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| ADDRESS_ABBREVIATIONS.iter().copied().collect());

/// Leading house number, at least one street token, then a recognized suffix
/// optionally followed by a direction or unit designator.
static STREET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let suffixes = STREET_SUFFIXES.join("|");
    Regex::new(&format!(
        r"^\d+[A-Z]?(?:-\d+)?(?: [A-Z0-9#/\-]+)+? (?:{})(?: [A-Z0-9#/\-]+)*$",
        suffixes
    ))
    .expect("street pattern is a valid regex")
});

/// Uppercase, strip punctuation, collapse whitespace and abbreviate
/// directionals and street suffixes on word boundaries.
///
/// Idempotent: every abbreviation is a fixed point of the dictionary.
pub fn standardize_address(address: &str) -> String {
    let cleaned: String = address
        .to_uppercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '#' || c == '-' || c == '/' {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .map(|word| ABBREVIATIONS.get(word).copied().unwrap_or(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a standardized address matches the street grammar.
pub fn matches_street_grammar(address: &str) -> bool {
    STREET_PATTERN.is_match(address)
}

/// Collapse internal whitespace and trim.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase alphanumeric form used for keys and comparisons.
pub fn normalize_key(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deduplication key: normalized address and owner joined by `_`.
pub fn dedup_key(address: &str, owner: &str) -> String {
    format!("{}_{}", normalize_key(address), normalize_key(owner))
}

/// Parse a currency-like string ("$1,234,567.00", "1234567") into a number.
pub fn parse_currency(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let digits: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if digits.is_empty() || digits.chars().filter(|c| *c == '.').count() > 1 {
        return None;
    }
    // Reject fragments where the number is incidental to mostly-alphabetic text
    let alpha = trimmed.chars().filter(|c| c.is_alphabetic()).count();
    if alpha > 3 {
        return None;
    }
    digits.parse::<f64>().ok().filter(|v| *v > 0.0)
}

fn present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// Additive completeness score, capped at 100.
///
/// Monotone: adding a field never lowers the score.
pub fn calculate_confidence(candidate: &RawCandidate) -> u8 {
    let mut score = 0;
    if present(&candidate.address) {
        score += CONFIDENCE_ADDRESS;
    }
    if present(&candidate.owner) {
        score += CONFIDENCE_OWNER;
    }
    if candidate.value.is_some_and(|v| v > 0.0) {
        score += CONFIDENCE_VALUE;
    }
    if present(&candidate.state) {
        score += CONFIDENCE_STATE;
    }
    if present(&candidate.county) {
        score += CONFIDENCE_COUNTY;
    }
    score.min(MAX_CONFIDENCE) as u8
}

/// Turn a raw candidate into a property record, rejecting any candidate that
/// lacks an address, owner, state or county.
pub fn normalize_candidate(candidate: &RawCandidate, data_source: &str) -> Result<ProcessedProperty> {
    let required = |field: &Option<String>, name: &str| -> Result<String> {
        field
            .as_deref()
            .map(clean_text)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ScraperError::Normalization(format!("missing {}", name)))
    };

    let address = required(&candidate.address, "address")?;
    let owner_name = required(&candidate.owner, "owner")?;
    let state = required(&candidate.state, "state")?;
    let county = required(&candidate.county, "county")?;

    let key = dedup_key(&address, &owner_name);
    let id = Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{}#{}", data_source, key).as_bytes());

    Ok(ProcessedProperty {
        id: id.to_string(),
        address,
        owner_name,
        assessed_value: candidate.value.filter(|v| *v > 0.0),
        state: state.to_uppercase(),
        county,
        zip: candidate.zip.as_deref().map(clean_text).filter(|z| !z.is_empty()),
        confidence_score: calculate_confidence(candidate),
        data_source: data_source.to_string(),
        created_at: Utc::now(),
    })
}
