use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::app::ports::{GeographyPort, HttpClientPort};
use crate::constants::state_code_for_fips;
use crate::types::Jurisdiction;

/// Reads the Census county enumeration: a JSON array whose first row is the
/// header (`NAME`, `state`, `county`) followed by one row per county.
pub struct CensusGeography {
    http: Arc<dyn HttpClientPort>,
    url: String,
    timeout: Duration,
}

impl CensusGeography {
    pub fn new(http: Arc<dyn HttpClientPort>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl GeographyPort for CensusGeography {
    async fn list_jurisdictions(&self) -> Result<Vec<Jurisdiction>, String> {
        let resp = self.http.get(&self.url, &[], self.timeout).await?;
        if !resp.is_success() {
            return Err(format!("geography service returned HTTP {}", resp.status));
        }
        let body: Value = serde_json::from_slice(&resp.bytes).map_err(|e| e.to_string())?;
        parse_geography_rows(&body)
    }
}

/// Parse header-row-plus-value-rows JSON into jurisdictions. Rows whose state
/// FIPS has no postal code mapping are skipped.
pub fn parse_geography_rows(body: &Value) -> Result<Vec<Jurisdiction>, String> {
    let rows = body
        .as_array()
        .ok_or_else(|| "geography payload is not an array".to_string())?;
    let header = rows
        .first()
        .and_then(|h| h.as_array())
        .ok_or_else(|| "geography payload has no header row".to_string())?;

    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.as_str().is_some_and(|s| s.eq_ignore_ascii_case(name)))
            .ok_or_else(|| format!("geography header missing '{}' column", name))
    };
    let name_idx = column("NAME")?;
    let state_idx = column("state")?;
    let county_idx = column("county")?;

    let mut jurisdictions = Vec::with_capacity(rows.len().saturating_sub(1));
    for row in rows.iter().skip(1) {
        let Some(cells) = row.as_array() else { continue };
        let cell = |i: usize| cells.get(i).and_then(|v| v.as_str()).unwrap_or("");
        let full_name = cell(name_idx);
        let state_fips = cell(state_idx);
        let county_fips = cell(county_idx);
        let Some(state_code) = state_code_for_fips(state_fips) else {
            tracing::debug!("Skipping row with unmapped state FIPS '{}'", state_fips);
            continue;
        };
        // "Travis County, Texas" -> "Travis County"
        let name = full_name.split(',').next().unwrap_or(full_name).trim();
        if name.is_empty() || county_fips.is_empty() {
            continue;
        }
        jurisdictions.push(Jurisdiction {
            name: name.to_string(),
            state_code: state_code.to_string(),
            state_fips: state_fips.to_string(),
            county_fips: county_fips.to_string(),
        });
    }
    Ok(jurisdictions)
}
