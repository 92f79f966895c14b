use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// How a discovered source is consumed, which also selects its content classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMethod {
    Scraper,
    Api,
    Csv,
}

impl fmt::Display for SourceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceMethod::Scraper => "scraper",
            SourceMethod::Api => "api",
            SourceMethod::Csv => "csv",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for SourceMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scraper" | "html" => Ok(SourceMethod::Scraper),
            "api" | "json" => Ok(SourceMethod::Api),
            "csv" => Ok(SourceMethod::Csv),
            other => Err(format!("unknown source method '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Active,
    Inactive,
    Error,
}

/// A jurisdiction endpoint judged usable by discovery.
///
/// Sources are never deleted; scrape outcomes only move `status` and
/// `success_rate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub id: String,
    pub name: String,
    pub url: String,
    pub method: SourceMethod,
    pub data_type: String,
    pub status: SourceStatus,
    pub last_checked: DateTime<Utc>,
    pub success_rate: f64,
    pub selectors: Option<Vec<String>>,
    /// Jurisdiction the source was discovered for; supplies state/county
    /// context the page itself may not repeat.
    pub jurisdiction: Option<Jurisdiction>,
}

impl DataSource {
    /// Mark a source that answers but no longer yields records.
    pub fn deactivate(&mut self) {
        self.status = SourceStatus::Inactive;
        self.success_rate = 0.0;
        self.last_checked = Utc::now();
    }
}

/// One county-equivalent entity from the reference geography dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jurisdiction {
    /// Full name as published, e.g. "Travis County"
    pub name: String,
    /// Two-letter postal code, e.g. "TX"
    pub state_code: String,
    pub state_fips: String,
    pub county_fips: String,
}

impl Jurisdiction {
    /// Five digit state+county FIPS code.
    pub fn fips(&self) -> String {
        format!("{}{}", self.state_fips, self.county_fips)
    }

    /// County name without its "County"/"Parish"/... suffix.
    pub fn short_name(&self) -> String {
        let mut name = self.name.trim().to_string();
        for suffix in crate::constants::JURISDICTION_SUFFIXES {
            if let Some(stripped) = name.strip_suffix(suffix) {
                name = stripped.trim_end().to_string();
                break;
            }
        }
        name
    }
}

/// Unstructured fields pulled out of one fetched fragment. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub address: Option<String>,
    pub owner: Option<String>,
    pub value: Option<f64>,
    pub state: Option<String>,
    pub county: Option<String>,
    pub zip: Option<String>,
    pub source_url: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedProperty {
    pub id: String,
    pub address: String,
    pub owner_name: String,
    pub assessed_value: Option<f64>,
    pub state: String,
    pub county: String,
    pub zip: Option<String>,
    /// 0..=100
    pub confidence_score: u8,
    pub data_source: String,
    pub created_at: DateTime<Utc>,
}

/// Reference data attached to a property, one variant per kind of lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FederalRecord {
    Census {
        tract: String,
        block_group: Option<String>,
        state_fips: String,
        county_fips: String,
    },
    Flood {
        zone: String,
        special_flood_hazard_area: bool,
        panel: Option<String>,
    },
    Environmental {
        hazard_sites_nearby: u32,
        nearest_site: Option<String>,
    },
}

impl FederalRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            FederalRecord::Census { .. } => "census",
            FederalRecord::Flood { .. } => "flood",
            FederalRecord::Environmental { .. } => "environmental",
        }
    }
}

/// At most one record per kind; empty when enrichment failed or was skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FederalData(Vec<FederalRecord>);

impl FederalData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any existing record of the same kind.
    pub fn insert(&mut self, record: FederalRecord) {
        self.0.retain(|r| r.kind() != record.kind());
        self.0.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn records(&self) -> &[FederalRecord] {
        &self.0
    }

    pub fn census_tract(&self) -> Option<&str> {
        self.0.iter().find_map(|r| match r {
            FederalRecord::Census { tract, .. } => Some(tract.as_str()),
            _ => None,
        })
    }

    pub fn flood_zone(&self) -> Option<&str> {
        self.0.iter().find_map(|r| match r {
            FederalRecord::Flood { zone, .. } => Some(zone.as_str()),
            _ => None,
        })
    }

    pub fn in_special_flood_hazard_area(&self) -> bool {
        self.0.iter().any(|r| {
            matches!(
                r,
                FederalRecord::Flood {
                    special_flood_hazard_area: true,
                    ..
                }
            )
        })
    }

    pub fn environmental_sites(&self) -> Option<u32> {
        self.0.iter().find_map(|r| match r {
            FederalRecord::Environmental {
                hazard_sites_nearby,
                ..
            } => Some(*hazard_sites_nearby),
            _ => None,
        })
    }
}

impl From<Vec<FederalRecord>> for FederalData {
    fn from(records: Vec<FederalRecord>) -> Self {
        let mut data = FederalData::new();
        for record in records {
            data.insert(record);
        }
        data
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedProperty {
    #[serde(flatten)]
    pub property: ProcessedProperty,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Locality from the geocoder's place context
    pub city: Option<String>,
    pub census_tract: Option<String>,
    pub federal_data: FederalData,
    pub data_sources: BTreeSet<String>,
    pub last_updated: DateTime<Utc>,
}

impl EnrichedProperty {
    pub fn from_processed(property: ProcessedProperty) -> Self {
        let mut data_sources = BTreeSet::new();
        data_sources.insert(property.data_source.clone());
        Self {
            property,
            latitude: None,
            longitude: None,
            city: None,
            census_tract: None,
            federal_data: FederalData::new(),
            data_sources,
            last_updated: Utc::now(),
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }

    pub fn is_geocoded(&self) -> bool {
        self.coordinates().is_some()
    }
}

/// Whether a coordinate pair falls inside the US/territories envelope the
/// geocoder and federal services are expected to cover.
pub fn within_plausible_bounds(latitude: f64, longitude: f64) -> bool {
    use crate::constants::{MAX_LATITUDE, MAX_LONGITUDE, MIN_LATITUDE, MIN_LONGITUDE};
    (MIN_LATITUDE..=MAX_LATITUDE).contains(&latitude)
        && (MIN_LONGITUDE..=MAX_LONGITUDE).contains(&longitude)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name_strips_suffix() {
        let j = Jurisdiction {
            name: "St. Louis County".to_string(),
            state_code: "MO".to_string(),
            state_fips: "29".to_string(),
            county_fips: "189".to_string(),
        };
        assert_eq!(j.short_name(), "St. Louis");
        assert_eq!(j.fips(), "29189");

        let parish = Jurisdiction {
            name: "Orleans Parish".to_string(),
            ..j
        };
        assert_eq!(parish.short_name(), "Orleans");
    }

    #[test]
    fn test_federal_data_keeps_one_record_per_kind() {
        let mut data = FederalData::new();
        data.insert(FederalRecord::Flood {
            zone: "X".to_string(),
            special_flood_hazard_area: false,
            panel: None,
        });
        data.insert(FederalRecord::Flood {
            zone: "AE".to_string(),
            special_flood_hazard_area: true,
            panel: None,
        });
        assert_eq!(data.records().len(), 1);
        assert_eq!(data.flood_zone(), Some("AE"));
        assert!(data.in_special_flood_hazard_area());
        assert!(data.census_tract().is_none());
    }

    #[test]
    fn test_federal_record_serializes_with_kind_tag() {
        let record = FederalRecord::Environmental {
            hazard_sites_nearby: 2,
            nearest_site: Some("Acme Plating".to_string()),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "environmental");
        assert_eq!(json["hazard_sites_nearby"], 2);
    }

    #[test]
    fn test_plausible_bounds() {
        assert!(within_plausible_bounds(30.27, -97.74));
        assert!(within_plausible_bounds(61.2, -149.9));
        assert!(!within_plausible_bounds(51.5, -0.12));
        assert!(!within_plausible_bounds(0.0, 0.0));
    }

    #[test]
    fn test_source_method_parse() {
        assert_eq!("API".parse::<SourceMethod>().unwrap(), SourceMethod::Api);
        assert_eq!("html".parse::<SourceMethod>().unwrap(), SourceMethod::Scraper);
        assert!("ftp".parse::<SourceMethod>().is_err());
    }
}
