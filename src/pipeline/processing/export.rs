use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, ScraperError};
use crate::types::EnrichedProperty;

pub const CSV_HEADER: &[&str] = &[
    "id",
    "address",
    "owner_name",
    "assessed_value",
    "state",
    "county",
    "city",
    "zip",
    "confidence_score",
    "latitude",
    "longitude",
    "census_tract",
    "flood_zone",
    "data_sources",
    "last_updated",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    GeoJson,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::GeoJson => "geojson",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "geojson" => Ok(ExportFormat::GeoJson),
            other => Err(ScraperError::UnsupportedFormat(other.to_string())),
        }
    }
}

pub fn export(records: &[EnrichedProperty], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Csv => Ok(to_csv(records)),
        ExportFormat::Json => Ok(serde_json::to_string_pretty(records)?),
        ExportFormat::GeoJson => Ok(serde_json::to_string_pretty(&to_geojson(records))?),
    }
}

/// Write an export to `path`. Returns the number of records written.
pub fn export_to_file(
    records: &[EnrichedProperty],
    format: ExportFormat,
    path: impl AsRef<Path>,
) -> Result<usize> {
    let content = export(records, format)?;
    fs::write(path, content)?;
    Ok(match format {
        ExportFormat::GeoJson => records.iter().filter(|r| r.is_geocoded()).count(),
        _ => records.len(),
    })
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn number<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Fixed header row; string fields quoted, numeric fields bare.
pub fn to_csv(records: &[EnrichedProperty]) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push('\n');
    for record in records {
        let p = &record.property;
        let sources: Vec<&str> = record.data_sources.iter().map(String::as_str).collect();
        let row = [
            quote(&p.id),
            quote(&p.address),
            quote(&p.owner_name),
            number(p.assessed_value),
            quote(&p.state),
            quote(&p.county),
            quote(record.city.as_deref().unwrap_or("")),
            quote(p.zip.as_deref().unwrap_or("")),
            p.confidence_score.to_string(),
            number(record.latitude),
            number(record.longitude),
            quote(record.census_tract.as_deref().unwrap_or("")),
            quote(record.federal_data.flood_zone().unwrap_or("")),
            quote(&sources.join(";")),
            quote(&record.last_updated.to_rfc3339()),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Point features for geocoded records only, coordinates in `[lng, lat]` order.
pub fn to_geojson(records: &[EnrichedProperty]) -> Value {
    let features: Vec<Value> = records
        .iter()
        .filter_map(|record| {
            let (lat, lng) = record.coordinates()?;
            let p = &record.property;
            Some(json!({
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [lng, lat] },
                "properties": {
                    "id": p.id,
                    "address": p.address,
                    "owner_name": p.owner_name,
                    "assessed_value": p.assessed_value,
                    "state": p.state,
                    "county": p.county,
                    "city": record.city,
                    "zip": p.zip,
                    "confidence_score": p.confidence_score,
                    "census_tract": record.census_tract,
                    "federal_data": record.federal_data,
                },
            }))
        })
        .collect();

    json!({ "type": "FeatureCollection", "features": features })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProcessedProperty;
    use chrono::Utc;

    fn record(id: &str, owner: &str, coords: Option<(f64, f64)>) -> EnrichedProperty {
        let mut record = EnrichedProperty::from_processed(ProcessedProperty {
            id: id.to_string(),
            address: "123 MAIN ST".to_string(),
            owner_name: owner.to_string(),
            assessed_value: Some(250_000.0),
            state: "TX".to_string(),
            county: "Travis".to_string(),
            zip: Some("78701".to_string()),
            confidence_score: 100,
            data_source: "https://traviscountytx.gov".to_string(),
            created_at: Utc::now(),
        });
        if let Some((lat, lng)) = coords {
            record.latitude = Some(lat);
            record.longitude = Some(lng);
        }
        record
    }

    #[test]
    fn test_csv_header_and_quoting() {
        let csv = to_csv(&[record("p1", "SMITH, \"JACK\"", None)]);
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), CSV_HEADER.join(","));
        let row = lines.next().unwrap();
        assert!(row.starts_with("\"p1\",\"123 MAIN ST\",\"SMITH, \"\"JACK\"\"\",250000,\"TX\""));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_geojson_only_geocoded_lng_lat() {
        let value = to_geojson(&[
            record("geo", "A LLC", Some((30.27, -97.74))),
            record("plain", "B LLC", None),
        ]);
        assert_eq!(value["type"], "FeatureCollection");
        let features = value["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["geometry"]["coordinates"][0], -97.74);
        assert_eq!(features[0]["geometry"]["coordinates"][1], 30.27);
        assert_eq!(features[0]["properties"]["id"], "geo");
    }

    #[test]
    fn test_json_is_pretty_array() {
        let out = export(&[record("p1", "A LLC", None)], ExportFormat::Json).unwrap();
        assert!(out.starts_with("[\n"));
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed[0]["owner_name"], "A LLC");
    }

    #[test]
    fn test_export_to_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.geojson");
        let written = export_to_file(
            &[record("geo", "A LLC", Some((30.27, -97.74))), record("plain", "B LLC", None)],
            ExportFormat::GeoJson,
            &path,
        )?;
        assert_eq!(written, 1);
        assert!(fs::read_to_string(&path)?.contains("FeatureCollection"));
        Ok(())
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("GeoJSON".parse::<ExportFormat>().unwrap(), ExportFormat::GeoJson);
        assert!(matches!("xml".parse::<ExportFormat>(), Err(ScraperError::UnsupportedFormat(_))));
    }
}
