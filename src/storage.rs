use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::error::{Result, ScraperError};
use crate::pipeline::processing::normalize::{dedup_key, normalize_key};
use crate::types::{DataSource, EnrichedProperty};

pub const DEFAULT_SEARCH_LIMIT: usize = 100;

/// Property search criteria. Every field is optional; string matches are
/// case-insensitive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    pub state: Option<String>,
    pub county: Option<String>,
    pub zip: Option<String>,
    pub owner_contains: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_confidence: Option<u8>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl SearchFilters {
    pub fn matches(&self, record: &EnrichedProperty) -> bool {
        let p = &record.property;
        if let Some(state) = &self.state {
            if !p.state.eq_ignore_ascii_case(state.trim()) {
                return false;
            }
        }
        if let Some(county) = &self.county {
            if normalize_key(&p.county) != normalize_key(county) {
                return false;
            }
        }
        if let Some(zip) = &self.zip {
            if !p.zip.as_deref().is_some_and(|z| z.starts_with(zip.trim())) {
                return false;
            }
        }
        if let Some(owner) = &self.owner_contains {
            if !normalize_key(&p.owner_name).contains(&normalize_key(owner)) {
                return false;
            }
        }
        if let Some(min) = self.min_value {
            if !p.assessed_value.is_some_and(|v| v >= min) {
                return false;
            }
        }
        if let Some(max) = self.max_value {
            if !p.assessed_value.is_some_and(|v| v <= max) {
                return false;
            }
        }
        if let Some(min) = self.min_confidence {
            if p.confidence_score < min {
                return false;
            }
        }
        true
    }
}

/// Storage for pipeline output consumed by the query surface.
#[async_trait]
pub trait PropertyStore: Send + Sync {
    /// Merge records by deduplication key; a stored record is replaced only
    /// by one with strictly greater confidence. Returns the number of new keys.
    async fn upsert_properties(&self, records: &[EnrichedProperty]) -> Result<usize>;
    async fn get_property(&self, id: &str) -> Result<Option<EnrichedProperty>>;
    /// Matching records in insertion order, paged. Returns the total match count
    /// alongside the page.
    async fn search(&self, filters: &SearchFilters) -> Result<(usize, Vec<EnrichedProperty>)>;
    async fn all_properties(&self) -> Result<Vec<EnrichedProperty>>;

    async fn upsert_sources(&self, sources: &[DataSource]) -> Result<()>;
    async fn list_sources(&self) -> Result<Vec<DataSource>>;
}

#[derive(Default)]
struct PropertyTable {
    order: Vec<String>,
    by_key: HashMap<String, EnrichedProperty>,
    key_by_id: HashMap<String, String>,
}

/// In-memory storage implementation for development/testing
#[derive(Default)]
pub struct InMemoryStorage {
    properties: Arc<Mutex<PropertyTable>>,
    sources: Arc<Mutex<Vec<DataSource>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| ScraperError::Storage("lock poisoned".to_string()))
}

#[async_trait]
impl PropertyStore for InMemoryStorage {
    async fn upsert_properties(&self, records: &[EnrichedProperty]) -> Result<usize> {
        let mut guard = lock(&self.properties)?;
        let table = &mut *guard;
        let mut inserted = 0;

        for record in records {
            let key = dedup_key(&record.property.address, &record.property.owner_name);
            match table.by_key.get_mut(&key) {
                Some(existing) => {
                    if record.property.confidence_score > existing.property.confidence_score {
                        let mut merged = record.clone();
                        merged.data_sources.extend(existing.data_sources.iter().cloned());
                        let old_id = std::mem::replace(existing, merged).property.id;
                        table.key_by_id.remove(&old_id);
                        table.key_by_id.insert(record.property.id.clone(), key);
                    } else {
                        existing.data_sources.extend(record.data_sources.iter().cloned());
                    }
                }
                None => {
                    table.key_by_id.insert(record.property.id.clone(), key.clone());
                    table.order.push(key.clone());
                    table.by_key.insert(key, record.clone());
                    inserted += 1;
                }
            }
        }

        debug!(incoming = records.len(), inserted, "Stored properties");
        Ok(inserted)
    }

    async fn get_property(&self, id: &str) -> Result<Option<EnrichedProperty>> {
        let table = lock(&self.properties)?;
        Ok(table
            .key_by_id
            .get(id)
            .and_then(|key| table.by_key.get(key))
            .cloned())
    }

    async fn search(&self, filters: &SearchFilters) -> Result<(usize, Vec<EnrichedProperty>)> {
        let table = lock(&self.properties)?;
        let matching: Vec<&EnrichedProperty> = table
            .order
            .iter()
            .filter_map(|key| table.by_key.get(key))
            .filter(|record| filters.matches(record))
            .collect();
        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(filters.offset.unwrap_or(0))
            .take(filters.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
            .cloned()
            .collect();
        Ok((total, page))
    }

    async fn all_properties(&self) -> Result<Vec<EnrichedProperty>> {
        let table = lock(&self.properties)?;
        Ok(table
            .order
            .iter()
            .filter_map(|key| table.by_key.get(key))
            .cloned()
            .collect())
    }

    async fn upsert_sources(&self, sources: &[DataSource]) -> Result<()> {
        let mut stored = lock(&self.sources)?;
        for source in sources {
            match stored.iter().position(|s| s.id == source.id) {
                Some(i) => stored[i] = source.clone(),
                None => stored.push(source.clone()),
            }
        }
        Ok(())
    }

    async fn list_sources(&self) -> Result<Vec<DataSource>> {
        Ok(lock(&self.sources)?.clone())
    }
}
