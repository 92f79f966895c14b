//! Collapse records that describe the same property.

use std::collections::HashMap;

use crate::pipeline::processing::normalize::dedup_key;
use crate::types::EnrichedProperty;

/// Keep one record per normalized `(address, owner)` key.
///
/// An incoming record replaces the kept one only when its confidence is
/// strictly greater, so equal scores keep the first-seen record. The winner
/// carries the union of both records' data sources. Output preserves the
/// order in which keys were first seen.
pub fn deduplicate(records: Vec<EnrichedProperty>) -> Vec<EnrichedProperty> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut kept: Vec<EnrichedProperty> = Vec::with_capacity(records.len());

    for record in records {
        let key = dedup_key(&record.property.address, &record.property.owner_name);
        match index.get(&key) {
            Some(&slot) => {
                let existing = &mut kept[slot];
                if record.property.confidence_score > existing.property.confidence_score {
                    let mut sources = std::mem::take(&mut existing.data_sources);
                    *existing = record;
                    existing.data_sources.append(&mut sources);
                } else {
                    existing.data_sources.extend(record.data_sources);
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(record);
            }
        }
    }

    kept
}
