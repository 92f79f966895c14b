//! Layout-agnostic content classification.
//!
//! Source layouts differ per jurisdiction and are unknown up front, so
//! classifiers never assume column positions. They walk generic structures
//! (table rows, list items, JSON objects, CSV records), label each fragment as
//! address-like, owner-like or value-like, and assemble one candidate per
//! structure.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::constants::{state_code_for_name, ENTITY_SUFFIXES};
use crate::pipeline::processing::normalize::{
    clean_text, matches_street_grammar, parse_currency, standardize_address,
};
use crate::types::{RawCandidate, SourceMethod};

/// Values below this without a currency marker are treated as incidental numbers.
const MIN_BARE_VALUE: f64 = 10_000.0;

static ZIP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{5}(?:-\d{4})?$").expect("zip pattern is a valid regex"));

static LAST_FIRST_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z'\-]+,\s*[A-Za-z][A-Za-z'\-]+(?:\s+[A-Za-z]\.?)*(?:\s*&\s*[A-Za-z][A-Za-z'\-]+)?$")
        .expect("owner pattern is a valid regex")
});

static ADDRESS_WITH_ZIP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<street>.+?)(?:,\s*[A-Za-z .]+)?(?:,\s*(?P<state>[A-Za-z]{2}))?\s+(?P<zip>\d{5}(?:-\d{4})?)$")
        .expect("address pattern is a valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Address,
    Owner,
    Value,
    Zip,
    State,
    Other,
}

/// Per-source context the classifier cannot see in the content.
#[derive(Debug, Clone)]
pub struct ClassificationContext {
    pub source_url: String,
    pub state: Option<String>,
    pub county: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl ClassificationContext {
    fn empty_candidate(&self) -> RawCandidate {
        RawCandidate {
            source_url: self.source_url.clone(),
            fetched_at: self.fetched_at,
            ..RawCandidate::default()
        }
    }
}

pub trait ContentClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the content has the generic shape of a record listing.
    fn looks_structured(&self, content: &str) -> bool;

    fn classify(&self, content: &str, context: &ClassificationContext) -> Vec<RawCandidate>;
}

pub trait ClassifierFactory: Send + Sync {
    fn for_method(&self, method: SourceMethod) -> Arc<dyn ContentClassifier>;
}

/// Maps each source method to its classifier; individual entries can be replaced.
pub struct DefaultClassifierFactory {
    overrides: HashMap<SourceMethod, Arc<dyn ContentClassifier>>,
}

impl Default for DefaultClassifierFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultClassifierFactory {
    pub fn new() -> Self {
        Self {
            overrides: HashMap::new(),
        }
    }

    pub fn with_classifier(
        mut self,
        method: SourceMethod,
        classifier: Arc<dyn ContentClassifier>,
    ) -> Self {
        self.overrides.insert(method, classifier);
        self
    }
}

impl ClassifierFactory for DefaultClassifierFactory {
    fn for_method(&self, method: SourceMethod) -> Arc<dyn ContentClassifier> {
        if let Some(classifier) = self.overrides.get(&method) {
            return classifier.clone();
        }
        match method {
            SourceMethod::Scraper => Arc::new(TableHeuristicClassifier),
            SourceMethod::Api => Arc::new(ApiJsonClassifier),
            SourceMethod::Csv => Arc::new(CsvClassifier),
        }
    }
}

fn is_entity_owner(upper: &str) -> bool {
    let tokens: Vec<&str> = upper
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.len() < 2 {
        return false;
    }
    ENTITY_SUFFIXES.iter().any(|suffix| {
        let suffix_tokens: Vec<&str> = suffix.split_whitespace().collect();
        tokens.ends_with(&suffix_tokens)
    })
}

/// Label a single text fragment.
pub fn classify_fragment(text: &str) -> FragmentKind {
    let text = clean_text(text);
    if text.is_empty() || text.len() > 200 {
        return FragmentKind::Other;
    }
    if ZIP_PATTERN.is_match(&text) {
        return FragmentKind::Zip;
    }
    if text.len() == 2 && state_code_for_name(&text).is_some() {
        return FragmentKind::State;
    }
    if text.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        let street = ADDRESS_WITH_ZIP
            .captures(&text)
            .and_then(|c| c.name("street"))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| text.split(',').next().unwrap_or(&text).to_string());
        if matches_street_grammar(&standardize_address(&street)) {
            return FragmentKind::Address;
        }
    }
    if let Some(value) = parse_currency(&text) {
        if text.contains('$') || text.contains(',') || value >= MIN_BARE_VALUE {
            return FragmentKind::Value;
        }
    }
    let upper = text.to_uppercase();
    if is_entity_owner(&upper) || is_last_first_name(&text) {
        return FragmentKind::Owner;
    }
    FragmentKind::Other
}

/// "LAST, FIRST" owner form. "Austin, TX" and "Austin, Texas" are places.
fn is_last_first_name(text: &str) -> bool {
    if !LAST_FIRST_PATTERN.is_match(text) {
        return false;
    }
    let given = text.split_once(',').map_or("", |(_, g)| g.trim());
    let names_state = if given.len() == 2 {
        given.chars().all(|c| c.is_ascii_uppercase()) && state_code_for_name(given).is_some()
    } else {
        state_code_for_name(given).is_some()
    };
    !names_state
}

/// Column role suggested by a header label.
fn header_hint(label: &str) -> Option<FragmentKind> {
    let lower = label.to_lowercase();
    if lower.contains("owner") || lower.contains("taxpayer") || lower.contains("grantee") {
        Some(FragmentKind::Owner)
    } else if lower.contains("address") || lower.contains("situs") || lower.contains("location")
    {
        Some(FragmentKind::Address)
    } else if lower.contains("value") || lower.contains("assess") || lower.contains("apprais") {
        Some(FragmentKind::Value)
    } else if lower.contains("zip") || lower.contains("postal") {
        Some(FragmentKind::Zip)
    } else if lower == "state" || lower == "st" {
        Some(FragmentKind::State)
    } else {
        None
    }
}

/// Fold labelled fragments into one candidate. Returns `None` when the
/// fragments carry neither an address nor an owner.
fn assemble(
    fragments: &[(String, Option<FragmentKind>)],
    context: &ClassificationContext,
) -> Option<RawCandidate> {
    let mut candidate = context.empty_candidate();

    for (text, hint) in fragments {
        let text = clean_text(text);
        if text.is_empty() {
            continue;
        }
        let mut kind = classify_fragment(&text);
        if kind == FragmentKind::Other {
            kind = match hint {
                // A header alone cannot make "see map" an address
                Some(FragmentKind::Address) if !text.chars().any(|c| c.is_ascii_digit()) => {
                    FragmentKind::Other
                }
                Some(h) => *h,
                None => FragmentKind::Other,
            };
        }
        match kind {
            FragmentKind::Address if candidate.address.is_none() => {
                if let Some(caps) = ADDRESS_WITH_ZIP.captures(&text) {
                    candidate.address = caps.name("street").map(|m| m.as_str().trim().to_string());
                    if candidate.zip.is_none() {
                        candidate.zip = caps.name("zip").map(|m| m.as_str().to_string());
                    }
                    if candidate.state.is_none() {
                        candidate.state = caps
                            .name("state")
                            .and_then(|m| state_code_for_name(m.as_str()))
                            .map(|s| s.to_string());
                    }
                } else {
                    candidate.address = Some(text);
                }
            }
            FragmentKind::Owner if candidate.owner.is_none() => candidate.owner = Some(text),
            FragmentKind::Value if candidate.value.is_none() => {
                candidate.value = parse_currency(&text)
            }
            FragmentKind::Zip if candidate.zip.is_none() => candidate.zip = Some(text),
            FragmentKind::State if candidate.state.is_none() => {
                candidate.state = state_code_for_name(&text).map(|s| s.to_string())
            }
            _ => {}
        }
    }

    if candidate.address.is_none() && candidate.owner.is_none() {
        return None;
    }
    if candidate.state.is_none() {
        candidate.state = context.state.clone();
    }
    if candidate.county.is_none() {
        candidate.county = context.county.clone();
    }
    Some(candidate)
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static TABLE_ROWS: Lazy<Selector> = Lazy::new(|| selector("table tr"));
static ROW_CELLS: Lazy<Selector> = Lazy::new(|| selector("td, th"));
static HEADER_CELLS: Lazy<Selector> = Lazy::new(|| selector("th"));
static LIST_ITEMS: Lazy<Selector> = Lazy::new(|| selector("ul > li, ol > li"));
static RECORD_CARDS: Lazy<Selector> = Lazy::new(|| {
    selector(r#"div[class*="property"], div[class*="parcel"], div[class*="result"], div[class*="record"]"#)
});

fn element_text(element: &ElementRef) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

/// HTML pages: table rows, list items and repeated record cards.
pub struct TableHeuristicClassifier;

impl TableHeuristicClassifier {
    fn split_fragments(text: &str) -> Vec<(String, Option<FragmentKind>)> {
        text.split(['|', ';', '\n', '•'])
            .flat_map(|part| part.split(" - "))
            .map(|s| (s.trim().to_string(), None))
            .filter(|(s, _)| !s.is_empty())
            .collect()
    }
}

impl ContentClassifier for TableHeuristicClassifier {
    fn name(&self) -> &'static str {
        "table_heuristic"
    }

    fn looks_structured(&self, content: &str) -> bool {
        let document = Html::parse_document(content);
        let rows = document.select(&TABLE_ROWS).count();
        let items = document.select(&LIST_ITEMS).count();
        let cards = document.select(&RECORD_CARDS).count();
        rows >= 2 || items >= 3 || cards >= 3
    }

    fn classify(&self, content: &str, context: &ClassificationContext) -> Vec<RawCandidate> {
        let document = Html::parse_document(content);
        let mut candidates = Vec::new();
        let mut hints: Vec<Option<FragmentKind>> = Vec::new();

        for row in document.select(&TABLE_ROWS) {
            let header_cells: Vec<String> =
                row.select(&HEADER_CELLS).map(|c| element_text(&c)).collect();
            let cells: Vec<String> = row.select(&ROW_CELLS).map(|c| element_text(&c)).collect();
            if !header_cells.is_empty() && header_cells.len() == cells.len() {
                hints = header_cells.iter().map(|h| header_hint(h)).collect();
                continue;
            }
            let fragments: Vec<(String, Option<FragmentKind>)> = cells
                .into_iter()
                .enumerate()
                .map(|(i, text)| (text, hints.get(i).copied().flatten()))
                .collect();
            if let Some(candidate) = assemble(&fragments, context) {
                candidates.push(candidate);
            }
        }

        for item in document
            .select(&LIST_ITEMS)
            .chain(document.select(&RECORD_CARDS))
        {
            // Cards nested in a table were already covered by the row pass
            if item.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| e.name() == "table")
            }) {
                continue;
            }
            let pieces: Vec<String> = item
                .text()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            let fragments: Vec<(String, Option<FragmentKind>)> = pieces
                .iter()
                .flat_map(|p| Self::split_fragments(p))
                .collect();
            if let Some(candidate) = assemble(&fragments, context) {
                candidates.push(candidate);
            }
        }

        candidates
    }
}

/// JSON APIs: any array of objects, including ArcGIS `features[].attributes`.
pub struct ApiJsonClassifier;

impl ApiJsonClassifier {
    const MAX_DEPTH: usize = 6;

    fn collect_objects<'a>(value: &'a Value, depth: usize, out: &mut Vec<&'a serde_json::Map<String, Value>>) {
        if depth > Self::MAX_DEPTH {
            return;
        }
        match value {
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::Object(map) => {
                            if let Some(Value::Object(attrs)) = map.get("attributes") {
                                out.push(attrs);
                            } else if map.values().any(|v| !v.is_object() && !v.is_array()) {
                                out.push(map);
                            } else {
                                Self::collect_objects(item, depth + 1, out);
                            }
                        }
                        other => Self::collect_objects(other, depth + 1, out),
                    }
                }
            }
            Value::Object(map) => {
                for v in map.values() {
                    Self::collect_objects(v, depth + 1, out);
                }
            }
            _ => {}
        }
    }

    fn scalar_text(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl ContentClassifier for ApiJsonClassifier {
    fn name(&self) -> &'static str {
        "api_json"
    }

    fn looks_structured(&self, content: &str) -> bool {
        let Ok(value) = serde_json::from_str::<Value>(content) else {
            return false;
        };
        let mut objects = Vec::new();
        Self::collect_objects(&value, 0, &mut objects);
        !objects.is_empty()
    }

    fn classify(&self, content: &str, context: &ClassificationContext) -> Vec<RawCandidate> {
        let Ok(value) = serde_json::from_str::<Value>(content) else {
            return Vec::new();
        };
        let mut objects = Vec::new();
        Self::collect_objects(&value, 0, &mut objects);

        objects
            .into_iter()
            .filter_map(|map| {
                let mut county = None;
                let mut fragments = Vec::new();
                for (key, v) in map {
                    let Some(text) = Self::scalar_text(v) else { continue };
                    if key.to_lowercase().contains("county") {
                        county = Some(clean_text(&text));
                        continue;
                    }
                    // Numbers under a value-ish key are values even without "$"
                    let hint = header_hint(key);
                    if hint == Some(FragmentKind::Value) && v.is_number() {
                        fragments.insert(0, (format!("${}", text), hint));
                    } else {
                        fragments.push((text, hint));
                    }
                }
                let mut candidate = assemble(&fragments, context)?;
                if county.is_some() {
                    candidate.county = county;
                }
                Some(candidate)
            })
            .collect()
    }
}

/// Delimited text with a header row.
pub struct CsvClassifier;

impl CsvClassifier {
    /// Split delimited text into records. Double-quoted fields may hold
    /// commas, doubled quotes and line breaks; blank lines are skipped.
    pub fn rows(content: &str) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        let mut fields = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut chars = content.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '"' if in_quotes && chars.peek() == Some(&'"') => {
                    current.push('"');
                    chars.next();
                }
                '"' => in_quotes = !in_quotes,
                ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
                '\r' if !in_quotes => {}
                '\n' if !in_quotes => {
                    fields.push(std::mem::take(&mut current));
                    Self::push_record(&mut rows, std::mem::take(&mut fields));
                }
                _ => current.push(c),
            }
        }
        fields.push(current);
        Self::push_record(&mut rows, fields);
        rows
    }

    fn push_record(rows: &mut Vec<Vec<String>>, fields: Vec<String>) {
        let fields: Vec<String> = fields.into_iter().map(|f| f.trim().to_string()).collect();
        if fields.iter().any(|f| !f.is_empty()) {
            rows.push(fields);
        }
    }
}

impl ContentClassifier for CsvClassifier {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn looks_structured(&self, content: &str) -> bool {
        let rows = Self::rows(content);
        let Some(header) = rows.first() else { return false };
        header.len() >= 2 && rows.iter().skip(1).any(|r| r.len() == header.len())
    }

    fn classify(&self, content: &str, context: &ClassificationContext) -> Vec<RawCandidate> {
        let rows = Self::rows(content);
        let Some((header, records)) = rows.split_first() else {
            return Vec::new();
        };
        let hints: Vec<Option<FragmentKind>> = header.iter().map(|h| header_hint(h)).collect();
        let county_col = header.iter().position(|h| h.to_lowercase().contains("county"));

        records
            .iter()
            .filter(|record| record.len() == header.len())
            .filter_map(|record| {
                let fragments: Vec<(String, Option<FragmentKind>)> = record
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| Some(*i) != county_col)
                    .map(|(i, text)| (text.clone(), hints.get(i).copied().flatten()))
                    .collect();
                let mut candidate = assemble(&fragments, context)?;
                if let Some(county) = county_col
                    .and_then(|i| record.get(i))
                    .filter(|c| !c.is_empty())
                {
                    candidate.county = Some(county.clone());
                }
                Some(candidate)
            })
            .collect()
    }
}
