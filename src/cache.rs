//! Read-only access to an exported snapshot of the rule cache.
//!
//! The snapshot is a JSON object mapping each cache key (the left-hand-side
//! text of a rule) to a record object. Record values may be strings or
//! integers; both are kept as text.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Field holding the replacement text; empty means "not an optimization".
pub const RESULT_FIELD: &str = "result";
/// Presence of this field marks a record with provenance tagging.
pub const TAG_FIELD: &str = "cache-infer-tag";

/// One cache record: field name to value.
pub type Record = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cannot read cache snapshot '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed cache snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FieldValue {
    Text(String),
    Count(u64),
    Signed(i64),
    Flag(bool),
}

impl FieldValue {
    fn into_text(self) -> String {
        match self {
            FieldValue::Text(s) => s,
            FieldValue::Count(n) => n.to_string(),
            FieldValue::Signed(n) => n.to_string(),
            FieldValue::Flag(b) => b.to_string(),
        }
    }
}

/// All records of one cache snapshot, ordered by key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    pub records: BTreeMap<String, Record>,
}

impl CacheSnapshot {
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let text = std::fs::read_to_string(path).map_err(|source| CacheError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, CacheError> {
        let raw: BTreeMap<String, BTreeMap<String, FieldValue>> = serde_json::from_str(text)?;
        let records = raw
            .into_iter()
            .map(|(key, fields)| {
                let record = fields
                    .into_iter()
                    .map(|(name, value)| (name, value.into_text()))
                    .collect();
                (key, record)
            })
            .collect();
        Ok(Self { records })
    }

    pub fn insert(&mut self, key: impl Into<String>, record: Record) {
        self.records.insert(key.into(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
