//! Id-indexed record tables
//!
//! Built once per batch and shared read-only: species lookups during exclusion,
//! candidate filtering and scoring are O(1) FxHashMap hits instead of table scans.

use crate::record::{Record, RecordId};
use rustc_hash::FxHashMap;

/// Records keyed by an id column, iterated in load order
#[derive(Debug, Clone, Default)]
pub struct RecordIndex {
    ids: Vec<RecordId>,
    rows: Vec<Record>,
    index: FxHashMap<RecordId, usize>,
}

impl RecordIndex {
    /// Index `records` by `id_column`
    ///
    /// Rows without a usable id cannot be referenced and are dropped. A repeated id
    /// keeps its first row.
    pub fn from_records(records: impl IntoIterator<Item = Record>, id_column: &str) -> Self {
        let mut out = Self::default();
        let mut dropped = 0usize;

        for record in records {
            let Some(id) = record.id(id_column) else {
                dropped += 1;
                continue;
            };
            if out.index.contains_key(&id) {
                tracing::warn!("Duplicate id {} in column '{}', keeping first row", id, id_column);
                continue;
            }
            out.index.insert(id.clone(), out.rows.len());
            out.ids.push(id);
            out.rows.push(record);
        }

        if dropped > 0 {
            tracing::warn!("Dropped {} rows without a '{}' value", dropped, id_column);
        }

        out
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.index.get(id).map(|&i| &self.rows[i])
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RecordId, &Record)> {
        self.ids.iter().zip(self.rows.iter())
    }

    pub fn ids(&self) -> &[RecordId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
