use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use lazyrow_store::{ConsistencyLevel, SliceRange, Storage};
use tracing::debug;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::iterators;
use crate::key::Key;
use crate::meta::RecordMeta;
use crate::record::Record;

pub fn valid<S: Storage>(records: &[Record<S>]) -> bool {
    records.iter().all(Record::valid)
}

/// Key and missing columns of each invalid record.
pub fn missing<S: Storage>(records: &[Record<S>]) -> Vec<(Option<&Key>, Vec<String>)> {
    records
        .iter()
        .filter_map(|r| {
            let missing = r.missing();
            (!missing.is_empty()).then(|| (r.key(), missing))
        })
        .collect()
}

pub fn modified<S: Storage>(records: &[Record<S>]) -> Vec<&Record<S>> {
    records.iter().filter(|r| r.is_modified()).collect()
}

/// Records indexed by row key, in insertion order.
pub struct RecordSet<S: Storage> {
    records: Vec<Record<S>>,
    positions: HashMap<String, usize>,
}

impl<S: Storage> Default for RecordSet<S> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<S: Storage> RecordSet<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = Record<S>>) -> Result<Self> {
        let mut set = Self::new();
        for record in records {
            set.append(record)?;
        }
        Ok(set)
    }

    /// Add `record`, replacing any record with the same row key.
    pub fn append(&mut self, record: Record<S>) -> Result<()> {
        let row = record.key().ok_or(Error::MissingKey)?.key.clone();
        match self.positions.get(&row) {
            Some(&i) => self.records[i] = record,
            None => {
                self.positions.insert(row, self.records.len());
                self.records.push(record);
            }
        }
        Ok(())
    }

    pub fn get(&self, row: &str) -> Option<&Record<S>> {
        self.positions.get(row).map(|&i| &self.records[i])
    }

    pub fn get_mut(&mut self, row: &str) -> Option<&mut Record<S>> {
        self.positions.get(row).map(|&i| &mut self.records[i])
    }

    pub fn contains(&self, row: &str) -> bool {
        self.positions.contains_key(row)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter_map(|r| r.key().map(|k| k.key.as_str()))
    }

    pub fn values(&self) -> &[Record<S>] {
        &self.records
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Record<S>> {
        self.records.iter_mut()
    }

    /// Save every modified record. Nothing is written unless every one of
    /// them passes the checks its own `save` makes: missing fields are
    /// reported together, any other failure as soon as it is found.
    pub fn save(&mut self, consistency: Option<ConsistencyLevel>) -> Result<()> {
        let mut missing = Vec::new();
        for record in self.records.iter_mut().filter(|r| r.is_modified()) {
            match record.check_save() {
                Ok(_) => {}
                Err(Error::MissingField(names)) => missing.extend(names),
                Err(e) => return Err(e),
            }
        }
        if !missing.is_empty() {
            return Err(Error::MissingField(missing));
        }
        for record in self.records.iter_mut().filter(|r| r.is_modified()) {
            record.save(consistency)?;
        }
        Ok(())
    }
}

/// A [`RecordSet`] loaded from a list of keys in one round trip per column
/// family.
pub struct KeyRecordSet<S: Storage> {
    records: RecordSet<S>,
}

impl<S: Storage> KeyRecordSet<S> {
    /// Rows without columns are left out.
    pub fn load(
        client: &Client<S>,
        meta: &Arc<RecordMeta<S>>,
        keys: &[Key],
        consistency: Option<ConsistencyLevel>,
    ) -> Result<Self> {
        let consistency = client.consistency(consistency, meta.consistency);
        let range = SliceRange::new("", "", client.config().slice_count);
        let mut grouped = iterators::multiget(client, keys, consistency, range)?;

        let mut records = RecordSet::new();
        for key in keys {
            let columns = grouped
                .get_mut(&key.keyspace)
                .and_then(|families| families.get_mut(&key.column_family))
                .and_then(|rows| rows.remove(&key.key))
                .unwrap_or_default();
            if columns.is_empty() {
                continue;
            }
            let mut record = Record::new(client.clone(), Arc::clone(meta));
            record.inject(key.clone(), columns);
            records.append(record)?;
        }
        debug!(requested = keys.len(), loaded = records.len(), "loaded record set");
        Ok(Self { records })
    }

    pub fn into_inner(self) -> RecordSet<S> {
        self.records
    }
}

impl<S: Storage> Deref for KeyRecordSet<S> {
    type Target = RecordSet<S>;

    fn deref(&self) -> &RecordSet<S> {
        &self.records
    }
}

impl<S: Storage> DerefMut for KeyRecordSet<S> {
    fn deref_mut(&mut self) -> &mut RecordSet<S> {
        &mut self.records
    }
}
