use std::ops::Range;

use lazyrow_store::{Column, ConsistencyLevel, SlicePredicate, SliceRange, Storage};

use crate::client::Client;
use crate::error::Result;
use crate::iterators;
use crate::key::Key;

/// Read-only positional access to one row's columns, in name order.
///
/// Nothing is held locally; every call reads the store.
pub struct Array<S: Storage> {
    client: Client<S>,
    key: Key,
    consistency: Option<ConsistencyLevel>,
}

impl<S: Storage> Array<S> {
    pub fn new(client: Client<S>, key: Key) -> Self {
        Self {
            client,
            key,
            consistency: None,
        }
    }

    pub fn consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = Some(consistency);
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    fn materialize(&self, count: usize, reversed: bool) -> Result<Vec<Column>> {
        let range = SliceRange::new("", "", count).reversed(reversed);
        let entries = self.client.storage().get_slice(
            &self.key.keyspace,
            &self.key.key,
            &self.key.get_parent(),
            &SlicePredicate::Range(range),
            self.client.consistency(None, self.consistency),
        )?;
        Ok(iterators::unpack(entries).collect())
    }

    /// The column at position `index`, if the row is that long.
    pub fn get(&self, index: usize) -> Result<Option<Column>> {
        Ok(self
            .materialize(index.saturating_add(1), false)?
            .into_iter()
            .nth(index))
    }

    pub fn range(&self, range: Range<usize>) -> Result<Vec<Column>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .materialize(range.end, false)?
            .into_iter()
            .skip(range.start)
            .collect())
    }

    pub fn iter(&self) -> Result<std::vec::IntoIter<Column>> {
        Ok(self
            .materialize(self.client.config().slice_count, false)?
            .into_iter())
    }

    pub fn iter_rev(&self) -> Result<std::vec::IntoIter<Column>> {
        Ok(self
            .materialize(self.client.config().slice_count, true)?
            .into_iter())
    }

    /// Column count, as the store reports it.
    pub fn len(&self) -> Result<usize> {
        Ok(self.client.storage().get_count(
            &self.key.keyspace,
            &self.key.key,
            &self.key.get_parent(),
            self.client.consistency(None, self.consistency),
        )?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
