use std::sync::Arc;

use lazyrow_store::{ConsistencyLevel, Storage, StoreError};
use tracing::debug;

use crate::client::Client;
use crate::clock;
use crate::error::{Error, Result};
use crate::iterators::Pages;
use crate::key::Key;
use crate::meta::{Index, RecordMeta};
use crate::record::Record;

/// A row listing other records.
///
/// Each column is named `"{timestamp}.{record key}"` and holds the record
/// key, so the row reads back in append order.
pub struct View<S: Storage> {
    client: Client<S>,
    key: Key,
    record_key: Key,
    chunk_size: usize,
    consistency: Option<ConsistencyLevel>,
}

impl<S: Storage> View<S> {
    /// `key` is the view's own row; listed keys are derived from `record_key`.
    pub fn new(client: Client<S>, key: Key, record_key: Key) -> Self {
        let chunk_size = client.config().view_chunk_size;
        Self {
            client,
            key,
            record_key,
            chunk_size,
            consistency: None,
        }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = Some(consistency);
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    fn resolve_consistency(&self) -> ConsistencyLevel {
        self.client.consistency(None, self.consistency)
    }

    /// Keys of the listed records, paged.
    pub fn keys(&self) -> impl Iterator<Item = Result<Key>> + use<S> {
        let record_key = self.record_key.clone();
        Pages::new(
            self.client.clone(),
            &self.key,
            self.resolve_consistency(),
            self.chunk_size,
        )
        .map(move |entry| {
            let column = entry?.into_column().ok_or_else(|| {
                Error::Store(StoreError::InvalidRequest(
                    "view rows hold plain columns".into(),
                ))
            })?;
            Ok(record_key.with_key(String::from_utf8_lossy(&column.value)))
        })
    }

    /// Load each listed record with `meta`.
    pub fn records(&self, meta: Arc<RecordMeta<S>>) -> impl Iterator<Item = Result<Record<S>>> + use<S> {
        let client = self.client.clone();
        let consistency = self.consistency;
        self.keys().map(move |key| {
            let mut record = Record::new(client.clone(), Arc::clone(&meta));
            record.load(key?, consistency)?;
            Ok(record)
        })
    }
}

impl<S: Storage> Index<S> for View<S> {
    fn append(&self, record: &Record<S>) -> Result<()> {
        let record_key = record.key().ok_or(Error::MissingKey)?;
        let timestamp = clock::timestamp();
        let column = format!("{timestamp}.{}", record_key.key);
        debug!(view = %self.key, column = %column, "appending to view");
        self.client.storage().insert(
            &self.key.keyspace,
            &self.key.key,
            &self.key.get_path(Some(column.as_str())),
            record_key.key.as_bytes(),
            timestamp,
            self.resolve_consistency(),
        )?;
        Ok(())
    }
}

type PartitionKeys = Box<dyn Fn() -> Vec<String>>;
type AppendPartition<S> = Box<dyn Fn(&Record<S>) -> Option<String>>;

/// A view spread over several rows, one per partition key.
pub struct PartitionedView<S: Storage> {
    client: Client<S>,
    view_key: Key,
    record_key: Key,
    partition_keys: PartitionKeys,
    append_partition: Option<AppendPartition<S>>,
    chunk_size: Option<usize>,
}

impl<S: Storage> PartitionedView<S> {
    /// Partition rows are `view_key` with its row key replaced by each of
    /// `partition_keys()`, in that order.
    pub fn new(
        client: Client<S>,
        view_key: Key,
        record_key: Key,
        partition_keys: impl Fn() -> Vec<String> + 'static,
    ) -> Self {
        Self {
            client,
            view_key,
            record_key,
            partition_keys: Box::new(partition_keys),
            append_partition: None,
            chunk_size: None,
        }
    }

    /// Choose the partition a record is appended to. Without this, or when
    /// it returns `None`, the first partition is used.
    pub fn append_partition(mut self, f: impl Fn(&Record<S>) -> Option<String> + 'static) -> Self {
        self.append_partition = Some(Box::new(f));
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn view(&self, partition: &str) -> View<S> {
        let view = View::new(
            self.client.clone(),
            self.view_key.with_key(partition),
            self.record_key.clone(),
        );
        match self.chunk_size {
            Some(n) => view.chunk_size(n),
            None => view,
        }
    }

    /// Keys across every partition.
    pub fn keys(&self) -> impl Iterator<Item = Result<Key>> + '_ {
        (self.partition_keys)()
            .into_iter()
            .flat_map(|partition| self.view(&partition).keys())
    }

    pub fn records(&self, meta: Arc<RecordMeta<S>>) -> impl Iterator<Item = Result<Record<S>>> + '_ {
        (self.partition_keys)()
            .into_iter()
            .flat_map(move |partition| self.view(&partition).records(Arc::clone(&meta)))
    }
}

impl<S: Storage> Index<S> for PartitionedView<S> {
    fn append(&self, record: &Record<S>) -> Result<()> {
        let chosen = self.append_partition.as_ref().and_then(|f| f(record));
        let partition = match chosen {
            Some(p) => p,
            None => (self.partition_keys)()
                .into_iter()
                .next()
                .ok_or_else(|| Error::IncompleteKey("partitioned view has no partitions".into()))?,
        };
        self.view(&partition).append(record)
    }
}
