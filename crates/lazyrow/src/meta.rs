use std::fmt;
use std::sync::Arc;

use lazyrow_store::{Column, ConsistencyLevel, Storage};

use crate::error::{Error, Result};
use crate::key::Key;
use crate::record::Record;
use crate::schema::FieldTable;

/// A denormalized copy of a record, saved with the same diff under a
/// different key.
pub trait Mirror<S: Storage> {
    fn mirror_key(&self, record: &Record<S>) -> Result<Key>;
}

/// Secondary lookup structure a saved record is appended to.
pub trait Index<S: Storage> {
    fn append(&self, record: &Record<S>) -> Result<()>;
}

/// Runs around `Record::load`.
pub trait LoadHook<S: Storage> {
    /// Sees the fetched columns before they are ingested.
    fn pre_load(&self, _key: &Key, _columns: &mut Vec<Column>) {}

    fn post_load(&self, _record: &Record<S>) {}
}

type DefaultKey<S> = Box<dyn Fn(&Record<S>) -> Result<Key>>;

/// Static configuration shared by every record of one kind.
pub struct RecordMeta<S: Storage> {
    pub keyspace: String,
    pub column_family: String,
    pub required: Vec<String>,
    pub consistency: Option<ConsistencyLevel>,
    pub read_only: bool,
    pub(crate) default_key: Option<DefaultKey<S>>,
    pub(crate) mirrors: Vec<Arc<dyn Mirror<S>>>,
    pub(crate) indexes: Vec<Arc<dyn Index<S>>>,
    pub(crate) hooks: Vec<Arc<dyn LoadHook<S>>>,
    pub(crate) schema: Option<Arc<FieldTable>>,
}

impl<S: Storage> RecordMeta<S> {
    pub fn builder(keyspace: impl Into<String>, column_family: impl Into<String>) -> RecordMetaBuilder<S> {
        RecordMetaBuilder {
            meta: RecordMeta {
                keyspace: keyspace.into(),
                column_family: column_family.into(),
                required: Vec::new(),
                consistency: None,
                read_only: false,
                default_key: None,
                mirrors: Vec::new(),
                indexes: Vec::new(),
                hooks: Vec::new(),
                schema: None,
            },
        }
    }

    pub fn schema(&self) -> Option<&FieldTable> {
        self.schema.as_deref()
    }

    pub(crate) fn default_key(&self, record: &Record<S>) -> Result<Key> {
        match &self.default_key {
            Some(f) => f(record),
            None => Err(Error::MissingKey),
        }
    }

    /// Every column that must be present before a save.
    pub(crate) fn required_columns(&self) -> impl Iterator<Item = &str> {
        let from_schema = self
            .schema
            .iter()
            .flat_map(|schema| schema.required_columns());
        self.required.iter().map(String::as_str).chain(from_schema)
    }
}

impl<S: Storage> fmt::Debug for RecordMeta<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordMeta")
            .field("keyspace", &self.keyspace)
            .field("column_family", &self.column_family)
            .field("required", &self.required)
            .field("consistency", &self.consistency)
            .field("read_only", &self.read_only)
            .field("mirrors", &self.mirrors.len())
            .field("indexes", &self.indexes.len())
            .finish_non_exhaustive()
    }
}

pub struct RecordMetaBuilder<S: Storage> {
    meta: RecordMeta<S>,
}

impl<S: Storage> RecordMetaBuilder<S> {
    pub fn required<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.meta.required.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.meta.consistency = Some(consistency);
        self
    }

    /// Records built from this meta refuse to save.
    pub fn read_only(mut self) -> Self {
        self.meta.read_only = true;
        self
    }

    /// Supplies a key for records saved without one.
    pub fn default_key(mut self, f: impl Fn(&Record<S>) -> Result<Key> + 'static) -> Self {
        self.meta.default_key = Some(Box::new(f));
        self
    }

    pub fn mirror(mut self, mirror: Arc<dyn Mirror<S>>) -> Self {
        self.meta.mirrors.push(mirror);
        self
    }

    pub fn index(mut self, index: Arc<dyn Index<S>>) -> Self {
        self.meta.indexes.push(index);
        self
    }

    pub fn hook(mut self, hook: Arc<dyn LoadHook<S>>) -> Self {
        self.meta.hooks.push(hook);
        self
    }

    pub fn schema(mut self, schema: FieldTable) -> Self {
        self.meta.schema = Some(Arc::new(schema));
        self
    }

    pub fn build(self) -> Arc<RecordMeta<S>> {
        Arc::new(self.meta)
    }
}
