use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use lazyrow_store::{
    Column, ColumnPath, ConsistencyLevel, Mutation, SliceRange, Storage, SuperColumn,
};
use tracing::{debug, warn};

use crate::client::Client;
use crate::clock;
use crate::error::{Error, Result};
use crate::iterators;
use crate::key::Key;
use crate::meta::RecordMeta;
use crate::value::Value;

/// The pending changes of a record: columns to write and paths to tombstone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub changed: Vec<Column>,
    pub deleted: Vec<ColumnPath>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }
}

/// One row's columns, tracked against the state last loaded or saved.
///
/// `original` is never mutated in place. Columns in `current` share their
/// allocation with `original` until first written, at which point they are
/// copied, so the two are never aliased for a modified name.
pub struct Record<S: Storage> {
    client: Client<S>,
    meta: Arc<RecordMeta<S>>,
    key: Option<Key>,
    original: HashMap<String, Arc<Column>>,
    current: BTreeMap<String, Arc<Column>>,
    modified: BTreeSet<String>,
    deleted: BTreeSet<String>,
    consistency: Option<ConsistencyLevel>,
}

impl<S: Storage> Record<S> {
    pub fn new(client: Client<S>, meta: Arc<RecordMeta<S>>) -> Self {
        Self {
            client,
            meta,
            key: None,
            original: HashMap::new(),
            current: BTreeMap::new(),
            modified: BTreeSet::new(),
            deleted: BTreeSet::new(),
            consistency: None,
        }
    }

    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = Some(consistency);
        self
    }

    pub fn client(&self) -> &Client<S> {
        &self.client
    }

    pub fn meta(&self) -> &Arc<RecordMeta<S>> {
        &self.meta
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// Set through [`RecordMetaBuilder::read_only`](crate::meta::RecordMetaBuilder::read_only).
    pub fn is_read_only(&self) -> bool {
        self.meta.read_only
    }

    // ── Keys ────────────────────────────────────────────────

    /// A key in this record's keyspace and column family.
    pub fn make_key(&self, row: Option<&str>, super_column: Option<&str>) -> Result<Key> {
        Key::make(
            self.meta.keyspace.as_str(),
            self.meta.column_family.as_str(),
            row,
            super_column,
            None,
        )
    }

    pub fn set_key(&mut self, row: &str, super_column: Option<&str>) -> Result<&mut Self> {
        self.key = Some(self.make_key(Some(row), super_column)?);
        Ok(self)
    }

    pub fn replace_key(&mut self, key: Key) -> &mut Self {
        self.key = Some(key);
        self
    }

    // ── Column access ───────────────────────────────────────

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.current.get(name).map(|c| c.value.as_slice())
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.current.get(name).and_then(|c| c.value_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.current.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.current.keys().map(String::as_str)
    }

    pub fn items(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.current
            .iter()
            .map(|(name, c)| (name.as_str(), c.value.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn original_column(&self, name: &str) -> Option<&Arc<Column>> {
        self.original.get(name)
    }

    pub fn current_column(&self, name: &str) -> Option<&Arc<Column>> {
        self.current.get(name)
    }

    /// Stage `value` for `name`.
    ///
    /// Setting a column back to its persisted value drops the pending change
    /// instead of recording a write.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let Some(value) = value.into().into_bytes() else {
            return Err(Error::InvalidValue(name.to_string()));
        };

        let original = self.original.get(name);
        if let Some(orig) = original.filter(|orig| orig.value == value) {
            self.current.insert(name.to_string(), Arc::clone(orig));
            self.modified.remove(name);
            self.deleted.remove(name);
            return Ok(());
        }

        self.deleted.remove(name);
        let entry = self
            .current
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Column::named(name)));
        if let Some(orig) = original {
            if Arc::ptr_eq(entry, orig) {
                *entry = Arc::new(Column::clone(orig));
            }
        }
        debug_assert!(
            original.is_none_or(|orig| !Arc::ptr_eq(entry, orig)),
            "column {name} still aliases its original"
        );

        let column = Arc::make_mut(entry);
        column.value = value;
        column.timestamp = clock::timestamp();
        self.modified.insert(name.to_string());
        Ok(())
    }

    /// Drop `name`. Only columns that exist in the store are tombstoned on save.
    pub fn delete(&mut self, name: &str) -> bool {
        let present = self.current.remove(name).is_some();
        if self.original.contains_key(name) {
            self.deleted.insert(name.to_string());
        }
        self.modified.remove(name);
        present
    }

    pub fn update<I, N, V>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: Into<Value>,
    {
        for (name, value) in items {
            self.set(name.as_ref(), value)?;
        }
        Ok(())
    }

    // ── State ───────────────────────────────────────────────

    /// Required columns that are absent or empty.
    pub fn missing(&self) -> Vec<String> {
        self.meta
            .required_columns()
            .filter(|name| self.get(name).is_none_or(<[u8]>::is_empty))
            .map(str::to_string)
            .collect()
    }

    pub fn valid(&self) -> bool {
        self.missing().is_empty()
    }

    pub fn is_modified(&self) -> bool {
        !self.modified.is_empty() || !self.deleted.is_empty()
    }

    /// The minimal diff between `original` and `current`.
    pub fn marshal(&self) -> Diff {
        let path_for = |name: &str| match &self.key {
            Some(key) => key.get_path(Some(name)),
            None => ColumnPath::new(self.meta.column_family.as_str()).with_column(name),
        };
        Diff {
            changed: self
                .modified
                .iter()
                .filter_map(|name| self.current.get(name))
                .map(|c| Column::clone(c))
                .collect(),
            deleted: self.deleted.iter().map(|name| path_for(name)).collect(),
        }
    }

    /// Discard pending changes. No I/O.
    pub fn revert(&mut self) {
        self.current = self
            .original
            .iter()
            .map(|(name, c)| (name.clone(), Arc::clone(c)))
            .collect();
        self.modified.clear();
        self.deleted.clear();
    }

    fn clean(&mut self) {
        self.original.clear();
        self.current.clear();
        self.modified.clear();
        self.deleted.clear();
        self.key = None;
    }

    /// Collapse to clean after a write: `original` becomes a deep copy of `current`.
    pub(crate) fn mark_clean(&mut self) {
        self.modified.clear();
        self.deleted.clear();
        self.original = self
            .current
            .iter()
            .map(|(name, c)| (name.clone(), Arc::new(Column::clone(c))))
            .collect();
    }

    /// Adopt `columns` as the persisted state under `key`.
    pub(crate) fn inject(&mut self, key: Key, columns: impl IntoIterator<Item = Column>) -> &mut Self {
        self.original = columns
            .into_iter()
            .map(|c| (c.name.clone(), Arc::new(c)))
            .collect();
        self.current = self
            .original
            .iter()
            .map(|(name, c)| (name.clone(), Arc::clone(c)))
            .collect();
        self.modified.clear();
        self.deleted.clear();
        self.key = Some(key);
        self
    }

    fn resolve_consistency(&self, call_site: Option<ConsistencyLevel>) -> ConsistencyLevel {
        self.client
            .consistency(call_site, self.consistency.or(self.meta.consistency))
    }

    // ── I/O ─────────────────────────────────────────────────

    pub fn load(&mut self, key: Key, consistency: Option<ConsistencyLevel>) -> Result<&mut Self> {
        let range = SliceRange::new("", "", self.client.config().slice_count);
        self.load_with(key, consistency, range)
    }

    /// Load by row key within this record's keyspace and column family.
    pub fn load_row(&mut self, row: &str, consistency: Option<ConsistencyLevel>) -> Result<&mut Self> {
        let key = self.make_key(Some(row), None)?;
        self.load(key, consistency)
    }

    /// Load only the columns `range` selects.
    pub fn load_with(
        &mut self,
        key: Key,
        consistency: Option<ConsistencyLevel>,
        range: SliceRange,
    ) -> Result<&mut Self> {
        self.clean();
        let consistency = self.resolve_consistency(consistency);
        let entries = iterators::slice(&self.client, &key, consistency, range)?;
        let mut columns: Vec<Column> = iterators::unpack(entries).collect();

        let meta = Arc::clone(&self.meta);
        for hook in &meta.hooks {
            hook.pre_load(&key, &mut columns);
        }
        debug!(key = %key, columns = columns.len(), "loaded record");
        self.inject(key, columns);
        for hook in &meta.hooks {
            hook.post_load(self);
        }
        Ok(self)
    }

    /// Persist pending changes, then fan them out to mirrors and indexes.
    ///
    /// A failing primary write leaves the record dirty. Once the primary
    /// write succeeds the record always ends clean, and the first mirror or
    /// index error is returned after every index has been attempted.
    pub fn save(&mut self, consistency: Option<ConsistencyLevel>) -> Result<&mut Self> {
        let key = self.check_save()?;
        let meta = Arc::clone(&self.meta);

        let diff = self.marshal();
        if diff.is_empty() {
            debug!(key = %key, "record unchanged, nothing to save");
            return Ok(self);
        }
        let consistency = self.resolve_consistency(consistency);
        self.save_internal(&key, &diff, consistency)?;
        debug!(
            key = %key,
            changed = diff.changed.len(),
            deleted = diff.deleted.len(),
            "saved record"
        );

        let mut failure = None;
        for mirror in &meta.mirrors {
            let saved = mirror
                .mirror_key(self)
                .and_then(|mirror_key| self.save_internal(&mirror_key, &diff, consistency));
            if let Err(e) = saved {
                warn!(key = %key, error = %e, "mirror save failed");
                failure = Some(e);
                break;
            }
        }
        for index in &meta.indexes {
            if let Err(e) = index.append(self) {
                warn!(key = %key, error = %e, "index append failed");
                failure.get_or_insert(e);
            }
        }

        self.mark_clean();
        match failure {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }

    /// Everything `save` requires before it writes: the record is not read
    /// only, schema defaults are filled and every field validates, no
    /// required column is missing and a key resolves. Repeating it is
    /// harmless.
    pub(crate) fn check_save(&mut self) -> Result<Key> {
        if self.meta.read_only {
            return Err(Error::Immutable);
        }
        let meta = Arc::clone(&self.meta);
        if let Some(schema) = meta.schema() {
            schema.prepare(self)?;
        }
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(Error::MissingField(missing));
        }
        match self.key.clone() {
            Some(key) => Ok(key),
            None => {
                let key = meta.default_key(self)?;
                self.key = Some(key.clone());
                Ok(key)
            }
        }
    }

    /// Tombstones first, then a single batched insert.
    fn save_internal(&self, key: &Key, diff: &Diff, consistency: ConsistencyLevel) -> Result<()> {
        let storage = self.client.storage();
        let timestamp = clock::timestamp();
        for path in &diff.deleted {
            let path = key.get_path(path.column.as_deref());
            storage.remove(&key.keyspace, &key.key, &path, timestamp, consistency)?;
        }

        if !diff.changed.is_empty() {
            let entries = match &key.super_column {
                Some(sc) => vec![SuperColumn::new(sc.as_str(), diff.changed.clone()).into()],
                None => iterators::pack(diff.changed.iter().cloned()).collect(),
            };
            let mut mutation = Mutation::new();
            mutation.insert(key.column_family.clone(), entries);
            storage.batch_insert(&key.keyspace, &key.key, &mutation, consistency)?;
        }
        Ok(())
    }

    /// Delete the whole row (or super column) and reset to empty.
    /// Mirrors and indexes are left alone.
    pub fn remove(&mut self, consistency: Option<ConsistencyLevel>) -> Result<&mut Self> {
        let key = self.key.clone().ok_or(Error::MissingKey)?;
        let consistency = self.resolve_consistency(consistency);
        Self::remove_key(&self.client, &key, Some(consistency))?;
        self.clean();
        Ok(self)
    }

    pub fn remove_key(client: &Client<S>, key: &Key, consistency: Option<ConsistencyLevel>) -> Result<()> {
        let consistency = client.consistency(consistency, None);
        debug!(key = %key, %consistency, "removing row");
        client.storage().remove(
            &key.keyspace,
            &key.key,
            &key.get_path(None),
            clock::timestamp(),
            consistency,
        )?;
        Ok(())
    }
}

impl<S: Storage> fmt::Debug for Record<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("key", &self.key)
            .field("columns", &self.current.keys().collect::<Vec<_>>())
            .field("modified", &self.modified)
            .field("deleted", &self.deleted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use lazyrow_store::{Call, MemoryStorage, RecordingStorage};

    use super::*;
    use crate::cache::NoopPageCache;

    type Store = RecordingStorage<MemoryStorage>;

    fn client() -> Client<Store> {
        Client::new(RecordingStorage::new(MemoryStorage::new())).with_cache(Arc::new(NoopPageCache))
    }

    fn record(client: &Client<Store>) -> Record<Store> {
        Record::new(client.clone(), RecordMeta::builder("ks", "users").build())
    }

    fn loaded(client: &Client<Store>, columns: &[(&str, &str)]) -> Record<Store> {
        let mut r = record(client);
        let key = r.make_key(Some("row"), None).unwrap();
        r.inject(key, columns.iter().map(|(n, v)| Column::new(*n, *v, 1)));
        r
    }

    #[test]
    fn set_marks_modified() {
        let c = client();
        let mut r = record(&c);
        r.set("name", "Joe").unwrap();
        assert!(r.is_modified());
        let diff = r.marshal();
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].name, "name");
        assert_eq!(diff.changed[0].value, b"Joe");
        assert!(diff.deleted.is_empty());
    }

    #[test]
    fn set_absent_is_rejected() {
        let c = client();
        let mut r = record(&c);
        assert!(matches!(r.set("name", None::<&str>), Err(Error::InvalidValue(_))));
        assert!(!r.is_modified());
    }

    #[test]
    fn setting_persisted_value_is_a_no_op() {
        let c = client();
        let mut r = loaded(&c, &[("name", "Joe")]);
        r.set("name", "Joe").unwrap();
        assert!(!r.is_modified());
        assert!(Arc::ptr_eq(
            r.current_column("name").unwrap(),
            r.original_column("name").unwrap()
        ));

        r.set("name", "Ann").unwrap();
        r.set("name", "Joe").unwrap();
        assert!(r.marshal().changed.is_empty());
        assert_eq!(r.get_str("name"), Some("Joe"));
    }

    #[test]
    fn set_copies_before_writing() {
        let c = client();
        let mut r = loaded(&c, &[("name", "Joe")]);
        r.set("name", "Ann").unwrap();

        let original = r.original_column("name").unwrap();
        let current = r.current_column("name").unwrap();
        assert!(!Arc::ptr_eq(original, current));
        assert_eq!(original.value, b"Joe");
        assert_eq!(original.timestamp, 1);
        assert_eq!(current.value, b"Ann");
    }

    #[test]
    fn delete_only_tombstones_persisted_columns() {
        let c = client();
        let mut r = loaded(&c, &[("name", "Joe")]);
        r.set("fresh", "x").unwrap();
        assert!(r.delete("fresh"));
        assert!(r.delete("name"));

        let diff = r.marshal();
        assert!(diff.changed.is_empty());
        assert_eq!(diff.deleted.len(), 1);
        assert_eq!(diff.deleted[0].column.as_deref(), Some("name"));
    }

    #[test]
    fn set_after_delete_cancels_tombstone() {
        let c = client();
        let mut r = loaded(&c, &[("name", "Joe")]);
        r.delete("name");
        r.set("name", "Ann").unwrap();
        let diff = r.marshal();
        assert!(diff.deleted.is_empty());
        assert_eq!(diff.changed.len(), 1);

        r.delete("name");
        let diff = r.marshal();
        assert!(diff.changed.is_empty());
        assert_eq!(diff.deleted.len(), 1);
    }

    #[test]
    fn revert_restores_original() {
        let c = client();
        let mut r = loaded(&c, &[("name", "Joe"), ("age", "30")]);
        r.set("name", "Ann").unwrap();
        r.delete("age");
        r.revert();
        assert!(!r.is_modified());
        assert_eq!(r.get_str("name"), Some("Joe"));
        assert_eq!(r.get_str("age"), Some("30"));
        assert!(c.storage().calls().is_empty());
    }

    #[test]
    fn missing_treats_empty_as_absent() {
        let c = client();
        let meta = RecordMeta::builder("ks", "users").required(["name", "email"]).build();
        let mut r = Record::new(c.clone(), meta);
        r.set("name", "").unwrap();
        assert_eq!(r.missing(), vec!["name".to_string(), "email".to_string()]);
        r.set("name", "Joe").unwrap();
        r.set("email", "joe@example.com").unwrap();
        assert!(r.valid());
    }

    #[test]
    fn save_without_key_fails() {
        let c = client();
        let mut r = record(&c);
        r.set("name", "Joe").unwrap();
        assert!(matches!(r.save(None), Err(Error::MissingKey)));
        assert!(r.is_modified());
    }

    #[test]
    fn save_uses_default_key_hook() {
        let c = client();
        let meta = RecordMeta::builder("ks", "users")
            .default_key(|r| r.make_key(Some("generated"), None))
            .build();
        let mut r = Record::new(c.clone(), meta);
        r.set("name", "Joe").unwrap();
        r.save(None).unwrap();
        assert_eq!(r.key().unwrap().key, "generated");
        assert_eq!(c.storage().writes()[0].row(), Some("generated"));
    }

    #[test]
    fn save_to_super_column_wraps_changes() {
        let c = client();
        let mut r = record(&c);
        r.set_key("row", Some("prefs")).unwrap();
        r.set("theme", "dark").unwrap();
        r.save(None).unwrap();

        let writes = c.storage().writes();
        let Call::BatchInsert { mutation, .. } = &writes[0] else {
            panic!("expected a batch insert");
        };
        let entries = &mutation["users"];
        let sc = entries[0].as_super().unwrap();
        assert_eq!(sc.name, "prefs");
        assert_eq!(sc.columns[0].name, "theme");
    }

    #[test]
    fn read_only_records_refuse_to_save() {
        let c = client();
        let mut r = Record::new(c.clone(), RecordMeta::builder("ks", "users").read_only().build());
        assert!(r.is_read_only());
        r.set_key("row", None).unwrap();
        r.set("name", "Joe").unwrap();
        assert!(matches!(r.save(None), Err(Error::Immutable)));
        assert!(c.storage().calls().is_empty());
    }

    #[test]
    fn remove_requires_key() {
        let c = client();
        let mut r = record(&c);
        assert!(matches!(r.remove(None), Err(Error::MissingKey)));
    }
}
