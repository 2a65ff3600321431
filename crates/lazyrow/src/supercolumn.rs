use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use lazyrow_store::{
    Column, ColumnOrSuperColumn, ColumnParent, ColumnPath, ConsistencyLevel, Storage, StoreError,
    SuperColumn as RawSuperColumn, SuperMutation,
};
use tracing::debug;

use crate::cache::CacheKey;
use crate::client::Client;
use crate::clock;
use crate::error::{Error, Result};
use crate::iterators::Pages;
use crate::key::{Key, KeyOverrides};
use crate::meta::RecordMeta;
use crate::record::Record;

/// A child record, shared between the container and its callers.
pub type Child<S> = Rc<RefCell<Record<S>>>;

const LOAD_ALL_CHUNK: usize = 1 << 30;

/// The super columns of one row, loaded on demand.
///
/// Each super column is a child [`Record`] keyed by the super column name.
/// A child is materialized at most once per container, so repeated lookups
/// hand back the same `Rc`. Raw pages fetched from the store also go to the
/// client's page cache, which other containers on the same row consult and
/// which writes do not invalidate.
pub struct SuperColumn<S: Storage> {
    client: Client<S>,
    key: Key,
    meta: Arc<RecordMeta<S>>,
    chunk_size: usize,
    consistency: Option<ConsistencyLevel>,
    children: BTreeMap<String, Child<S>>,
}

impl<S: Storage> SuperColumn<S> {
    /// `key` names the row; any super column or column on it is ignored.
    /// Children are built with `meta`.
    pub fn new(client: Client<S>, key: &Key, meta: Arc<RecordMeta<S>>) -> Self {
        let chunk_size = client.config().chunk_size;
        let key = key.clone_with(KeyOverrides {
            super_column: Some(None),
            column: Some(None),
            ..KeyOverrides::default()
        });
        Self {
            client,
            key,
            meta,
            chunk_size,
            consistency: None,
            children: BTreeMap::new(),
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

    fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.key.keyspace, &self.key.key)
    }

    fn resolve_consistency(&self, call_site: Option<ConsistencyLevel>) -> ConsistencyLevel {
        self.client
            .consistency(call_site, self.consistency.or(self.meta.consistency))
    }

    fn instantiate(&self, super_key: &str, columns: &[Column]) -> Child<S> {
        let mut record = Record::new(self.client.clone(), Arc::clone(&self.meta));
        record.inject(self.key.with_super_column(super_key), columns.iter().cloned());
        Rc::new(RefCell::new(record))
    }

    /// The child for `super_key`, fetching it if this container has not
    /// seen it yet. A super column absent from the store is `NotFound`.
    pub fn get(&mut self, super_key: &str) -> Result<Child<S>> {
        if let Some(child) = self.children.get(super_key) {
            return Ok(Rc::clone(child));
        }

        let cache_key = self.cache_key();
        let column_family = self.key.column_family.as_str();
        let raw = match self.client.cache().get(&cache_key, column_family, super_key) {
            Some(raw) => {
                debug!(cache_key = %cache_key, super_key, "page cache hit");
                raw
            }
            None => {
                let path = ColumnPath::new(column_family).with_super_column(super_key);
                let entry = self.client.storage().get(
                    &self.key.keyspace,
                    &self.key.key,
                    &path,
                    self.resolve_consistency(None),
                )?;
                let raw = Arc::new(into_raw(entry)?);
                self.client
                    .cache()
                    .put(&cache_key, column_family, Arc::clone(&raw));
                raw
            }
        };

        let child = self.instantiate(super_key, &raw.columns);
        self.children.insert(super_key.to_string(), Rc::clone(&child));
        Ok(child)
    }

    fn pages(&self, start: &str, limit: Option<usize>, chunk_size: usize) -> Pages<S> {
        Pages::new(
            self.client.clone(),
            &self.key,
            self.resolve_consistency(None),
            chunk_size,
        )
        .start(start)
        .limit(limit)
    }

    fn cache_entry(&self, entry: ColumnOrSuperColumn) -> Result<Arc<RawSuperColumn>> {
        let raw = Arc::new(into_raw(entry)?);
        self.client
            .cache()
            .put(&self.cache_key(), &self.key.column_family, Arc::clone(&raw));
        Ok(raw)
    }

    fn adopt(&mut self, raw: &RawSuperColumn) -> Child<S> {
        if let Some(child) = self.children.get(&raw.name) {
            return Rc::clone(child);
        }
        let child = self.instantiate(&raw.name, &raw.columns);
        self.children.insert(raw.name.clone(), Rc::clone(&child));
        child
    }

    /// Super column names in the store, from `start`, paged.
    pub fn keys(&self, start: &str, limit: Option<usize>) -> impl Iterator<Item = Result<String>> {
        self.pages(start, limit, self.chunk_size)
            .map(|entry| -> Result<String> { Ok(self.cache_entry(entry?)?.name.clone()) })
    }

    /// Children in the store, from `start`, paged. Children already held by
    /// this container are reused.
    pub fn children(&mut self, start: &str, limit: Option<usize>) -> Children<'_, S> {
        let pages = self.pages(start, limit, self.chunk_size);
        Children {
            container: self,
            pages,
        }
    }

    /// Materialize every child in one request.
    pub fn load_all(&mut self) -> Result<&mut Self> {
        let pages = self.pages("", None, LOAD_ALL_CHUNK);
        {
            let mut children = Children {
                container: &mut *self,
                pages,
            };
            children.try_for_each(|child| child.map(drop))?;
        }
        Ok(self)
    }

    /// Always fails: children enter the container through `get` or `append`.
    pub fn insert(&mut self, _super_key: &str, _child: Record<S>) -> Result<()> {
        Err(Error::NotSupported(
            "assigning into a lazily loaded super column; use get or append",
        ))
    }

    /// Adopt a record built elsewhere. Its key must already name a super
    /// column; it is rewritten onto this container's row.
    pub fn append(&mut self, mut child: Record<S>) -> Result<Child<S>> {
        let Some(super_key) = child.key().and_then(|k| k.super_column.clone()) else {
            return Err(Error::IncompleteKey(
                "appended record has no super column in its key".into(),
            ));
        };
        child.replace_key(self.key.with_super_column(super_key.as_str()));
        let child = Rc::new(RefCell::new(child));
        self.children.insert(super_key, Rc::clone(&child));
        Ok(child)
    }

    pub fn contains(&self, super_key: &str) -> bool {
        self.children.contains_key(super_key)
    }

    /// Children materialized so far.
    pub fn len_loaded(&self) -> usize {
        self.children.len()
    }

    /// Super columns in the store.
    pub fn len_db(&self) -> Result<usize> {
        Ok(self.client.storage().get_count(
            &self.key.keyspace,
            &self.key.key,
            &ColumnParent::new(self.key.column_family.as_str()),
            self.resolve_consistency(None),
        )?)
    }

    pub fn valid(&self) -> bool {
        self.children.values().all(|child| child.borrow().valid())
    }

    /// Missing required columns of each invalid child.
    pub fn missing(&self) -> BTreeMap<String, Vec<String>> {
        self.children
            .iter()
            .filter_map(|(name, child)| {
                let missing = child.borrow().missing();
                (!missing.is_empty()).then(|| (name.clone(), missing))
            })
            .collect()
    }

    /// Write every modified child.
    ///
    /// Tombstones go out one `remove` each; all changed columns go in a single
    /// `batch_insert_super`, which cannot carry deletions.
    ///
    /// Children are written as they stand: required columns are not checked,
    /// and schema defaults and validation are not applied. Call `valid` first
    /// when that matters.
    pub fn save(&mut self, consistency: Option<ConsistencyLevel>) -> Result<&mut Self> {
        let consistency = self.resolve_consistency(consistency);
        let storage = self.client.storage();
        let column_family = self.key.column_family.as_str();
        let mut mutation = SuperMutation::new(column_family);
        let mut saved = Vec::new();

        for (name, child) in &self.children {
            let record = child.borrow();
            if !record.is_modified() {
                continue;
            }
            let diff = record.marshal();
            let super_column = record
                .key()
                .and_then(|k| k.super_column.clone())
                .unwrap_or_else(|| name.clone());

            for path in &diff.deleted {
                let mut target = ColumnPath::new(column_family).with_super_column(super_column.as_str());
                target.column = path.column.clone();
                storage.remove(
                    &self.key.keyspace,
                    &self.key.key,
                    &target,
                    clock::timestamp(),
                    consistency,
                )?;
            }
            if !diff.changed.is_empty() {
                mutation
                    .super_columns
                    .entry(super_column)
                    .or_default()
                    .extend(diff.changed);
            }
            saved.push(Rc::clone(child));
        }

        if !mutation.is_empty() {
            storage.batch_insert_super(&self.key.keyspace, &self.key.key, &mutation, consistency)?;
        }
        debug!(key = %self.key, children = saved.len(), "saved super column");
        for child in saved {
            child.borrow_mut().mark_clean();
        }
        Ok(self)
    }
}

fn into_raw(entry: ColumnOrSuperColumn) -> Result<RawSuperColumn> {
    match entry {
        ColumnOrSuperColumn::Super(raw) => Ok(raw),
        ColumnOrSuperColumn::Column(c) => Err(Error::Store(StoreError::InvalidRequest(format!(
            "expected a super column, found column {}",
            c.name
        )))),
    }
}

/// Lazy iterator returned by [`SuperColumn::children`].
pub struct Children<'a, S: Storage> {
    container: &'a mut SuperColumn<S>,
    pages: Pages<S>,
}

impl<S: Storage> Iterator for Children<'_, S> {
    type Item = Result<Child<S>>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = match self.pages.next()? {
            Ok(entry) => entry,
            Err(e) => return Some(Err(e)),
        };
        Some(
            self.container
                .cache_entry(entry)
                .map(|raw| self.container.adopt(&raw)),
        )
    }
}

#[cfg(test)]
mod tests {
    use lazyrow_store::{Call, MemoryStorage, RecordingStorage};

    use super::*;
    use crate::cache::{NoopPageCache, SharedPageCache};

    type Store = RecordingStorage<MemoryStorage>;

    fn client() -> Client<Store> {
        Client::new(RecordingStorage::new(MemoryStorage::new())).with_cache(Arc::new(NoopPageCache))
    }

    fn seed(client: &Client<Store>, row: &str, supers: &[(&str, &[(&str, &str)])]) {
        for (sc, columns) in supers {
            for (name, value) in *columns {
                let path = ColumnPath::new("prefs").with_super_column(*sc).with_column(*name);
                client
                    .storage()
                    .insert("ks", row, &path, value.as_bytes(), 1, ConsistencyLevel::One)
                    .unwrap();
            }
        }
        client.storage().take_calls();
    }

    fn container(client: &Client<Store>, row: &str) -> SuperColumn<Store> {
        let key = Key::row("ks", "prefs", row).unwrap();
        SuperColumn::new(client.clone(), &key, RecordMeta::builder("ks", "prefs").build())
    }

    #[test]
    fn get_is_reference_stable() {
        let c = client();
        seed(&c, "u1", &[("theme", &[("color", "dark")])]);
        let mut sc = container(&c, "u1");

        let first = sc.get("theme").unwrap();
        let second = sc.get("theme").unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.borrow().get_str("color"), Some("dark"));
        assert_eq!(
            first.borrow().key().unwrap().super_column.as_deref(),
            Some("theme")
        );
        assert_eq!(c.storage().calls().len(), 1);
    }

    #[test]
    fn get_of_unknown_super_column_is_not_found() {
        let c = client();
        seed(&c, "u1", &[("theme", &[("color", "dark")])]);
        let mut sc = container(&c, "u1");
        assert!(matches!(
            sc.get("nothing"),
            Err(Error::Store(StoreError::NotFound(_)))
        ));
        assert_eq!(sc.len_loaded(), 0);
    }

    #[test]
    fn shared_cache_serves_other_containers() {
        let c = client().with_cache(Arc::new(SharedPageCache::new()));
        seed(&c, "u1", &[("theme", &[("color", "dark")])]);

        container(&c, "u1").get("theme").unwrap();
        let mut other = container(&c, "u1");
        let child = other.get("theme").unwrap();
        assert_eq!(child.borrow().get_str("color"), Some("dark"));
        assert_eq!(c.storage().calls().len(), 1);
    }

    #[test]
    fn direct_insert_is_not_supported() {
        let c = client();
        let mut sc = container(&c, "u1");
        let record = Record::new(c.clone(), RecordMeta::builder("ks", "prefs").build());
        assert!(matches!(sc.insert("x", record), Err(Error::NotSupported(_))));
        assert!(!sc.contains("x"));
    }

    #[test]
    fn append_requires_super_column() {
        let c = client();
        let mut sc = container(&c, "u1");
        let mut record = Record::new(c.clone(), RecordMeta::builder("ks", "prefs").build());
        assert!(matches!(
            sc.append(Record::new(c.clone(), RecordMeta::builder("ks", "prefs").build())),
            Err(Error::IncompleteKey(_))
        ));

        record.set_key("elsewhere", Some("theme")).unwrap();
        let child = sc.append(record).unwrap();
        let key = child.borrow().key().cloned().unwrap();
        assert_eq!(key.key, "u1");
        assert_eq!(key.super_column.as_deref(), Some("theme"));
        assert!(Rc::ptr_eq(&child, &sc.get("theme").unwrap()));
    }

    #[test]
    fn save_batches_inserts_and_removes_individually() {
        let c = client();
        seed(
            &c,
            "u1",
            &[("a", &[("x", "1"), ("y", "2")]), ("b", &[("x", "1")])],
        );
        let mut sc = container(&c, "u1");
        sc.load_all().unwrap();
        c.storage().take_calls();

        sc.get("a").unwrap().borrow_mut().set("x", "10").unwrap();
        sc.get("a").unwrap().borrow_mut().delete("y");
        sc.get("b").unwrap().borrow_mut().set("z", "3").unwrap();
        sc.save(None).unwrap();

        let writes = c.storage().writes();
        assert_eq!(writes.len(), 2);
        let Call::Remove { path, .. } = &writes[0] else {
            panic!("expected a remove first");
        };
        assert_eq!(path.super_column.as_deref(), Some("a"));
        assert_eq!(path.column.as_deref(), Some("y"));
        let Call::BatchInsertSuper { mutation, .. } = &writes[1] else {
            panic!("expected one batch insert");
        };
        assert_eq!(mutation.super_columns["a"].len(), 1);
        assert_eq!(mutation.super_columns["b"][0].name, "z");

        assert!(!sc.get("a").unwrap().borrow().is_modified());
        assert!(!sc.get("b").unwrap().borrow().is_modified());

        c.storage().take_calls();
        sc.save(None).unwrap();
        assert!(c.storage().calls().is_empty());
    }

    #[test]
    fn len_db_counts_super_columns() {
        let c = client();
        seed(&c, "u1", &[("a", &[("x", "1")]), ("b", &[("x", "1")])]);
        let sc = container(&c, "u1");
        assert_eq!(sc.len_db().unwrap(), 2);
        assert_eq!(sc.len_loaded(), 0);
    }

    #[test]
    fn missing_reports_invalid_children() {
        let c = client();
        seed(&c, "u1", &[("a", &[("x", "1")]), ("b", &[("name", "n")])]);
        let key = Key::row("ks", "prefs", "u1").unwrap();
        let meta = RecordMeta::builder("ks", "prefs").required(["name"]).build();
        let mut sc = SuperColumn::new(c.clone(), &key, meta);
        sc.load_all().unwrap();

        assert!(!sc.valid());
        let missing = sc.missing();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing["a"], vec!["name".to_string()]);
    }
}
