use std::collections::{BTreeMap, VecDeque};

use lazyrow_store::{
    Column, ColumnOrSuperColumn, ColumnParent, ConsistencyLevel, SlicePredicate, SliceRange,
    Storage,
};
use tracing::debug;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::key::Key;

/// Rows grouped keyspace → column family → row key.
pub type Grouped = BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<Column>>>>;

/// One slice of `key`'s row. An empty result is `NoSuchRecord`.
pub fn slice<S: Storage>(
    client: &Client<S>,
    key: &Key,
    consistency: ConsistencyLevel,
    range: SliceRange,
) -> Result<Vec<ColumnOrSuperColumn>> {
    let entries = client.storage().get_slice(
        &key.keyspace,
        &key.key,
        &key.get_parent(),
        &SlicePredicate::Range(range),
        consistency,
    )?;
    if entries.is_empty() {
        return Err(Error::NoSuchRecord(key.to_string()));
    }
    Ok(entries)
}

/// Slices many rows, one `multiget_slice` per keyspace and column family.
pub fn multiget<S: Storage>(
    client: &Client<S>,
    keys: &[Key],
    consistency: ConsistencyLevel,
    range: SliceRange,
) -> Result<Grouped> {
    let mut by_family: BTreeMap<(&str, &str), Vec<&str>> = BTreeMap::new();
    for key in keys {
        by_family
            .entry((key.keyspace.as_str(), key.column_family.as_str()))
            .or_default()
            .push(key.key.as_str());
    }

    let predicate = SlicePredicate::Range(range);
    let mut out = Grouped::new();
    for ((keyspace, column_family), rows) in by_family {
        let found = client.storage().multiget_slice(
            keyspace,
            &rows,
            &ColumnParent::new(column_family),
            &predicate,
            consistency,
        )?;
        debug!(keyspace, column_family, rows = rows.len(), "multiget");
        let family = out
            .entry(keyspace.to_string())
            .or_default()
            .entry(column_family.to_string())
            .or_default();
        for (row, entries) in found {
            family.insert(row, unpack(entries).collect());
        }
    }
    Ok(out)
}

/// Just the named columns of one row.
pub fn sparse_get<S: Storage>(client: &Client<S>, key: &Key, columns: &[&str]) -> Result<Vec<Column>> {
    let predicate = SlicePredicate::Names(columns.iter().map(|c| c.to_string()).collect());
    let entries = client.storage().get_slice(
        &key.keyspace,
        &key.key,
        &key.get_parent(),
        &predicate,
        client.consistency(None, None),
    )?;
    Ok(unpack(entries).collect())
}

/// Just the named columns of several rows. Keyspace and column family are
/// taken from the first key.
pub fn sparse_multiget<S: Storage>(
    client: &Client<S>,
    keys: &[Key],
    columns: &[&str],
) -> Result<BTreeMap<String, Vec<ColumnOrSuperColumn>>> {
    let Some(first) = keys.first() else {
        return Ok(BTreeMap::new());
    };
    let rows: Vec<&str> = keys.iter().map(|k| k.key.as_str()).collect();
    let predicate = SlicePredicate::Names(columns.iter().map(|c| c.to_string()).collect());
    Ok(client.storage().multiget_slice(
        &first.keyspace,
        &rows,
        &first.get_parent(),
        &predicate,
        client.consistency(None, None),
    )?)
}

/// Row keys of `key`'s column family between `start` and `finish`.
pub fn key_range<S: Storage>(
    client: &Client<S>,
    key: &Key,
    start: &str,
    finish: &str,
    count: usize,
) -> Result<Vec<String>> {
    Ok(client.storage().get_key_range(
        &key.keyspace,
        &key.column_family,
        start,
        finish,
        count,
        client.consistency(None, None),
    )?)
}

/// Like [`key_range`], as keys derived from `key`.
pub fn key_range_keys<S: Storage>(
    client: &Client<S>,
    key: &Key,
    start: &str,
    finish: &str,
    count: usize,
) -> Result<Vec<Key>> {
    Ok(key_range(client, key, start, finish, count)?
        .into_iter()
        .map(|row| key.with_key(row))
        .collect())
}

pub fn pack<T>(objects: impl IntoIterator<Item = T>) -> impl Iterator<Item = ColumnOrSuperColumn>
where
    T: Into<ColumnOrSuperColumn>,
{
    objects.into_iter().map(Into::into)
}

/// The plain columns among `entries`; super columns are skipped.
pub fn unpack(entries: impl IntoIterator<Item = ColumnOrSuperColumn>) -> impl Iterator<Item = Column> {
    entries.into_iter().filter_map(ColumnOrSuperColumn::into_column)
}

/// Lazily pages through one row's entries in name order.
///
/// After the first page, each request starts at the last name already
/// yielded and asks for one extra entry; the store repeats that boundary
/// entry first and it is dropped. Paging stops once `limit` entries have
/// been yielded, or a page brings fewer than `chunk_size` new entries.
pub struct Pages<S: Storage> {
    client: Client<S>,
    keyspace: String,
    row: String,
    parent: ColumnParent,
    consistency: ConsistencyLevel,
    chunk_size: usize,
    start: String,
    finish: String,
    limit: Option<usize>,
    boundary: Option<String>,
    buffer: VecDeque<ColumnOrSuperColumn>,
    returned: usize,
    fetches: usize,
    exhausted: bool,
}

impl<S: Storage> Pages<S> {
    pub fn new(client: Client<S>, key: &Key, consistency: ConsistencyLevel, chunk_size: usize) -> Self {
        Self {
            client,
            keyspace: key.keyspace.clone(),
            row: key.key.clone(),
            parent: key.get_parent(),
            consistency,
            chunk_size: chunk_size.max(1),
            start: String::new(),
            finish: String::new(),
            limit: None,
            boundary: None,
            buffer: VecDeque::new(),
            returned: 0,
            fetches: 0,
            exhausted: false,
        }
    }

    /// First name to include.
    pub fn start(mut self, start: impl Into<String>) -> Self {
        self.start = start.into();
        self
    }

    pub fn finish(mut self, finish: impl Into<String>) -> Self {
        self.finish = finish.into();
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Number of slice requests issued so far.
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    fn fetch(&mut self) -> Result<()> {
        let fence = self.boundary.is_some();
        let range = SliceRange {
            start: self.boundary.clone().unwrap_or_else(|| self.start.clone()),
            finish: self.finish.clone(),
            reversed: false,
            count: self.chunk_size.saturating_add(usize::from(fence)),
        };
        let page = self.client.storage().get_slice(
            &self.keyspace,
            &self.row,
            &self.parent,
            &SlicePredicate::Range(range),
            self.consistency,
        )?;
        self.fetches += 1;

        let skip = match (&self.boundary, page.first()) {
            (Some(boundary), Some(first)) => first.name() == boundary,
            _ => false,
        };
        let fresh = page.len() - usize::from(skip);
        debug!(
            keyspace = %self.keyspace,
            row = %self.row,
            fetched = page.len(),
            fresh,
            "fetched page"
        );

        if let Some(last) = page.last() {
            self.boundary = Some(last.name().to_string());
        }
        if fresh < self.chunk_size {
            self.exhausted = true;
        }
        self.buffer.extend(page.into_iter().skip(usize::from(skip)));
        Ok(())
    }
}

impl<S: Storage> Iterator for Pages<S> {
    type Item = Result<ColumnOrSuperColumn>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.limit.is_some_and(|limit| self.returned >= limit) {
            return None;
        }
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        let entry = self.buffer.pop_front()?;
        self.returned += 1;
        Some(Ok(entry))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lazyrow_store::{Call, ColumnPath, MemoryStorage, RecordingStorage};

    use super::*;
    use crate::cache::NoopPageCache;

    type Store = RecordingStorage<MemoryStorage>;

    fn client_with_row(columns: usize) -> (Client<Store>, Key) {
        let client = Client::new(RecordingStorage::new(MemoryStorage::new()))
            .with_cache(Arc::new(NoopPageCache));
        let key = Key::row("ks", "cf", "row").unwrap();
        for i in 0..columns {
            let path = ColumnPath::new("cf").with_column(format!("c{i:02}"));
            client
                .storage()
                .insert("ks", "row", &path, format!("{i}").as_bytes(), 1, ConsistencyLevel::One)
                .unwrap();
        }
        client.storage().take_calls();
        (client, key)
    }

    fn names(pages: impl Iterator<Item = Result<ColumnOrSuperColumn>>) -> Vec<String> {
        pages.map(|e| e.unwrap().name().to_string()).collect()
    }

    #[test]
    fn pages_skip_the_repeated_boundary() {
        let (client, key) = client_with_row(24);
        let mut pages = Pages::new(client.clone(), &key, ConsistencyLevel::One, 10);
        let got = names(pages.by_ref());

        let expected: Vec<String> = (0..24).map(|i| format!("c{i:02}")).collect();
        assert_eq!(got, expected);
        assert_eq!(pages.fetches(), 3);

        let counts: Vec<usize> = client
            .storage()
            .calls()
            .iter()
            .filter_map(|call| match call {
                Call::GetSlice {
                    predicate: SlicePredicate::Range(range),
                    ..
                } => Some(range.count),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![10, 11, 11]);
    }

    #[test]
    fn exact_multiple_of_chunk_size_ends_on_boundary_only_page() {
        let (client, key) = client_with_row(20);
        let mut pages = Pages::new(client, &key, ConsistencyLevel::One, 10);
        assert_eq!(names(pages.by_ref()).len(), 20);
        assert_eq!(pages.fetches(), 3);
    }

    #[test]
    fn limit_stops_paging() {
        let (client, key) = client_with_row(24);
        let mut pages = Pages::new(client, &key, ConsistencyLevel::One, 10).limit(Some(12));
        assert_eq!(names(pages.by_ref()).len(), 12);
        assert_eq!(pages.fetches(), 2);
    }

    #[test]
    fn empty_row_yields_nothing() {
        let (client, key) = client_with_row(0);
        let mut pages = Pages::new(client, &key, ConsistencyLevel::One, 10);
        assert!(pages.next().is_none());
        assert_eq!(pages.fetches(), 1);
    }

    #[test]
    fn start_is_inclusive() {
        let (client, key) = client_with_row(5);
        let got = names(Pages::new(client, &key, ConsistencyLevel::One, 2).start("c02"));
        assert_eq!(got, vec!["c02", "c03", "c04"]);
    }

    #[test]
    fn store_errors_surface_once() {
        let (client, key) = client_with_row(5);
        client.storage().fail_all(true);
        let mut pages = Pages::new(client, &key, ConsistencyLevel::One, 2);
        assert!(matches!(pages.next(), Some(Err(Error::Store(_)))));
        assert!(pages.next().is_none());
    }

    #[test]
    fn slice_of_missing_row_is_no_such_record() {
        let (client, _) = client_with_row(3);
        let missing = Key::row("ks", "cf", "nobody").unwrap();
        let err = slice(&client, &missing, ConsistencyLevel::One, SliceRange::default()).unwrap_err();
        assert!(matches!(err, Error::NoSuchRecord(_)));
    }

    #[test]
    fn sparse_get_returns_only_named_columns() {
        let (client, key) = client_with_row(5);
        let columns = sparse_get(&client, &key, &["c03", "c01", "zz"]).unwrap();
        let got: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(got, vec!["c03", "c01"]);
    }

    #[test]
    fn multiget_groups_by_family() {
        let (client, key) = client_with_row(2);
        let other = Key::row("ks", "cf", "empty").unwrap();
        let grouped = multiget(
            &client,
            &[key.clone(), other],
            ConsistencyLevel::One,
            SliceRange::default(),
        )
        .unwrap();
        let family = &grouped["ks"]["cf"];
        assert_eq!(family["row"].len(), 2);
        assert!(family["empty"].is_empty());
        assert_eq!(client.storage().calls().len(), 1);
    }

    #[test]
    fn key_range_derives_keys() {
        let (client, key) = client_with_row(1);
        let keys = key_range_keys(&client, &key, "", "", 10).unwrap();
        assert_eq!(keys, vec![key]);
    }
}
