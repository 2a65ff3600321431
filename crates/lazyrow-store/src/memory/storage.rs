use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use arc_swap::ArcSwap;
use imbl::OrdMap;

use crate::error::StoreError;
use crate::storage::Storage;
use crate::types::{
    Column, ColumnOrSuperColumn, ColumnParent, ColumnPath, ConsistencyLevel, Mutation,
    SlicePredicate, SliceRange, SuperColumn, SuperMutation,
};

use super::family::{Family, FamilyKind, Row};

type FamilyId = (String, String);

/// In-process wide-column store.
///
/// Each column family is an immutable `OrdMap` behind an `ArcSwap`: readers
/// load a snapshot without locking, writers serialize on `write_lock`, clone
/// the map, mutate it, and swap it back.
pub struct MemoryStorage {
    families: RwLock<HashMap<FamilyId, Arc<ArcSwap<Family>>>>,
    write_lock: Mutex<()>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            families: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Declare a column family up front. Families are otherwise created on
    /// first write, taking their kind from that write.
    pub fn create_family(
        &self,
        keyspace: &str,
        column_family: &str,
        kind: FamilyKind,
    ) -> Result<(), StoreError> {
        let mut families = self
            .families
            .write()
            .map_err(|e| StoreError::Storage(format!("family map poisoned: {e}")))?;
        families
            .entry((keyspace.to_string(), column_family.to_string()))
            .or_insert_with(|| Arc::new(ArcSwap::new(Arc::new(Family::new(kind)))));
        Ok(())
    }

    /// Snapshot one column family.
    fn snapshot(&self, keyspace: &str, column_family: &str) -> Result<Option<Arc<Family>>, StoreError> {
        let families = self
            .families
            .read()
            .map_err(|e| StoreError::Storage(format!("family map poisoned: {e}")))?;
        Ok(families
            .get(&(keyspace.to_string(), column_family.to_string()))
            .map(|arc| arc.load_full()))
    }

    /// Apply a write to one row, creating the family (with `kind`) and the row
    /// as needed. Rows left empty by the write are dropped.
    fn update_row(
        &self,
        keyspace: &str,
        column_family: &str,
        row: &str,
        kind: FamilyKind,
        f: impl FnOnce(&mut Row) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| StoreError::Storage(format!("write lock poisoned: {e}")))?;

        let arc = {
            let mut families = self
                .families
                .write()
                .map_err(|e| StoreError::Storage(format!("family map poisoned: {e}")))?;
            Arc::clone(
                families
                    .entry((keyspace.to_string(), column_family.to_string()))
                    .or_insert_with(|| {
                        tracing::debug!(keyspace, column_family, ?kind, "creating column family");
                        Arc::new(ArcSwap::new(Arc::new(Family::new(kind))))
                    }),
            )
        };

        let mut data = (**arc.load()).clone();
        let mut target = data.rows.get(row).cloned().unwrap_or_default();
        f(&mut target)?;
        if target.is_empty() {
            data.rows.remove(row);
        } else {
            data.rows.insert(row.to_string(), target);
        }
        arc.store(Arc::new(data));
        Ok(())
    }

    fn slice_row(
        family: &Family,
        row: &Row,
        parent: &ColumnParent,
        predicate: &SlicePredicate,
    ) -> Vec<ColumnOrSuperColumn> {
        match &parent.super_column {
            Some(sc) => match row.supers.get(sc) {
                Some(columns) => select(columns, predicate, |_, c| c.clone().into()),
                None => Vec::new(),
            },
            None => match family.kind {
                FamilyKind::Super => select(&row.supers, predicate, |name, columns| {
                    to_super(name, columns).into()
                }),
                FamilyKind::Standard => select(&row.columns, predicate, |_, c| c.clone().into()),
            },
        }
    }
}

fn to_super(name: &str, columns: &OrdMap<String, Column>) -> SuperColumn {
    SuperColumn::new(name, columns.values().cloned().collect())
}

fn in_range(name: &str, range: &SliceRange) -> bool {
    let (low, high) = if range.reversed {
        (&range.finish, &range.start)
    } else {
        (&range.start, &range.finish)
    };
    (low.is_empty() || name >= low.as_str()) && (high.is_empty() || name <= high.as_str())
}

fn select<V>(
    map: &OrdMap<String, V>,
    predicate: &SlicePredicate,
    convert: impl Fn(&str, &V) -> ColumnOrSuperColumn,
) -> Vec<ColumnOrSuperColumn>
where
    V: Clone,
{
    match predicate {
        SlicePredicate::Names(names) => names
            .iter()
            .filter_map(|name| map.get(name).map(|v| convert(name, v)))
            .collect(),
        SlicePredicate::Range(range) => {
            let mut matching: Vec<(&String, &V)> =
                map.iter().filter(|(k, _)| in_range(k, range)).collect();
            if range.reversed {
                matching.reverse();
            }
            matching
                .into_iter()
                .take(range.count)
                .map(|(k, v)| convert(k, v))
                .collect()
        }
    }
}

impl Storage for MemoryStorage {
    fn get(
        &self,
        keyspace: &str,
        row: &str,
        path: &ColumnPath,
        _consistency: ConsistencyLevel,
    ) -> Result<ColumnOrSuperColumn, StoreError> {
        let not_found = || StoreError::NotFound(format!("{keyspace}/{row} {path:?}"));
        let family = self
            .snapshot(keyspace, &path.column_family)?
            .ok_or_else(not_found)?;
        let data = family.rows.get(row).ok_or_else(not_found)?;

        match (&path.super_column, &path.column) {
            (Some(sc), Some(name)) => data
                .supers
                .get(sc)
                .and_then(|columns| columns.get(name))
                .map(|c| ColumnOrSuperColumn::Column(c.clone()))
                .ok_or_else(not_found),
            (Some(sc), None) => data
                .supers
                .get(sc)
                .map(|columns| to_super(sc, columns).into())
                .ok_or_else(not_found),
            (None, Some(name)) => data
                .columns
                .get(name)
                .map(|c| ColumnOrSuperColumn::Column(c.clone()))
                .ok_or_else(not_found),
            (None, None) => Err(StoreError::InvalidRequest(
                "get requires a column or super column in the path".into(),
            )),
        }
    }

    fn get_slice(
        &self,
        keyspace: &str,
        row: &str,
        parent: &ColumnParent,
        predicate: &SlicePredicate,
        _consistency: ConsistencyLevel,
    ) -> Result<Vec<ColumnOrSuperColumn>, StoreError> {
        let Some(family) = self.snapshot(keyspace, &parent.column_family)? else {
            return Ok(Vec::new());
        };
        Ok(match family.rows.get(row) {
            Some(data) => Self::slice_row(&family, data, parent, predicate),
            None => Vec::new(),
        })
    }

    fn multiget_slice(
        &self,
        keyspace: &str,
        rows: &[&str],
        parent: &ColumnParent,
        predicate: &SlicePredicate,
        consistency: ConsistencyLevel,
    ) -> Result<BTreeMap<String, Vec<ColumnOrSuperColumn>>, StoreError> {
        rows.iter()
            .map(|row| {
                let entries = self.get_slice(keyspace, row, parent, predicate, consistency)?;
                Ok((row.to_string(), entries))
            })
            .collect()
    }

    fn get_count(
        &self,
        keyspace: &str,
        row: &str,
        parent: &ColumnParent,
        consistency: ConsistencyLevel,
    ) -> Result<usize, StoreError> {
        let everything = SlicePredicate::Range(SliceRange::new("", "", usize::MAX));
        Ok(self
            .get_slice(keyspace, row, parent, &everything, consistency)?
            .len())
    }

    fn get_key_range(
        &self,
        keyspace: &str,
        column_family: &str,
        start: &str,
        finish: &str,
        count: usize,
        _consistency: ConsistencyLevel,
    ) -> Result<Vec<String>, StoreError> {
        let Some(family) = self.snapshot(keyspace, column_family)? else {
            return Ok(Vec::new());
        };
        let range = SliceRange::new(start, finish, count);
        Ok(family
            .rows
            .keys()
            .filter(|k| in_range(k, &range))
            .take(count)
            .cloned()
            .collect())
    }

    fn insert(
        &self,
        keyspace: &str,
        row: &str,
        path: &ColumnPath,
        value: &[u8],
        timestamp: i64,
        _consistency: ConsistencyLevel,
    ) -> Result<(), StoreError> {
        let Some(name) = &path.column else {
            return Err(StoreError::InvalidRequest(
                "insert requires a column in the path".into(),
            ));
        };
        let column = Column::new(name.clone(), value.to_vec(), timestamp);
        let kind = if path.super_column.is_some() {
            FamilyKind::Super
        } else {
            FamilyKind::Standard
        };
        self.update_row(keyspace, &path.column_family, row, kind, |data| {
            data.put(path.super_column.as_deref(), column);
            Ok(())
        })
    }

    fn batch_insert(
        &self,
        keyspace: &str,
        row: &str,
        mutation: &Mutation,
        _consistency: ConsistencyLevel,
    ) -> Result<(), StoreError> {
        for (column_family, entries) in mutation {
            let kind = if entries.iter().any(|e| e.as_super().is_some()) {
                FamilyKind::Super
            } else {
                FamilyKind::Standard
            };
            self.update_row(keyspace, column_family, row, kind, |data| {
                for entry in entries {
                    match entry {
                        ColumnOrSuperColumn::Column(c) => data.put(None, c.clone()),
                        ColumnOrSuperColumn::Super(sc) => {
                            for c in &sc.columns {
                                data.put(Some(sc.name.as_str()), c.clone());
                            }
                        }
                    }
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    fn batch_insert_super(
        &self,
        keyspace: &str,
        row: &str,
        mutation: &SuperMutation,
        _consistency: ConsistencyLevel,
    ) -> Result<(), StoreError> {
        self.update_row(
            keyspace,
            &mutation.column_family,
            row,
            FamilyKind::Super,
            |data| {
                for (sc, columns) in &mutation.super_columns {
                    for c in columns {
                        data.put(Some(sc.as_str()), c.clone());
                    }
                }
                Ok(())
            },
        )
    }

    fn remove(
        &self,
        keyspace: &str,
        row: &str,
        path: &ColumnPath,
        timestamp: i64,
        _consistency: ConsistencyLevel,
    ) -> Result<(), StoreError> {
        if self.snapshot(keyspace, &path.column_family)?.is_none() {
            return Ok(());
        }
        let kind = if path.super_column.is_some() {
            FamilyKind::Super
        } else {
            FamilyKind::Standard
        };
        self.update_row(keyspace, &path.column_family, row, kind, |data| {
            data.remove(path.super_column.as_deref(), path.column.as_deref(), timestamp);
            Ok(())
        })
    }
}
