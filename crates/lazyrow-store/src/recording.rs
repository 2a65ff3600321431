use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::StoreError;
use crate::storage::Storage;
use crate::types::{
    ColumnOrSuperColumn, ColumnParent, ColumnPath, ConsistencyLevel, Mutation, SlicePredicate,
    SuperMutation,
};

/// One call made through a [`RecordingStorage`], with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Get {
        keyspace: String,
        row: String,
        path: ColumnPath,
        consistency: ConsistencyLevel,
    },
    GetSlice {
        keyspace: String,
        row: String,
        parent: ColumnParent,
        predicate: SlicePredicate,
        consistency: ConsistencyLevel,
    },
    MultigetSlice {
        keyspace: String,
        rows: Vec<String>,
        parent: ColumnParent,
        predicate: SlicePredicate,
        consistency: ConsistencyLevel,
    },
    GetCount {
        keyspace: String,
        row: String,
        parent: ColumnParent,
        consistency: ConsistencyLevel,
    },
    GetKeyRange {
        keyspace: String,
        column_family: String,
        start: String,
        finish: String,
        count: usize,
        consistency: ConsistencyLevel,
    },
    Insert {
        keyspace: String,
        row: String,
        path: ColumnPath,
        value: Vec<u8>,
        timestamp: i64,
        consistency: ConsistencyLevel,
    },
    BatchInsert {
        keyspace: String,
        row: String,
        mutation: Mutation,
        consistency: ConsistencyLevel,
    },
    BatchInsertSuper {
        keyspace: String,
        row: String,
        mutation: SuperMutation,
        consistency: ConsistencyLevel,
    },
    Remove {
        keyspace: String,
        row: String,
        path: ColumnPath,
        timestamp: i64,
        consistency: ConsistencyLevel,
    },
}

impl Call {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Call::Insert { .. }
                | Call::BatchInsert { .. }
                | Call::BatchInsertSuper { .. }
                | Call::Remove { .. }
        )
    }

    /// The single row this call addresses, if it addresses exactly one.
    pub fn row(&self) -> Option<&str> {
        match self {
            Call::Get { row, .. }
            | Call::GetSlice { row, .. }
            | Call::GetCount { row, .. }
            | Call::Insert { row, .. }
            | Call::BatchInsert { row, .. }
            | Call::BatchInsertSuper { row, .. }
            | Call::Remove { row, .. } => Some(row),
            Call::MultigetSlice { .. } | Call::GetKeyRange { .. } => None,
        }
    }

    pub fn consistency(&self) -> ConsistencyLevel {
        match self {
            Call::Get { consistency, .. }
            | Call::GetSlice { consistency, .. }
            | Call::MultigetSlice { consistency, .. }
            | Call::GetCount { consistency, .. }
            | Call::GetKeyRange { consistency, .. }
            | Call::Insert { consistency, .. }
            | Call::BatchInsert { consistency, .. }
            | Call::BatchInsertSuper { consistency, .. }
            | Call::Remove { consistency, .. } => *consistency,
        }
    }
}

/// Decorates a [`Storage`], logging every call in order and optionally
/// failing some of them with [`StoreError::Unavailable`].
///
/// Failed calls are still logged; they are not forwarded to the inner storage.
pub struct RecordingStorage<S> {
    inner: S,
    calls: Mutex<Vec<Call>>,
    failing_rows: Mutex<HashSet<String>>,
    fail_all: AtomicBool,
}

impl<S: Storage> RecordingStorage<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            failing_rows: Mutex::new(HashSet::new()),
            fail_all: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_write).collect()
    }

    /// Drain the call log.
    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Make every subsequent write addressed to `row` fail.
    pub fn fail_writes_to(&self, row: impl Into<String>) {
        self.failing_rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(row.into());
    }

    /// Make every subsequent call fail (or stop doing so).
    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: Call) -> Result<(), StoreError> {
        let fail = self.fail_all.load(Ordering::SeqCst)
            || (call.is_write()
                && call.row().is_some_and(|row| {
                    self.failing_rows
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .contains(row)
                }));
        let description = format!("{call:?}");
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
        if fail {
            return Err(StoreError::Unavailable(format!("injected failure: {description}")));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for RecordingStorage<S> {
    fn get(
        &self,
        keyspace: &str,
        row: &str,
        path: &ColumnPath,
        consistency: ConsistencyLevel,
    ) -> Result<ColumnOrSuperColumn, StoreError> {
        self.record(Call::Get {
            keyspace: keyspace.into(),
            row: row.into(),
            path: path.clone(),
            consistency,
        })?;
        self.inner.get(keyspace, row, path, consistency)
    }

    fn get_slice(
        &self,
        keyspace: &str,
        row: &str,
        parent: &ColumnParent,
        predicate: &SlicePredicate,
        consistency: ConsistencyLevel,
    ) -> Result<Vec<ColumnOrSuperColumn>, StoreError> {
        self.record(Call::GetSlice {
            keyspace: keyspace.into(),
            row: row.into(),
            parent: parent.clone(),
            predicate: predicate.clone(),
            consistency,
        })?;
        self.inner
            .get_slice(keyspace, row, parent, predicate, consistency)
    }

    fn multiget_slice(
        &self,
        keyspace: &str,
        rows: &[&str],
        parent: &ColumnParent,
        predicate: &SlicePredicate,
        consistency: ConsistencyLevel,
    ) -> Result<BTreeMap<String, Vec<ColumnOrSuperColumn>>, StoreError> {
        self.record(Call::MultigetSlice {
            keyspace: keyspace.into(),
            rows: rows.iter().map(|r| r.to_string()).collect(),
            parent: parent.clone(),
            predicate: predicate.clone(),
            consistency,
        })?;
        self.inner
            .multiget_slice(keyspace, rows, parent, predicate, consistency)
    }

    fn get_count(
        &self,
        keyspace: &str,
        row: &str,
        parent: &ColumnParent,
        consistency: ConsistencyLevel,
    ) -> Result<usize, StoreError> {
        self.record(Call::GetCount {
            keyspace: keyspace.into(),
            row: row.into(),
            parent: parent.clone(),
            consistency,
        })?;
        self.inner.get_count(keyspace, row, parent, consistency)
    }

    fn get_key_range(
        &self,
        keyspace: &str,
        column_family: &str,
        start: &str,
        finish: &str,
        count: usize,
        consistency: ConsistencyLevel,
    ) -> Result<Vec<String>, StoreError> {
        self.record(Call::GetKeyRange {
            keyspace: keyspace.into(),
            column_family: column_family.into(),
            start: start.into(),
            finish: finish.into(),
            count,
            consistency,
        })?;
        self.inner
            .get_key_range(keyspace, column_family, start, finish, count, consistency)
    }

    fn insert(
        &self,
        keyspace: &str,
        row: &str,
        path: &ColumnPath,
        value: &[u8],
        timestamp: i64,
        consistency: ConsistencyLevel,
    ) -> Result<(), StoreError> {
        self.record(Call::Insert {
            keyspace: keyspace.into(),
            row: row.into(),
            path: path.clone(),
            value: value.to_vec(),
            timestamp,
            consistency,
        })?;
        self.inner
            .insert(keyspace, row, path, value, timestamp, consistency)
    }

    fn batch_insert(
        &self,
        keyspace: &str,
        row: &str,
        mutation: &Mutation,
        consistency: ConsistencyLevel,
    ) -> Result<(), StoreError> {
        self.record(Call::BatchInsert {
            keyspace: keyspace.into(),
            row: row.into(),
            mutation: mutation.clone(),
            consistency,
        })?;
        self.inner.batch_insert(keyspace, row, mutation, consistency)
    }

    fn batch_insert_super(
        &self,
        keyspace: &str,
        row: &str,
        mutation: &SuperMutation,
        consistency: ConsistencyLevel,
    ) -> Result<(), StoreError> {
        self.record(Call::BatchInsertSuper {
            keyspace: keyspace.into(),
            row: row.into(),
            mutation: mutation.clone(),
            consistency,
        })?;
        self.inner
            .batch_insert_super(keyspace, row, mutation, consistency)
    }

    fn remove(
        &self,
        keyspace: &str,
        row: &str,
        path: &ColumnPath,
        timestamp: i64,
        consistency: ConsistencyLevel,
    ) -> Result<(), StoreError> {
        self.record(Call::Remove {
            keyspace: keyspace.into(),
            row: row.into(),
            path: path.clone(),
            timestamp,
            consistency,
        })?;
        self.inner.remove(keyspace, row, path, timestamp, consistency)
    }
}
