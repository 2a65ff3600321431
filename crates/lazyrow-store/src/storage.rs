use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::types::{
    ColumnOrSuperColumn, ColumnParent, ColumnPath, ConsistencyLevel, Mutation, SlicePredicate,
    SuperMutation,
};

/// The remote wide-column store, as seen by the mapping layer.
///
/// Every call is a blocking round trip. Transport timeouts, retries and
/// reconnection belong to the implementation; callers treat any error as
/// fatal for the operation in flight.
pub trait Storage: Send + Sync {
    // Reads
    fn get(
        &self,
        keyspace: &str,
        row: &str,
        path: &ColumnPath,
        consistency: ConsistencyLevel,
    ) -> Result<ColumnOrSuperColumn, StoreError>;

    fn get_slice(
        &self,
        keyspace: &str,
        row: &str,
        parent: &ColumnParent,
        predicate: &SlicePredicate,
        consistency: ConsistencyLevel,
    ) -> Result<Vec<ColumnOrSuperColumn>, StoreError>;

    fn multiget_slice(
        &self,
        keyspace: &str,
        rows: &[&str],
        parent: &ColumnParent,
        predicate: &SlicePredicate,
        consistency: ConsistencyLevel,
    ) -> Result<BTreeMap<String, Vec<ColumnOrSuperColumn>>, StoreError>;

    fn get_count(
        &self,
        keyspace: &str,
        row: &str,
        parent: &ColumnParent,
        consistency: ConsistencyLevel,
    ) -> Result<usize, StoreError>;

    /// Row keys of a column family, in order. Empty bounds are unbounded.
    fn get_key_range(
        &self,
        keyspace: &str,
        column_family: &str,
        start: &str,
        finish: &str,
        count: usize,
        consistency: ConsistencyLevel,
    ) -> Result<Vec<String>, StoreError>;

    // Writes
    fn insert(
        &self,
        keyspace: &str,
        row: &str,
        path: &ColumnPath,
        value: &[u8],
        timestamp: i64,
        consistency: ConsistencyLevel,
    ) -> Result<(), StoreError>;

    fn batch_insert(
        &self,
        keyspace: &str,
        row: &str,
        mutation: &Mutation,
        consistency: ConsistencyLevel,
    ) -> Result<(), StoreError>;

    fn batch_insert_super(
        &self,
        keyspace: &str,
        row: &str,
        mutation: &SuperMutation,
        consistency: ConsistencyLevel,
    ) -> Result<(), StoreError>;

    /// Removes a column, a whole super column, or a whole row, depending on
    /// how much of `path` is set. Only data written at or before `timestamp`
    /// is removed.
    fn remove(
        &self,
        keyspace: &str,
        row: &str,
        path: &ColumnPath,
        timestamp: i64,
        consistency: ConsistencyLevel,
    ) -> Result<(), StoreError>;
}
