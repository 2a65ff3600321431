//! Single-column reads and writes, without a record.

use lazyrow_store::{Column, ConsistencyLevel, Storage, StoreError};

use crate::client::Client;
use crate::clock;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::value::Value;

pub fn get_column<S: Storage>(
    client: &Client<S>,
    key: &Key,
    name: &str,
    consistency: Option<ConsistencyLevel>,
) -> Result<Column> {
    let entry = client.storage().get(
        &key.keyspace,
        &key.key,
        &key.get_path(Some(name)),
        client.consistency(consistency, None),
    )?;
    entry.into_column().ok_or_else(|| {
        Error::Store(StoreError::InvalidRequest(format!(
            "{name} under {key} is a super column"
        )))
    })
}

/// The value of one column.
pub fn get<S: Storage>(
    client: &Client<S>,
    key: &Key,
    name: &str,
    consistency: Option<ConsistencyLevel>,
) -> Result<Vec<u8>> {
    Ok(get_column(client, key, name, consistency)?.value)
}

/// Write one column, stamped now unless `timestamp` is given.
pub fn set<S: Storage>(
    client: &Client<S>,
    key: &Key,
    name: &str,
    value: impl Into<Value>,
    timestamp: Option<i64>,
    consistency: Option<ConsistencyLevel>,
) -> Result<()> {
    let value = value
        .into()
        .into_bytes()
        .ok_or_else(|| Error::InvalidValue(name.to_string()))?;
    let column = Column::new(name, value, timestamp.unwrap_or_else(clock::timestamp));
    set_column(client, key, &column, consistency)
}

pub fn set_column<S: Storage>(
    client: &Client<S>,
    key: &Key,
    column: &Column,
    consistency: Option<ConsistencyLevel>,
) -> Result<()> {
    client.storage().insert(
        &key.keyspace,
        &key.key,
        &key.get_path(Some(column.name.as_str())),
        &column.value,
        column.timestamp,
        client.consistency(consistency, None),
    )?;
    Ok(())
}

pub fn remove<S: Storage>(
    client: &Client<S>,
    key: &Key,
    name: &str,
    timestamp: Option<i64>,
    consistency: Option<ConsistencyLevel>,
) -> Result<()> {
    client.storage().remove(
        &key.keyspace,
        &key.key,
        &key.get_path(Some(name)),
        timestamp.unwrap_or_else(clock::timestamp),
        client.consistency(consistency, None),
    )?;
    Ok(())
}
