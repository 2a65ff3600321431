#![allow(dead_code)]

use std::sync::Arc;

use lazyrow::{Client, NoopPageCache, Record, RecordMeta};
use lazyrow_store::{ColumnPath, ConsistencyLevel, MemoryStorage, RecordingStorage, Storage};

pub type Store = RecordingStorage<MemoryStorage>;

pub const KS: &str = "app";

/// A client over a fresh recording store, with caching disabled.
pub fn client() -> Client<Store> {
    Client::new(RecordingStorage::new(MemoryStorage::new())).with_cache(Arc::new(NoopPageCache))
}

pub fn users() -> Arc<RecordMeta<Store>> {
    RecordMeta::builder(KS, "users").build()
}

pub fn user(client: &Client<Store>, meta: &Arc<RecordMeta<Store>>, row: &str) -> Record<Store> {
    let mut r = Record::new(client.clone(), Arc::clone(meta));
    r.set_key(row, None).unwrap();
    r
}

/// Write `count` super columns `r00..` under `row`, each with one column,
/// then forget the calls.
pub fn seed_super_columns(client: &Client<Store>, column_family: &str, row: &str, count: usize) {
    for i in 0..count {
        let path = ColumnPath::new(column_family)
            .with_super_column(format!("r{i:02}"))
            .with_column("n");
        client
            .storage()
            .insert(KS, row, &path, i.to_string().as_bytes(), 1, ConsistencyLevel::One)
            .unwrap();
    }
    client.storage().take_calls();
}
