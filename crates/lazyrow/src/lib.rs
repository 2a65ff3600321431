//! Record-oriented access to a wide-column store.
//!
//! A [`Record`] tracks one row (or one super column) against the state it was
//! loaded with and saves only what changed. [`SuperColumn`] pages through
//! a row of super columns lazily, [`View`] lists records by key, and
//! [`Model`] layers typed fields over a record.

pub mod array;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod crud;
pub mod error;
pub mod iterators;
pub mod key;
pub mod meta;
pub mod record;
pub mod recordset;
pub mod schema;
pub mod supercolumn;
pub mod value;
pub mod view;

pub use array::Array;
pub use cache::{CacheKey, NoopPageCache, PageCache, SharedPageCache, TtlPageCache};
pub use client::Client;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use iterators::Pages;
pub use key::{Key, KeyOverrides};
pub use meta::{Index, LoadHook, Mirror, RecordMeta, RecordMetaBuilder};
pub use record::{Diff, Record};
pub use recordset::{KeyRecordSet, RecordSet};
pub use schema::{Field, FieldKind, FieldTable, FieldTableBuilder, FieldValue, Model};
pub use supercolumn::{Child, Children, SuperColumn};
pub use value::Value;
pub use view::{PartitionedView, View};

pub use lazyrow_store::{Column, ConsistencyLevel, Storage, StoreError};
