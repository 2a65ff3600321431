mod error;
mod recording;
mod storage;
mod types;

pub use error::StoreError;
pub use recording::{Call, RecordingStorage};
pub use storage::Storage;
pub use types::{
    Column, ColumnOrSuperColumn, ColumnParent, ColumnPath, ConsistencyLevel, Mutation,
    SlicePredicate, SliceRange, SuperColumn, SuperMutation,
};

#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "memory")]
pub use memory::{FamilyKind, MemoryStorage};
