mod family;
mod storage;

pub use family::FamilyKind;
pub use storage::MemoryStorage;
