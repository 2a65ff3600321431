use std::fmt;

use lazyrow_store::{ColumnParent, ColumnPath};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Addresses a row, optionally narrowed to a super column and a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    pub keyspace: String,
    pub column_family: String,
    pub key: String,
    pub super_column: Option<String>,
    pub column: Option<String>,
}

/// Fields to replace when deriving one key from another. `None` keeps the
/// original value.
#[derive(Debug, Clone, Default)]
pub struct KeyOverrides {
    pub keyspace: Option<String>,
    pub column_family: Option<String>,
    pub key: Option<String>,
    pub super_column: Option<Option<String>>,
    pub column: Option<Option<String>>,
}

impl Key {
    /// Fails with `IncompleteKey` unless keyspace and column family are set.
    /// A missing row key is replaced with a fresh UUID.
    pub fn make(
        keyspace: impl Into<String>,
        column_family: impl Into<String>,
        key: Option<&str>,
        super_column: Option<&str>,
        column: Option<&str>,
    ) -> Result<Self> {
        let keyspace = keyspace.into();
        let column_family = column_family.into();
        if keyspace.is_empty() {
            return Err(Error::IncompleteKey("keyspace is required".into()));
        }
        if column_family.is_empty() {
            return Err(Error::IncompleteKey("column family is required".into()));
        }
        Ok(Self {
            keyspace,
            column_family,
            key: key.map_or_else(generate, str::to_string),
            super_column: super_column.map(str::to_string),
            column: column.map(str::to_string),
        })
    }

    /// Shorthand for a plain row key.
    pub fn row(
        keyspace: impl Into<String>,
        column_family: impl Into<String>,
        key: &str,
    ) -> Result<Self> {
        Self::make(keyspace, column_family, Some(key), None, None)
    }

    pub fn clone_with(&self, overrides: KeyOverrides) -> Self {
        Self {
            keyspace: overrides.keyspace.unwrap_or_else(|| self.keyspace.clone()),
            column_family: overrides
                .column_family
                .unwrap_or_else(|| self.column_family.clone()),
            key: overrides.key.unwrap_or_else(|| self.key.clone()),
            super_column: overrides
                .super_column
                .unwrap_or_else(|| self.super_column.clone()),
            column: overrides.column.unwrap_or_else(|| self.column.clone()),
        }
    }

    pub fn with_key(&self, key: impl Into<String>) -> Self {
        self.clone_with(KeyOverrides {
            key: Some(key.into()),
            ..KeyOverrides::default()
        })
    }

    pub fn with_super_column(&self, super_column: impl Into<String>) -> Self {
        self.clone_with(KeyOverrides {
            super_column: Some(Some(super_column.into())),
            ..KeyOverrides::default()
        })
    }

    pub fn with_column(&self, column: impl Into<String>) -> Self {
        self.clone_with(KeyOverrides {
            column: Some(Some(column.into())),
            ..KeyOverrides::default()
        })
    }

    pub fn with_column_family(&self, column_family: impl Into<String>) -> Self {
        self.clone_with(KeyOverrides {
            column_family: Some(column_family.into()),
            ..KeyOverrides::default()
        })
    }

    pub fn with_keyspace(&self, keyspace: impl Into<String>) -> Self {
        self.clone_with(KeyOverrides {
            keyspace: Some(keyspace.into()),
            ..KeyOverrides::default()
        })
    }

    pub fn is_super(&self) -> bool {
        self.super_column.is_some()
    }

    /// Path to this key's location. `column` takes precedence over the
    /// key's own column; with neither, the path names the whole row (or the
    /// whole super column).
    pub fn get_path(&self, column: Option<&str>) -> ColumnPath {
        ColumnPath {
            column_family: self.column_family.clone(),
            super_column: self.super_column.clone(),
            column: column.map(str::to_string).or_else(|| self.column.clone()),
        }
    }

    pub fn get_parent(&self) -> ColumnParent {
        ColumnParent {
            column_family: self.column_family.clone(),
            super_column: self.super_column.clone(),
        }
    }
}

fn generate() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.keyspace, self.column_family, self.key)?;
        if let Some(sc) = &self.super_column {
            write!(f, "/{sc}")?;
        }
        if let Some(c) = &self.column {
            write!(f, ":{c}")?;
        }
        Ok(())
    }
}
