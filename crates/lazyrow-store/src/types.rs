use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ── Columns ─────────────────────────────────────────────────

/// A name/value/timestamp triple, the atomic unit of storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub value: Vec<u8>,
    /// GMT unix seconds. Used by the store for last-write-wins resolution.
    pub timestamp: i64,
}

impl Column {
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            timestamp,
        }
    }

    /// An empty column with no value and a zero timestamp.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new(), 0)
    }

    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// A column whose value is itself a collection of columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperColumn {
    pub name: String,
    pub columns: Vec<Column>,
}

impl SuperColumn {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }
}

/// One entry of a slice: either a plain column or a super column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnOrSuperColumn {
    Column(Column),
    Super(SuperColumn),
}

impl ColumnOrSuperColumn {
    pub fn name(&self) -> &str {
        match self {
            Self::Column(c) => &c.name,
            Self::Super(s) => &s.name,
        }
    }

    pub fn as_column(&self) -> Option<&Column> {
        match self {
            Self::Column(c) => Some(c),
            Self::Super(_) => None,
        }
    }

    pub fn as_super(&self) -> Option<&SuperColumn> {
        match self {
            Self::Super(s) => Some(s),
            Self::Column(_) => None,
        }
    }

    pub fn into_column(self) -> Option<Column> {
        match self {
            Self::Column(c) => Some(c),
            Self::Super(_) => None,
        }
    }

    pub fn into_super(self) -> Option<SuperColumn> {
        match self {
            Self::Super(s) => Some(s),
            Self::Column(_) => None,
        }
    }
}

impl From<Column> for ColumnOrSuperColumn {
    fn from(c: Column) -> Self {
        Self::Column(c)
    }
}

impl From<SuperColumn> for ColumnOrSuperColumn {
    fn from(s: SuperColumn) -> Self {
        Self::Super(s)
    }
}

// ── Paths ───────────────────────────────────────────────────

/// Addresses a column, a super column, or a whole row within a column family,
/// depending on which of the optional parts are set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnPath {
    pub column_family: String,
    pub super_column: Option<String>,
    pub column: Option<String>,
}

impl ColumnPath {
    pub fn new(column_family: impl Into<String>) -> Self {
        Self {
            column_family: column_family.into(),
            super_column: None,
            column: None,
        }
    }

    pub fn with_super_column(mut self, super_column: impl Into<String>) -> Self {
        self.super_column = Some(super_column.into());
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn parent(&self) -> ColumnParent {
        ColumnParent {
            column_family: self.column_family.clone(),
            super_column: self.super_column.clone(),
        }
    }
}

/// Scopes a slice: the column family, and optionally one super column inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnParent {
    pub column_family: String,
    pub super_column: Option<String>,
}

impl ColumnParent {
    pub fn new(column_family: impl Into<String>) -> Self {
        Self {
            column_family: column_family.into(),
            super_column: None,
        }
    }

    pub fn with_super_column(mut self, super_column: impl Into<String>) -> Self {
        self.super_column = Some(super_column.into());
        self
    }
}

// ── Predicates ──────────────────────────────────────────────

/// An inclusive name range. Empty `start`/`finish` leave that side unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceRange {
    pub start: String,
    pub finish: String,
    pub reversed: bool,
    pub count: usize,
}

impl Default for SliceRange {
    fn default() -> Self {
        Self {
            start: String::new(),
            finish: String::new(),
            reversed: false,
            count: 100,
        }
    }
}

impl SliceRange {
    pub fn new(start: impl Into<String>, finish: impl Into<String>, count: usize) -> Self {
        Self {
            start: start.into(),
            finish: finish.into(),
            reversed: false,
            count,
        }
    }

    pub fn reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlicePredicate {
    /// Exactly these names, in this order. Absent names are skipped.
    Names(Vec<String>),
    Range(SliceRange),
}

impl From<SliceRange> for SlicePredicate {
    fn from(range: SliceRange) -> Self {
        Self::Range(range)
    }
}

// ── Mutations ───────────────────────────────────────────────

/// Column family → entries to write, for one row.
pub type Mutation = BTreeMap<String, Vec<ColumnOrSuperColumn>>;

/// Inserts into several super columns of one column family in one call.
///
/// Only insertions are representable; removals go through `Storage::remove`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SuperMutation {
    pub column_family: String,
    pub super_columns: BTreeMap<String, Vec<Column>>,
}

impl SuperMutation {
    pub fn new(column_family: impl Into<String>) -> Self {
        Self {
            column_family: column_family.into(),
            super_columns: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.super_columns.values().all(Vec::is_empty)
    }
}

// ── Consistency ─────────────────────────────────────────────

/// Per-operation durability/visibility contract, passed through to the store unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyLevel {
    Zero,
    #[default]
    One,
    Quorum,
    DcQuorum,
    DcQuorumSync,
    All,
    Any,
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Zero => "ZERO",
            Self::One => "ONE",
            Self::Quorum => "QUORUM",
            Self::DcQuorum => "DC_QUORUM",
            Self::DcQuorumSync => "DC_QUORUM_SYNC",
            Self::All => "ALL",
            Self::Any => "ANY",
        };
        f.write_str(s)
    }
}

impl FromStr for ConsistencyLevel {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ZERO" => Ok(Self::Zero),
            "ONE" => Ok(Self::One),
            "QUORUM" => Ok(Self::Quorum),
            "DC_QUORUM" | "DCQUORUM" => Ok(Self::DcQuorum),
            "DC_QUORUM_SYNC" | "DCQUORUMSYNC" => Ok(Self::DcQuorumSync),
            "ALL" => Ok(Self::All),
            "ANY" => Ok(Self::Any),
            other => Err(StoreError::InvalidRequest(format!(
                "unknown consistency level: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistency_parses_case_insensitively() {
        assert_eq!("quorum".parse::<ConsistencyLevel>().unwrap(), ConsistencyLevel::Quorum);
        assert_eq!(" ONE ".parse::<ConsistencyLevel>().unwrap(), ConsistencyLevel::One);
        assert_eq!(
            "dc_quorum_sync".parse::<ConsistencyLevel>().unwrap(),
            ConsistencyLevel::DcQuorumSync
        );
        assert!("twice".parse::<ConsistencyLevel>().is_err());
    }

    #[test]
    fn default_consistency_is_one() {
        assert_eq!(ConsistencyLevel::default(), ConsistencyLevel::One);
    }

    #[test]
    fn path_parent_drops_column() {
        let path = ColumnPath::new("users").with_super_column("prefs").with_column("theme");
        let parent = path.parent();
        assert_eq!(parent.column_family, "users");
        assert_eq!(parent.super_column.as_deref(), Some("prefs"));
    }

    #[test]
    fn empty_super_mutation() {
        let mut m = SuperMutation::new("cf");
        assert!(m.is_empty());
        m.super_columns.insert("a".into(), vec![]);
        assert!(m.is_empty());
        m.super_columns
            .insert("b".into(), vec![Column::new("x", "1", 1)]);
        assert!(!m.is_empty());
    }
}
