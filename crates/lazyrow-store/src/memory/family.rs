use imbl::OrdMap;

use crate::types::Column;

/// Whether a column family's rows hold plain columns or super columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyKind {
    Standard,
    Super,
}

#[derive(Clone)]
pub(crate) struct Family {
    pub(crate) kind: FamilyKind,
    pub(crate) rows: OrdMap<String, Row>,
}

impl Family {
    pub(crate) fn new(kind: FamilyKind) -> Self {
        Self {
            kind,
            rows: OrdMap::new(),
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct Row {
    pub(crate) columns: OrdMap<String, Column>,
    pub(crate) supers: OrdMap<String, OrdMap<String, Column>>,
}

impl Row {
    pub(crate) fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.supers.is_empty()
    }

    /// Last-write-wins: a column older than the stored one is dropped.
    pub(crate) fn put(&mut self, super_column: Option<&str>, column: Column) {
        match super_column {
            Some(sc) => {
                let mut columns = self.supers.remove(sc).unwrap_or_default();
                put_column(&mut columns, column);
                self.supers.insert(sc.to_string(), columns);
            }
            None => put_column(&mut self.columns, column),
        }
    }

    /// Remove one column, or everything under `super_column` (or the whole
    /// row) when `column` is `None`. Only data at or before `timestamp` goes.
    pub(crate) fn remove(&mut self, super_column: Option<&str>, column: Option<&str>, timestamp: i64) {
        match super_column {
            Some(sc) => {
                if let Some(mut columns) = self.supers.remove(sc) {
                    remove_columns(&mut columns, column, timestamp);
                    if !columns.is_empty() {
                        self.supers.insert(sc.to_string(), columns);
                    }
                }
            }
            None if column.is_some() => remove_columns(&mut self.columns, column, timestamp),
            None => {
                remove_columns(&mut self.columns, None, timestamp);
                let names: Vec<String> = self.supers.keys().cloned().collect();
                for sc in names {
                    self.remove(Some(sc.as_str()), None, timestamp);
                }
            }
        }
    }
}

fn put_column(columns: &mut OrdMap<String, Column>, column: Column) {
    if let Some(existing) = columns.get(&column.name) {
        if existing.timestamp > column.timestamp {
            return;
        }
    }
    columns.insert(column.name.clone(), column);
}

fn remove_columns(columns: &mut OrdMap<String, Column>, name: Option<&str>, timestamp: i64) {
    match name {
        Some(name) => {
            if columns.get(name).is_some_and(|c| c.timestamp <= timestamp) {
                columns.remove(name);
            }
        }
        None => {
            let doomed: Vec<String> = columns
                .iter()
                .filter(|(_, c)| c.timestamp <= timestamp)
                .map(|(k, _)| k.clone())
                .collect();
            for k in doomed {
                columns.remove(&k);
            }
        }
    }
}
