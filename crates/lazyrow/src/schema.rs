//! Typed fields over a record's byte columns.
//!
//! A [`FieldTable`] is built once per record kind and attached to its
//! [`RecordMeta`]. Saving a record with a table fills defaults and validates
//! every present field first; [`Model`] adds typed `get`/`set` on top.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use lazyrow_store::{ConsistencyLevel, Storage};
use serde_json::{Map, Value as Json};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::meta::RecordMeta;
use crate::record::Record;

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Dict(Map<String, Json>),
    /// Key of another record.
    Related(Key),
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Float(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl From<Key> for FieldValue {
    fn from(key: Key) -> Self {
        FieldValue::Related(key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Char,
    /// The row key. Not stored as a column.
    Key,
    Integer,
    Float,
    Boolean,
    /// A JSON object.
    Dict,
    /// Another record, stored as its row key. The template supplies the
    /// keyspace and column family of decoded keys.
    Related(Key),
}

#[derive(Clone)]
enum FieldDefault {
    Value(FieldValue),
    Producer(Arc<dyn Fn() -> FieldValue + Send + Sync>),
}

impl FieldDefault {
    fn produce(&self) -> FieldValue {
        match self {
            FieldDefault::Value(v) => v.clone(),
            FieldDefault::Producer(f) => f(),
        }
    }
}

#[derive(Clone)]
pub struct Field {
    name: String,
    kind: FieldKind,
    required: bool,
    default: Option<FieldDefault>,
    choices: Vec<FieldValue>,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
            choices: Vec::new(),
        }
    }

    pub fn char(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Char)
    }

    pub fn key(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Key)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn dict(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Dict)
    }

    pub fn related(name: impl Into<String>, template: Key) -> Self {
        Self::new(name, FieldKind::Related(template))
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(FieldDefault::Value(value.into()));
        self
    }

    /// Default computed each time it is needed.
    pub fn default_with(mut self, f: impl Fn() -> FieldValue + Send + Sync + 'static) -> Self {
        self.default = Some(FieldDefault::Producer(Arc::new(f)));
        self
    }

    pub fn choices<I, V>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default(&self) -> Option<FieldValue> {
        self.default.as_ref().map(FieldDefault::produce)
    }

    fn mismatch(&self, value: &FieldValue) -> Error {
        Error::validation(
            &self.name,
            format!("{value:?} does not fit a {:?} field", self.kind),
        )
    }

    /// Wire form of `value`.
    pub fn encode(&self, value: &FieldValue) -> Result<Vec<u8>> {
        let text = match (&self.kind, value) {
            (FieldKind::Char | FieldKind::Key, FieldValue::Text(s)) => s.clone(),
            (FieldKind::Integer, FieldValue::Integer(n)) => n.to_string(),
            (FieldKind::Float, FieldValue::Float(n)) => n.to_string(),
            (FieldKind::Float, FieldValue::Integer(n)) => n.to_string(),
            (FieldKind::Boolean, FieldValue::Boolean(b)) => (if *b { "1" } else { "0" }).to_string(),
            (FieldKind::Dict, FieldValue::Dict(map)) => serde_json::to_string(map)
                .map_err(|e| Error::validation(&self.name, e.to_string()))?,
            (FieldKind::Related(_), FieldValue::Related(key)) => key.key.clone(),
            (FieldKind::Related(_), FieldValue::Text(row)) => row.clone(),
            _ => return Err(self.mismatch(value)),
        };
        Ok(text.into_bytes())
    }

    pub fn decode(&self, raw: &[u8]) -> Result<FieldValue> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| Error::validation(&self.name, e.to_string()))?;
        let invalid = |reason: String| Error::validation(&self.name, reason);
        Ok(match &self.kind {
            FieldKind::Char | FieldKind::Key => FieldValue::Text(text.to_string()),
            FieldKind::Integer => {
                FieldValue::Integer(text.trim().parse().map_err(|e| invalid(format!("{e}")))?)
            }
            FieldKind::Float => {
                FieldValue::Float(text.trim().parse().map_err(|e| invalid(format!("{e}")))?)
            }
            FieldKind::Boolean => FieldValue::Boolean(text == "1"),
            FieldKind::Dict => match serde_json::from_str::<Json>(text).map_err(|e| invalid(e.to_string()))? {
                Json::Object(map) => FieldValue::Dict(map),
                other => return Err(invalid(format!("expected a JSON object, found {other}"))),
            },
            FieldKind::Related(template) => FieldValue::Related(template.with_key(text)),
        })
    }

    /// Checks kind and, when declared, membership in `choices`.
    pub fn validate(&self, value: &FieldValue) -> Result<()> {
        self.encode(value)?;
        if !self.choices.is_empty() && !self.choices.contains(value) {
            return Err(Error::validation(
                &self.name,
                format!("{value:?} is not one of {:?}", self.choices),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("has_default", &self.default.is_some())
            .field("choices", &self.choices)
            .finish()
    }
}

/// The declared fields of one record kind, exactly one of which is the key.
#[derive(Debug, Clone)]
pub struct FieldTable {
    fields: Vec<Field>,
    key_field: usize,
}

#[derive(Debug, Default)]
pub struct FieldTableBuilder {
    fields: Vec<Field>,
}

impl FieldTableBuilder {
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> Result<FieldTable> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(Error::Schema(format!("field `{}` declared twice", field.name)));
            }
        }

        let keys: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.kind == FieldKind::Key)
            .map(|(i, _)| i)
            .collect();
        let key_field = match keys.as_slice() {
            [i] => *i,
            [] => return Err(Error::Schema("no key field declared".into())),
            many => {
                let names: Vec<&str> = many.iter().map(|&i| self.fields[i].name()).collect();
                return Err(Error::Schema(format!(
                    "multiple key fields declared: {}",
                    names.join(", ")
                )));
            }
        };
        if !self.fields[key_field].required {
            return Err(Error::Schema(format!(
                "key field `{}` must be required",
                self.fields[key_field].name
            )));
        }

        Ok(FieldTable {
            fields: self.fields,
            key_field,
        })
    }
}

impl FieldTable {
    pub fn builder() -> FieldTableBuilder {
        FieldTableBuilder::default()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn key_field(&self) -> &Field {
        &self.fields[self.key_field]
    }

    fn columns(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != self.key_field)
            .map(|(_, f)| f)
    }

    /// Required fields stored as columns that have no default. The key field
    /// is not a column, and defaulted fields are filled on save.
    pub fn required_columns(&self) -> impl Iterator<Item = &str> {
        self.columns()
            .filter(|f| f.required && f.default.is_none())
            .map(Field::name)
    }

    /// Fill defaults for absent fields, then validate every present one.
    pub(crate) fn prepare<S: Storage>(&self, record: &mut Record<S>) -> Result<()> {
        for field in self.columns() {
            if record.contains(&field.name) {
                continue;
            }
            if let Some(default) = field.default() {
                record.set(&field.name, field.encode(&default)?)?;
            }
        }
        for field in self.columns() {
            if let Some(raw) = record.get(&field.name) {
                field.validate(&field.decode(raw)?)?;
            }
        }
        Ok(())
    }
}

/// A record accessed through its [`FieldTable`].
pub struct Model<S: Storage> {
    record: Record<S>,
    table: Arc<FieldTable>,
}

impl<S: Storage> Model<S> {
    /// Fails with `Schema` if `meta` carries no field table.
    pub fn new(client: Client<S>, meta: Arc<RecordMeta<S>>) -> Result<Self> {
        let table = meta
            .schema
            .clone()
            .ok_or_else(|| Error::Schema(format!("{} has no field table", meta.column_family)))?;
        Ok(Self {
            record: Record::new(client, meta),
            table,
        })
    }

    /// A new model with the given fields set. Unknown names are rejected.
    pub fn with_fields<I, N, V>(client: Client<S>, meta: Arc<RecordMeta<S>>, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: Into<FieldValue>,
    {
        let mut model = Self::new(client, meta)?;
        model.update(fields)?;
        Ok(model)
    }

    pub fn load(
        client: Client<S>,
        meta: Arc<RecordMeta<S>>,
        row: &str,
        consistency: Option<ConsistencyLevel>,
    ) -> Result<Self> {
        let mut model = Self::new(client, meta)?;
        model.record.load_row(row, consistency)?;
        Ok(model)
    }

    pub fn table(&self) -> &FieldTable {
        &self.table
    }

    pub fn record(&self) -> &Record<S> {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut Record<S> {
        &mut self.record
    }

    pub fn into_record(self) -> Record<S> {
        self.record
    }

    fn field(&self, name: &str) -> Result<Field> {
        self.table
            .field(name)
            .cloned()
            .ok_or_else(|| Error::Schema(format!("unknown field `{name}`")))
    }

    /// The decoded value of `name`, or its default when absent.
    pub fn get(&self, name: &str) -> Result<Option<FieldValue>> {
        let field = self.field(name)?;
        if field.kind == FieldKind::Key {
            return Ok(self.record.key().map(|k| FieldValue::Text(k.key.clone())));
        }
        match self.record.get(name) {
            Some(raw) => field.decode(raw).map(Some),
            None => Ok(field.default()),
        }
    }

    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<()> {
        let field = self.field(name)?;
        let value = value.into();
        field.validate(&value)?;
        if field.kind == FieldKind::Key {
            let FieldValue::Text(row) = &value else {
                return Err(field.mismatch(&value));
            };
            self.record.set_key(row, None)?;
            return Ok(());
        }
        self.record.set(name, field.encode(&value)?)
    }

    pub fn update<I, N, V>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: Into<FieldValue>,
    {
        for (name, value) in fields {
            self.set(name.as_ref(), value)?;
        }
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<bool> {
        let field = self.field(name)?;
        if field.kind == FieldKind::Key {
            return Err(Error::NotSupported("deleting the key field"));
        }
        Ok(self.record.delete(name))
    }

    /// Fails with `MissingField` naming the key field when no key is set.
    pub fn save(&mut self, consistency: Option<ConsistencyLevel>) -> Result<&mut Self> {
        if self.record.key().is_none() {
            return Err(Error::MissingField(vec![self.table.key_field().name.clone()]));
        }
        self.record.save(consistency)?;
        Ok(self)
    }

    pub fn remove(&mut self, consistency: Option<ConsistencyLevel>) -> Result<()> {
        self.record.remove(consistency)?;
        Ok(())
    }
}
