use lazyrow_store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("there is no key set for this record")]
    MissingKey,

    #[error("incomplete key: {0}")]
    IncompleteKey(String),

    #[error("column `{0}` may not be set to an absent value; delete it instead")]
    InvalidValue(String),

    #[error("missing required field(s): {}", .0.join(", "))]
    MissingField(Vec<String>),

    #[error("read-only records cannot be saved")]
    Immutable,

    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    #[error("invalid value for field `{field}`: {reason}")]
    Validation { field: String, reason: String },

    #[error("no record matching key {0}")]
    NoSuchRecord(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
