use thiserror::Error;

use crate::error::{BoxError, MultiError};

/// Where inside a composite field an element failed.
#[derive(Debug, Error)]
pub enum ElementError {
    #[error("index {index}: {source}")]
    Index {
        index: usize,
        #[source]
        source: BoxError,
    },

    #[error("key {raw:?}: {source}")]
    Key {
        raw: String,
        #[source]
        source: BoxError,
    },

    #[error("value {raw:?}: {source}")]
    Value {
        raw: String,
        #[source]
        source: BoxError,
    },
}

#[derive(Debug, Error)]
pub enum FieldErrorKind {
    #[error("value not set")]
    ValueNotSet,

    #[error("parse failed: {0}")]
    Parse(#[source] BoxError),

    #[error("invalid map item format {item:?}, should be key{separator:?}value")]
    InvalidMapItem { item: String, separator: String },

    #[error("invalid elements:\n{0}")]
    Elements(#[source] MultiError<ElementError>),
}

/// A runtime input problem with one field.
#[derive(Debug, Error)]
#[error("{key} ({type_name}): {kind}")]
pub struct FieldError {
    pub key: String,
    pub type_name: &'static str,
    pub kind: FieldErrorKind,
}

impl FieldError {
    pub fn is_value_not_set(&self) -> bool {
        matches!(self.kind, FieldErrorKind::ValueNotSet)
    }

    pub fn is_parse(&self) -> bool {
        !self.is_value_not_set()
    }
}

/// The declared record and the decoder disagree about what is decodable.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("field {field} ({type_name}): no parser and not a record, sequence or map")]
    NoParser {
        field: &'static str,
        type_name: &'static str,
    },

    #[error("field {field}: decoded value does not match {type_name}")]
    TypeMismatch {
        field: &'static str,
        type_name: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Field(FieldError),

    #[error("{0}")]
    Fields(MultiError<FieldError>),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

impl DecodeError {
    /// Every field error carried, regardless of how many there are.
    pub fn field_errors(&self) -> Vec<&FieldError> {
        match self {
            DecodeError::Field(err) => vec![err],
            DecodeError::Fields(errors) => errors.iter().collect(),
            DecodeError::Schema(_) => Vec::new(),
        }
    }

    /// Keys that were required but absent, sorted.
    pub fn missing_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .field_errors()
            .into_iter()
            .filter(|err| err.is_value_not_set())
            .map(|err| err.key.as_str())
            .collect();
        keys.sort_unstable();
        keys
    }

    pub(crate) fn from_fields(mut errors: Vec<FieldError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop().map(DecodeError::Field),
            _ => Some(DecodeError::Fields(errors.into())),
        }
    }
}
