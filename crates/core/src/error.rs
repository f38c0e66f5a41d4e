use thiserror::Error;

use crate::model::Family;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("{label} is empty")]
    Empty { label: String },

    #[error("{label} is not a text file (found a NUL byte at offset {offset})")]
    Binary { label: String, offset: usize },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("required field `{field}` was not found in the {family} diagnostic card")]
    MissingIdentity { family: Family, field: &'static str },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuleError {
    #[error("{metric} is expressed in {found}, expected {expected}")]
    UnitMismatch {
        metric: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{0} is required but was not extracted")]
    MissingValue(&'static str),

    #[error("invalid value: {0}")]
    Invalid(String),

    #[error("rule panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("firmware lookup timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("firmware lookup is unavailable: {0}")]
    Unavailable(String),

    #[error("no firmware listed for {product_line}/{platform}")]
    NotListed {
        product_line: String,
        platform: String,
    },
}
