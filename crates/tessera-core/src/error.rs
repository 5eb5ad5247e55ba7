use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable classification.
/// `class` says how a caller should react, `origin` says which layer raised it.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl InternalError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
        }
    }

    /// Construct a schema-origin programmer error.
    pub(crate) fn schema(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Schema, ErrorOrigin::Schema, message)
    }

    /// Unknown model name.
    pub(crate) fn unknown_model(model: &str) -> Self {
        Self::schema(format!("unknown model '{model}'"))
    }

    /// Unknown field name (or json name) on a model.
    pub(crate) fn unknown_field(model: &str, field: &str) -> Self {
        Self::schema(format!("unknown field '{field}' on model '{model}'"))
    }

    /// Construct a query-origin programmer error (malformed operator/argument, bad path).
    pub(crate) fn query(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Schema, ErrorOrigin::Query, message)
    }

    /// Construct a storage error, raised by the connection layer.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Storage, ErrorOrigin::Store, message)
    }

    /// Construct a record-not-found error.
    pub(crate) fn record_not_found(model: &str, id: i64) -> Self {
        Self::new(
            ErrorClass::NotFound,
            ErrorOrigin::Record,
            format!("record {model}({id}) not found"),
        )
    }

    /// Construct a record-layer usage error (e.g. singleton expected).
    pub(crate) fn record(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Schema, ErrorOrigin::Record, message)
    }

    /// Construct a permission denial for an explicit write/unlink check.
    pub(crate) fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::PermissionDenied, ErrorOrigin::Record, message)
    }

    /// Construct the failure of a field constraint; raised by constraint
    /// methods.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Record, message)
    }

    /// Construct a trigger-origin invariant violation.
    pub(crate) fn trigger_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Trigger,
            message,
        )
    }

    #[must_use]
    pub const fn is_schema(&self) -> bool {
        matches!(self.class, ErrorClass::Schema)
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.class, ErrorClass::NotFound)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorClass
///
/// Schema errors are fatal programmer errors and are never retried.
/// NotFound and PermissionDenied are expected, recoverable outcomes.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum ErrorClass {
    Config,
    InvariantViolation,
    NotFound,
    PermissionDenied,
    Schema,
    Storage,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Config => "config",
            Self::InvariantViolation => "invariant_violation",
            Self::NotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::Schema => "schema",
            Self::Storage => "storage",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum ErrorOrigin {
    Cache,
    Config,
    Environment,
    Query,
    Record,
    Schema,
    Store,
    Trigger,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Cache => "cache",
            Self::Config => "config",
            Self::Environment => "environment",
            Self::Query => "query",
            Self::Record => "record",
            Self::Schema => "schema",
            Self::Store => "store",
            Self::Trigger => "trigger",
        };
        write!(f, "{label}")
    }
}
