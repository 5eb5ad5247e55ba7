use crate::{
    db::record::RecordCollection,
    error::InternalError,
    value::{FieldMap, Value},
};
use std::{fmt, sync::Arc};

/// Compute or on-change method: maps a singleton record to field values.
pub type ComputeFn =
    Arc<dyn Fn(&RecordCollection<'_>) -> Result<FieldMap, InternalError> + Send + Sync>;

/// Inverse method: receives the value a caller wrote to a computed field.
pub type InverseFn =
    Arc<dyn Fn(&RecordCollection<'_>, &Value) -> Result<(), InternalError> + Send + Sync>;

/// Constraint method: fails when a singleton record is not acceptable.
pub type ConstraintFn =
    Arc<dyn Fn(&RecordCollection<'_>) -> Result<(), InternalError> + Send + Sync>;

///
/// Method
///
/// Typed method registered on a model under a logical name.
/// Field declarations refer to methods by that name; the kind a field expects
/// is checked once at bootstrap.
///

#[derive(Clone)]
#[remain::sorted]
pub enum Method {
    Compute(ComputeFn),
    Constraint(ConstraintFn),
    Inverse(InverseFn),
    OnChange(ComputeFn),
}

impl Method {
    pub fn compute<F>(f: F) -> Self
    where
        F: Fn(&RecordCollection<'_>) -> Result<FieldMap, InternalError> + Send + Sync + 'static,
    {
        Self::Compute(Arc::new(f))
    }

    pub fn constraint<F>(f: F) -> Self
    where
        F: Fn(&RecordCollection<'_>) -> Result<(), InternalError> + Send + Sync + 'static,
    {
        Self::Constraint(Arc::new(f))
    }

    pub fn inverse<F>(f: F) -> Self
    where
        F: Fn(&RecordCollection<'_>, &Value) -> Result<(), InternalError> + Send + Sync + 'static,
    {
        Self::Inverse(Arc::new(f))
    }

    pub fn on_change<F>(f: F) -> Self
    where
        F: Fn(&RecordCollection<'_>) -> Result<FieldMap, InternalError> + Send + Sync + 'static,
    {
        Self::OnChange(Arc::new(f))
    }

    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::Compute(_) => "compute",
            Self::Constraint(_) => "constraint",
            Self::Inverse(_) => "inverse",
            Self::OnChange(_) => "on_change",
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Method::{}", self.kind_label())
    }
}
