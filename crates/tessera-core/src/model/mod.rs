//! Schema declarations: fields, models, typed methods and the registry that
//! freezes them and inverts computed-field dependencies.

pub mod depends;
pub mod entity;
pub mod field;
pub mod kind;
pub mod methods;
pub mod registry;

#[cfg(test)]
mod tests;

pub use depends::ComputeTrigger;
pub use entity::{CREATE_DATE_FIELD, ID_FIELD, Model, ModelId, ModelKind, WRITE_DATE_FIELD};
pub use field::{Field, LinkSpec};
pub use kind::FieldKind;
pub use methods::Method;
pub use registry::{Registry, RegistryError};
